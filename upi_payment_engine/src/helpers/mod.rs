mod extract;
mod fingerprint;
mod upi_uri;

pub use extract::{extract_amount, extract_utr, is_valid_utr, parse_money, reference_token};
pub use fingerprint::{new_fingerprint, FINGERPRINT_LEN};
pub use upi_uri::upi_collection_uri;
