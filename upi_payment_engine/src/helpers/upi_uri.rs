use upg_common::{Paisa, INR_CURRENCY_CODE};
use url::form_urlencoded::Serializer;

/// Builds a `upi://pay` collection URI for the given payee VPA.
///
/// The transaction note carries the payment fingerprint, so the token travels with the payer
/// into their banking app and comes back on the bank statement narrative, where the
/// reconciliation matcher can pick it up.
pub fn upi_collection_uri(upi_id: &str, payee_name: &str, amount: Paisa, note: &str) -> String {
    let query = Serializer::new(String::new())
        .append_pair("pa", upi_id)
        .append_pair("pn", payee_name)
        .append_pair("am", &amount.to_rupee_string())
        .append_pair("cu", INR_CURRENCY_CODE)
        .append_pair("tn", note)
        .finish();
    format!("upi://pay?{query}")
}
