use blake2::{Blake2b512, Digest};

/// Width of a transaction fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 24;

/// Derives a fresh transaction fingerprint for a payment.
///
/// The fingerprint is an opaque, fixed-length token: a Blake2b digest over the merchant id, the
/// merchant's reference and a random 16-byte salt, hex encoded and truncated. The salt means a
/// client retrying the same reference gets a different fingerprint every time; collisions are
/// only possible by hash collision and surface as a unique-constraint violation on insert,
/// which the ledger handles by regenerating.
pub fn new_fingerprint(merchant_id: &str, reference: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let mut hasher = Blake2b512::new();
    hasher.update(merchant_id.as_bytes());
    hasher.update(reference.as_bytes());
    hasher.update(salt);
    let mut fingerprint = hex::encode(hasher.finalize());
    fingerprint.truncate(FINGERPRINT_LEN);
    fingerprint
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn fixed_length_hex() {
        let fp = new_fingerprint("merchant-001", "order-42");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn no_collisions_for_identical_inputs() {
        // Same merchant and reference, 1000 times over. Every fingerprint must be distinct.
        let fingerprints: HashSet<String> =
            (0..1000).map(|_| new_fingerprint("merchant-001", "order-42")).collect();
        assert_eq!(fingerprints.len(), 1000);
    }
}
