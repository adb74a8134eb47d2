//! Regex extraction of UTR-like tokens and money amounts from bank statement narrative text.
//!
//! Banks format their statements differently, but UTR references reliably show up as a 12-22
//! character alphanumeric token introduced by "UTR", "Ref" or "Reference", and amounts carry a
//! currency marker or a labelled column. These helpers pull both out of free text; the
//! format-specific row splitting lives in the statement extractors.

use regex::Regex;
use upg_common::Paisa;

/// Finds the first UTR-like token in the text: a 12-22 character alphanumeric run introduced
/// by a UTR/Ref/Reference marker.
pub fn extract_utr(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)(?:UTR|REF(?:ERENCE)?)\.?\s*(?:NO\.?|NUMBER)?\s*[:\s]\s*([A-Za-z0-9]{12,22})\b").unwrap();
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Checks whether a string is plausibly a bank UTR: 12-22 alphanumeric characters.
pub fn is_valid_utr(utr: &str) -> bool {
    (12..=22).contains(&utr.len()) && utr.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Finds the first reference-like token in the text: an alphanumeric word of at least four
/// characters that mixes letters and digits. A weaker form of evidence than a full UTR, used
/// when a statement row carries no recognisable UTR at all.
pub fn reference_token(text: &str) -> Option<String> {
    let re = Regex::new(r"\b([A-Za-z]+[0-9][A-Za-z0-9]*)\b").unwrap();
    for caps in re.captures_iter(text) {
        let token = caps[1].to_string();
        if token.len() >= 4 {
            return Some(token);
        }
    }
    None
}

/// Parses a plain money string like "1,234.56" or "1000" into paise. Returns `None` for
/// anything that is not a positive amount.
pub fn parse_money(s: &str) -> Option<Paisa> {
    let re = Regex::new(r"^\s*([0-9][0-9,]*)(?:\.([0-9]{1,2}))?\s*$").unwrap();
    let caps = re.captures(s)?;
    let rupees: i64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let paise: i64 = match caps.get(2) {
        Some(frac) if frac.as_str().len() == 1 => frac.as_str().parse::<i64>().ok()? * 10,
        Some(frac) => frac.as_str().parse().ok()?,
        None => 0,
    };
    let total = rupees.checked_mul(100)?.checked_add(paise)?;
    if total > 0 {
        Some(Paisa::from(total))
    } else {
        None
    }
}

/// Finds the first positive money amount in free text, trying currency-marked and labelled
/// forms in decreasing order of confidence.
pub fn extract_amount(text: &str) -> Option<Paisa> {
    let patterns = [
        r"(?:Rs\.?|INR|₹)\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
        r"(?i)(?:Amount|Amt|Total|Credit)\s*[:\s]\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
        r"([0-9][0-9,]*(?:\.[0-9]{1,2})?)\s*(?:Rs\.?|INR|/-|₹)",
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap();
        if let Some(amount) = re.captures(text).and_then(|c| c.get(1)).and_then(|m| parse_money(m.as_str())) {
            return Some(amount);
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn finds_utr_tokens() {
        assert_eq!(extract_utr("UTR: AXIS12345678901 credited").as_deref(), Some("AXIS12345678901"));
        assert_eq!(extract_utr("NEFT Ref No. 123456789012 Rs. 500").as_deref(), Some("123456789012"));
        assert_eq!(extract_utr("Reference Number HDFC0001234567890").as_deref(), Some("HDFC0001234567890"));
        // Too short to be a UTR
        assert_eq!(extract_utr("UTR: ABC123"), None);
        assert_eq!(extract_utr("no reference here"), None);
    }

    #[test]
    fn validates_utrs() {
        assert!(is_valid_utr("AXIS12345678901"));
        assert!(is_valid_utr("123456789012"));
        assert!(!is_valid_utr("UTR1"));
        assert!(!is_valid_utr("has spaces 123456789"));
        assert!(!is_valid_utr("12345678901234567890123"));
    }

    #[test]
    fn finds_reference_tokens() {
        assert_eq!(reference_token("payment ref UTR1 received").as_deref(), Some("UTR1"));
        assert_eq!(reference_token("NEFT AXIS12345678901 credit").as_deref(), Some("AXIS12345678901"));
        // Pure words and pure numbers do not qualify
        assert_eq!(reference_token("CASH DEPOSIT 1500.00"), None);
        assert_eq!(reference_token("12/08/2024 CHARGES"), None);
    }

    #[test]
    fn parses_money() {
        assert_eq!(parse_money("1000"), Some(Paisa::from(100_000)));
        assert_eq!(parse_money("1,234.56"), Some(Paisa::from(123_456)));
        assert_eq!(parse_money("0.5"), Some(Paisa::from(50)));
        assert_eq!(parse_money("0"), None);
        assert_eq!(parse_money("12/08/2024"), None);
        assert_eq!(parse_money("abc"), None);
    }

    #[test]
    fn finds_amounts_in_text() {
        assert_eq!(extract_amount("credited Rs. 1,000.00 via NEFT"), Some(Paisa::from(100_000)));
        assert_eq!(extract_amount("INR 500 received"), Some(Paisa::from(50_000)));
        assert_eq!(extract_amount("Amount: 250.50"), Some(Paisa::from(25_050)));
        assert_eq!(extract_amount("750/- transferred"), Some(Paisa::from(75_000)));
        assert_eq!(extract_amount("nothing to see"), None);
    }
}
