//! Description normalization, similarity scoring and amount comparison

use bigdecimal::BigDecimal;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Identical after normalization
pub const SIMILARITY_NORMALIZED_EXACT: u32 = 95;
/// Identical once only letters and digits are kept
pub const SIMILARITY_ALPHANUMERIC_EXACT: u32 = 90;
/// One description contains the other
pub const SIMILARITY_CONTAINS: u32 = 85;
/// Lower and upper bound of the shared-word score
pub const SIMILARITY_WORDS_FLOOR: u32 = 20;
pub const SIMILARITY_WORDS_CEILING: u32 = 80;
/// Nothing in common
pub const SIMILARITY_FALLBACK: u32 = 10;

const MIN_WORD_LEN: usize = 3;

fn vendor_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "MERPAGO*", "PAYPAL *", "SQ *" and similar processor prefixes
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]{2,10}\s?\*\s*").expect("valid regex"))
}

fn installment_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "3/6", "(03/12)", "C.03/12", "CUOTA 3/6"
    RE.get_or_init(|| {
        Regex::new(r"\s*(?:\b(?:CUOTAS?|C\.)\s*)?\(?\d{1,2}\s*/\s*\d{1,2}\)?\s*$")
            .expect("valid regex")
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Uppercase, drop processor prefixes and trailing installment markers
pub fn normalize_description(raw: &str) -> String {
    let mut text = whitespace_re()
        .replace_all(raw.trim(), " ")
        .to_uppercase();
    loop {
        let next = vendor_prefix_re().replace(&text, "").trim().to_string();
        if next == text {
            break;
        }
        text = next;
    }
    installment_suffix_re()
        .replace(&text, "")
        .trim()
        .to_string()
}

/// Description with trailing installment markers removed, case preserved
pub fn strip_installment_marker(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    match installment_suffix_re().find(&upper) {
        // uppercasing can change byte lengths, so only cut when they agree
        Some(m) if upper.len() == raw.trim().len() => raw.trim()[..m.start()].trim().to_string(),
        _ => raw.trim().to_string(),
    }
}

fn alphanumeric(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn significant_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN && !w.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Similarity of two descriptions on a 0-100 scale
pub fn description_similarity(a: &str, b: &str) -> u32 {
    let a = normalize_description(a);
    let b = normalize_description(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    if a == b {
        return SIMILARITY_NORMALIZED_EXACT;
    }

    let (alnum_a, alnum_b) = (alphanumeric(&a), alphanumeric(&b));
    if !alnum_a.is_empty() && alnum_a == alnum_b {
        return SIMILARITY_ALPHANUMERIC_EXACT;
    }

    let shorter = alnum_a.len().min(alnum_b.len());
    if shorter >= MIN_WORD_LEN && (a.contains(&b) || b.contains(&a)) {
        return SIMILARITY_CONTAINS;
    }

    let words_a = significant_words(&a);
    let words_b = significant_words(&b);
    let shared = words_a.intersection(&words_b).count();
    if shared > 0 {
        let larger = words_a.len().max(words_b.len()) as u32;
        let span = SIMILARITY_WORDS_CEILING - SIMILARITY_WORDS_FLOOR;
        return SIMILARITY_WORDS_FLOOR + span * shared as u32 / larger;
    }

    SIMILARITY_FALLBACK
}

/// Round to the cent
pub fn to_cents(amount: &BigDecimal) -> BigDecimal {
    amount.round(2)
}

/// Two amounts match when their absolute values agree to the cent
pub fn amounts_match(a: &BigDecimal, b: &BigDecimal) -> bool {
    to_cents(&a.abs()) == to_cents(&b.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalization_strips_prefix_and_installments() {
        assert_eq!(normalize_description("MERPAGO*Libreria Sur"), "LIBRERIA SUR");
        assert_eq!(normalize_description("  Tienda   Central  03/12 "), "TIENDA CENTRAL");
        assert_eq!(normalize_description("PAYPAL *STEAM C.02/06"), "STEAM");
        assert_eq!(normalize_description("Colchones (1/3)"), "COLCHONES");
    }

    #[test]
    fn test_strip_installment_marker_keeps_case() {
        assert_eq!(strip_installment_marker("Smart TV 3/6"), "Smart TV");
        assert_eq!(strip_installment_marker("Groceries"), "Groceries");
    }

    #[test]
    fn test_similarity_ladder() {
        assert_eq!(description_similarity("Netflix", "NETFLIX"), 95);
        assert_eq!(description_similarity("MC DONALDS", "MCDONALDS"), 90);
        assert_eq!(
            description_similarity("SUPERMERCADO", "SUPERMERCADO 1234"),
            SIMILARITY_CONTAINS
        );

        let shared = description_similarity("FARMACIA CENTRO NORTE", "FARMACIA OESTE SUR");
        assert!(shared >= SIMILARITY_WORDS_FLOOR && shared <= SIMILARITY_WORDS_CEILING);

        assert_eq!(description_similarity("AIRLINE", "BAKERY"), SIMILARITY_FALLBACK);
        assert_eq!(description_similarity("", "BAKERY"), 0);
    }

    #[test]
    fn test_amounts_match_on_absolute_cents() {
        let a = BigDecimal::from_str("100.004").unwrap();
        let b = BigDecimal::from_str("-100.00").unwrap();
        assert!(amounts_match(&a, &b));
        assert!(!amounts_match(&a, &BigDecimal::from_str("100.01").unwrap()));
    }
}
