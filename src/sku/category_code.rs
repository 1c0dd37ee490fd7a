//! Short uppercase abbreviations derived from display names.

/// Maximum length of a derived code.
pub const CODE_LEN: usize = 3;

/// Reduce a display name to at most three uppercase alphanumeric characters.
///
/// Used for the category segment of every format and the item segment of
/// the `custom` format. Names with fewer alphanumerics yield a shorter code;
/// nothing is padded.
pub fn derive_code(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .take(CODE_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_code_truncates_to_three() {
        assert_eq!(derive_code("Fertilizer"), "FER");
        assert_eq!(derive_code("vegetables"), "VEG");
    }

    #[test]
    fn test_derive_code_strips_punctuation_and_spaces() {
        assert_eq!(derive_code("N-P-K mix"), "NPK");
        assert_eq!(derive_code("  a b  "), "AB");
    }

    #[test]
    fn test_derive_code_keeps_digits() {
        assert_eq!(derive_code("5kg seed"), "5KG");
    }

    #[test]
    fn test_derive_code_short_names_are_not_padded() {
        assert_eq!(derive_code("Ox"), "OX");
        assert_eq!(derive_code("---"), "");
        assert_eq!(derive_code(""), "");
    }
}
