//! Hex-pubkey validation and canonicalization.
//!
//! All pubkeys in the notary's data model are lowercase hex strings of
//! length 64 (32 raw bytes). Validation is deliberately permissive about
//! case on input and strict about length and alphabet.

/// Returns `true` iff `value` is a 64-character hex string (case-insensitive).
pub fn is_hex_pubkey(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lowercases a pubkey. Callers should validate with [`is_hex_pubkey`] first;
/// this function does not itself check length or alphabet.
pub fn normalize_pubkey(value: &str) -> String {
    value.to_ascii_lowercase()
}

/// Validates and lowercases a pubkey in one step.
pub fn validate_and_normalize(value: &str) -> Option<String> {
    if is_hex_pubkey(value) {
        Some(normalize_pubkey(value))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_hex() {
        let key = "a".repeat(64);
        assert!(is_hex_pubkey(&key));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_hex_pubkey(&"a".repeat(63)));
        assert!(!is_hex_pubkey(&"a".repeat(65)));
    }

    #[test]
    fn rejects_non_hex_chars() {
        let mut key = "a".repeat(63);
        key.push('z');
        assert!(!is_hex_pubkey(&key));
    }

    #[test]
    fn normalizes_to_lowercase() {
        let key = "A".repeat(64);
        assert_eq!(validate_and_normalize(&key), Some("a".repeat(64)));
    }
}
