use regex::Regex;
use sha2::{Digest, Sha256};

/// VIN handling utilities
///
/// VINs are treated as sensitive identifiers:
/// 1. Log lines carry the masked form (last four characters only)
/// 2. Cache rows carry a SHA-256 fingerprint next to the plaintext VIN so
///    downstream joins never re-expose the identifier
/// 3. The fingerprint is recomputed on every write for consistency

/// Checks that a string has VIN shape: 17 chars, no I/O/Q.
pub fn is_valid_vin(vin: &str) -> bool {
    if vin.len() != 17 {
        return false;
    }
    let vin_regex = Regex::new(r"^[A-HJ-NPR-Z0-9]{17}$").unwrap();
    vin_regex.is_match(&vin.to_uppercase())
}

/// Masks a VIN for logging, keeping only the last four characters.
pub fn mask_vin(vin: &str) -> String {
    if vin.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = vin.chars().collect();
    let visible = chars.len().min(4);
    let last: String = chars[chars.len() - visible..].iter().collect();
    format!("{}{}", "*".repeat(13), last)
}

/// Non-reversible VIN fingerprint (SHA-256, hex encoded).
pub fn vin_fingerprint(vin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(vin.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_vins() {
        assert!(is_valid_vin("1HGCM82633A004352"));
        assert!(is_valid_vin("5YJ3E1EA7KF317000"));
        // lower case accepted
        assert!(is_valid_vin("1hgcm82633a004352"));
    }

    #[test]
    fn test_invalid_vins() {
        // wrong length
        assert!(!is_valid_vin("1HGCM82633A00435"));
        assert!(!is_valid_vin(""));
        // I, O and Q never appear in a VIN
        assert!(!is_valid_vin("1HGCM82633A00435I"));
        assert!(!is_valid_vin("OHGCM82633A004352"));
        assert!(!is_valid_vin("QHGCM82633A004352"));
    }

    #[test]
    fn test_mask_keeps_last_four() {
        let masked = mask_vin("1HGCM82633A004352");
        assert!(masked.ends_with("4352"));
        assert!(!masked.contains("1HGCM"));
        assert_eq!(mask_vin(""), "");
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = vin_fingerprint("1HGCM82633A004352");
        let b = vin_fingerprint("1HGCM82633A004352");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, "1HGCM82633A004352");
    }

    #[test]
    fn test_fingerprint_differs_per_vin() {
        assert_ne!(
            vin_fingerprint("1HGCM82633A004352"),
            vin_fingerprint("1HGCM82633A004353")
        );
    }
}
