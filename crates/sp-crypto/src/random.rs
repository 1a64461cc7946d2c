//! Cryptographically secure random generation.
//!
//! Used for SAML message IDs, artifact message handles, and relay-state
//! correlation keys. All of these are security-bearing values: an ID a
//! peer can predict is an ID a peer can forge a correlation for.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Generates `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates `byte_len` random bytes rendered as lowercase hex.
#[must_use]
pub fn random_hex(byte_len: usize) -> String {
    let bytes = random_bytes(byte_len);
    let mut out = String::with_capacity(byte_len * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Generates a random alphanumeric string of the given length.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a URL-safe base64 random string from `byte_len` random bytes.
///
/// Safe to place in query strings without further encoding.
#[must_use]
pub fn random_base64url(byte_len: usize) -> String {
    let bytes = random_bytes(byte_len);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_bytes_length_and_variability() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_ne!(random_bytes(32), random_bytes(32));
    }

    #[test]
    fn random_hex_format() {
        let s = random_hex(16);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn random_alphanumeric_charset() {
        let s = random_alphanumeric(256);
        assert_eq!(s.len(), 256);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_base64url_is_url_safe() {
        let s = random_base64url(24);
        assert!(s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hex_values_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| random_hex(16)).collect();
        assert_eq!(ids.len(), 1000);
    }
}
