//! Error type shared by the crypto modules.

use thiserror::Error;

/// Errors from cryptographic operations.
///
/// Verification failure is deliberately generic so callers cannot leak
/// oracle detail to peers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material could not be parsed or is unusable.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Signature verification failed.
    #[error("signature verification failed")]
    Verification,

    /// The requested algorithm is not available in this build.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),

    /// Decryption failed (wrong key, corrupt ciphertext, or bad padding).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_error_is_generic() {
        // Must not reveal why verification failed.
        assert_eq!(
            CryptoError::Verification.to_string(),
            "signature verification failed"
        );
    }
}
