//! XML Signature support.
//!
//! Signing and verification of enveloped XML-DSig signatures on SAML
//! messages and assertions, plus the detached query-string signature of
//! the HTTP-Redirect binding.

mod signer;
mod verifier;

pub use signer::XmlSigner;
pub use verifier::{find_signature, verify_signed_element};

use crate::types::{digest_algorithms, signature_algorithms};

/// Signature algorithms accepted on SAML messages.
///
/// RSA-SHA1 is deliberately absent: a signature using it fails
/// verification as an unsupported algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256 (the interop baseline).
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
}

impl SignatureAlgorithm {
    /// Returns the XML-DSig URI for this algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
        }
    }

    /// Returns the matching digest algorithm URI.
    #[must_use]
    pub const fn digest_uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => digest_algorithms::SHA256,
            Self::RsaSha384 => digest_algorithms::SHA384,
            Self::RsaSha512 => digest_algorithms::SHA512,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            _ => None,
        }
    }

    /// Maps to the sp-crypto algorithm.
    #[must_use]
    pub(crate) const fn crypto_algorithm(&self) -> sp_crypto::RsaSignatureAlgorithm {
        match self {
            Self::RsaSha256 => sp_crypto::RsaSignatureAlgorithm::Sha256,
            Self::RsaSha384 => sp_crypto::RsaSignatureAlgorithm::Sha384,
            Self::RsaSha512 => sp_crypto::RsaSignatureAlgorithm::Sha512,
        }
    }
}
