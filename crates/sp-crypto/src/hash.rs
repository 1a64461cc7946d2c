//! Digest functions.
//!
//! SHA-256 is the working digest for XML-DSig references. SHA-1 exists
//! solely because SAML 2.0 §3.6.4 defines the artifact SourceID as
//! SHA-1 of the issuer entity id; it must not be used for signatures.

use aws_lc_rs::digest;

/// Computes a SHA-1 digest.
///
/// # Warning
///
/// Provided only for SAML artifact SourceID derivation per the binding
/// specification. Do not use for any integrity purpose.
#[must_use]
pub fn sha1(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data)
        .as_ref()
        .to_vec()
}

/// Computes a SHA-256 digest.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Computes a SHA-384 digest.
#[must_use]
pub fn sha384(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA384, data).as_ref().to_vec()
}

/// Computes a SHA-512 digest.
#[must_use]
pub fn sha512(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA512, data).as_ref().to_vec()
}
