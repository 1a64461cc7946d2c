//! RSA PKCS#1 v1.5 signatures for XML-DSig.
//!
//! SAML 2.0 interop requires RSA-SHA256 at minimum; SHA-384 and SHA-512
//! variants are carried for IdPs that negotiate them. Public keys are
//! accepted as DER `SubjectPublicKeyInfo` (what x509-parser hands back
//! from a certificate) or raw PKCS#1 `RSAPublicKey`; aws-lc-rs parses
//! both.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, RsaKeyPair},
};

use crate::error::CryptoError;

/// RSA signature algorithms used by the SAML signature pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaSignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256.
    Sha256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    Sha384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    Sha512,
}

impl RsaSignatureAlgorithm {
    /// Returns the XML-DSig algorithm URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Sha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }
}

/// Signs data with an RSA private key.
///
/// # Arguments
///
/// * `key_der` - RSA private key in DER form (PKCS#1 or PKCS#8)
/// * `data` - Data to sign
/// * `algorithm` - Signature algorithm
///
/// # Errors
///
/// Returns an error if the key is rejected or signing fails.
pub fn rsa_sign(
    key_der: &[u8],
    data: &[u8],
    algorithm: RsaSignatureAlgorithm,
) -> Result<Vec<u8>, CryptoError> {
    let key_pair = RsaKeyPair::from_der(key_der)
        .or_else(|_| RsaKeyPair::from_pkcs8(key_der))
        .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA key: {e}")))?;

    let rng = SystemRandom::new();
    let mut sig = vec![0u8; key_pair.public_modulus_len()];

    let padding = match algorithm {
        RsaSignatureAlgorithm::Sha256 => &signature::RSA_PKCS1_SHA256,
        RsaSignatureAlgorithm::Sha384 => &signature::RSA_PKCS1_SHA384,
        RsaSignatureAlgorithm::Sha512 => &signature::RSA_PKCS1_SHA512,
    };

    key_pair
        .sign(padding, &rng, data, &mut sig)
        .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;

    Ok(sig)
}

/// Verifies an RSA signature.
///
/// # Arguments
///
/// * `public_key_der` - Public key as DER `SubjectPublicKeyInfo` or PKCS#1
/// * `data` - Data that was signed
/// * `sig` - Signature bytes
/// * `algorithm` - Signature algorithm
///
/// # Errors
///
/// Returns `Ok(false)` when the signature does not verify; errors are
/// reserved for unusable inputs.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaSignatureAlgorithm,
) -> Result<bool, CryptoError> {
    use aws_lc_rs::signature::{
        UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384,
        RSA_PKCS1_2048_8192_SHA512,
    };

    let verification_alg: &dyn signature::VerificationAlgorithm = match algorithm {
        RsaSignatureAlgorithm::Sha256 => &RSA_PKCS1_2048_8192_SHA256,
        RsaSignatureAlgorithm::Sha384 => &RSA_PKCS1_2048_8192_SHA384,
        RsaSignatureAlgorithm::Sha512 => &RSA_PKCS1_2048_8192_SHA512,
    };

    let public_key = UnparsedPublicKey::new(verification_alg, public_key_der);

    match public_key.verify(data, sig) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
