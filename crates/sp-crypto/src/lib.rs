//! # sp-crypto
//!
//! Cryptographic operations for the SAML2 service-provider core,
//! built on aws-lc-rs.
//!
//! The algorithms here are the ones the SAML 2.0 wire formats demand:
//! RSA PKCS#1 v1.5 signatures over SHA-256/384/512 for XML-DSig,
//! RSA-OAEP / RSA PKCS#1 v1.5 key transport and AES-CBC / AES-GCM
//! content ciphers for XML-Enc, and SHA-1 where the standard pins it
//! (artifact SourceID derivation).

#![forbid(unsafe_code)]

pub mod cipher;
pub mod error;
pub mod hash;
pub mod random;
pub mod rsa;

pub use cipher::{BlockCipher, KeyTransport};
pub use error::CryptoError;
pub use hash::{sha1, sha256, sha384, sha512};
pub use rsa::RsaSignatureAlgorithm;
