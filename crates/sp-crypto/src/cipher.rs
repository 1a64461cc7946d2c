//! XML-Enc key transport and content ciphers.
//!
//! SAML encrypted assertions arrive as an `xenc:EncryptedKey` (the
//! content-encryption key wrapped with the SP's RSA public key) plus an
//! `xenc:EncryptedData` (the assertion bytes under AES). This module
//! provides both halves: RSA-OAEP / RSA PKCS#1 v1.5 unwrap and
//! AES-CBC / AES-GCM content decryption, with the matching forward
//! operations for local issuers and tests.
//!
//! Wire layout of `data` for the content ciphers follows XML-Enc:
//! CBC ciphertext is `IV(16) || ciphertext`, GCM is
//! `nonce(12) || ciphertext || tag(16)`.

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM};
use aws_lc_rs::cipher::{
    DecryptionContext, PaddedBlockDecryptingKey, PaddedBlockEncryptingKey,
    UnboundCipherKey, AES_128, AES_256,
};
use aws_lc_rs::iv::FixedLength;
use aws_lc_rs::rsa::{
    OaepPrivateDecryptingKey, OaepPublicEncryptingKey, Pkcs1PrivateDecryptingKey,
    Pkcs1PublicEncryptingKey, PrivateDecryptingKey, OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256,
};

use crate::error::CryptoError;
use crate::random::random_bytes;

const CBC_IV_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;

/// Content-encryption ciphers defined by XML-Enc for SAML assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCipher {
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-256 in CBC mode.
    Aes256Cbc,
    /// AES-128 in GCM mode.
    Aes128Gcm,
    /// AES-256 in GCM mode.
    Aes256Gcm,
}

impl BlockCipher {
    /// Returns the XML-Enc algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }

    /// Parses a cipher from its XML-Enc URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#aes128-cbc" => Some(Self::Aes128Cbc),
            "http://www.w3.org/2001/04/xmlenc#aes256-cbc" => Some(Self::Aes256Cbc),
            "http://www.w3.org/2009/xmlenc11#aes128-gcm" => Some(Self::Aes128Gcm),
            "http://www.w3.org/2009/xmlenc11#aes256-gcm" => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }
}

/// Key-transport algorithms for `xenc:EncryptedKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransport {
    /// RSA-OAEP with SHA-1 and MGF1-SHA1 (`rsa-oaep-mgf1p`).
    RsaOaepSha1,
    /// RSA-OAEP with SHA-256 and MGF1-SHA256 (xenc11 `rsa-oaep`).
    RsaOaepSha256,
    /// RSA PKCS#1 v1.5 (`rsa-1_5`).
    RsaPkcs1,
}

impl KeyTransport {
    /// Returns the XML-Enc algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepSha1 => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
            Self::RsaOaepSha256 => "http://www.w3.org/2009/xmlenc11#rsa-oaep",
            Self::RsaPkcs1 => "http://www.w3.org/2001/04/xmlenc#rsa-1_5",
        }
    }

    /// Parses a key-transport algorithm from its XML-Enc URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p" => Some(Self::RsaOaepSha1),
            "http://www.w3.org/2009/xmlenc11#rsa-oaep" => Some(Self::RsaOaepSha256),
            "http://www.w3.org/2001/04/xmlenc#rsa-1_5" => Some(Self::RsaPkcs1),
            _ => None,
        }
    }
}

/// Unwraps a content-encryption key with an RSA private key.
///
/// # Arguments
///
/// * `private_key_pkcs8` - The SP private key in PKCS#8 DER form
/// * `transport` - The key-transport algorithm from `EncryptionMethod`
/// * `wrapped` - The `CipherValue` bytes of the `EncryptedKey`
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] when the key does not unwrap the
/// value (the caller tries the next configured key on this error).
pub fn unwrap_key(
    private_key_pkcs8: &[u8],
    transport: KeyTransport,
    wrapped: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let private_key = PrivateDecryptingKey::from_pkcs8(private_key_pkcs8)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA private key: {e}")))?;

    match transport {
        KeyTransport::RsaOaepSha1 | KeyTransport::RsaOaepSha256 => {
            let oaep = OaepPrivateDecryptingKey::new(private_key)
                .map_err(|e| CryptoError::InvalidKey(format!("key unusable for OAEP: {e}")))?;
            let alg = match transport {
                KeyTransport::RsaOaepSha1 => &OAEP_SHA1_MGF1SHA1,
                _ => &OAEP_SHA256_MGF1SHA256,
            };
            let mut out = vec![0u8; oaep.min_output_size()];
            let len = oaep
                .decrypt(alg, wrapped, &mut out, None)
                .map_err(|e| CryptoError::Decryption(format!("OAEP unwrap failed: {e}")))?
                .len();
            out.truncate(len);
            Ok(out)
        }
        KeyTransport::RsaPkcs1 => {
            let pkcs1 = Pkcs1PrivateDecryptingKey::new(private_key)
                .map_err(|e| CryptoError::InvalidKey(format!("key unusable for PKCS#1: {e}")))?;
            let mut out = vec![0u8; pkcs1.min_output_size()];
            let len = pkcs1
                .decrypt(wrapped, &mut out)
                .map_err(|e| CryptoError::Decryption(format!("PKCS#1 unwrap failed: {e}")))?
                .len();
            out.truncate(len);
            Ok(out)
        }
    }
}

/// Wraps a content-encryption key for the holder of the given private key.
///
/// The public half is derived from the private key; this exists for the
/// encrypting side of round-trip tests and local stub issuers.
///
/// # Errors
///
/// Returns an error if the key is rejected or encryption fails.
pub fn wrap_key(
    recipient_private_key_pkcs8: &[u8],
    transport: KeyTransport,
    cek: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let private_key = PrivateDecryptingKey::from_pkcs8(recipient_private_key_pkcs8)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA private key: {e}")))?;
    let public_key = private_key.public_key();

    match transport {
        KeyTransport::RsaOaepSha1 | KeyTransport::RsaOaepSha256 => {
            let oaep = OaepPublicEncryptingKey::new(public_key)
                .map_err(|e| CryptoError::InvalidKey(format!("key unusable for OAEP: {e}")))?;
            let alg = match transport {
                KeyTransport::RsaOaepSha1 => &OAEP_SHA1_MGF1SHA1,
                _ => &OAEP_SHA256_MGF1SHA256,
            };
            let mut out = vec![0u8; oaep.ciphertext_size()];
            let len = oaep
                .encrypt(alg, cek, &mut out, None)
                .map_err(|e| CryptoError::Encryption(format!("OAEP wrap failed: {e}")))?
                .len();
            out.truncate(len);
            Ok(out)
        }
        KeyTransport::RsaPkcs1 => {
            let pkcs1 = Pkcs1PublicEncryptingKey::new(public_key)
                .map_err(|e| CryptoError::InvalidKey(format!("key unusable for PKCS#1: {e}")))?;
            let mut out = vec![0u8; pkcs1.ciphertext_size()];
            let len = pkcs1
                .encrypt(cek, &mut out)
                .map_err(|e| CryptoError::Encryption(format!("PKCS#1 wrap failed: {e}")))?
                .len();
            out.truncate(len);
            Ok(out)
        }
    }
}

/// Decrypts XML-Enc content ciphertext.
///
/// `data` carries the IV/nonce prefix as produced by [`encrypt`] and by
/// conforming XML-Enc encryptors.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] on short input, bad padding, or
/// a failed GCM tag check.
pub fn decrypt(cipher: BlockCipher, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != cipher.key_len() {
        return Err(CryptoError::InvalidKey(format!(
            "expected {}-byte key, got {}",
            cipher.key_len(),
            key.len()
        )));
    }

    match cipher {
        BlockCipher::Aes128Cbc | BlockCipher::Aes256Cbc => {
            if data.len() < CBC_IV_LEN + CBC_IV_LEN {
                return Err(CryptoError::Decryption("CBC ciphertext too short".into()));
            }
            let alg = if cipher == BlockCipher::Aes128Cbc {
                &AES_128
            } else {
                &AES_256
            };
            let unbound = UnboundCipherKey::new(alg, key)
                .map_err(|e| CryptoError::InvalidKey(format!("AES key rejected: {e}")))?;
            let decrypting_key = PaddedBlockDecryptingKey::cbc_pkcs7(unbound)
                .map_err(|e| CryptoError::Decryption(format!("CBC setup failed: {e}")))?;

            let iv = FixedLength::<CBC_IV_LEN>::try_from(&data[..CBC_IV_LEN])
                .map_err(|_| CryptoError::Decryption("invalid CBC IV".into()))?;
            let mut in_out = data[CBC_IV_LEN..].to_vec();
            let plaintext = decrypting_key
                .decrypt(&mut in_out, DecryptionContext::Iv128(iv))
                .map_err(|e| CryptoError::Decryption(format!("CBC decrypt failed: {e}")))?;
            Ok(plaintext.to_vec())
        }
        BlockCipher::Aes128Gcm | BlockCipher::Aes256Gcm => {
            if data.len() < GCM_NONCE_LEN + 16 {
                return Err(CryptoError::Decryption("GCM ciphertext too short".into()));
            }
            let alg = if cipher == BlockCipher::Aes128Gcm {
                &AES_128_GCM
            } else {
                &AES_256_GCM
            };
            let unbound = UnboundKey::new(alg, key)
                .map_err(|e| CryptoError::InvalidKey(format!("AES key rejected: {e}")))?;
            let aead_key = LessSafeKey::new(unbound);

            let nonce = Nonce::try_assume_unique_for_key(&data[..GCM_NONCE_LEN])
                .map_err(|_| CryptoError::Decryption("invalid GCM nonce".into()))?;
            let mut in_out = data[GCM_NONCE_LEN..].to_vec();
            let plaintext = aead_key
                .open_in_place(nonce, Aad::empty(), &mut in_out)
                .map_err(|_| CryptoError::Decryption("GCM tag check failed".into()))?;
            Ok(plaintext.to_vec())
        }
    }
}

/// Encrypts plaintext under an XML-Enc content cipher.
///
/// Output carries the IV/nonce prefix expected by [`decrypt`].
///
/// # Errors
///
/// Returns an error if the key is rejected or encryption fails.
pub fn encrypt(cipher: BlockCipher, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != cipher.key_len() {
        return Err(CryptoError::InvalidKey(format!(
            "expected {}-byte key, got {}",
            cipher.key_len(),
            key.len()
        )));
    }

    match cipher {
        BlockCipher::Aes128Cbc | BlockCipher::Aes256Cbc => {
            let alg = if cipher == BlockCipher::Aes128Cbc {
                &AES_128
            } else {
                &AES_256
            };
            let unbound = UnboundCipherKey::new(alg, key)
                .map_err(|e| CryptoError::InvalidKey(format!("AES key rejected: {e}")))?;
            let encrypting_key = PaddedBlockEncryptingKey::cbc_pkcs7(unbound)
                .map_err(|e| CryptoError::Encryption(format!("CBC setup failed: {e}")))?;

            let mut in_out = plaintext.to_vec();
            let context = encrypting_key
                .encrypt(&mut in_out)
                .map_err(|e| CryptoError::Encryption(format!("CBC encrypt failed: {e}")))?;
            let iv = match context {
                DecryptionContext::Iv128(iv) => iv.as_ref().to_vec(),
                _ => return Err(CryptoError::Encryption("unexpected cipher context".into())),
            };

            let mut out = iv;
            out.extend_from_slice(&in_out);
            Ok(out)
        }
        BlockCipher::Aes128Gcm | BlockCipher::Aes256Gcm => {
            let alg = if cipher == BlockCipher::Aes128Gcm {
                &AES_128_GCM
            } else {
                &AES_256_GCM
            };
            let unbound = UnboundKey::new(alg, key)
                .map_err(|e| CryptoError::InvalidKey(format!("AES key rejected: {e}")))?;
            let aead_key = LessSafeKey::new(unbound);

            let nonce_bytes = random_bytes(GCM_NONCE_LEN);
            let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
                .map_err(|_| CryptoError::Encryption("nonce generation failed".into()))?;
            let mut in_out = plaintext.to_vec();
            aead_key
                .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
                .map_err(|e| CryptoError::Encryption(format!("GCM encrypt failed: {e}")))?;

            let mut out = nonce_bytes;
            out.extend_from_slice(&in_out);
            Ok(out)
        }
    }
}
