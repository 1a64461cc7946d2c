//! Encrypted-assertion handling.
//!
//! Unwraps `saml2:EncryptedAssertion` elements: the RSA-wrapped content
//! key comes out of the `xenc:EncryptedKey`, the assertion bytes out of
//! the `xenc:EncryptedData`. Key selection never trusts the sender's
//! `KeyInfo` naming: every configured private key is tried in order,
//! and the first one that works is used for the whole response (the
//! assertions of one response share a session-key policy).

use base64::{engine::general_purpose::STANDARD, Engine};
use sp_crypto::{BlockCipher, KeyTransport};

use crate::error::{SamlError, SamlResult};
use crate::types::{SAML_NS, XMLDSIG_NS, XMLENC_NS};
use crate::xml::Element;

/// Decrypts every `EncryptedAssertion` child of a response document.
///
/// Returns the cleartext `Assertion` elements, in document order. An
/// empty result means the response had no encrypted assertions.
///
/// # Errors
///
/// * [`SamlError::NoDecryptionKey`] - encrypted assertions exist but no
///   private key is configured
/// * [`SamlError::DecryptionFailed`] - no key unwraps the first
///   assertion, or the winning key fails on a later one
pub fn decrypt_assertions(
    response_document: &Element,
    decryption_keys: &[Vec<u8>],
) -> SamlResult<Vec<Element>> {
    let encrypted: Vec<&Element> = response_document
        .children_named(SAML_NS, "EncryptedAssertion")
        .collect();

    if encrypted.is_empty() {
        return Ok(Vec::new());
    }
    if decryption_keys.is_empty() {
        return Err(SamlError::NoDecryptionKey);
    }

    let mut assertions = Vec::with_capacity(encrypted.len());
    let mut winning_key: Option<&Vec<u8>> = None;

    for element in encrypted {
        match winning_key {
            Some(key) => {
                // Later assertions must decrypt with the key that won on
                // the first one; divergence rejects the whole response.
                let assertion = decrypt_one(element, key)?;
                assertions.push(assertion);
            }
            None => {
                let mut last_error = None;
                for key in decryption_keys {
                    match decrypt_one(element, key) {
                        Ok(assertion) => {
                            winning_key = Some(key);
                            assertions.push(assertion);
                            break;
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                if winning_key.is_none() {
                    tracing::warn!(
                        keys_tried = decryption_keys.len(),
                        "no configured key decrypted the assertion"
                    );
                    return Err(match last_error {
                        Some(SamlError::DecryptionFailed(msg)) => {
                            SamlError::DecryptionFailed(msg)
                        }
                        Some(other) => other,
                        None => SamlError::DecryptionFailed("no keys tried".to_string()),
                    });
                }
            }
        }
    }

    Ok(assertions)
}

fn decrypt_one(encrypted_assertion: &Element, private_key: &[u8]) -> SamlResult<Element> {
    let encrypted_data = encrypted_assertion
        .child(XMLENC_NS, "EncryptedData")
        .ok_or_else(|| SamlError::DecryptionFailed("missing EncryptedData".to_string()))?;

    let cipher = encrypted_data
        .child(XMLENC_NS, "EncryptionMethod")
        .and_then(|el| el.attr("Algorithm"))
        .and_then(BlockCipher::from_uri)
        .ok_or_else(|| {
            SamlError::DecryptionFailed("unsupported content encryption algorithm".to_string())
        })?;

    // The EncryptedKey usually sits in the EncryptedData's KeyInfo, but
    // some IdPs emit it as a sibling inside the EncryptedAssertion.
    let encrypted_key = encrypted_data
        .child(XMLDSIG_NS, "KeyInfo")
        .and_then(|key_info| key_info.child(XMLENC_NS, "EncryptedKey"))
        .or_else(|| encrypted_assertion.child(XMLENC_NS, "EncryptedKey"))
        .ok_or_else(|| SamlError::DecryptionFailed("missing EncryptedKey".to_string()))?;

    let transport = encrypted_key
        .child(XMLENC_NS, "EncryptionMethod")
        .and_then(|el| el.attr("Algorithm"))
        .and_then(KeyTransport::from_uri)
        .ok_or_else(|| {
            SamlError::DecryptionFailed("unsupported key transport algorithm".to_string())
        })?;

    let wrapped_key = cipher_value(encrypted_key)?;
    let content_key = sp_crypto::cipher::unwrap_key(private_key, transport, &wrapped_key)
        .map_err(|e| SamlError::DecryptionFailed(e.to_string()))?;

    if content_key.len() != cipher.key_len() {
        return Err(SamlError::DecryptionFailed(format!(
            "unwrapped key has wrong length for {}",
            cipher.uri()
        )));
    }

    let ciphertext = cipher_value(encrypted_data)?;
    let plaintext = sp_crypto::cipher::decrypt(cipher, &content_key, &ciphertext)
        .map_err(|e| SamlError::DecryptionFailed(e.to_string()))?;

    let xml = String::from_utf8(plaintext)
        .map_err(|_| SamlError::DecryptionFailed("decrypted bytes are not UTF-8".to_string()))?;
    let assertion = Element::parse(&xml)
        .map_err(|e| SamlError::DecryptionFailed(format!("decrypted XML is invalid: {e}")))?;

    if !assertion.is(SAML_NS, "Assertion") {
        return Err(SamlError::DecryptionFailed(format!(
            "decrypted element is {}, not an Assertion",
            assertion.qname()
        )));
    }

    Ok(assertion)
}

fn cipher_value(parent: &Element) -> SamlResult<Vec<u8>> {
    let value = parent
        .child(XMLENC_NS, "CipherData")
        .and_then(|cipher_data| cipher_data.child(XMLENC_NS, "CipherValue"))
        .map(|el| {
            el.text()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
        })
        .ok_or_else(|| SamlError::DecryptionFailed("missing CipherValue".to_string()))?;

    STANDARD
        .decode(value)
        .map_err(|e| SamlError::DecryptionFailed(format!("bad CipherValue encoding: {e}")))
}

/// Produces an `EncryptedAssertion` element for the holder of the given
/// private key. The encrypting side of the round trip, for stub issuers
/// and tests.
///
/// # Errors
///
/// Returns an error when the assertion XML is malformed or a
/// cryptographic step fails.
pub fn encrypt_assertion(
    assertion_xml: &str,
    recipient_private_key_pkcs8: &[u8],
    cipher: BlockCipher,
    transport: KeyTransport,
) -> SamlResult<String> {
    // Validate the input before paying for any crypto.
    let assertion = Element::parse(assertion_xml)?;
    if !assertion.is(SAML_NS, "Assertion") {
        return Err(SamlError::XmlMalformed(
            "encrypt_assertion expects a saml2:Assertion".to_string(),
        ));
    }
    let canonical = assertion.to_xml();

    let content_key = sp_crypto::random::random_bytes(cipher.key_len());
    let ciphertext = sp_crypto::cipher::encrypt(cipher, &content_key, canonical.as_bytes())
        .map_err(|e| SamlError::Crypto(e.to_string()))?;
    let wrapped_key =
        sp_crypto::cipher::wrap_key(recipient_private_key_pkcs8, transport, &content_key)
            .map_err(|e| SamlError::Crypto(e.to_string()))?;

    Ok(format!(
        concat!(
            r#"<saml2:EncryptedAssertion xmlns:saml2="{saml}">"#,
            r#"<xenc:EncryptedData xmlns:xenc="{xenc}" Type="http://www.w3.org/2001/04/xmlenc#Element">"#,
            r#"<xenc:EncryptionMethod Algorithm="{cipher}"></xenc:EncryptionMethod>"#,
            r#"<ds:KeyInfo xmlns:ds="{ds}">"#,
            r#"<xenc:EncryptedKey>"#,
            r#"<xenc:EncryptionMethod Algorithm="{transport}"></xenc:EncryptionMethod>"#,
            r#"<xenc:CipherData><xenc:CipherValue>{wrapped}</xenc:CipherValue></xenc:CipherData>"#,
            r#"</xenc:EncryptedKey>"#,
            r#"</ds:KeyInfo>"#,
            r#"<xenc:CipherData><xenc:CipherValue>{data}</xenc:CipherValue></xenc:CipherData>"#,
            r#"</xenc:EncryptedData>"#,
            r#"</saml2:EncryptedAssertion>"#,
        ),
        saml = SAML_NS,
        xenc = XMLENC_NS,
        ds = XMLDSIG_NS,
        cipher = cipher.uri(),
        transport = transport.uri(),
        wrapped = STANDARD.encode(wrapped_key),
        data = STANDARD.encode(ciphertext),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lc_rs::encoding::AsDer;
    use aws_lc_rs::rsa::{KeySize, PrivateDecryptingKey};

    fn test_private_key() -> Vec<u8> {
        PrivateDecryptingKey::generate(KeySize::Rsa2048)
            .expect("keygen")
            .as_der()
            .expect("serialize key")
            .as_ref()
            .to_vec()
    }

    const ASSERTION: &str = r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0" IssueInstant="2024-06-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer></saml2:Assertion>"#;

    fn response_with(encrypted: &str) -> Element {
        Element::parse(&format!(
            r#"<saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1" Version="2.0">{encrypted}</saml2p:Response>"#
        ))
        .unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = test_private_key();
        let encrypted =
            encrypt_assertion(ASSERTION, &key, BlockCipher::Aes128Cbc, KeyTransport::RsaOaepSha1)
                .unwrap();
        let document = response_with(&encrypted);

        let assertions = decrypt_assertions(&document, &[key]).unwrap();
        assert_eq!(assertions.len(), 1);
        assert!(assertions[0].is(SAML_NS, "Assertion"));
        assert_eq!(assertions[0].attr("ID"), Some("_a1"));
    }

    #[test]
    fn gcm_round_trip() {
        let key = test_private_key();
        let encrypted = encrypt_assertion(
            ASSERTION,
            &key,
            BlockCipher::Aes256Gcm,
            KeyTransport::RsaOaepSha256,
        )
        .unwrap();
        let document = response_with(&encrypted);

        let assertions = decrypt_assertions(&document, &[key]).unwrap();
        assert_eq!(assertions.len(), 1);
    }

    #[test]
    fn second_configured_key_succeeds() {
        // The first key fails to unwrap; its error is swallowed and the
        // second key decrypts.
        let wrong_key = test_private_key();
        let right_key = test_private_key();
        let encrypted = encrypt_assertion(
            ASSERTION,
            &right_key,
            BlockCipher::Aes128Cbc,
            KeyTransport::RsaOaepSha1,
        )
        .unwrap();
        let document = response_with(&encrypted);

        let assertions = decrypt_assertions(&document, &[wrong_key, right_key]).unwrap();
        assert_eq!(assertions.len(), 1);
    }

    #[test]
    fn no_matching_key_fails() {
        let key = test_private_key();
        let other = test_private_key();
        let encrypted =
            encrypt_assertion(ASSERTION, &key, BlockCipher::Aes128Cbc, KeyTransport::RsaOaepSha1)
                .unwrap();
        let document = response_with(&encrypted);

        assert!(matches!(
            decrypt_assertions(&document, &[other]).unwrap_err(),
            SamlError::DecryptionFailed(_)
        ));
    }

    #[test]
    fn no_keys_configured_fails_distinctly() {
        let key = test_private_key();
        let encrypted =
            encrypt_assertion(ASSERTION, &key, BlockCipher::Aes128Cbc, KeyTransport::RsaOaepSha1)
                .unwrap();
        let document = response_with(&encrypted);

        assert_eq!(
            decrypt_assertions(&document, &[]).unwrap_err(),
            SamlError::NoDecryptionKey
        );
    }

    #[test]
    fn plaintext_response_yields_nothing() {
        let document = response_with("");
        assert!(decrypt_assertions(&document, &[test_private_key()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn non_assertion_plaintext_is_rejected() {
        let key = test_private_key();
        // Encrypt something that is not an assertion by bypassing the
        // builder's own check.
        let content_key = sp_crypto::random::random_bytes(16);
        let ciphertext = sp_crypto::cipher::encrypt(
            BlockCipher::Aes128Cbc,
            &content_key,
            b"<Bogus xmlns=\"urn:x\"></Bogus>",
        )
        .unwrap();
        let wrapped =
            sp_crypto::cipher::wrap_key(&key, KeyTransport::RsaOaepSha1, &content_key).unwrap();
        let encrypted = format!(
            r#"<saml2:EncryptedAssertion xmlns:saml2="{SAML_NS}"><xenc:EncryptedData xmlns:xenc="{XMLENC_NS}"><xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"></xenc:EncryptionMethod><ds:KeyInfo xmlns:ds="{XMLDSIG_NS}"><xenc:EncryptedKey><xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p"></xenc:EncryptionMethod><xenc:CipherData><xenc:CipherValue>{}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedKey></ds:KeyInfo><xenc:CipherData><xenc:CipherValue>{}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData></saml2:EncryptedAssertion>"#,
            STANDARD.encode(&wrapped),
            STANDARD.encode(&ciphertext),
        );
        let document = response_with(&encrypted);

        assert!(matches!(
            decrypt_assertions(&document, &[key]).unwrap_err(),
            SamlError::DecryptionFailed(_)
        ));
    }
}
