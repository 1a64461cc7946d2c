//! HTTP-Redirect binding.
//!
//! Messages ride the query string: DEFLATE-compressed, base64-encoded,
//! percent-encoded. The optional detached signature covers the exact
//! percent-encoded octets of `SAMLRequest|SAMLResponse=..[&RelayState=
//! ..]&SigAlg=..` as they appear in the final URL, in that order. The
//! easiest way to break interop with signed Redirect is to sign a
//! differently-escaped rendition of those bytes, so both signing and
//! verification here work on the final wire form and never re-encode.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};
use crate::options::Options;
use crate::signature::{SignatureAlgorithm, XmlSigner};
use crate::types::{SamlBinding, SAML_NS};
use crate::xml::Element;

use super::{Binding, CommandResult, HttpRequestData, SamlMessage, SamlMessageType, UnboundMessage};

/// Ceiling on the encoded payload before base64 decoding, against
/// memory exhaustion from oversized input.
const MAX_ENCODED_SIZE: usize = 128 * 1024;

/// Ceiling on the inflated payload, against deflate bombs.
const MAX_INFLATED_SIZE: u64 = 256 * 1024;

/// HTTP-Redirect binding.
pub struct HttpRedirectBinding;

#[async_trait]
impl Binding for HttpRedirectBinding {
    fn binding_type(&self) -> SamlBinding {
        SamlBinding::HttpRedirect
    }

    fn can_unbind(&self, request: &HttpRequestData) -> bool {
        request.method == "GET"
            && (request.query.contains_key("SAMLRequest")
                || request.query.contains_key("SAMLResponse"))
    }

    fn bind(&self, message: &SamlMessage, signer: Option<&XmlSigner>) -> SamlResult<CommandResult> {
        message.check()?;

        let compressed = deflate(message.xml.as_bytes())?;
        let payload = STANDARD.encode(compressed);

        // Build the percent-encoded query in canonical order; these are
        // the octets a signature covers.
        let mut query = format!(
            "{}={}",
            message.message_type.form_param(),
            urlencoding::encode(&payload)
        );
        if let Some(relay_state) = &message.relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(relay_state));
        }

        if let Some(signer) = signer {
            query.push_str("&SigAlg=");
            query.push_str(&urlencoding::encode(signer.algorithm().uri()));
            let signature = signer.sign_query(&query)?;
            query.push_str("&Signature=");
            query.push_str(&urlencoding::encode(&signature));
        }

        let separator = if message.destination.contains('?') { '&' } else { '?' };
        let location = format!("{}{}{}", message.destination, separator, query);

        tracing::debug!(
            destination = %message.destination,
            signed = signer.is_some(),
            "bound message to HTTP-Redirect"
        );
        Ok(CommandResult::redirect(location))
    }

    async fn unbind(
        &self,
        request: &HttpRequestData,
        options: &Options,
    ) -> SamlResult<UnboundMessage> {
        let (encoded, message_type) = if let Some(value) = request.query.get("SAMLRequest") {
            (value, SamlMessageType::Request)
        } else if let Some(value) = request.query.get("SAMLResponse") {
            (value, SamlMessageType::Response)
        } else {
            return Err(SamlError::UnsupportedBinding(
                "no SAMLRequest or SAMLResponse query parameter".to_string(),
            ));
        };

        if encoded.len() > MAX_ENCODED_SIZE {
            return Err(SamlError::Base64Decode(format!(
                "encoded payload exceeds {MAX_ENCODED_SIZE} bytes"
            )));
        }

        // A literal '+' in the payload reaches us as a space when the
        // host decodes the query with form semantics.
        let encoded = encoded.replace(' ', "+");
        let compressed = STANDARD.decode(encoded)?;
        let xml = inflate(&compressed)?;

        if request.query.contains_key("Signature") {
            verify_query_signature(request, options, &xml)?;
        }

        Ok(UnboundMessage {
            xml,
            message_type,
            relay_state: request.query.get("RelayState").cloned(),
        })
    }
}

/// Verifies the detached query signature against the issuing IdP's key
/// set, using the raw percent-encoded octets from the request URL.
fn verify_query_signature(
    request: &HttpRequestData,
    options: &Options,
    xml: &str,
) -> SamlResult<()> {
    let sig_alg = request
        .query
        .get("SigAlg")
        .ok_or_else(|| SamlError::SignatureInvalid("Signature without SigAlg".to_string()))?;
    let algorithm = SignatureAlgorithm::from_uri(sig_alg).ok_or_else(|| {
        SamlError::SignatureInvalid(format!("unsupported signature algorithm: {sig_alg}"))
    })?;

    let signature = STANDARD
        .decode(request.query.get("Signature").map(String::as_str).unwrap_or(""))
        .map_err(|e| SamlError::SignatureInvalid(format!("bad signature encoding: {e}")))?;

    let raw_query = request
        .url
        .query()
        .ok_or_else(|| SamlError::SignatureInvalid("no query string".to_string()))?;
    let signed_data = signed_octets(raw_query)
        .ok_or_else(|| SamlError::SignatureInvalid("incomplete signed query".to_string()))?;

    // Key selection needs the issuer, which only exists inside the XML;
    // this reads the issuer element and nothing else before the
    // signature check passes.
    let issuer = peek_issuer(xml)?;
    let idp = options.identity_provider(&issuer)?;
    let keys = idp.verification_keys();

    for key in &keys {
        if sp_crypto::rsa::rsa_verify(
            key,
            signed_data.as_bytes(),
            &signature,
            algorithm.crypto_algorithm(),
        )
        .unwrap_or(false)
        {
            return Ok(());
        }
    }

    tracing::warn!(issuer = %issuer, "redirect query signature failed verification");
    Err(SamlError::SignatureInvalid(
        "no configured key verified the query signature".to_string(),
    ))
}

/// Reassembles the signed portion of a raw query string in the
/// canonical order, preserving the original percent-encoding.
fn signed_octets(raw_query: &str) -> Option<String> {
    let mut message = None;
    let mut relay_state = None;
    let mut sig_alg = None;

    for pair in raw_query.split('&') {
        if pair.starts_with("SAMLRequest=") || pair.starts_with("SAMLResponse=") {
            message = Some(pair);
        } else if pair.starts_with("RelayState=") {
            relay_state = Some(pair);
        } else if pair.starts_with("SigAlg=") {
            sig_alg = Some(pair);
        }
    }

    let mut out = String::from(message?);
    if let Some(relay_state) = relay_state {
        out.push('&');
        out.push_str(relay_state);
    }
    out.push('&');
    out.push_str(sig_alg?);
    Some(out)
}

fn peek_issuer(xml: &str) -> SamlResult<String> {
    let root = Element::parse(xml)?;
    root.child(SAML_NS, "Issuer")
        .map(|el| el.text().trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| SamlError::XmlMalformed("signed message has no Issuer".to_string()))
}

fn deflate(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn inflate(data: &[u8]) -> SamlResult<String> {
    let mut xml = String::new();
    DeflateDecoder::new(data)
        .take(MAX_INFLATED_SIZE)
        .read_to_string(&mut xml)?;
    if xml.len() as u64 >= MAX_INFLATED_SIZE {
        return Err(SamlError::Deflate(format!(
            "inflated payload exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{IdentityProvider, SpOptions};
    use aws_lc_rs::encoding::AsDer;
    use aws_lc_rs::rsa::KeySize;
    use aws_lc_rs::signature::{KeyPair, RsaKeyPair};

    fn message(relay_state: Option<&str>) -> SamlMessage {
        SamlMessage {
            xml: r#"<saml2p:AuthnRequest xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1" Version="2.0"></saml2p:AuthnRequest>"#
                .to_string(),
            message_type: SamlMessageType::Request,
            issuer: "https://sp.example.com".to_string(),
            destination: "https://idp.example.com/sso".to_string(),
            relay_state: relay_state.map(str::to_string),
        }
    }

    fn options_with_key(public_der: Vec<u8>) -> Options {
        let mut idp =
            IdentityProvider::new("https://idp.example.com", "https://idp.example.com/sso");
        idp.signing_keys.push(public_der);
        Options::new(SpOptions::new(
            "https://sp.example.com",
            "https://sp.example.com/acs",
        ))
        .with_identity_provider(idp)
    }

    #[tokio::test]
    async fn bind_unbind_round_trip() {
        let binding = HttpRedirectBinding;
        let message = message(Some("state123"));

        let result = binding.bind(&message, None).unwrap();
        let request = HttpRequestData::get(result.location().unwrap()).unwrap();
        assert!(binding.can_unbind(&request));

        let options = options_with_key(Vec::new());
        let unbound = binding.unbind(&request, &options).await.unwrap();
        assert_eq!(unbound.xml, message.xml);
        assert_eq!(unbound.message_type, SamlMessageType::Request);
        assert_eq!(unbound.relay_state.as_deref(), Some("state123"));
    }

    #[tokio::test]
    async fn relay_state_round_trips_url_unsafe_characters() {
        let binding = HttpRedirectBinding;
        let relay_state = "a+b=c&d e";
        let message = message(Some(relay_state));

        let result = binding.bind(&message, None).unwrap();
        let request = HttpRequestData::get(result.location().unwrap()).unwrap();
        let options = options_with_key(Vec::new());
        let unbound = binding.unbind(&request, &options).await.unwrap();

        assert_eq!(unbound.relay_state.as_deref(), Some(relay_state));
    }

    #[tokio::test]
    async fn signed_query_round_trip() {
        let key_pair = RsaKeyPair::generate(KeySize::Rsa2048).expect("keygen");
        let private_der = key_pair.as_der().unwrap().as_ref().to_vec();
        let public_der = key_pair.public_key().as_ref().to_vec();

        let binding = HttpRedirectBinding;
        // The signed message must carry an Issuer for key selection.
        let mut message = message(Some("foo bar"));
        message.xml = r#"<saml2p:AuthnRequest xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0"><saml2:Issuer>https://idp.example.com</saml2:Issuer></saml2p:AuthnRequest>"#.to_string();

        let signer = XmlSigner::new(private_der, None);
        let result = binding.bind(&message, Some(&signer)).unwrap();
        let location = result.location().unwrap();
        assert!(location.contains("SigAlg="));
        assert!(location.contains("Signature="));

        let request = HttpRequestData::get(location).unwrap();
        let options = options_with_key(public_der);
        let unbound = binding.unbind(&request, &options).await.unwrap();
        assert_eq!(unbound.relay_state.as_deref(), Some("foo bar"));
    }

    #[tokio::test]
    async fn tampered_signed_query_is_rejected() {
        let key_pair = RsaKeyPair::generate(KeySize::Rsa2048).expect("keygen");
        let private_der = key_pair.as_der().unwrap().as_ref().to_vec();
        let public_der = key_pair.public_key().as_ref().to_vec();

        let binding = HttpRedirectBinding;
        let mut message = message(Some("original"));
        message.xml = r#"<saml2p:AuthnRequest xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0"><saml2:Issuer>https://idp.example.com</saml2:Issuer></saml2p:AuthnRequest>"#.to_string();

        let signer = XmlSigner::new(private_der, None);
        let result = binding.bind(&message, Some(&signer)).unwrap();
        let tampered = result
            .location()
            .unwrap()
            .replace("RelayState=original", "RelayState=attacker");

        let request = HttpRequestData::get(&tampered).unwrap();
        let options = options_with_key(public_der);
        assert!(matches!(
            binding.unbind(&request, &options).await.unwrap_err(),
            SamlError::SignatureInvalid(_)
        ));
    }

    #[test]
    fn signed_octets_canonical_order() {
        // Order in the URL must not matter; the canonical order does.
        let raw = "SigAlg=alg&SAMLResponse=abc&RelayState=xyz&Signature=sig";
        assert_eq!(
            signed_octets(raw).unwrap(),
            "SAMLResponse=abc&RelayState=xyz&SigAlg=alg"
        );

        let without_relay = "SAMLRequest=abc&SigAlg=alg";
        assert_eq!(
            signed_octets(without_relay).unwrap(),
            "SAMLRequest=abc&SigAlg=alg"
        );

        assert!(signed_octets("RelayState=xyz").is_none());
    }

    #[test]
    fn deflate_round_trip() {
        let compressed = deflate(b"some SAML message").unwrap();
        assert_eq!(inflate(&compressed).unwrap(), "some SAML message");
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let binding = HttpRedirectBinding;
        let huge = "A".repeat(MAX_ENCODED_SIZE + 1);
        let mut request = HttpRequestData::get("https://sp.example.com/acs?x=1").unwrap();
        request.query.insert("SAMLResponse".to_string(), huge);

        let options = options_with_key(Vec::new());
        assert!(matches!(
            binding.unbind(&request, &options).await.unwrap_err(),
            SamlError::Base64Decode(_)
        ));
    }
}
