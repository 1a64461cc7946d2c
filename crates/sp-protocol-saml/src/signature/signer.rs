//! Enveloped XML signature creation.
//!
//! Produces signatures the verifier in this crate (and any conforming
//! XML-DSig consumer) accepts: exclusive C14N, enveloped-signature
//! transform, digest and signature algorithms matched, signature
//! inserted after the `Issuer` element per the SAML schema.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{SamlError, SamlResult};
use crate::types::{transform_algorithms, SAML_NS, XMLDSIG_NS};
use crate::xml::{exclusive_c14n, Element, Node};

use super::SignatureAlgorithm;

/// XML document signer holding the SP signing key.
pub struct XmlSigner {
    /// RSA private key in DER form (PKCS#1 or PKCS#8).
    private_key_der: Vec<u8>,
    /// X.509 certificate in DER form, embedded in `KeyInfo` when present.
    certificate_der: Option<Vec<u8>>,
    /// Signature algorithm.
    algorithm: SignatureAlgorithm,
}

impl XmlSigner {
    /// Creates a signer with the default algorithm (RSA-SHA256).
    #[must_use]
    pub fn new(private_key_der: Vec<u8>, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            private_key_der,
            certificate_der,
            algorithm: SignatureAlgorithm::default(),
        }
    }

    /// Sets the signature algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Returns the configured signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Signs the element with the given ID inside `xml` and returns the
    /// document with the `ds:Signature` inserted.
    ///
    /// The target may be the document element or a descendant (an
    /// assertion inside a response).
    ///
    /// # Errors
    ///
    /// Returns an error when the ID is not found, the XML is malformed,
    /// or the key is rejected.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let mut root = Element::parse(xml)?;

        let target = find_by_id(&root, reference_id).ok_or_else(|| {
            SamlError::Internal(format!("element with ID '{reference_id}' not found"))
        })?;

        // Digest over the canonical target before the signature exists
        // inside it; the enveloped-signature transform will remove it
        // again on the verifying side.
        let canonical_target = exclusive_c14n(target);
        let digest = match self.algorithm {
            SignatureAlgorithm::RsaSha256 => sp_crypto::sha256(canonical_target.as_bytes()),
            SignatureAlgorithm::RsaSha384 => sp_crypto::sha384(canonical_target.as_bytes()),
            SignatureAlgorithm::RsaSha512 => sp_crypto::sha512(canonical_target.as_bytes()),
        };
        let digest_b64 = STANDARD.encode(digest);

        let signed_info_xml = build_signed_info(reference_id, &digest_b64, self.algorithm);
        let signed_info = Element::parse(&signed_info_xml)?;
        let canonical_signed_info = exclusive_c14n(&signed_info);

        let signature_bytes = sp_crypto::rsa::rsa_sign(
            &self.private_key_der,
            canonical_signed_info.as_bytes(),
            self.algorithm.crypto_algorithm(),
        )
        .map_err(|e| SamlError::Crypto(format!("signing failed: {e}")))?;
        let signature_b64 = STANDARD.encode(signature_bytes);

        let signature_xml = build_signature_element(
            &signed_info_xml,
            &signature_b64,
            self.certificate_der.as_deref(),
        );
        let signature_element = Element::parse(&signature_xml)?;

        let target_mut = find_by_id_mut(&mut root, reference_id)
            .ok_or_else(|| SamlError::Internal("signed element vanished".to_string()))?;
        let position = insert_position(target_mut);
        target_mut
            .children
            .insert(position, Node::Element(signature_element));

        Ok(exclusive_c14n(&root))
    }

    /// Computes the detached HTTP-Redirect query signature.
    ///
    /// The input must be the exact percent-encoded octets of
    /// `SAMLRequest|SAMLResponse=..[&RelayState=..]&SigAlg=..` as they
    /// appear in the final URL; signing anything else breaks interop
    /// with every conforming peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is rejected.
    pub fn sign_query(&self, signed_query: &str) -> SamlResult<String> {
        let signature = sp_crypto::rsa::rsa_sign(
            &self.private_key_der,
            signed_query.as_bytes(),
            self.algorithm.crypto_algorithm(),
        )
        .map_err(|e| SamlError::Crypto(format!("query signing failed: {e}")))?;
        Ok(STANDARD.encode(signature))
    }
}

fn find_by_id<'a>(element: &'a Element, id: &str) -> Option<&'a Element> {
    if element.attr("ID") == Some(id) {
        return Some(element);
    }
    element
        .child_elements()
        .find_map(|child| find_by_id(child, id))
}

fn find_by_id_mut<'a>(element: &'a mut Element, id: &str) -> Option<&'a mut Element> {
    if element.attr("ID") == Some(id) {
        return Some(element);
    }
    for node in &mut element.children {
        if let Node::Element(child) = node {
            if let Some(found) = find_by_id_mut(child, id) {
                return Some(found);
            }
        }
    }
    None
}

/// The SAML schema places `ds:Signature` directly after `Issuer`.
fn insert_position(element: &Element) -> usize {
    for (index, node) in element.children.iter().enumerate() {
        if let Node::Element(child) = node {
            if child.is(SAML_NS, "Issuer") {
                return index + 1;
            }
        }
    }
    0
}

fn build_signed_info(
    reference_id: &str,
    digest_b64: &str,
    algorithm: SignatureAlgorithm,
) -> String {
    format!(
        concat!(
            r#"<ds:SignedInfo xmlns:ds="{ds}">"#,
            r#"<ds:CanonicalizationMethod Algorithm="{c14n}"></ds:CanonicalizationMethod>"#,
            r#"<ds:SignatureMethod Algorithm="{sig_alg}"></ds:SignatureMethod>"#,
            r##"<ds:Reference URI="#{id}">"##,
            r#"<ds:Transforms>"#,
            r#"<ds:Transform Algorithm="{enveloped}"></ds:Transform>"#,
            r#"<ds:Transform Algorithm="{c14n}"></ds:Transform>"#,
            r#"</ds:Transforms>"#,
            r#"<ds:DigestMethod Algorithm="{digest_alg}"></ds:DigestMethod>"#,
            r#"<ds:DigestValue>{digest}</ds:DigestValue>"#,
            r#"</ds:Reference>"#,
            r#"</ds:SignedInfo>"#,
        ),
        ds = XMLDSIG_NS,
        c14n = transform_algorithms::EXCLUSIVE_C14N,
        sig_alg = algorithm.uri(),
        enveloped = transform_algorithms::ENVELOPED_SIGNATURE,
        digest_alg = algorithm.digest_uri(),
        id = reference_id,
        digest = digest_b64,
    )
}

fn build_signature_element(
    signed_info_xml: &str,
    signature_b64: &str,
    certificate_der: Option<&[u8]>,
) -> String {
    let key_info = certificate_der
        .map(|cert| {
            format!(
                "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                STANDARD.encode(cert)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">{signed_info_xml}<ds:SignatureValue>{signature_b64}</ds:SignatureValue>{key_info}</ds:Signature>"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::verify_signed_element;
    use aws_lc_rs::encoding::AsDer;
    use aws_lc_rs::rsa::KeySize;
    use aws_lc_rs::signature::{KeyPair, RsaKeyPair};

    fn test_key() -> (Vec<u8>, Vec<u8>) {
        let key_pair = RsaKeyPair::generate(KeySize::Rsa2048).expect("keygen");
        let private_der = key_pair.as_der().expect("serialize key").as_ref().to_vec();
        let public_der = key_pair.public_key().as_ref().to_vec();
        (private_der, public_der)
    }

    const UNSIGNED: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0"><saml:Issuer>https://idp.example.com</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"></samlp:StatusCode></samlp:Status></samlp:Response>"#;

    #[test]
    fn signature_lands_after_issuer() {
        let (private_der, _) = test_key();
        let signed = XmlSigner::new(private_der, None).sign(UNSIGNED, "_r1").unwrap();

        let root = Element::parse(&signed).unwrap();
        let children: Vec<&Element> = root.child_elements().collect();
        assert!(children[0].is(SAML_NS, "Issuer"));
        assert!(children[1].is(XMLDSIG_NS, "Signature"));
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let (private_der, public_der) = test_key();
        let signed = XmlSigner::new(private_der, None).sign(UNSIGNED, "_r1").unwrap();

        let root = Element::parse(&signed).unwrap();
        verify_signed_element(&root, &[public_der]).unwrap();
    }

    #[test]
    fn sha512_round_trip() {
        let (private_der, public_der) = test_key();
        let signed = XmlSigner::new(private_der, None)
            .with_algorithm(SignatureAlgorithm::RsaSha512)
            .sign(UNSIGNED, "_r1")
            .unwrap();

        let root = Element::parse(&signed).unwrap();
        verify_signed_element(&root, &[public_der]).unwrap();
    }

    #[test]
    fn nested_assertion_can_be_signed() {
        let (private_der, public_der) = test_key();
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0"><saml:Issuer>https://idp.example.com</saml:Issuer><saml:Assertion ID="_a1" Version="2.0"><saml:Issuer>https://idp.example.com</saml:Issuer><saml:Subject></saml:Subject></saml:Assertion></samlp:Response>"#;

        let signed = XmlSigner::new(private_der, None).sign(xml, "_a1").unwrap();
        let root = Element::parse(&signed).unwrap();
        let assertion = root.child(SAML_NS, "Assertion").unwrap();
        verify_signed_element(assertion, &[public_der]).unwrap();
    }

    #[test]
    fn unknown_reference_id_errors() {
        let (private_der, _) = test_key();
        let result = XmlSigner::new(private_der, None).sign(UNSIGNED, "_missing");
        assert!(result.is_err());
    }

    #[test]
    fn certificate_is_embedded_when_present() {
        let (private_der, _) = test_key();
        let signed = XmlSigner::new(private_der, Some(vec![1, 2, 3, 4]))
            .sign(UNSIGNED, "_r1")
            .unwrap();
        assert!(signed.contains("X509Certificate"));
    }
}
