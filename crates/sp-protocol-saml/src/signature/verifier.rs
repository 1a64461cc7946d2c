//! Enveloped XML signature verification.
//!
//! The checks here are the ones that keep SAML honest. Signature
//! wrapping attacks work by making the verifier hash one element while
//! the application consumes another; the defense is structural: exactly
//! one reference, the reference must point at the element carrying the
//! signature, and only the enveloped-signature and exclusive-C14N
//! transforms may appear in the chain.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{SamlError, SamlResult};
use crate::types::{digest_algorithms, transform_algorithms, XMLDSIG_NS};
use crate::xml::{exclusive_c14n, Element};

use super::SignatureAlgorithm;

/// Returns the `ds:Signature` element directly under `root`, if any.
#[must_use]
pub fn find_signature(root: &Element) -> Option<&Element> {
    root.child(XMLDSIG_NS, "Signature")
}

/// Verifies the enveloped signature on `root` against a set of
/// candidate public keys (DER `SubjectPublicKeyInfo`).
///
/// Verification succeeds when any key validates both the reference
/// digest and the signature value. Multiple keys support IdP
/// certificate rollover; the sender's `KeyInfo` is never consulted for
/// key selection because IdPs omit or mangle it too often to trust.
///
/// # Errors
///
/// * [`SamlError::NotSigned`] - no `ds:Signature` child
/// * [`SamlError::NoReference`] / [`SamlError::MultipleReferences`] -
///   the `SignedInfo` reference shape is wrong
/// * [`SamlError::ReferenceMismatch`] - reference URI is not
///   `#<root ID>`
/// * [`SamlError::DisallowedTransform`] - transform outside the
///   allow-list
/// * [`SamlError::SignatureInvalid`] - digest or signature check failed
/// * [`SamlError::Sha256NotRegistered`] - backend lacks RSA-SHA256
pub fn verify_signed_element(root: &Element, candidate_keys: &[Vec<u8>]) -> SamlResult<()> {
    let signature = find_signature(root).ok_or(SamlError::NotSigned)?;

    let signed_info = signature
        .child(XMLDSIG_NS, "SignedInfo")
        .ok_or_else(|| SamlError::SignatureInvalid("missing SignedInfo".to_string()))?;

    let references: Vec<&Element> = signed_info
        .children_named(XMLDSIG_NS, "Reference")
        .collect();
    let reference = match references.len() {
        0 => return Err(SamlError::NoReference),
        1 => references[0],
        n => return Err(SamlError::MultipleReferences(n)),
    };

    let root_id = root
        .attr("ID")
        .ok_or_else(|| SamlError::SignatureInvalid("signed element has no ID".to_string()))?;
    let reference_uri = reference.attr("URI").unwrap_or("");
    if reference_uri != format!("#{root_id}") {
        return Err(SamlError::ReferenceMismatch {
            expected: root_id.to_string(),
            actual: reference_uri.to_string(),
        });
    }

    if let Some(transforms) = reference.child(XMLDSIG_NS, "Transforms") {
        for transform in transforms.children_named(XMLDSIG_NS, "Transform") {
            let algorithm = transform.attr("Algorithm").unwrap_or("");
            let allowed = matches!(
                algorithm,
                transform_algorithms::ENVELOPED_SIGNATURE
                    | transform_algorithms::EXCLUSIVE_C14N
                    | transform_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS
            );
            if !allowed {
                return Err(SamlError::DisallowedTransform(algorithm.to_string()));
            }
        }
    }

    if let Some(c14n_method) = signed_info.child(XMLDSIG_NS, "CanonicalizationMethod") {
        let algorithm = c14n_method.attr("Algorithm").unwrap_or("");
        let supported = matches!(
            algorithm,
            transform_algorithms::EXCLUSIVE_C14N
                | transform_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS
        );
        if !supported {
            return Err(SamlError::DisallowedTransform(algorithm.to_string()));
        }
    }

    verify_reference_digest(root, reference)?;
    verify_signature_value(signature, signed_info, candidate_keys)
}

fn verify_reference_digest(root: &Element, reference: &Element) -> SamlResult<()> {
    let digest_method = reference
        .child(XMLDSIG_NS, "DigestMethod")
        .and_then(|el| el.attr("Algorithm"))
        .ok_or_else(|| SamlError::SignatureInvalid("missing DigestMethod".to_string()))?;

    let expected = reference
        .child(XMLDSIG_NS, "DigestValue")
        .map(|el| strip_whitespace(&el.text()))
        .ok_or_else(|| SamlError::SignatureInvalid("missing DigestValue".to_string()))?;

    // Enveloped-signature transform: hash the element with its own
    // signature removed.
    let content = root.without_child(XMLDSIG_NS, "Signature");
    let canonical = exclusive_c14n(&content);

    let digest = match digest_method {
        digest_algorithms::SHA256 => sp_crypto::sha256(canonical.as_bytes()),
        digest_algorithms::SHA384 => sp_crypto::sha384(canonical.as_bytes()),
        digest_algorithms::SHA512 => sp_crypto::sha512(canonical.as_bytes()),
        other => {
            return Err(SamlError::SignatureInvalid(format!(
                "unsupported digest algorithm: {other}"
            )));
        }
    };

    if STANDARD.encode(digest) != expected {
        return Err(SamlError::SignatureInvalid(
            "reference digest mismatch".to_string(),
        ));
    }

    Ok(())
}

fn verify_signature_value(
    signature: &Element,
    signed_info: &Element,
    candidate_keys: &[Vec<u8>],
) -> SamlResult<()> {
    let algorithm_uri = signed_info
        .child(XMLDSIG_NS, "SignatureMethod")
        .and_then(|el| el.attr("Algorithm"))
        .ok_or_else(|| SamlError::SignatureInvalid("missing SignatureMethod".to_string()))?;

    let algorithm = SignatureAlgorithm::from_uri(algorithm_uri).ok_or_else(|| {
        SamlError::SignatureInvalid(format!("unsupported signature algorithm: {algorithm_uri}"))
    })?;

    let signature_value = signature
        .child(XMLDSIG_NS, "SignatureValue")
        .map(|el| strip_whitespace(&el.text()))
        .ok_or_else(|| SamlError::SignatureInvalid("missing SignatureValue".to_string()))?;
    let signature_bytes = STANDARD
        .decode(signature_value)
        .map_err(|e| SamlError::SignatureInvalid(format!("bad signature encoding: {e}")))?;

    let canonical_signed_info = exclusive_c14n(signed_info);

    for key in candidate_keys {
        match sp_crypto::rsa::rsa_verify(
            key,
            canonical_signed_info.as_bytes(),
            &signature_bytes,
            algorithm.crypto_algorithm(),
        ) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(sp_crypto::CryptoError::UnsupportedAlgorithm(_))
                if algorithm == SignatureAlgorithm::RsaSha256 =>
            {
                return Err(SamlError::Sha256NotRegistered);
            }
            Err(_) => {}
        }
    }

    tracing::warn!(
        algorithm = algorithm_uri,
        keys_tried = candidate_keys.len(),
        "signature verification failed against all configured keys"
    );
    Err(SamlError::SignatureInvalid(
        "no configured key verified the signature".to_string(),
    ))
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
