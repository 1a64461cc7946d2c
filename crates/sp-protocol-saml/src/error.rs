//! SAML error types.
//!
//! One error family covers parsing, binding transport, signature and
//! decryption failures, and response validation. The enum is `Clone` so
//! a validated response can cache its outcome and replay it on repeat
//! calls without re-running any cryptography.
//!
//! Detail strings are for operator logs. Hosts translate the kind to an
//! HTTP status and must not surface the text to end users.

use thiserror::Error;

use crate::pending::PendingStateError;
use crate::types::{Saml2StatusCode, Status};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SamlError {
    /// The element is not a SAML message of the expected kind, or the
    /// protocol version is not "2.0".
    #[error("malformed SAML XML: {0}")]
    XmlMalformed(String),

    /// XML could not be parsed at all.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// A signature was required but no `ds:Signature` element is present.
    #[error("message is not signed")]
    NotSigned,

    /// The `SignedInfo` contains no `Reference`.
    #[error("signature contains no reference")]
    NoReference,

    /// The `SignedInfo` contains more than one `Reference`.
    #[error("signature contains {0} references, expected exactly one")]
    MultipleReferences(usize),

    /// The reference URI does not point at the signed root element.
    #[error("signature reference '{actual}' does not match signed element '#{expected}'")]
    ReferenceMismatch {
        /// The ID of the element carrying the signature.
        expected: String,
        /// The reference URI found in the signature.
        actual: String,
    },

    /// A transform outside the allow-list was present in the reference.
    #[error("disallowed signature transform: {0}")]
    DisallowedTransform(String),

    /// No candidate key verified the signature, or the digest is wrong.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// The platform is missing RSA-SHA256 support.
    #[error("RSA-SHA256 is not available in this cryptographic backend")]
    Sha256NotRegistered,

    /// The response is unsigned and an assertion is also unsigned.
    #[error("unsigned assertion: {0}")]
    UnsignedAssertion(String),

    /// Encrypted assertions were present but no configured key could
    /// decrypt them.
    #[error("assertion decryption failed: {0}")]
    DecryptionFailed(String),

    /// Encrypted assertions were present but no decryption key is
    /// configured.
    #[error("no decryption key configured for encrypted assertion")]
    NoDecryptionKey,

    /// Unsolicited response received and the identity provider
    /// configuration does not allow them.
    #[error("unsolicited response from '{0}' is not allowed")]
    UnsolicitedNotAllowed(String),

    /// The relay state is unknown or already consumed.
    #[error("relay state does not match a pending request (replayed or unknown)")]
    ReplayedOrUnknownRelayState,

    /// `InResponseTo` disagrees with the pending request's message id.
    #[error("InResponseTo '{actual}' does not match pending request '{expected}'")]
    InResponseToMismatch {
        /// The message id recorded when the request was sent.
        expected: String,
        /// The `InResponseTo` value in the response.
        actual: String,
    },

    /// The response issuer disagrees with the pending request's IdP.
    #[error("issuer '{actual}' does not match pending request IdP '{expected}'")]
    IssuerMismatch {
        /// The IdP entity id recorded when the request was sent.
        expected: String,
        /// The issuer in the response.
        actual: String,
    },

    /// The response status is not Success.
    #[error("response status is not success: {}", status.code.uri())]
    UnsuccessfulStatus {
        /// The full status from the response.
        status: Status,
    },

    /// The artifact back-channel call failed.
    #[error("artifact resolution failed: {0}")]
    ArtifactResolutionFailed(String),

    /// An assertion is past its `NotOnOrAfter`.
    #[error("assertion expired")]
    AssertionExpired,

    /// An assertion's `NotBefore` lies in the future.
    #[error("assertion not yet valid")]
    AssertionNotYetValid,

    /// A one-time-use assertion was presented again.
    #[error("assertion '{0}' was already presented")]
    AssertionReplayed(String),

    /// The assertion audience does not include this service provider.
    #[error("invalid audience: expected {expected}, got {actual}")]
    InvalidAudience {
        /// The SP entity id that must be in the audience.
        expected: String,
        /// The audiences found in the assertion.
        actual: String,
    },

    /// Unknown or unsupported binding for the incoming request.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// The issuer is not a configured identity provider.
    #[error("unknown identity provider: {0}")]
    UnknownIdentityProvider(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression or decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Cryptographic operation error outside the verification path.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Pending-request store error.
    #[error("pending request store error: {0}")]
    PendingState(#[from] PendingStateError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SamlError {
    /// Returns the SAML status code an SP-side responder would report
    /// for this error.
    #[must_use]
    pub const fn status_code(&self) -> Saml2StatusCode {
        match self {
            Self::XmlMalformed(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::NotSigned
            | Self::NoReference
            | Self::MultipleReferences(_)
            | Self::ReferenceMismatch { .. }
            | Self::DisallowedTransform(_)
            | Self::SignatureInvalid(_)
            | Self::UnsignedAssertion(_)
            | Self::UnsolicitedNotAllowed(_)
            | Self::ReplayedOrUnknownRelayState
            | Self::InResponseToMismatch { .. }
            | Self::IssuerMismatch { .. }
            | Self::AssertionExpired
            | Self::AssertionNotYetValid
            | Self::AssertionReplayed(_)
            | Self::InvalidAudience { .. } => Saml2StatusCode::Requester,
            Self::UnknownIdentityProvider(_) => Saml2StatusCode::UnknownPrincipal,
            Self::UnsupportedBinding(_) => Saml2StatusCode::UnsupportedBinding,
            _ => Saml2StatusCode::Responder,
        }
    }

    /// Returns the HTTP status code the host should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::XmlMalformed(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::UnsupportedBinding(_)
            | Self::ReplayedOrUnknownRelayState
            | Self::InResponseToMismatch { .. }
            | Self::IssuerMismatch { .. }
            | Self::UnsolicitedNotAllowed(_) => 400,
            Self::NotSigned
            | Self::NoReference
            | Self::MultipleReferences(_)
            | Self::ReferenceMismatch { .. }
            | Self::DisallowedTransform(_)
            | Self::SignatureInvalid(_)
            | Self::UnsignedAssertion(_)
            | Self::AssertionExpired
            | Self::AssertionNotYetValid
            | Self::AssertionReplayed(_)
            | Self::InvalidAudience { .. }
            | Self::UnsuccessfulStatus { .. } => 401,
            Self::UnknownIdentityProvider(_) => 404,
            Self::ArtifactResolutionFailed(_) => 502,
            _ => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Deflate(err.to_string())
    }
}

impl From<sp_crypto::CryptoError> for SamlError {
    fn from(err: sp_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_requester() {
        let err = SamlError::ReplayedOrUnknownRelayState;
        assert_eq!(err.status_code(), Saml2StatusCode::Requester);
        assert_eq!(err.http_status(), 400);

        let err = SamlError::SignatureInvalid("digest mismatch".into());
        assert_eq!(err.status_code(), Saml2StatusCode::Requester);
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn infrastructure_errors_map_to_responder() {
        let err = SamlError::Internal("boom".into());
        assert_eq!(err.status_code(), Saml2StatusCode::Responder);
        assert_eq!(err.http_status(), 500);

        let err = SamlError::ArtifactResolutionFailed("connection refused".into());
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn errors_are_cloneable_for_the_validation_cache() {
        let err = SamlError::UnsuccessfulStatus {
            status: Status::requester_error("denied"),
        };
        assert_eq!(err.clone(), err);
    }
}
