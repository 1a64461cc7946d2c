//! SAML protocol status.
//!
//! Status information carried in protocol responses, with every status
//! code of SAML 2.0 §3.2.2.2 bound to its stable URI.

use serde::{Deserialize, Serialize};

/// SAML 2.0 status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Saml2StatusCode {
    /// The request succeeded.
    Success,
    /// The request could not be performed due to an error on the requester.
    Requester,
    /// The request could not be performed due to an error on the responder.
    Responder,
    /// The responder could not handle the protocol version.
    VersionMismatch,
    /// The responding provider was unable to authenticate the principal.
    AuthnFailed,
    /// An attribute name or value was invalid.
    InvalidAttrNameOrValue,
    /// The requested name identifier policy cannot be satisfied.
    InvalidNameIdPolicy,
    /// The authentication context requirements cannot be met.
    NoAuthnContext,
    /// No supported identity provider is available.
    NoAvailableIdp,
    /// Passive authentication was requested but interaction was required.
    NoPassive,
    /// None of the named identity providers are supported.
    NoSupportedIdp,
    /// Not all session participants logged out successfully.
    PartialLogout,
    /// A proxy count was exceeded.
    ProxyCountExceeded,
    /// The request was denied.
    RequestDenied,
    /// The request is not supported.
    RequestUnsupported,
    /// The protocol version in the request is deprecated.
    RequestVersionDeprecated,
    /// The protocol version in the request is too high.
    RequestVersionTooHigh,
    /// The protocol version in the request is too low.
    RequestVersionTooLow,
    /// The named resource is not recognized.
    ResourceNotRecognized,
    /// More responses would be returned than the requester asked for.
    TooManyResponses,
    /// An unknown attribute profile was named.
    UnknownAttrProfile,
    /// The principal is not known to the responder.
    UnknownPrincipal,
    /// The requested binding is not supported.
    UnsupportedBinding,
}

impl Saml2StatusCode {
    /// Returns the status code URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Success => "urn:oasis:names:tc:SAML:2.0:status:Success",
            Self::Requester => "urn:oasis:names:tc:SAML:2.0:status:Requester",
            Self::Responder => "urn:oasis:names:tc:SAML:2.0:status:Responder",
            Self::VersionMismatch => "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch",
            Self::AuthnFailed => "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed",
            Self::InvalidAttrNameOrValue => {
                "urn:oasis:names:tc:SAML:2.0:status:InvalidAttrNameOrValue"
            }
            Self::InvalidNameIdPolicy => {
                "urn:oasis:names:tc:SAML:2.0:status:InvalidNameIDPolicy"
            }
            Self::NoAuthnContext => "urn:oasis:names:tc:SAML:2.0:status:NoAuthnContext",
            Self::NoAvailableIdp => "urn:oasis:names:tc:SAML:2.0:status:NoAvailableIDP",
            Self::NoPassive => "urn:oasis:names:tc:SAML:2.0:status:NoPassive",
            Self::NoSupportedIdp => "urn:oasis:names:tc:SAML:2.0:status:NoSupportedIDP",
            Self::PartialLogout => "urn:oasis:names:tc:SAML:2.0:status:PartialLogout",
            Self::ProxyCountExceeded => {
                "urn:oasis:names:tc:SAML:2.0:status:ProxyCountExceeded"
            }
            Self::RequestDenied => "urn:oasis:names:tc:SAML:2.0:status:RequestDenied",
            Self::RequestUnsupported => {
                "urn:oasis:names:tc:SAML:2.0:status:RequestUnsupported"
            }
            Self::RequestVersionDeprecated => {
                "urn:oasis:names:tc:SAML:2.0:status:RequestVersionDeprecated"
            }
            Self::RequestVersionTooHigh => {
                "urn:oasis:names:tc:SAML:2.0:status:RequestVersionTooHigh"
            }
            Self::RequestVersionTooLow => {
                "urn:oasis:names:tc:SAML:2.0:status:RequestVersionTooLow"
            }
            Self::ResourceNotRecognized => {
                "urn:oasis:names:tc:SAML:2.0:status:ResourceNotRecognized"
            }
            Self::TooManyResponses => "urn:oasis:names:tc:SAML:2.0:status:TooManyResponses",
            Self::UnknownAttrProfile => {
                "urn:oasis:names:tc:SAML:2.0:status:UnknownAttrProfile"
            }
            Self::UnknownPrincipal => "urn:oasis:names:tc:SAML:2.0:status:UnknownPrincipal",
            Self::UnsupportedBinding => {
                "urn:oasis:names:tc:SAML:2.0:status:UnsupportedBinding"
            }
        }
    }

    /// Parses a status code from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        const ALL: [Saml2StatusCode; 23] = [
            Saml2StatusCode::Success,
            Saml2StatusCode::Requester,
            Saml2StatusCode::Responder,
            Saml2StatusCode::VersionMismatch,
            Saml2StatusCode::AuthnFailed,
            Saml2StatusCode::InvalidAttrNameOrValue,
            Saml2StatusCode::InvalidNameIdPolicy,
            Saml2StatusCode::NoAuthnContext,
            Saml2StatusCode::NoAvailableIdp,
            Saml2StatusCode::NoPassive,
            Saml2StatusCode::NoSupportedIdp,
            Saml2StatusCode::PartialLogout,
            Saml2StatusCode::ProxyCountExceeded,
            Saml2StatusCode::RequestDenied,
            Saml2StatusCode::RequestUnsupported,
            Saml2StatusCode::RequestVersionDeprecated,
            Saml2StatusCode::RequestVersionTooHigh,
            Saml2StatusCode::RequestVersionTooLow,
            Saml2StatusCode::ResourceNotRecognized,
            Saml2StatusCode::TooManyResponses,
            Saml2StatusCode::UnknownAttrProfile,
            Saml2StatusCode::UnknownPrincipal,
            Saml2StatusCode::UnsupportedBinding,
        ];
        ALL.into_iter().find(|code| code.uri() == uri)
    }

    /// Returns true for the success code.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Status of a SAML response.
///
/// The second-level code is kept verbatim: responders nest arbitrary
/// URIs there and the caller wants the exact wire value for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The top-level status code.
    pub code: Saml2StatusCode,

    /// Optional human-readable status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Optional nested second-level status code URI, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_level: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            code: Saml2StatusCode::Success,
            message: None,
            second_level: None,
        }
    }

    /// Creates a requester error status.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self {
            code: Saml2StatusCode::Requester,
            message: Some(message.into()),
            second_level: None,
        }
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self {
            code: Saml2StatusCode::Responder,
            message: Some(message.into()),
            second_level: None,
        }
    }

    /// Sets the second-level status code URI.
    #[must_use]
    pub fn with_second_level(mut self, uri: impl Into<String>) -> Self {
        self.second_level = Some(uri.into());
        self
    }

    /// Returns true when the status indicates success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}
