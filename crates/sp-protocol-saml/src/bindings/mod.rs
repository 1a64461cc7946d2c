//! SAML binding implementations.
//!
//! Bindings move protocol messages on and off HTTP:
//!
//! - **HTTP-Redirect** - DEFLATE + base64 + percent-encoding in query
//!   parameters, with an optional detached query signature
//! - **HTTP-POST** - base64 in an auto-submitting HTML form
//! - **HTTP-Artifact** - a short handle in the query, dereferenced over
//!   the SOAP back-channel
//!
//! Binding instances are stateless and shared; [`get`] returns the
//! cached instance for a type and [`from_request`] probes which binding
//! can unbind an incoming request.

mod artifact;
mod post;
mod redirect;

pub use artifact::HttpArtifactBinding;
pub use post::HttpPostBinding;
pub use redirect::HttpRedirectBinding;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

use crate::error::{SamlError, SamlResult};
use crate::options::Options;
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// An `AuthnRequest` (or other request) message.
    Request,
    /// A `Response` message.
    Response,
}

impl SamlMessageType {
    /// Returns the query/form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// A message ready to be bound onto HTTP.
#[derive(Debug, Clone)]
pub struct SamlMessage {
    /// The serialized message XML.
    pub xml: String,
    /// Whether this travels as `SAMLRequest` or `SAMLResponse`.
    pub message_type: SamlMessageType,
    /// The entity id of the message issuer (used for artifact
    /// SourceID derivation).
    pub issuer: String,
    /// Where the message is addressed.
    pub destination: String,
    /// Relay state echoed by the peer, at most 80 octets per the
    /// binding specification.
    pub relay_state: Option<String>,
}

/// RelayState length ceiling from SAML 2.0 Bindings §3.4.3.
pub const MAX_RELAY_STATE_OCTETS: usize = 80;

impl SamlMessage {
    /// Checks binding-level invariants common to all transports.
    pub(crate) fn check(&self) -> SamlResult<()> {
        if let Some(relay_state) = &self.relay_state {
            if relay_state.len() > MAX_RELAY_STATE_OCTETS {
                return Err(SamlError::Internal(format!(
                    "relay state exceeds {MAX_RELAY_STATE_OCTETS} octets"
                )));
            }
        }
        Ok(())
    }
}

/// A message recovered from HTTP.
#[derive(Debug, Clone)]
pub struct UnboundMessage {
    /// The raw message XML.
    pub xml: String,
    /// Whether it arrived as `SAMLRequest` or `SAMLResponse`.
    pub message_type: SamlMessageType,
    /// The relay state, verbatim as delivered.
    pub relay_state: Option<String>,
}

/// The HTTP request surface the host hands to the core.
#[derive(Debug, Clone)]
pub struct HttpRequestData {
    /// HTTP method, uppercase.
    pub method: String,
    /// Full request URL including the raw query string.
    pub url: Url,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// Decoded form body parameters.
    pub form: HashMap<String, String>,
}

impl HttpRequestData {
    /// Builds request data for a GET, deriving the query map from the
    /// URL.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Internal`] when the URL does not parse.
    pub fn get(url: &str) -> SamlResult<Self> {
        let url =
            Url::parse(url).map_err(|e| SamlError::Internal(format!("invalid URL: {e}")))?;
        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Self {
            method: "GET".to_string(),
            url,
            query,
            form: HashMap::new(),
        })
    }

    /// Builds request data for a form POST.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Internal`] when the URL does not parse.
    pub fn post(url: &str, form: &[(&str, &str)]) -> SamlResult<Self> {
        let url =
            Url::parse(url).map_err(|e| SamlError::Internal(format!("invalid URL: {e}")))?;
        Ok(Self {
            method: "POST".to_string(),
            url,
            query: HashMap::new(),
            form: form
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        })
    }
}

/// The HTTP action the host enacts on the core's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body, if any.
    pub body: Option<String>,
}

impl CommandResult {
    /// A 303 redirect to the given location.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 303,
            headers: vec![("Location".to_string(), location.into())],
            body: None,
        }
    }

    /// A 200 HTML page.
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: vec![(
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: Some(body.into()),
        }
    }

    /// Returns the `Location` header, if present.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("location"))
            .map(|(_, value)| value.as_str())
    }
}

/// A SAML transport binding.
#[async_trait]
pub trait Binding: Send + Sync {
    /// The binding type this instance implements.
    fn binding_type(&self) -> SamlBinding;

    /// Returns true when this binding recognizes the request.
    fn can_unbind(&self, request: &HttpRequestData) -> bool;

    /// Serializes a message into the HTTP action that transports it.
    ///
    /// # Errors
    ///
    /// Returns an error when the message violates binding constraints
    /// or signing fails.
    fn bind(&self, message: &SamlMessage, signer: Option<&XmlSigner>) -> SamlResult<CommandResult>;

    /// Recovers the raw message XML and relay state from a request.
    ///
    /// # Errors
    ///
    /// Returns transport decode errors, signature errors for signed
    /// redirect queries, and [`SamlError::ArtifactResolutionFailed`]
    /// for the artifact back-channel.
    async fn unbind(
        &self,
        request: &HttpRequestData,
        options: &Options,
    ) -> SamlResult<UnboundMessage>;
}

/// Returns the shared instance for a binding type, or `None` for
/// binding types with no front-channel transport (SOAP).
#[must_use]
pub fn get(binding: SamlBinding) -> Option<&'static dyn Binding> {
    static REDIRECT: HttpRedirectBinding = HttpRedirectBinding;
    static POST: HttpPostBinding = HttpPostBinding;
    static ARTIFACT: OnceLock<HttpArtifactBinding> = OnceLock::new();

    match binding {
        SamlBinding::HttpRedirect => Some(&REDIRECT),
        SamlBinding::HttpPost => Some(&POST),
        SamlBinding::HttpArtifact => {
            Some(ARTIFACT.get_or_init(HttpArtifactBinding::new) as &dyn Binding)
        }
        SamlBinding::Soap => None,
    }
}

/// Probes each binding's `can_unbind` and returns the first match.
#[must_use]
pub fn from_request(request: &HttpRequestData) -> Option<&'static dyn Binding> {
    [
        SamlBinding::HttpArtifact,
        SamlBinding::HttpRedirect,
        SamlBinding::HttpPost,
    ]
    .into_iter()
    .filter_map(get)
    .find(|binding| binding.can_unbind(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_cached_instances() {
        let a = get(SamlBinding::HttpRedirect).unwrap();
        let b = get(SamlBinding::HttpRedirect).unwrap();
        assert!(std::ptr::eq(a, b));
        assert!(get(SamlBinding::Soap).is_none());
    }

    #[test]
    fn from_request_probes_bindings() {
        let redirect =
            HttpRequestData::get("https://sp.example.com/acs?SAMLResponse=abc").unwrap();
        assert_eq!(
            from_request(&redirect).unwrap().binding_type(),
            SamlBinding::HttpRedirect
        );

        let post = HttpRequestData::post(
            "https://sp.example.com/acs",
            &[("SAMLResponse", "abc")],
        )
        .unwrap();
        assert_eq!(
            from_request(&post).unwrap().binding_type(),
            SamlBinding::HttpPost
        );

        let artifact =
            HttpRequestData::get("https://sp.example.com/acs?SAMLart=abc").unwrap();
        assert_eq!(
            from_request(&artifact).unwrap().binding_type(),
            SamlBinding::HttpArtifact
        );

        let neither = HttpRequestData::get("https://sp.example.com/acs?foo=bar").unwrap();
        assert!(from_request(&neither).is_none());
    }

    #[test]
    fn relay_state_ceiling_is_enforced() {
        let message = SamlMessage {
            xml: "<x/>".to_string(),
            message_type: SamlMessageType::Request,
            issuer: "https://sp.example.com".to_string(),
            destination: "https://idp.example.com/sso".to_string(),
            relay_state: Some("x".repeat(MAX_RELAY_STATE_OCTETS + 1)),
        };
        assert!(message.check().is_err());
    }

    #[test]
    fn command_result_helpers() {
        let redirect = CommandResult::redirect("https://idp.example.com/sso?x=1");
        assert_eq!(redirect.status, 303);
        assert_eq!(redirect.location(), Some("https://idp.example.com/sso?x=1"));

        let html = CommandResult::html("<html></html>");
        assert_eq!(html.status, 200);
        assert!(html.body.is_some());
    }
}
