//! Artifact resolution back-channel (SOAP 1.1).
//!
//! Dereferences a SAML artifact: a signed `ArtifactResolve` goes to the
//! IdP's artifact resolution service inside a SOAP 1.1 envelope, and
//! the `ArtifactResponse` that comes back wraps the actual protocol
//! message. This is the only network I/O in the protocol core.

use std::time::Duration;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::{
    format_issue_instant, ArtifactResponse, Saml2Id, Saml2StatusCode, SAMLP_NS, SAML_NS, SOAP_NS,
};
use crate::xml::{escape_xml, Element};

/// Default deadline for the back-channel call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// SOAP client for `ArtifactResolve` exchanges.
pub struct ArtifactResolver {
    client: reqwest::Client,
    timeout: Duration,
}

impl ArtifactResolver {
    /// Creates a resolver with the default deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the deadline applied to each resolution call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves an artifact against an IdP endpoint.
    ///
    /// The request is signed when a signer is supplied (IdPs commonly
    /// require it). On timeout the caller's pending-request entry stays
    /// in the table until TTL expiry; it is not reinstated because the
    /// send may have partially succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ArtifactResolutionFailed`] for connection
    /// errors, non-2xx statuses, SOAP faults, unsuccessful
    /// `ArtifactResponse` statuses and malformed envelopes.
    pub async fn resolve(
        &self,
        endpoint: &str,
        artifact_b64: &str,
        sp_entity_id: &str,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<Element> {
        let resolve_id = Saml2Id::new();
        let mut message = build_artifact_resolve(&resolve_id, sp_entity_id, artifact_b64);
        if let Some(signer) = signer {
            message = signer.sign(&message, resolve_id.as_str())?;
        }
        let envelope = wrap_soap_envelope(&message);

        tracing::debug!(endpoint, "dereferencing artifact over SOAP back-channel");

        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .timeout(self.timeout)
            .body(envelope)
            .send()
            .await
            .map_err(|e| SamlError::ArtifactResolutionFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SamlError::ArtifactResolutionFailed(format!(
                "endpoint answered HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SamlError::ArtifactResolutionFailed(format!("body read failed: {e}")))?;

        parse_artifact_response_envelope(&body)
    }
}

impl Default for ArtifactResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders the `ArtifactResolve` message.
fn build_artifact_resolve(id: &Saml2Id, sp_entity_id: &str, artifact_b64: &str) -> String {
    format!(
        concat!(
            r#"<saml2p:ArtifactResolve xmlns:saml2p="{samlp}" xmlns:saml2="{saml}" "#,
            r#"ID="{id}" Version="2.0" IssueInstant="{instant}">"#,
            r#"<saml2:Issuer>{issuer}</saml2:Issuer>"#,
            r#"<saml2p:Artifact>{artifact}</saml2p:Artifact>"#,
            r#"</saml2p:ArtifactResolve>"#,
        ),
        samlp = SAMLP_NS,
        saml = SAML_NS,
        id = id,
        instant = format_issue_instant(chrono::Utc::now()),
        issuer = escape_xml(sp_entity_id),
        artifact = escape_xml(artifact_b64),
    )
}

/// Wraps a message in a SOAP 1.1 envelope.
fn wrap_soap_envelope(message: &str) -> String {
    format!(
        r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{SOAP_NS}"><SOAP-ENV:Body>{message}</SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
    )
}

/// Unwraps the SOAP envelope and the `ArtifactResponse` inside it,
/// returning the wrapped protocol message.
fn parse_artifact_response_envelope(body: &str) -> SamlResult<Element> {
    let envelope = Element::parse(body)
        .map_err(|e| SamlError::ArtifactResolutionFailed(format!("invalid envelope: {e}")))?;
    if !envelope.is(SOAP_NS, "Envelope") {
        return Err(SamlError::ArtifactResolutionFailed(
            "response is not a SOAP envelope".to_string(),
        ));
    }

    let soap_body = envelope.child(SOAP_NS, "Body").ok_or_else(|| {
        SamlError::ArtifactResolutionFailed("envelope has no Body".to_string())
    })?;

    if soap_body.child(SOAP_NS, "Fault").is_some() {
        return Err(SamlError::ArtifactResolutionFailed(
            "endpoint answered with a SOAP fault".to_string(),
        ));
    }

    let artifact_response = soap_body
        .child(SAMLP_NS, "ArtifactResponse")
        .ok_or_else(|| {
            SamlError::ArtifactResolutionFailed("Body carries no ArtifactResponse".to_string())
        })?;

    // The wrapper has its own status, separate from the inner message's.
    let wrapper_status = artifact_response
        .child(SAMLP_NS, "Status")
        .and_then(|status| status.child(SAMLP_NS, "StatusCode"))
        .and_then(|code| code.attr("Value"));
    match wrapper_status {
        Some(uri) if uri == Saml2StatusCode::Success.uri() => {}
        Some(uri) => {
            return Err(SamlError::ArtifactResolutionFailed(format!(
                "resolution status: {uri}"
            )));
        }
        None => {
            return Err(SamlError::ArtifactResolutionFailed(
                "ArtifactResponse has no status".to_string(),
            ));
        }
    }

    ArtifactResponse::unwrap_message(artifact_response)
        .map_err(|e| SamlError::ArtifactResolutionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_resolve_is_well_formed() {
        let id = Saml2Id::new();
        let xml = build_artifact_resolve(&id, "https://sp.example.com", "AAQAAdead==");
        let root = Element::parse(&xml).unwrap();

        assert!(root.is(SAMLP_NS, "ArtifactResolve"));
        assert_eq!(root.attr("ID"), Some(id.as_str()));
        assert_eq!(
            root.child(SAML_NS, "Issuer").unwrap().text(),
            "https://sp.example.com"
        );
        assert_eq!(
            root.child(SAMLP_NS, "Artifact").unwrap().text(),
            "AAQAAdead=="
        );
    }

    #[test]
    fn envelope_wraps_the_message() {
        let envelope = wrap_soap_envelope("<x xmlns=\"urn:x\"></x>");
        let root = Element::parse(&envelope).unwrap();
        assert!(root.is(SOAP_NS, "Envelope"));
        assert!(root.child(SOAP_NS, "Body").is_some());
    }

    fn wrapped_response(status_uri: &str, include_message: bool) -> String {
        let inner = if include_message {
            format!(
                r#"<saml2p:Response ID="_inner" Version="2.0" IssueInstant="2024-06-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer><saml2p:Status><saml2p:StatusCode Value="{}"></saml2p:StatusCode></saml2p:Status></saml2p:Response>"#,
                Saml2StatusCode::Success.uri()
            )
        } else {
            String::new()
        };
        wrap_soap_envelope(&format!(
            r#"<saml2p:ArtifactResponse xmlns:saml2p="{SAMLP_NS}" xmlns:saml2="{SAML_NS}" ID="_ar" Version="2.0"><saml2:Issuer>https://idp.example.com</saml2:Issuer><saml2p:Status><saml2p:StatusCode Value="{status_uri}"></saml2p:StatusCode></saml2p:Status>{inner}</saml2p:ArtifactResponse>"#,
        ))
    }

    #[test]
    fn successful_envelope_yields_inner_message() {
        let body = wrapped_response(Saml2StatusCode::Success.uri(), true);
        let inner = parse_artifact_response_envelope(&body).unwrap();
        assert!(inner.is(SAMLP_NS, "Response"));
        assert_eq!(inner.attr("ID"), Some("_inner"));
    }

    #[test]
    fn unsuccessful_wrapper_status_fails() {
        let body = wrapped_response("urn:oasis:names:tc:SAML:2.0:status:Requester", true);
        assert!(matches!(
            parse_artifact_response_envelope(&body).unwrap_err(),
            SamlError::ArtifactResolutionFailed(_)
        ));
    }

    #[test]
    fn missing_inner_message_fails() {
        let body = wrapped_response(Saml2StatusCode::Success.uri(), false);
        assert!(parse_artifact_response_envelope(&body).is_err());
    }

    #[test]
    fn soap_fault_fails() {
        let body = format!(
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{SOAP_NS}"><SOAP-ENV:Body><SOAP-ENV:Fault><faultstring>broken</faultstring></SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
        );
        assert!(matches!(
            parse_artifact_response_envelope(&body).unwrap_err(),
            SamlError::ArtifactResolutionFailed(_)
        ));
    }

    #[test]
    fn non_envelope_fails() {
        assert!(parse_artifact_response_envelope("<x xmlns=\"urn:x\"></x>").is_err());
    }
}
