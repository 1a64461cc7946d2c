//! HTTP-Artifact binding.
//!
//! The front channel carries only a 44-byte artifact; the message
//! itself is fetched from the issuer over the SOAP back-channel. Unbind
//! therefore needs configuration (to find the IdP by SourceID) and
//! network I/O (to dereference the artifact).

use async_trait::async_trait;

use crate::error::{SamlError, SamlResult};
use crate::options::Options;
use crate::resolver::ArtifactResolver;
use crate::signature::XmlSigner;
use crate::types::{Saml2Artifact, SamlBinding};

use super::{Binding, CommandResult, HttpRequestData, SamlMessage, SamlMessageType, UnboundMessage};

/// HTTP-Artifact binding.
pub struct HttpArtifactBinding {
    resolver: ArtifactResolver,
}

impl HttpArtifactBinding {
    /// Creates the binding with a default resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: ArtifactResolver::new(),
        }
    }

    /// Creates the binding with a custom resolver (timeout control).
    #[must_use]
    pub fn with_resolver(resolver: ArtifactResolver) -> Self {
        Self { resolver }
    }

    fn artifact_param<'a>(request: &'a HttpRequestData) -> Option<&'a str> {
        request
            .query
            .get("SAMLart")
            .or_else(|| request.form.get("SAMLart"))
            .map(String::as_str)
    }
}

impl Default for HttpArtifactBinding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Binding for HttpArtifactBinding {
    fn binding_type(&self) -> SamlBinding {
        SamlBinding::HttpArtifact
    }

    fn can_unbind(&self, request: &HttpRequestData) -> bool {
        Self::artifact_param(request).is_some()
    }

    fn bind(&self, message: &SamlMessage, _signer: Option<&XmlSigner>) -> SamlResult<CommandResult> {
        message.check()?;

        let artifact = Saml2Artifact::new(&message.issuer, 0);
        let mut location = format!(
            "{}{}SAMLart={}",
            message.destination,
            if message.destination.contains('?') { '&' } else { '?' },
            urlencoding::encode(&artifact.encode())
        );
        if let Some(relay_state) = &message.relay_state {
            location.push_str("&RelayState=");
            location.push_str(&urlencoding::encode(relay_state));
        }

        tracing::debug!(
            destination = %message.destination,
            "bound message to HTTP-Artifact"
        );
        Ok(CommandResult::redirect(location))
    }

    async fn unbind(
        &self,
        request: &HttpRequestData,
        options: &Options,
    ) -> SamlResult<UnboundMessage> {
        let artifact_b64 = Self::artifact_param(request).ok_or_else(|| {
            SamlError::UnsupportedBinding("no SAMLart parameter".to_string())
        })?;
        let artifact = Saml2Artifact::decode(artifact_b64)?;

        let idp = options
            .identity_provider_by_source_id(&artifact.source_id)
            .ok_or_else(|| {
                SamlError::UnknownIdentityProvider(format!(
                    "no identity provider matches artifact SourceID {}",
                    hex(&artifact.source_id)
                ))
            })?;

        let endpoint = idp.artifact_resolution_url.as_deref().ok_or_else(|| {
            SamlError::ArtifactResolutionFailed(format!(
                "no artifact resolution endpoint configured for {}",
                idp.entity_id
            ))
        })?;

        let signer = options.sp.signer();
        let inner = self
            .resolver
            .resolve(endpoint, artifact_b64, &options.sp.entity_id, signer.as_ref())
            .await?;

        let message_type = if inner.local == "Response" {
            SamlMessageType::Response
        } else {
            SamlMessageType::Request
        };

        Ok(UnboundMessage {
            xml: inner.to_xml(),
            message_type,
            relay_state: request
                .query
                .get("RelayState")
                .or_else(|| request.form.get("RelayState"))
                .cloned(),
        })
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{IdentityProvider, SpOptions};

    fn options() -> Options {
        Options::new(SpOptions::new(
            "https://sp.example.com",
            "https://sp.example.com/acs",
        ))
        .with_identity_provider(IdentityProvider::new(
            "https://idp.example.com",
            "https://idp.example.com/sso",
        ))
    }

    #[test]
    fn bind_emits_artifact_redirect() {
        let binding = HttpArtifactBinding::new();
        let message = SamlMessage {
            xml: "<x/>".to_string(),
            message_type: SamlMessageType::Request,
            issuer: "https://sp.example.com".to_string(),
            destination: "https://idp.example.com/sso".to_string(),
            relay_state: Some("state".to_string()),
        };

        let result = binding.bind(&message, None).unwrap();
        let location = result.location().unwrap();
        assert!(location.starts_with("https://idp.example.com/sso?SAMLart="));
        assert!(location.contains("&RelayState=state"));

        // The emitted artifact decodes and names the issuer.
        let request = HttpRequestData::get(location).unwrap();
        let artifact = Saml2Artifact::decode(request.query.get("SAMLart").unwrap()).unwrap();
        assert!(artifact.matches_issuer("https://sp.example.com"));
    }

    #[tokio::test]
    async fn unknown_source_id_is_rejected() {
        let binding = HttpArtifactBinding::new();
        let artifact = Saml2Artifact::new("https://stranger.example.com", 0);
        let url = format!(
            "https://sp.example.com/acs?SAMLart={}",
            urlencoding::encode(&artifact.encode())
        );
        let request = HttpRequestData::get(&url).unwrap();

        assert!(matches!(
            binding.unbind(&request, &options()).await.unwrap_err(),
            SamlError::UnknownIdentityProvider(_)
        ));
    }

    #[tokio::test]
    async fn missing_resolution_endpoint_is_rejected() {
        let binding = HttpArtifactBinding::new();
        let artifact = Saml2Artifact::new("https://idp.example.com", 0);
        let url = format!(
            "https://sp.example.com/acs?SAMLart={}",
            urlencoding::encode(&artifact.encode())
        );
        let request = HttpRequestData::get(&url).unwrap();

        assert!(matches!(
            binding.unbind(&request, &options()).await.unwrap_err(),
            SamlError::ArtifactResolutionFailed(_)
        ));
    }

    #[tokio::test]
    async fn malformed_artifact_is_rejected() {
        let binding = HttpArtifactBinding::new();
        let request =
            HttpRequestData::get("https://sp.example.com/acs?SAMLart=AAAA").unwrap();
        assert!(binding.unbind(&request, &options()).await.is_err());
    }
}
