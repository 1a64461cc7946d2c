//! Host-provided configuration.
//!
//! The embedding application constructs an [`Options`] value and hands
//! it (typically inside an `Arc`) to the binding and validation entry
//! points. Key material is read-mostly: to rotate keys, build a new
//! `Options` and swap the `Arc` rather than mutating one that
//! validations may be reading.

use std::collections::HashMap;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

/// Audience-restriction enforcement policy.
///
/// There is no safe default-off: disabling the check requires the
/// explicit `Never` value in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudienceMode {
    /// Always enforce audience restrictions.
    #[default]
    Always,
    /// Enforce only for bearer subject confirmations.
    IfBearer,
    /// Never enforce. Explicit opt-out.
    Never,
}

/// Service-provider side options.
pub struct SpOptions {
    /// The SP entity id; also the audience value assertions must name.
    pub entity_id: String,
    /// Assertion consumer service URL.
    pub acs_url: String,
    /// Signing key for outbound messages, when configured.
    pub signing_key: Option<SigningKey>,
    /// Private keys (PKCS#8 DER) tried in order against encrypted
    /// assertions. A set, to survive key rollover.
    pub decryption_keys: Vec<Vec<u8>>,
    /// Audience enforcement policy.
    pub audience_mode: AudienceMode,
    /// Tolerated clock skew for assertion time conditions, in seconds.
    pub clock_skew_seconds: i64,
}

impl SpOptions {
    /// Creates options with defaults: audience always enforced,
    /// 5 minutes of clock skew tolerance, no keys.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, acs_url: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            acs_url: acs_url.into(),
            signing_key: None,
            decryption_keys: Vec::new(),
            audience_mode: AudienceMode::default(),
            clock_skew_seconds: 300,
        }
    }

    /// Builds a signer from the configured signing key.
    #[must_use]
    pub fn signer(&self) -> Option<XmlSigner> {
        self.signing_key.as_ref().map(|key| {
            XmlSigner::new(key.private_key_der.clone(), key.certificate_der.clone())
        })
    }
}

/// An SP signing key with its certificate.
pub struct SigningKey {
    /// RSA private key in DER form (PKCS#1 or PKCS#8).
    pub private_key_der: Vec<u8>,
    /// Certificate embedded in `KeyInfo` of produced signatures.
    pub certificate_der: Option<Vec<u8>>,
}

/// Configuration for one identity provider.
pub struct IdentityProvider {
    /// The IdP entity id.
    pub entity_id: String,
    /// Single sign-on endpoint.
    pub sso_url: String,
    /// Binding used when sending requests to the SSO endpoint.
    pub binding: SamlBinding,
    /// Signing certificates (DER). A set, to span certificate rollover;
    /// verification tries each. The sender's `KeyInfo` is never used to
    /// pick one.
    pub signing_certificates: Vec<Vec<u8>>,
    /// Raw verification keys (DER `SubjectPublicKeyInfo`) for
    /// deployments that distribute bare keys instead of certificates.
    /// Merged with the certificate-derived keys.
    pub signing_keys: Vec<Vec<u8>>,
    /// Whether IdP-initiated (unsolicited) responses are accepted.
    pub allow_unsolicited_authn_response: bool,
    /// Artifact resolution endpoint, when the artifact binding is used.
    pub artifact_resolution_url: Option<String>,
}

impl IdentityProvider {
    /// Creates a provider entry with no keys and unsolicited responses
    /// disabled.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, sso_url: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            sso_url: sso_url.into(),
            binding: SamlBinding::HttpRedirect,
            signing_certificates: Vec::new(),
            signing_keys: Vec::new(),
            allow_unsolicited_authn_response: false,
            artifact_resolution_url: None,
        }
    }

    /// Returns the verification keys as DER `SubjectPublicKeyInfo`,
    /// extracted from the configured certificates.
    ///
    /// Entries that fail to parse are skipped with a warning rather than
    /// failing the whole set; one rotten certificate must not take down
    /// rollover.
    #[must_use]
    pub fn verification_keys(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<Vec<u8>> = self
            .signing_certificates
            .iter()
            .filter_map(|der| match parse_certificate_spki(der) {
                Ok(spki) => Some(spki),
                Err(e) => {
                    tracing::warn!(
                        idp = %self.entity_id,
                        error = %e,
                        "skipping unparseable signing certificate"
                    );
                    None
                }
            })
            .collect();
        keys.extend(self.signing_keys.iter().cloned());
        keys
    }
}

/// Extracts the `SubjectPublicKeyInfo` from a DER certificate.
pub(crate) fn parse_certificate_spki(cert_der: &[u8]) -> SamlResult<Vec<u8>> {
    use x509_parser::prelude::*;

    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| SamlError::Crypto(format!("certificate parse error: {e}")))?;
    Ok(cert.public_key().raw.to_vec())
}

/// The full configuration surface consumed by the protocol core.
pub struct Options {
    /// Service provider options.
    pub sp: SpOptions,
    identity_providers: HashMap<String, IdentityProvider>,
}

impl Options {
    /// Creates options with no identity providers registered.
    #[must_use]
    pub fn new(sp: SpOptions) -> Self {
        Self {
            sp,
            identity_providers: HashMap::new(),
        }
    }

    /// Registers an identity provider, keyed by entity id.
    #[must_use]
    pub fn with_identity_provider(mut self, idp: IdentityProvider) -> Self {
        self.identity_providers.insert(idp.entity_id.clone(), idp);
        self
    }

    /// Looks up an identity provider by entity id.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnknownIdentityProvider`] when absent.
    pub fn identity_provider(&self, entity_id: &str) -> SamlResult<&IdentityProvider> {
        self.identity_providers
            .get(entity_id)
            .ok_or_else(|| SamlError::UnknownIdentityProvider(entity_id.to_string()))
    }

    /// Finds the identity provider whose entity id hashes to the given
    /// artifact SourceID.
    #[must_use]
    pub fn identity_provider_by_source_id(&self, source_id: &[u8]) -> Option<&IdentityProvider> {
        self.identity_providers
            .values()
            .find(|idp| sp_crypto::sha1(idp.entity_id.as_bytes()) == source_id)
    }

    /// Iterates all registered identity providers.
    pub fn identity_providers(&self) -> impl Iterator<Item = &IdentityProvider> {
        self.identity_providers.values()
    }
}
