//! Response validation.
//!
//! A `Response` moves from unvalidated to validated exactly once. The
//! outcome, success or failure, is cached, so repeated calls replay
//! the same result without touching the pending store or re-running any
//! cryptography. `tokio::sync::OnceCell` makes the first-caller race
//! benign: concurrent validations of one instance still produce a
//! single outcome.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::decrypt::decrypt_assertions;
use crate::error::{SamlError, SamlResult};
use crate::options::{AudienceMode, Options};
use crate::pending::{PendingRequestStore, StoredRequestState};
use crate::signature::{find_signature, verify_signed_element};
use crate::types::{Claim, ClaimsIdentity, Response, Saml2Id, BEARER_METHOD, SAML_NS, XMLDSIG_NS};
use crate::xml::Element;

/// The product of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResponse {
    /// The issuing IdP entity id.
    pub idp: String,
    /// One identity per assertion.
    pub identities: Vec<ClaimsIdentity>,
    /// The return URL recorded when the request was issued.
    pub return_url: Option<String>,
    /// The request this response answered, absent for unsolicited
    /// responses.
    pub in_response_to: Option<Saml2Id>,
}

impl Response {
    /// Validates the response against the configuration and pending
    /// table.
    ///
    /// The first call runs the full pipeline: correlation, signature
    /// verification, decryption, status gate and claims extraction.
    /// Every later call returns the cached outcome.
    ///
    /// # Errors
    ///
    /// Any kind from the validation table in [`SamlError`]; the same
    /// error is returned on every repeat call.
    pub async fn validate(
        &self,
        options: &Options,
        pending: &dyn PendingRequestStore,
    ) -> SamlResult<ValidatedResponse> {
        self.validation
            .get_or_init(|| async { run_validation(self, options, pending).await })
            .await
            .clone()
    }
}

async fn run_validation(
    response: &Response,
    options: &Options,
    pending: &dyn PendingRequestStore,
) -> SamlResult<ValidatedResponse> {
    let correlation = correlate(response, options, pending).await?;

    let idp = options.identity_provider(response.issuer())?;
    let verification_keys = idp.verification_keys();

    let response_signed = find_signature(response.document()).is_some();
    if response_signed {
        verify_signed_element(response.document(), &verification_keys)?;
    }

    let decrypted = decrypt_assertions(response.document(), &options.sp.decryption_keys)?;
    let mut assertions: Vec<Element> =
        response.assertion_elements().into_iter().cloned().collect();
    assertions.extend(decrypted);

    if !response_signed {
        for assertion in &assertions {
            match verify_signed_element(assertion, &verification_keys) {
                Ok(()) => {}
                Err(SamlError::NotSigned) => {
                    let id = assertion.attr("ID").unwrap_or("<no id>").to_string();
                    tracing::warn!(assertion = %id, "unsigned assertion in unsigned response");
                    return Err(SamlError::UnsignedAssertion(id));
                }
                Err(other) => return Err(other),
            }
        }
    }

    if !response.status().is_success() {
        tracing::info!(
            issuer = response.issuer(),
            status = response.status().code.uri(),
            second_level = ?response.status().second_level,
            "response carries an unsuccessful status"
        );
        return Err(SamlError::UnsuccessfulStatus {
            status: response.status().clone(),
        });
    }

    let now = Utc::now();
    let skew = Duration::seconds(options.sp.clock_skew_seconds);
    let mut identities = Vec::with_capacity(assertions.len());
    for assertion in &assertions {
        // Signatures were consumed above; drop them from the view the
        // claims extraction walks.
        let assertion = assertion.without_child(XMLDSIG_NS, "Signature");
        check_replay(&assertion, now)?;
        check_conditions(&assertion, options, now, skew)?;
        identities.push(extract_identity(&assertion));
    }

    tracing::info!(
        issuer = response.issuer(),
        identities = identities.len(),
        solicited = correlation.is_some(),
        "response validated"
    );

    Ok(ValidatedResponse {
        idp: response.issuer().to_string(),
        identities,
        return_url: correlation.and_then(|state| state.return_url),
        in_response_to: response.in_response_to().cloned(),
    })
}

/// Matches the response against the pending table (or the unsolicited
/// policy) and consumes the entry.
async fn correlate(
    response: &Response,
    options: &Options,
    pending: &dyn PendingRequestStore,
) -> SamlResult<Option<StoredRequestState>> {
    let Some(in_response_to) = response.in_response_to() else {
        let idp = options.identity_provider(response.issuer())?;
        if !idp.allow_unsolicited_authn_response {
            tracing::warn!(issuer = response.issuer(), "rejected unsolicited response");
            return Err(SamlError::UnsolicitedNotAllowed(
                response.issuer().to_string(),
            ));
        }
        return Ok(None);
    };

    let Some(relay_state) = response.relay_state() else {
        return Err(SamlError::ReplayedOrUnknownRelayState);
    };

    let state = pending
        .try_remove(relay_state)
        .await?
        .ok_or(SamlError::ReplayedOrUnknownRelayState)?;

    if state.message_id != *in_response_to {
        return Err(SamlError::InResponseToMismatch {
            expected: state.message_id.to_string(),
            actual: in_response_to.to_string(),
        });
    }
    if state.idp != response.issuer() {
        return Err(SamlError::IssuerMismatch {
            expected: state.idp.clone(),
            actual: response.issuer().to_string(),
        });
    }

    Ok(Some(state))
}

/// Process-wide cache of assertion IDs already accepted, bounding token
/// replay across unsolicited and artifact deliveries where the pending
/// table cannot help.
struct TokenReplayCache {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TokenReplayCache {
    fn check_and_insert(&self, id: &str, expires: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock().expect("replay cache poisoned");
        let now = Utc::now();
        seen.retain(|_, expiry| *expiry > now);
        if seen.contains_key(id) {
            return false;
        }
        seen.insert(id.to_string(), expires);
        true
    }
}

fn token_replay_cache() -> &'static TokenReplayCache {
    static CACHE: OnceLock<TokenReplayCache> = OnceLock::new();
    CACHE.get_or_init(|| TokenReplayCache {
        seen: Mutex::new(HashMap::new()),
    })
}

fn check_replay(assertion: &Element, now: DateTime<Utc>) -> SamlResult<()> {
    let Some(id) = assertion.attr("ID") else {
        return Ok(());
    };

    let expires = assertion
        .child(SAML_NS, "Conditions")
        .and_then(|c| c.attr("NotOnOrAfter"))
        .and_then(|v| crate::types::parse_issue_instant(v).ok())
        .unwrap_or(now + Duration::hours(1));

    if !token_replay_cache().check_and_insert(id, expires) {
        tracing::warn!(assertion = id, "assertion replay detected");
        return Err(SamlError::AssertionReplayed(id.to_string()));
    }
    Ok(())
}

fn check_conditions(
    assertion: &Element,
    options: &Options,
    now: DateTime<Utc>,
    skew: Duration,
) -> SamlResult<()> {
    let Some(conditions) = assertion.child(SAML_NS, "Conditions") else {
        return Ok(());
    };

    if let Some(not_before) = conditions.attr("NotBefore") {
        let not_before = crate::types::parse_issue_instant(not_before)?;
        if now + skew < not_before {
            return Err(SamlError::AssertionNotYetValid);
        }
    }

    if let Some(not_on_or_after) = conditions.attr("NotOnOrAfter") {
        let not_on_or_after = crate::types::parse_issue_instant(not_on_or_after)?;
        if now - skew >= not_on_or_after {
            return Err(SamlError::AssertionExpired);
        }
    }

    let enforce_audience = match options.sp.audience_mode {
        AudienceMode::Always => true,
        AudienceMode::Never => false,
        AudienceMode::IfBearer => has_bearer_confirmation(assertion),
    };

    if enforce_audience {
        let restrictions: Vec<&Element> = conditions
            .children_named(SAML_NS, "AudienceRestriction")
            .collect();
        if !restrictions.is_empty() {
            let audiences: Vec<String> = restrictions
                .iter()
                .flat_map(|r| r.children_named(SAML_NS, "Audience"))
                .map(|a| a.text().trim().to_string())
                .collect();
            if !audiences.iter().any(|a| a == &options.sp.entity_id) {
                return Err(SamlError::InvalidAudience {
                    expected: options.sp.entity_id.clone(),
                    actual: audiences.join(", "),
                });
            }
        }
    }

    Ok(())
}

fn has_bearer_confirmation(assertion: &Element) -> bool {
    assertion
        .child(SAML_NS, "Subject")
        .map(|subject| {
            subject
                .children_named(SAML_NS, "SubjectConfirmation")
                .any(|confirmation| confirmation.attr("Method") == Some(BEARER_METHOD))
        })
        .unwrap_or(false)
}

fn extract_identity(assertion: &Element) -> ClaimsIdentity {
    let mut identity = ClaimsIdentity::default();

    if let Some(subject) = assertion.child(SAML_NS, "Subject") {
        if let Some(name_id) = subject.child(SAML_NS, "NameID") {
            identity.name_id = Some(name_id.text().trim().to_string());
            identity.name_id_format = name_id.attr("Format").map(str::to_string);
        }
    }

    if let Some(authn_statement) = assertion.child(SAML_NS, "AuthnStatement") {
        identity.session_index = authn_statement.attr("SessionIndex").map(str::to_string);
    }

    if let Some(statement) = assertion.child(SAML_NS, "AttributeStatement") {
        for attribute in statement.children_named(SAML_NS, "Attribute") {
            let Some(name) = attribute.attr("Name") else {
                continue;
            };
            let values = attribute
                .children_named(SAML_NS, "AttributeValue")
                .map(|v| v.text())
                .collect();
            let mut claim = Claim::multi(name, values);
            if let Some(friendly) = attribute.attr("FriendlyName") {
                claim = claim.with_friendly_name(friendly);
            }
            identity.claims.push(claim);
        }
    }

    identity
}
