//! SAML message identifiers and issue-instant timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SamlError, SamlResult};

/// A SAML message or assertion identifier.
///
/// Lexically an XML `ID` (NCName): it must not be empty, must not start
/// with a digit, and must not contain a colon. Generated IDs are an
/// underscore followed by 128 bits of random hex, which satisfies the
/// NCName grammar and cannot collide in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Saml2Id(String);

impl Saml2Id {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("_{}", sp_crypto::random::random_hex(16)))
    }

    /// Parses an identifier, validating the NCName constraint.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlMalformed`] when the value is not a valid
    /// XML `ID`.
    pub fn parse(value: &str) -> SamlResult<Self> {
        if !is_ncname(value) {
            return Err(SamlError::XmlMalformed(format!(
                "'{value}' is not a valid XML ID"
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Saml2Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Saml2Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks the NCName production (restricted to the ASCII subset SAML
/// implementations emit; non-ASCII name characters are accepted as-is).
fn is_ncname(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Renders a UTC timestamp as an `xsd:dateTime` with millisecond
/// precision and a trailing `Z`, the form every major IdP emits.
#[must_use]
pub fn format_issue_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an `IssueInstant` attribute value to UTC.
///
/// # Errors
///
/// Returns [`SamlError::XmlMalformed`] when the value is not a valid
/// RFC 3339 timestamp.
pub fn parse_issue_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::XmlMalformed(format!("invalid IssueInstant '{value}': {e}")))
}
