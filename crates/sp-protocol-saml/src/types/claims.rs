//! Claims extracted from validated assertions.

use serde::{Deserialize, Serialize};

/// A single attribute from an assertion's `AttributeStatement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// The attribute name (typically a URI).
    pub name: String,

    /// A human-readable name for the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// The attribute values in document order.
    pub values: Vec<String>,
}

impl Claim {
    /// Creates a single-valued claim.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            values: vec![value.into()],
        }
    }

    /// Creates a multi-valued claim.
    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            values,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }
}

/// The identity asserted by one assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    /// The subject `NameID` value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<String>,

    /// The `NameID` format URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_format: Option<String>,

    /// The session index from the authentication statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// Attributes from the attribute statement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    /// Creates an identity with just a subject name.
    #[must_use]
    pub fn with_name_id(name_id: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name_id: Some(name_id.into()),
            name_id_format: Some(format.into()),
            session_index: None,
            claims: Vec::new(),
        }
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Returns the first value of the named claim, if present.
    #[must_use]
    pub fn claim_value(&self, name: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|claim| claim.name == name)
            .and_then(|claim| claim.values.first())
            .map(String::as_str)
    }
}
