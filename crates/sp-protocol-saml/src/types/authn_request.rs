//! SAML AuthnRequest message.
//!
//! The request a service provider sends to an identity provider to
//! start an SSO exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::id::{format_issue_instant, Saml2Id};
use crate::types::{NameIdFormat, SamlBinding, SAMLP_NS, SAML_NS};
use crate::xml::escape_xml;

/// SAML Authentication Request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request; recorded in the pending table
    /// for `InResponseTo` correlation.
    pub id: Saml2Id,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The SP entity id issuing the request.
    pub issuer: String,

    /// The IdP SSO endpoint the request is addressed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Where the IdP should send the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Binding requested for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,

    /// Requested name identifier format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_format: Option<NameIdFormat>,

    /// Whether the IdP must re-authenticate the user.
    #[serde(default)]
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,

    /// The RelayState carried alongside the request (not part of the
    /// XML).
    #[serde(skip)]
    pub relay_state: Option<String>,
}

impl AuthnRequest {
    /// Creates a new request from the given SP entity id.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: Saml2Id::new(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            assertion_consumer_service_url: None,
            protocol_binding: None,
            name_id_format: None,
            force_authn: false,
            is_passive: false,
            relay_state: None,
        }
    }

    /// Sets the destination (the IdP SSO endpoint).
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the response binding.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    /// Sets the requested name identifier format.
    #[must_use]
    pub const fn with_name_id_format(mut self, format: NameIdFormat) -> Self {
        self.name_id_format = Some(format);
        self
    }

    /// Sets force authentication.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets passive authentication.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// Sets the relay state.
    #[must_use]
    pub fn with_relay_state(mut self, state: impl Into<String>) -> Self {
        self.relay_state = Some(state.into());
        self
    }

    /// Serializes the request. No XML declaration is emitted so the
    /// result can go straight into a binding payload.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<saml2p:AuthnRequest xmlns:saml2p=""#);
        xml.push_str(SAMLP_NS);
        xml.push_str(r#"" xmlns:saml2=""#);
        xml.push_str(SAML_NS);
        xml.push_str("\" ID=\"");
        xml.push_str(self.id.as_str());
        xml.push_str("\" Version=\"2.0\" IssueInstant=\"");
        xml.push_str(&format_issue_instant(self.issue_instant));
        xml.push('"');
        if let Some(destination) = &self.destination {
            xml.push_str(" Destination=\"");
            xml.push_str(&escape_xml(destination));
            xml.push('"');
        }
        if let Some(acs_url) = &self.assertion_consumer_service_url {
            xml.push_str(" AssertionConsumerServiceURL=\"");
            xml.push_str(&escape_xml(acs_url));
            xml.push('"');
        }
        if let Some(binding) = &self.protocol_binding {
            xml.push_str(" ProtocolBinding=\"");
            xml.push_str(&escape_xml(binding));
            xml.push('"');
        }
        if self.force_authn {
            xml.push_str(" ForceAuthn=\"true\"");
        }
        if self.is_passive {
            xml.push_str(" IsPassive=\"true\"");
        }
        xml.push_str("><saml2:Issuer>");
        xml.push_str(&escape_xml(&self.issuer));
        xml.push_str("</saml2:Issuer>");
        if let Some(format) = &self.name_id_format {
            xml.push_str("<saml2p:NameIDPolicy Format=\"");
            xml.push_str(format.uri());
            xml.push_str("\" AllowCreate=\"true\"></saml2p:NameIDPolicy>");
        }
        xml.push_str("</saml2p:AuthnRequest>");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Element;

    #[test]
    fn serialized_request_is_well_formed() {
        let request = AuthnRequest::new("https://sp.example.com")
            .with_destination("https://idp.example.com/sso")
            .with_acs_url("https://sp.example.com/acs")
            .with_binding(SamlBinding::HttpPost)
            .with_name_id_format(NameIdFormat::Email);

        let root = Element::parse(&request.to_xml()).unwrap();
        assert!(root.is(SAMLP_NS, "AuthnRequest"));
        assert_eq!(root.attr("Version"), Some("2.0"));
        assert_eq!(root.attr("Destination"), Some("https://idp.example.com/sso"));
        assert_eq!(
            root.attr("AssertionConsumerServiceURL"),
            Some("https://sp.example.com/acs")
        );
        assert_eq!(
            root.child(SAML_NS, "Issuer").unwrap().text(),
            "https://sp.example.com"
        );
        assert!(root.child(SAMLP_NS, "NameIDPolicy").is_some());
    }

    #[test]
    fn flags_are_omitted_when_false() {
        let request = AuthnRequest::new("https://sp.example.com");
        let xml = request.to_xml();
        assert!(!xml.contains("ForceAuthn"));
        assert!(!xml.contains("IsPassive"));

        let forced = AuthnRequest::new("https://sp.example.com").force_authn(true);
        assert!(forced.to_xml().contains("ForceAuthn=\"true\""));
    }

    #[test]
    fn each_request_gets_a_fresh_id() {
        let a = AuthnRequest::new("https://sp.example.com");
        let b = AuthnRequest::new("https://sp.example.com");
        assert_ne!(a.id, b.id);
    }
}
