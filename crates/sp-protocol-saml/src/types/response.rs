//! SAML Response message.
//!
//! The inbound shape is parsed once from the wire and keeps both the
//! typed fields and the original element tree: signature verification
//! must run over the octets the IdP signed, not over a re-rendering of
//! our data model. Decryption and signature checks are deferred to the
//! validator.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OnceCell;

use crate::error::{SamlError, SamlResult};
use crate::types::id::{format_issue_instant, parse_issue_instant, Saml2Id};
use crate::types::{ClaimsIdentity, Saml2StatusCode, Status, SAMLP_NS, SAML_NS};
use crate::validator::ValidatedResponse;
use crate::xml::{escape_xml, Element};

/// A SAML `Response` received from (or built for) the wire.
pub struct Response {
    id: Saml2Id,
    in_response_to: Option<Saml2Id>,
    issue_instant: DateTime<Utc>,
    destination: Option<String>,
    issuer: String,
    status: Status,
    relay_state: Option<String>,
    xml: String,
    document: Element,
    pub(crate) validation: OnceCell<Result<ValidatedResponse, SamlError>>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("id", &self.id)
            .field("in_response_to", &self.in_response_to)
            .field("issuer", &self.issuer)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Response {
    /// Parses a `Response` from its XML serialization.
    ///
    /// Performs structural checks only: namespace and element name,
    /// protocol version, required attributes, status mapping and issuer
    /// capture. Nothing cryptographic happens here.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlMalformed`] when the document is not a
    /// version 2.0 `samlp:Response`, and [`SamlError::XmlParse`] when it
    /// is not XML at all.
    pub fn parse(xml: &str, relay_state: Option<String>) -> SamlResult<Self> {
        let document = Element::parse(xml)?;

        if !document.is(SAMLP_NS, "Response") {
            return Err(SamlError::XmlMalformed(format!(
                "expected {{{SAMLP_NS}}}Response, got {}",
                document.qname()
            )));
        }

        match document.attr("Version") {
            Some("2.0") => {}
            Some(other) => {
                return Err(SamlError::XmlMalformed(format!(
                    "unsupported SAML version: {other}"
                )));
            }
            None => {
                return Err(SamlError::XmlMalformed("missing Version".to_string()));
            }
        }

        let id = document
            .attr("ID")
            .ok_or_else(|| SamlError::XmlMalformed("missing ID".to_string()))
            .and_then(Saml2Id::parse)?;

        let issue_instant = document
            .attr("IssueInstant")
            .ok_or_else(|| SamlError::XmlMalformed("missing IssueInstant".to_string()))
            .and_then(parse_issue_instant)?;

        let in_response_to = document
            .attr("InResponseTo")
            .map(Saml2Id::parse)
            .transpose()?;

        let destination = document.attr("Destination").map(str::to_string);

        let status = parse_status(&document)?;

        let issuer = document
            .child(SAML_NS, "Issuer")
            .map(|el| el.text().trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| SamlError::XmlMalformed("missing Issuer".to_string()))?;

        Ok(Self {
            id,
            in_response_to,
            issue_instant,
            destination,
            issuer,
            status,
            relay_state,
            xml: xml.to_string(),
            document,
            validation: OnceCell::new(),
        })
    }

    /// The response ID.
    #[must_use]
    pub fn id(&self) -> &Saml2Id {
        &self.id
    }

    /// The `InResponseTo` correlation id, absent on unsolicited
    /// responses.
    #[must_use]
    pub fn in_response_to(&self) -> Option<&Saml2Id> {
        self.in_response_to.as_ref()
    }

    /// When the response was issued.
    #[must_use]
    pub fn issue_instant(&self) -> DateTime<Utc> {
        self.issue_instant
    }

    /// The `Destination` attribute, if present.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// The issuing entity id.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The response status.
    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// The relay state delivered alongside the XML, if any.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// The authoritative serialized form.
    #[must_use]
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// The parsed document element.
    #[must_use]
    pub(crate) fn document(&self) -> &Element {
        &self.document
    }

    /// Cleartext `saml2:Assertion` children as present in the source.
    #[must_use]
    pub fn assertion_elements(&self) -> Vec<&Element> {
        self.document.children_named(SAML_NS, "Assertion").collect()
    }

    /// `saml2:EncryptedAssertion` children as present in the source.
    #[must_use]
    pub fn encrypted_assertion_elements(&self) -> Vec<&Element> {
        self.document
            .children_named(SAML_NS, "EncryptedAssertion")
            .collect()
    }

    /// Returns true when the root element carries a signature.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        crate::signature::find_signature(&self.document).is_some()
    }
}

fn parse_status(document: &Element) -> SamlResult<Status> {
    let status_element = document
        .child(SAMLP_NS, "Status")
        .ok_or_else(|| SamlError::XmlMalformed("missing Status".to_string()))?;

    let status_code = status_element
        .child(SAMLP_NS, "StatusCode")
        .ok_or_else(|| SamlError::XmlMalformed("missing StatusCode".to_string()))?;

    let code_uri = status_code
        .attr("Value")
        .ok_or_else(|| SamlError::XmlMalformed("missing StatusCode Value".to_string()))?;
    let code = Saml2StatusCode::from_uri(code_uri)
        .ok_or_else(|| SamlError::XmlMalformed(format!("unknown status code: {code_uri}")))?;

    // Second-level codes are free-form; keep the wire value verbatim.
    let second_level = status_code
        .child(SAMLP_NS, "StatusCode")
        .and_then(|nested| nested.attr("Value"))
        .map(str::to_string);

    let message = status_element
        .child(SAMLP_NS, "StatusMessage")
        .map(|el| el.text().trim().to_string())
        .filter(|text| !text.is_empty());

    Ok(Status {
        code,
        message,
        second_level,
    })
}

/// Builder for outbound `Response` documents.
///
/// Used by tests and stub issuers; renders one assertion per supplied
/// identity. The rendered XML re-parses into an equal [`Response`], so
/// a built message and its received form agree.
pub struct ResponseBuilder {
    id: Saml2Id,
    issuer: String,
    destination: Option<String>,
    in_response_to: Option<Saml2Id>,
    status: Status,
    audience: Option<String>,
    identities: Vec<ClaimsIdentity>,
    validity: Duration,
}

impl ResponseBuilder {
    /// Creates a builder for a success response from the given issuer.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: Saml2Id::new(),
            issuer: issuer.into(),
            destination: None,
            in_response_to: None,
            status: Status::success(),
            audience: None,
            identities: Vec::new(),
            validity: Duration::minutes(5),
        }
    }

    /// Sets the response ID (defaults to a fresh random id).
    #[must_use]
    pub fn id(mut self, id: Saml2Id) -> Self {
        self.id = id;
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the request id this response answers.
    #[must_use]
    pub fn in_response_to(mut self, id: Saml2Id) -> Self {
        self.in_response_to = Some(id);
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Sets the audience written into each assertion's conditions.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Adds an identity, rendered as one assertion.
    #[must_use]
    pub fn identity(mut self, identity: ClaimsIdentity) -> Self {
        self.identities.push(identity);
        self
    }

    /// Sets the assertion validity window.
    #[must_use]
    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Renders the response XML. No XML declaration is emitted and the
    /// output re-parses stably.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let now = Utc::now();
        let issue_instant = format_issue_instant(now);

        let mut xml = String::new();
        xml.push_str(r#"<saml2p:Response xmlns:saml2p=""#);
        xml.push_str(SAMLP_NS);
        xml.push_str(r#"" xmlns:saml2=""#);
        xml.push_str(SAML_NS);
        xml.push('"');
        if let Some(destination) = &self.destination {
            xml.push_str(" Destination=\"");
            xml.push_str(&escape_xml(destination));
            xml.push('"');
        }
        xml.push_str(" ID=\"");
        xml.push_str(self.id.as_str());
        xml.push_str("\" Version=\"2.0\" IssueInstant=\"");
        xml.push_str(&issue_instant);
        xml.push('"');
        if let Some(in_response_to) = &self.in_response_to {
            xml.push_str(" InResponseTo=\"");
            xml.push_str(in_response_to.as_str());
            xml.push('"');
        }
        xml.push_str("><saml2:Issuer>");
        xml.push_str(&escape_xml(&self.issuer));
        xml.push_str("</saml2:Issuer><saml2p:Status><saml2p:StatusCode Value=\"");
        xml.push_str(self.status.code.uri());
        xml.push('"');
        if let Some(second_level) = &self.status.second_level {
            xml.push_str("><saml2p:StatusCode Value=\"");
            xml.push_str(&escape_xml(second_level));
            xml.push_str("\"></saml2p:StatusCode></saml2p:StatusCode>");
        } else {
            xml.push_str("></saml2p:StatusCode>");
        }
        if let Some(message) = &self.status.message {
            xml.push_str("<saml2p:StatusMessage>");
            xml.push_str(&escape_xml(message));
            xml.push_str("</saml2p:StatusMessage>");
        }
        xml.push_str("</saml2p:Status>");

        for identity in &self.identities {
            self.render_assertion(&mut xml, identity, now);
        }

        xml.push_str("</saml2p:Response>");
        xml
    }

    fn render_assertion(&self, xml: &mut String, identity: &ClaimsIdentity, now: DateTime<Utc>) {
        let assertion_id = Saml2Id::new();
        let issue_instant = format_issue_instant(now);
        let not_on_or_after = format_issue_instant(now + self.validity);
        let not_before = format_issue_instant(now - Duration::minutes(2));

        xml.push_str("<saml2:Assertion ID=\"");
        xml.push_str(assertion_id.as_str());
        xml.push_str("\" Version=\"2.0\" IssueInstant=\"");
        xml.push_str(&issue_instant);
        xml.push_str("\"><saml2:Issuer>");
        xml.push_str(&escape_xml(&self.issuer));
        xml.push_str("</saml2:Issuer><saml2:Subject>");
        if let Some(name_id) = &identity.name_id {
            xml.push_str("<saml2:NameID");
            if let Some(format) = &identity.name_id_format {
                xml.push_str(" Format=\"");
                xml.push_str(&escape_xml(format));
                xml.push('"');
            }
            xml.push('>');
            xml.push_str(&escape_xml(name_id));
            xml.push_str("</saml2:NameID>");
        }
        xml.push_str(
            "<saml2:SubjectConfirmation Method=\"urn:oasis:names:tc:SAML:2.0:cm:bearer\">",
        );
        xml.push_str("<saml2:SubjectConfirmationData NotOnOrAfter=\"");
        xml.push_str(&not_on_or_after);
        xml.push('"');
        if let Some(destination) = &self.destination {
            xml.push_str(" Recipient=\"");
            xml.push_str(&escape_xml(destination));
            xml.push('"');
        }
        if let Some(in_response_to) = &self.in_response_to {
            xml.push_str(" InResponseTo=\"");
            xml.push_str(in_response_to.as_str());
            xml.push('"');
        }
        xml.push_str("></saml2:SubjectConfirmationData></saml2:SubjectConfirmation></saml2:Subject>");

        xml.push_str("<saml2:Conditions NotBefore=\"");
        xml.push_str(&not_before);
        xml.push_str("\" NotOnOrAfter=\"");
        xml.push_str(&not_on_or_after);
        xml.push('"');
        if let Some(audience) = &self.audience {
            xml.push_str("><saml2:AudienceRestriction><saml2:Audience>");
            xml.push_str(&escape_xml(audience));
            xml.push_str("</saml2:Audience></saml2:AudienceRestriction></saml2:Conditions>");
        } else {
            xml.push_str("></saml2:Conditions>");
        }

        xml.push_str("<saml2:AuthnStatement AuthnInstant=\"");
        xml.push_str(&issue_instant);
        xml.push('"');
        if let Some(session_index) = &identity.session_index {
            xml.push_str(" SessionIndex=\"");
            xml.push_str(&escape_xml(session_index));
            xml.push('"');
        }
        xml.push_str("><saml2:AuthnContext><saml2:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml2:AuthnContextClassRef></saml2:AuthnContext></saml2:AuthnStatement>");

        if !identity.claims.is_empty() {
            xml.push_str("<saml2:AttributeStatement>");
            for claim in &identity.claims {
                xml.push_str("<saml2:Attribute Name=\"");
                xml.push_str(&escape_xml(&claim.name));
                xml.push('"');
                if let Some(friendly) = &claim.friendly_name {
                    xml.push_str(" FriendlyName=\"");
                    xml.push_str(&escape_xml(friendly));
                    xml.push('"');
                }
                xml.push('>');
                for value in &claim.values {
                    xml.push_str("<saml2:AttributeValue>");
                    xml.push_str(&escape_xml(value));
                    xml.push_str("</saml2:AttributeValue>");
                }
                xml.push_str("</saml2:Attribute>");
            }
            xml.push_str("</saml2:AttributeStatement>");
        }

        xml.push_str("</saml2:Assertion>");
    }
}

/// `ArtifactResponse` wrapper handling.
pub struct ArtifactResponse;

impl ArtifactResponse {
    /// Extracts the wrapped protocol message from a
    /// `samlp:ArtifactResponse` element: the first child element that is
    /// not `Issuer`, `Signature`, `Extensions`, or `Status`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlMalformed`] when the element is not an
    /// `ArtifactResponse` or wraps no message.
    pub fn unwrap_message(element: &Element) -> SamlResult<Element> {
        if !element.is(SAMLP_NS, "ArtifactResponse") {
            return Err(SamlError::XmlMalformed(format!(
                "expected ArtifactResponse, got {}",
                element.qname()
            )));
        }

        element
            .child_elements()
            .find(|child| {
                !(child.is(SAML_NS, "Issuer")
                    || child.is(crate::types::XMLDSIG_NS, "Signature")
                    || child.is(SAMLP_NS, "Extensions")
                    || child.is(SAMLP_NS, "Status"))
            })
            .cloned()
            .ok_or_else(|| {
                SamlError::XmlMalformed("ArtifactResponse wraps no message".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Claim;

    fn sample_response_xml() -> String {
        ResponseBuilder::new("https://idp.example.com")
            .destination("https://sp.example.com/acs")
            .in_response_to(Saml2Id::parse("_req1").unwrap())
            .audience("https://sp.example.com")
            .identity(
                ClaimsIdentity::with_name_id(
                    "user@example.com",
                    "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
                )
                .with_claim(Claim::single("email", "user@example.com")),
            )
            .to_xml()
    }

    #[test]
    fn built_response_reparses_with_equal_fields() {
        let xml = sample_response_xml();
        let response = Response::parse(&xml, Some("relay".to_string())).unwrap();

        assert_eq!(response.issuer(), "https://idp.example.com");
        assert_eq!(response.destination(), Some("https://sp.example.com/acs"));
        assert_eq!(response.in_response_to().unwrap().as_str(), "_req1");
        assert!(response.status().is_success());
        assert_eq!(response.relay_state(), Some("relay"));
        assert_eq!(response.assertion_elements().len(), 1);
        assert!(response.encrypted_assertion_elements().is_empty());
        assert!(!response.is_signed());
    }

    #[test]
    fn parse_rejects_non_response() {
        let err = Response::parse(
            r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a"/>"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SamlError::XmlMalformed(_)));
    }

    #[test]
    fn parse_rejects_wrong_version() {
        let xml = sample_response_xml().replace("Version=\"2.0\"", "Version=\"1.1\"");
        let err = Response::parse(&xml, None).unwrap_err();
        assert!(matches!(err, SamlError::XmlMalformed(_)));
    }

    #[test]
    fn parse_rejects_missing_id() {
        let xml = sample_response_xml();
        let without_id = xml.replacen(
            &format!(" ID=\"{}\"", Response::parse(&xml, None).unwrap().id()),
            "",
            1,
        );
        assert!(Response::parse(&without_id, None).is_err());
    }

    #[test]
    fn second_level_status_is_captured() {
        let xml = ResponseBuilder::new("https://idp.example.com")
            .status(
                Status::requester_error("name id policy rejected").with_second_level(
                    "urn:oasis:names:tc:SAML:2.0:status:InvalidNameIDPolicy",
                ),
            )
            .to_xml();
        let response = Response::parse(&xml, None).unwrap();

        assert_eq!(response.status().code, Saml2StatusCode::Requester);
        assert_eq!(
            response.status().second_level.as_deref(),
            Some("urn:oasis:names:tc:SAML:2.0:status:InvalidNameIDPolicy")
        );
        assert_eq!(
            response.status().message.as_deref(),
            Some("name id policy rejected")
        );
    }

    #[test]
    fn unknown_status_code_is_rejected() {
        let xml = sample_response_xml().replace(
            "urn:oasis:names:tc:SAML:2.0:status:Success",
            "urn:oasis:names:tc:SAML:2.0:status:MadeUp",
        );
        assert!(Response::parse(&xml, None).is_err());
    }

    #[test]
    fn artifact_response_unwraps_inner_message() {
        let xml = format!(
            r#"<saml2p:ArtifactResponse xmlns:saml2p="{SAMLP_NS}" xmlns:saml2="{SAML_NS}" ID="_ar1" Version="2.0"><saml2:Issuer>https://idp.example.com</saml2:Issuer><saml2p:Status><saml2p:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"></saml2p:StatusCode></saml2p:Status><saml2p:Response ID="_inner" Version="2.0" IssueInstant="2024-06-01T12:00:00Z"><saml2:Issuer>https://idp.example.com</saml2:Issuer><saml2p:Status><saml2p:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"></saml2p:StatusCode></saml2p:Status></saml2p:Response></saml2p:ArtifactResponse>"#
        );
        let wrapper = Element::parse(&xml).unwrap();
        let inner = ArtifactResponse::unwrap_message(&wrapper).unwrap();
        assert!(inner.is(SAMLP_NS, "Response"));
        assert_eq!(inner.attr("ID"), Some("_inner"));
    }

    #[test]
    fn artifact_response_without_message_errors() {
        let xml = format!(
            r#"<saml2p:ArtifactResponse xmlns:saml2p="{SAMLP_NS}" xmlns:saml2="{SAML_NS}" ID="_ar1"><saml2:Issuer>https://idp.example.com</saml2:Issuer><saml2p:Status><saml2p:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"></saml2p:StatusCode></saml2p:Status></saml2p:ArtifactResponse>"#
        );
        let wrapper = Element::parse(&xml).unwrap();
        assert!(ArtifactResponse::unwrap_message(&wrapper).is_err());
    }
}
