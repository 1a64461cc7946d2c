//! HTTP-POST binding.
//!
//! Messages travel base64-encoded in a self-submitting HTML form. Any
//! signature is inside the XML, so the unbind side is pure transport.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{SamlError, SamlResult};
use crate::options::Options;
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

use super::{Binding, CommandResult, HttpRequestData, SamlMessage, SamlMessageType, UnboundMessage};

/// Ceiling on the encoded payload before base64 decoding.
const MAX_ENCODED_SIZE: usize = 512 * 1024;

/// HTTP-POST binding.
pub struct HttpPostBinding;

#[async_trait]
impl Binding for HttpPostBinding {
    fn binding_type(&self) -> SamlBinding {
        SamlBinding::HttpPost
    }

    fn can_unbind(&self, request: &HttpRequestData) -> bool {
        request.method == "POST"
            && (request.form.contains_key("SAMLRequest")
                || request.form.contains_key("SAMLResponse"))
    }

    fn bind(&self, message: &SamlMessage, signer: Option<&XmlSigner>) -> SamlResult<CommandResult> {
        message.check()?;

        // POST carries the signature inside the XML itself.
        let xml = match signer {
            Some(signer) => {
                let id = root_id(&message.xml)?;
                signer.sign(&message.xml, &id)?
            }
            None => message.xml.clone(),
        };

        let encoded = STANDARD.encode(xml.as_bytes());
        let form = auto_submit_form(
            &message.destination,
            message.message_type.form_param(),
            &encoded,
            message.relay_state.as_deref(),
        );

        tracing::debug!(
            destination = %message.destination,
            signed = signer.is_some(),
            "bound message to HTTP-POST"
        );
        Ok(CommandResult::html(form))
    }

    async fn unbind(
        &self,
        request: &HttpRequestData,
        _options: &Options,
    ) -> SamlResult<UnboundMessage> {
        let (encoded, message_type) = if let Some(value) = request.form.get("SAMLRequest") {
            (value, SamlMessageType::Request)
        } else if let Some(value) = request.form.get("SAMLResponse") {
            (value, SamlMessageType::Response)
        } else {
            return Err(SamlError::UnsupportedBinding(
                "no SAMLRequest or SAMLResponse form field".to_string(),
            ));
        };

        if encoded.len() > MAX_ENCODED_SIZE {
            return Err(SamlError::Base64Decode(format!(
                "encoded payload exceeds {MAX_ENCODED_SIZE} bytes"
            )));
        }

        // Form decoding may have preserved base64 whitespace.
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = STANDARD.decode(cleaned)?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| SamlError::XmlParse(format!("message is not UTF-8: {e}")))?;

        Ok(UnboundMessage {
            xml,
            message_type,
            relay_state: request.form.get("RelayState").cloned(),
        })
    }
}

fn root_id(xml: &str) -> SamlResult<String> {
    let root = crate::xml::Element::parse(xml)?;
    root.attr("ID")
        .map(str::to_string)
        .ok_or_else(|| SamlError::XmlMalformed("message root has no ID".to_string()))
}

/// Builds the auto-submitting form. The noscript branch keeps a visible
/// Continue button so the flow also works without script.
fn auto_submit_form(
    destination: &str,
    param_name: &str,
    encoded: &str,
    relay_state: Option<&str>,
) -> String {
    let relay_state_input = relay_state
        .map(|rs| {
            format!(
                r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                html_escape(rs)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Continue sign-in</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
        html_escape(destination),
        param_name,
        encoded,
        relay_state_input
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SpOptions;

    fn options() -> Options {
        Options::new(SpOptions::new(
            "https://sp.example.com",
            "https://sp.example.com/acs",
        ))
    }

    fn message(relay_state: Option<&str>) -> SamlMessage {
        SamlMessage {
            xml: r#"<saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1" Version="2.0"></saml2p:Response>"#
                .to_string(),
            message_type: SamlMessageType::Response,
            issuer: "https://idp.example.com".to_string(),
            destination: "https://sp.example.com/acs".to_string(),
            relay_state: relay_state.map(str::to_string),
        }
    }

    fn extract_field<'a>(html: &'a str, name: &str) -> &'a str {
        let marker = format!("name=\"{name}\" value=\"");
        let start = html.find(&marker).unwrap() + marker.len();
        let end = html[start..].find('"').unwrap();
        &html[start..start + end]
    }

    #[tokio::test]
    async fn bind_unbind_round_trip() {
        let binding = HttpPostBinding;
        let message = message(Some("state123"));

        let result = binding.bind(&message, None).unwrap();
        let html = result.body.as_deref().unwrap();
        assert!(html.contains("document.forms[0].submit()"));
        assert!(html.contains("Continue"));

        let encoded = extract_field(html, "SAMLResponse");
        let request = HttpRequestData::post(
            "https://sp.example.com/acs",
            &[("SAMLResponse", encoded), ("RelayState", "state123")],
        )
        .unwrap();
        assert!(binding.can_unbind(&request));

        let unbound = binding.unbind(&request, &options()).await.unwrap();
        assert_eq!(unbound.xml, message.xml);
        assert_eq!(unbound.message_type, SamlMessageType::Response);
        assert_eq!(unbound.relay_state.as_deref(), Some("state123"));
    }

    #[tokio::test]
    async fn signer_embeds_signature_in_xml() {
        use aws_lc_rs::encoding::AsDer;
        use aws_lc_rs::rsa::KeySize;
        use aws_lc_rs::signature::RsaKeyPair;

        let key_pair = RsaKeyPair::generate(KeySize::Rsa2048).expect("keygen");
        let private_der = key_pair.as_der().unwrap().as_ref().to_vec();

        let binding = HttpPostBinding;
        let mut message = message(None);
        message.xml = r#"<saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0"><saml2:Issuer>https://idp.example.com</saml2:Issuer></saml2p:Response>"#.to_string();

        let signer = XmlSigner::new(private_der, None);
        let result = binding.bind(&message, Some(&signer)).unwrap();

        let encoded = extract_field(result.body.as_deref().unwrap(), "SAMLResponse");
        let request = HttpRequestData::post(
            "https://sp.example.com/acs",
            &[("SAMLResponse", encoded)],
        )
        .unwrap();
        let unbound = binding.unbind(&request, &options()).await.unwrap();
        assert!(unbound.xml.contains("SignatureValue"));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let binding = HttpPostBinding;
        let request =
            HttpRequestData::post("https://sp.example.com/acs", &[("other", "x")]).unwrap();
        assert!(!binding.can_unbind(&request));
        assert!(binding.unbind(&request, &options()).await.is_err());
    }

    #[test]
    fn destination_is_html_escaped() {
        let html = auto_submit_form(
            "https://sp.example.com/acs?a=1&b=\"x\"",
            "SAMLResponse",
            "abc",
            None,
        );
        assert!(html.contains("&amp;"));
        assert!(html.contains("&quot;"));
    }
}
