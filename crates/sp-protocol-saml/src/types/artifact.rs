//! SAML artifacts (SAML 2.0 Bindings §3.6.4).
//!
//! A type-4 artifact is a fixed 44-byte structure: a 2-byte type code
//! (0x0004), a 2-byte endpoint index, the 20-byte SourceID (SHA-1 of the
//! issuer entity id) and a 20-byte random message handle. The SP uses
//! the SourceID to find which IdP to dereference the artifact against.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{SamlError, SamlResult};

/// Artifact type code for the type-4 format.
pub const TYPE_CODE: u16 = 0x0004;

const SOURCE_ID_LEN: usize = 20;
const MESSAGE_HANDLE_LEN: usize = 20;
const ARTIFACT_LEN: usize = 4 + SOURCE_ID_LEN + MESSAGE_HANDLE_LEN;

/// A decoded type-4 SAML artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saml2Artifact {
    /// Index of the artifact resolution endpoint at the issuer.
    pub endpoint_index: u16,
    /// SHA-1 of the issuer entity id.
    pub source_id: [u8; SOURCE_ID_LEN],
    /// Random handle identifying the stored message.
    pub message_handle: [u8; MESSAGE_HANDLE_LEN],
}

impl Saml2Artifact {
    /// Creates a fresh artifact for a message issued by `entity_id`.
    #[must_use]
    pub fn new(entity_id: &str, endpoint_index: u16) -> Self {
        let mut source_id = [0u8; SOURCE_ID_LEN];
        source_id.copy_from_slice(&sp_crypto::sha1(entity_id.as_bytes()));

        let mut message_handle = [0u8; MESSAGE_HANDLE_LEN];
        message_handle.copy_from_slice(&sp_crypto::random::random_bytes(MESSAGE_HANDLE_LEN));

        Self {
            endpoint_index,
            source_id,
            message_handle,
        }
    }

    /// Returns true when the artifact was sourced by `entity_id`.
    #[must_use]
    pub fn matches_issuer(&self, entity_id: &str) -> bool {
        sp_crypto::sha1(entity_id.as_bytes()) == self.source_id
    }

    /// Encodes the artifact to its base64 wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(ARTIFACT_LEN);
        bytes.extend_from_slice(&TYPE_CODE.to_be_bytes());
        bytes.extend_from_slice(&self.endpoint_index.to_be_bytes());
        bytes.extend_from_slice(&self.source_id);
        bytes.extend_from_slice(&self.message_handle);
        STANDARD.encode(bytes)
    }

    /// Decodes a base64 artifact, checking length and type code.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlMalformed`] on a wrong length or type
    /// code, [`SamlError::Base64Decode`] on bad base64.
    pub fn decode(artifact: &str) -> SamlResult<Self> {
        let bytes = STANDARD.decode(artifact)?;
        if bytes.len() != ARTIFACT_LEN {
            return Err(SamlError::XmlMalformed(format!(
                "artifact must be {ARTIFACT_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let type_code = u16::from_be_bytes([bytes[0], bytes[1]]);
        if type_code != TYPE_CODE {
            return Err(SamlError::XmlMalformed(format!(
                "unsupported artifact type code: {type_code:#06x}"
            )));
        }

        let endpoint_index = u16::from_be_bytes([bytes[2], bytes[3]]);

        let mut source_id = [0u8; SOURCE_ID_LEN];
        source_id.copy_from_slice(&bytes[4..4 + SOURCE_ID_LEN]);

        let mut message_handle = [0u8; MESSAGE_HANDLE_LEN];
        message_handle.copy_from_slice(&bytes[4 + SOURCE_ID_LEN..]);

        Ok(Self {
            endpoint_index,
            source_id,
            message_handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let artifact = Saml2Artifact::new("https://idp.example.com", 1);
        let decoded = Saml2Artifact::decode(&artifact.encode()).unwrap();
        assert_eq!(decoded, artifact);
        assert_eq!(decoded.endpoint_index, 1);
    }

    #[test]
    fn source_id_identifies_issuer() {
        let artifact = Saml2Artifact::new("https://idp.example.com", 0);
        assert!(artifact.matches_issuer("https://idp.example.com"));
        assert!(!artifact.matches_issuer("https://other.example.com"));
    }

    #[test]
    fn message_handles_are_unique() {
        let a = Saml2Artifact::new("https://idp.example.com", 0);
        let b = Saml2Artifact::new("https://idp.example.com", 0);
        assert_ne!(a.message_handle, b.message_handle);
    }

    #[test]
    fn wrong_length_rejected() {
        let short = STANDARD.encode([0u8; 10]);
        assert!(Saml2Artifact::decode(&short).is_err());
    }

    #[test]
    fn wrong_type_code_rejected() {
        let mut bytes = vec![0u8; ARTIFACT_LEN];
        bytes[1] = 0x03;
        let encoded = STANDARD.encode(&bytes);
        assert!(Saml2Artifact::decode(&encoded).is_err());
    }

    #[test]
    fn invalid_base64_rejected() {
        assert!(matches!(
            Saml2Artifact::decode("!!not-base64!!"),
            Err(SamlError::Base64Decode(_))
        ));
    }
}
