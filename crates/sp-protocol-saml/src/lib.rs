//! SAML 2.0 Web SSO protocol core for service providers.
//!
//! This crate implements the message model, transport bindings and
//! cryptographic validation a service provider needs to exchange SAML
//! 2.0 messages with identity providers:
//!
//! - **Message model** - `AuthnRequest` / `Response` /
//!   `ArtifactResponse` parsing and rendering with typed status tables
//! - **Bindings** - HTTP-Redirect (with detached query signatures),
//!   HTTP-POST, and HTTP-Artifact with its SOAP back-channel
//! - **Signature pipeline** - exclusive canonicalization, enveloped
//!   signature verification hardened against signature wrapping, and
//!   signing for outbound messages
//! - **Encrypted assertions** - RSA key transport and AES content
//!   decryption across a rolling set of private keys
//! - **Replay defense** - a one-shot pending-request table correlating
//!   responses to requests, plus assertion-id replay detection
//!
//! The embedding HTTP layer stays outside: it hands in
//! [`bindings::HttpRequestData`], receives [`bindings::CommandResult`]
//! actions to enact, and supplies configuration through
//! [`options::Options`].
//!
//! # Receiving a response
//!
//! ```rust,ignore
//! let binding = bindings::from_request(&request).ok_or(...)?;
//! let unbound = binding.unbind(&request, &options).await?;
//! let response = Response::parse(&unbound.xml, unbound.relay_state)?;
//! let outcome = response.validate(&options, pending_store).await?;
//! // outcome.identities carries the authenticated claims
//! ```

#![forbid(unsafe_code)]

pub mod bindings;
pub mod decrypt;
pub mod error;
pub mod options;
pub mod pending;
pub mod resolver;
pub mod signature;
pub mod types;
pub mod validator;
pub mod xml;

pub use error::{SamlError, SamlResult};
pub use options::{AudienceMode, IdentityProvider, Options, SigningKey, SpOptions};
pub use pending::{InMemoryPendingStore, PendingRequestStore, StoredRequestState};
pub use types::{
    AuthnRequest, Claim, ClaimsIdentity, Response, ResponseBuilder, Saml2Artifact, Saml2Id,
    Saml2StatusCode, SamlBinding, Status,
};
pub use validator::ValidatedResponse;
