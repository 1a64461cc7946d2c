//! Pending-request tracking for `InResponseTo` correlation.
//!
//! Every outbound `AuthnRequest` records an entry keyed by the relay
//! state the IdP will echo back. The entry is taken exactly once:
//! `try_remove` is the single atomicity point that turns a duplicate
//! delivery into a replay signal, so implementations must make it a
//! linearizable take, not a read followed by a delete.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::Saml2Id;

/// Default entry lifetime. An authentication round trip that takes
/// longer than this has failed for other reasons.
pub const DEFAULT_TTL_SECONDS: i64 = 300;

/// Hard ceiling on the configurable TTL (one hour).
pub const MAX_TTL_SECONDS: i64 = 3600;

/// State recorded when an `AuthnRequest` is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRequestState {
    /// The IdP the request was addressed to.
    pub idp: String,
    /// The `AuthnRequest` message id, matched against `InResponseTo`.
    pub message_id: Saml2Id,
    /// Where to send the user after a successful exchange.
    pub return_url: Option<String>,
    /// When the request was issued.
    pub created_at: DateTime<Utc>,
}

impl StoredRequestState {
    /// Creates state for a request issued now.
    #[must_use]
    pub fn new(idp: impl Into<String>, message_id: Saml2Id, return_url: Option<String>) -> Self {
        Self {
            idp: idp.into(),
            message_id,
            return_url,
            created_at: Utc::now(),
        }
    }
}

/// Pending-store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PendingStateError {
    /// The correlation key is already present. Keys are random; a
    /// collision means the caller reused one, which is a programming
    /// error on their side.
    #[error("duplicate correlation key: {0}")]
    DuplicateKey(String),

    /// The backing store failed.
    #[error("pending store failure: {0}")]
    Storage(String),
}

/// Process-wide table of in-flight authentication requests.
///
/// Implementations may externalize the state (a shared cache for
/// multi-instance deployments) as long as `try_remove` stays an atomic
/// take-on-use.
#[async_trait]
pub trait PendingRequestStore: Send + Sync {
    /// Inserts state under a correlation key.
    async fn add(&self, key: &str, state: StoredRequestState) -> Result<(), PendingStateError>;

    /// Atomically removes and returns the state for a key.
    ///
    /// `Ok(None)` means unknown or already consumed; the caller treats
    /// both as a replay.
    async fn try_remove(&self, key: &str) -> Result<Option<StoredRequestState>, PendingStateError>;

    /// Drops expired entries, returning how many were removed.
    async fn cleanup_expired(&self) -> Result<u64, PendingStateError>;
}

/// In-memory pending store.
#[derive(Debug)]
pub struct InMemoryPendingStore {
    entries: Arc<RwLock<HashMap<String, StoredRequestState>>>,
    ttl: Duration,
}

impl InMemoryPendingStore {
    /// Creates a store with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl_seconds(DEFAULT_TTL_SECONDS)
    }

    /// Creates a store with a custom TTL, clamped to the one-hour
    /// ceiling.
    #[must_use]
    pub fn with_ttl_seconds(ttl_seconds: i64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(ttl_seconds.clamp(1, MAX_TTL_SECONDS)),
        }
    }

    fn is_expired(&self, state: &StoredRequestState) -> bool {
        Utc::now() > state.created_at + self.ttl
    }
}

impl Default for InMemoryPendingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PendingRequestStore for InMemoryPendingStore {
    async fn add(&self, key: &str, state: StoredRequestState) -> Result<(), PendingStateError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Err(PendingStateError::DuplicateKey(key.to_string()));
        }

        tracing::debug!(
            idp = %state.idp,
            message_id = %state.message_id,
            "recorded pending authentication request"
        );
        entries.insert(key.to_string(), state);
        Ok(())
    }

    async fn try_remove(&self, key: &str) -> Result<Option<StoredRequestState>, PendingStateError> {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(state) if self.is_expired(&state) => {
                tracing::warn!(
                    idp = %state.idp,
                    message_id = %state.message_id,
                    "pending request expired before the response arrived"
                );
                Ok(None)
            }
            Some(state) => {
                tracing::info!(
                    idp = %state.idp,
                    message_id = %state.message_id,
                    "pending request consumed"
                );
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn cleanup_expired(&self) -> Result<u64, PendingStateError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, state| Utc::now() <= state.created_at + ttl);
        let removed = (before - entries.len()) as u64;

        if removed > 0 {
            tracing::debug!(removed, "dropped expired pending requests");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> StoredRequestState {
        StoredRequestState::new(
            "https://idp.example.com",
            Saml2Id::parse("_req1").unwrap(),
            Some("/dashboard".to_string()),
        )
    }

    #[tokio::test]
    async fn add_and_take() {
        let store = InMemoryPendingStore::new();
        store.add("relay1", sample_state()).await.unwrap();

        let taken = store.try_remove("relay1").await.unwrap().unwrap();
        assert_eq!(taken.idp, "https://idp.example.com");
        assert_eq!(taken.message_id.as_str(), "_req1");
        assert_eq!(taken.return_url.as_deref(), Some("/dashboard"));
    }

    #[tokio::test]
    async fn second_take_signals_replay() {
        let store = InMemoryPendingStore::new();
        store.add("relay1", sample_state()).await.unwrap();

        assert!(store.try_remove("relay1").await.unwrap().is_some());
        assert!(store.try_remove("relay1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_key_is_absent() {
        let store = InMemoryPendingStore::new();
        assert!(store.try_remove("never-added").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_key_is_an_error() {
        let store = InMemoryPendingStore::new();
        store.add("relay1", sample_state()).await.unwrap();

        let result = store.add("relay1", sample_state()).await;
        assert!(matches!(result, Err(PendingStateError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let store = InMemoryPendingStore::with_ttl_seconds(60);
        let mut state = sample_state();
        state.created_at = Utc::now() - Duration::minutes(5);
        store.add("relay1", state).await.unwrap();

        assert!(store.try_remove("relay1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_drops_only_expired_entries() {
        let store = InMemoryPendingStore::with_ttl_seconds(60);

        let mut expired = sample_state();
        expired.created_at = Utc::now() - Duration::minutes(10);
        store.add("old", expired).await.unwrap();
        store.add("fresh", sample_state()).await.unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(store.try_remove("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ttl_is_clamped_to_ceiling() {
        // A huge TTL must not exceed the one-hour ceiling.
        let store = InMemoryPendingStore::with_ttl_seconds(86_400);
        let mut state = sample_state();
        state.created_at = Utc::now() - Duration::seconds(MAX_TTL_SECONDS + 60);
        store.add("relay1", state).await.unwrap();

        assert!(store.try_remove("relay1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_takes_yield_exactly_one_winner() {
        let store = Arc::new(InMemoryPendingStore::new());
        store.add("relay1", sample_state()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.try_remove("relay1").await.unwrap().is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
