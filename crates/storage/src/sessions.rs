// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identity, TTL, and cascading deletion (spec.md §4.6).

use async_trait::async_trait;
use cellrun_core::{Clock, Language, Principal, RegistryError, SessionId, SessionMeta};
use std::sync::Arc;
use std::time::Duration;

/// `SessionRegistry` contract (spec.md §4.6).
#[async_trait]
pub trait SessionRegistry: Send + Sync + 'static {
    async fn create(&self, principal: Principal, hint: Option<Language>) -> SessionId;
    async fn get(&self, id: SessionId) -> Result<SessionMeta, RegistryError>;
    async fn touch(&self, id: SessionId) -> Result<(), RegistryError>;
    async fn delete(&self, id: SessionId);
}

/// `moka`-backed registry. Expiry is checked lazily on `get` (spec.md §4.6
/// invariant: "`Get` of an expired id returns `NotFound`"); a background
/// session cleaner still sweeps periodically for bounded storage growth
/// (spec.md §2 "Background loops").
pub struct MokaSessionRegistry<C: Clock> {
    entries: moka::future::Cache<SessionId, Arc<parking_lot::Mutex<SessionMeta>>>,
    clock: C,
    default_ttl: Duration,
}

impl<C: Clock> MokaSessionRegistry<C> {
    pub fn new(clock: C, default_ttl: Duration) -> Self {
        let entries = moka::future::Cache::builder()
            .max_capacity(1_000_000)
            .build();
        Self { entries, clock, default_ttl }
    }

    /// Sweep expired sessions (spec.md §2 "session ... cleaner"). Returns
    /// the removed ids so the caller can cascade into `FileStore`/
    /// `StateStore` (spec.md §4.6 `Delete` "cascades ... via explicit calls
    /// ... no implicit foreign-key cascade").
    pub async fn sweep_expired(&self) -> Vec<SessionId> {
        let now_ms = self.clock.epoch_ms();
        let expired: Vec<SessionId> = self
            .entries
            .iter()
            .filter(|(_, meta)| meta.lock().is_expired(now_ms))
            .map(|(id, _)| (*id).clone())
            .collect();
        for id in &expired {
            self.entries.invalidate(id).await;
        }
        expired
    }
}

#[async_trait]
impl<C: Clock> SessionRegistry for MokaSessionRegistry<C> {
    async fn create(&self, principal: Principal, hint: Option<Language>) -> SessionId {
        let id = SessionId::new();
        let now_ms = self.clock.epoch_ms();
        let mut meta = SessionMeta::new(id, principal, now_ms, self.default_ttl);
        if let Some(lang) = hint {
            meta = meta.language_hint(lang);
        }
        self.entries.insert(id, Arc::new(parking_lot::Mutex::new(meta))).await;
        id
    }

    async fn get(&self, id: SessionId) -> Result<SessionMeta, RegistryError> {
        let now_ms = self.clock.epoch_ms();
        match self.entries.get(&id).await {
            Some(meta) => {
                let guard = meta.lock();
                if guard.is_expired(now_ms) {
                    drop(guard);
                    self.entries.invalidate(&id).await;
                    Err(RegistryError::NotFound)
                } else {
                    Ok(guard.clone())
                }
            }
            None => Err(RegistryError::NotFound),
        }
    }

    async fn touch(&self, id: SessionId) -> Result<(), RegistryError> {
        let now_ms = self.clock.epoch_ms();
        match self.entries.get(&id).await {
            Some(meta) => {
                let mut guard = meta.lock();
                if guard.is_expired(now_ms) {
                    return Err(RegistryError::NotFound);
                }
                guard.touch(now_ms);
                Ok(())
            }
            None => Err(RegistryError::NotFound),
        }
    }

    async fn delete(&self, id: SessionId) {
        self.entries.invalidate(&id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellrun_core::FakeClock;

    fn registry() -> MokaSessionRegistry<FakeClock> {
        MokaSessionRegistry::new(FakeClock::new(), Duration::from_secs(10))
    }

    fn principal() -> Principal {
        Principal::new("acme", "alice")
    }

    #[tokio::test]
    async fn created_session_is_gettable() {
        let r = registry();
        let id = r.create(principal(), None).await;
        assert_eq!(r.get(id).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn get_unknown_session_is_not_found() {
        let r = registry();
        assert!(matches!(r.get(SessionId::new()).await, Err(RegistryError::NotFound)));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let r = registry();
        let id = r.create(principal(), None).await;
        r.delete(id).await;
        assert!(matches!(r.get(id).await, Err(RegistryError::NotFound)));
        // idempotent
        r.delete(id).await;
    }

    #[tokio::test]
    async fn touch_is_idempotent_and_side_effect_free_besides_timestamp() {
        let r = registry();
        let id = r.create(principal(), None).await;
        let before = r.get(id).await.unwrap();
        r.touch(id).await.unwrap();
        r.touch(id).await.unwrap();
        let after = r.get(id).await.unwrap();
        assert_eq!(before.principal, after.principal);
        assert_eq!(before.language_hint, after.language_hint);
    }

    #[tokio::test]
    async fn language_hint_is_stored() {
        let r = registry();
        let id = r.create(principal(), Some(cellrun_core::Language::Py)).await;
        assert_eq!(r.get(id).await.unwrap().language_hint, Some(cellrun_core::Language::Py));
    }
}
