// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SandboxPool` (spec.md §4.2) — the hardest subsystem: a bounded,
//! per-language set of warm sandboxes with O(10ms) acquisition and a
//! background replenisher.
//!
//! Concurrency invariants I1-I4 (spec.md §4.2) are upheld by construction:
//! - I1/I2: a single `parking_lot::Mutex` guards the slot map; `take_ready`
//!   is the only path that transitions `Ready -> Leased`, and it both reads
//!   and mutates under one lock acquisition, so no two callers can claim the
//!   same slot.
//! - I3: every blocking call (`backend.create`, the readiness probe,
//!   `backend.destroy`) happens after the lock guard is dropped.
//! - I4: `take_ready` removes the slot from the map entirely once leased —
//!   nothing left behind for the replenisher or health checker to touch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cellrun_adapters::SandboxBackend;
use cellrun_core::{
    Clock, Event, Language, PoolConfig, PoolError, PoolStats, Provenance, SandboxHandle, SandboxId,
    SlotState,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};

struct Slot {
    handle: SandboxHandle,
    state: SlotState,
}

#[derive(Default)]
struct LangState {
    slots: HashMap<SandboxId, Slot>,
    /// Coalesces repeated exhaustion signals into one in-flight replenish
    /// (spec.md §4.2 "coalesces signals to avoid thundering-herd restarts").
    replenishing: bool,
}

impl LangState {
    fn stats(&self) -> PoolStats {
        let mut s = PoolStats::default();
        for slot in self.slots.values() {
            match slot.state {
                SlotState::Starting => s.starting += 1,
                SlotState::Ready => s.ready += 1,
                SlotState::Leased => s.leased += 1,
                SlotState::Unhealthy => s.unhealthy += 1,
            }
        }
        s
    }

    fn take_ready(&mut self) -> Option<SandboxHandle> {
        let id = self
            .slots
            .iter()
            .find(|(_, slot)| slot.state == SlotState::Ready)
            .map(|(id, _)| *id)?;
        self.slots.remove(&id).map(|slot| slot.handle)
    }
}

/// Maintains, per language, a bounded set of `Ready` sandboxes (spec.md
/// §4.2). Generic over the platform backend so Docker/Kubernetes/fake are
/// interchangeable (spec.md §4.3's `SandboxBackend` trait), and over the
/// clock so replenish/readiness timing is deterministic in tests.
///
/// Always held behind an `Arc`: `acquire` spawns a detached replenish task
/// on exhaustion, which needs its own owned handle back into the pool.
pub struct SandboxPool<B: SandboxBackend, C: Clock> {
    backend: Arc<B>,
    clock: C,
    config: PoolConfig,
    state: Mutex<HashMap<Language, LangState>>,
    signals: Mutex<HashMap<Language, Arc<Notify>>>,
    events: broadcast::Sender<Event>,
    shutting_down: AtomicBool,
    /// Dedicated client for the pool's own readiness/health probes — the
    /// `RemoteExecutor` (engine crate) uses a separate client tuned for the
    /// `/execute` call's different timeout profile.
    probe_client: reqwest::Client,
}

impl<B: SandboxBackend, C: Clock> SandboxPool<B, C> {
    pub fn new(backend: Arc<B>, clock: C, config: PoolConfig, events: broadcast::Sender<Event>) -> Self {
        Self {
            backend,
            clock,
            config,
            state: Mutex::new(HashMap::new()),
            signals: Mutex::new(HashMap::new()),
            events,
            shutting_down: AtomicBool::new(false),
            probe_client: reqwest::Client::new(),
        }
    }

    fn signal_for(&self, lang: Language) -> Arc<Notify> {
        self.signals.lock().entry(lang).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    /// Acquire a ready sandbox for `language`, waiting at most until
    /// `deadline` elapses (spec.md §4.2 `Acquire`).
    ///
    /// Takes an owned `Arc<Self>` (not `&self`) because an empty pool
    /// spawns a detached replenish task that needs its own handle back
    /// into the pool — call it as `Arc::clone(&pool).acquire(...)`.
    pub async fn acquire(
        self: Arc<Self>,
        language: Language,
        deadline: Duration,
    ) -> Result<SandboxHandle, PoolError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }
        if self.config.is_pool_disabled(language) {
            return Err(PoolError::Disabled);
        }

        let start = tokio::time::Instant::now();
        let signal = self.signal_for(language);

        loop {
            let (handle, should_replenish) = {
                let mut state = self.state.lock();
                let lang_state = state.entry(language).or_default();
                let handle = lang_state.take_ready();
                let triggers = handle.is_none() && self.config.exhaustion_trigger && !lang_state.replenishing;
                if triggers {
                    lang_state.replenishing = true;
                }
                (handle, triggers)
            };

            if let Some(handle) = handle {
                return Ok(handle);
            }

            if should_replenish {
                let _ = self.events.send(Event::PoolExhausted { language });
                let pool = Arc::clone(&self);
                tokio::spawn(async move { pool.replenish_once(language).await });
            }

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(PoolError::Timeout);
            }
            let remaining = deadline - elapsed;
            let _ = tokio::time::timeout(remaining, signal.notified()).await;
        }
    }

    /// Block until `language`'s pool reaches its target size or a bounded
    /// cap elapses; partial success is allowed and logged (spec.md §4.2
    /// `Warmup`, used at process start).
    pub async fn warmup(&self, language: Language) {
        if self.config.is_pool_disabled(language) {
            return;
        }
        let target = self.config.target_for(language);
        let cap = Duration::from_secs(self.config.startup_deadline_s.max(1) * 4);
        let deadline = tokio::time::Instant::now() + cap;

        loop {
            self.replenish_once(language).await;
            let ready = self.stats(language).ready;
            if ready >= target || tokio::time::Instant::now() >= deadline {
                if ready < target {
                    tracing::warn!(%language, ready, target, "warmup reached its cap with a partial pool");
                }
                return;
            }
        }
    }

    pub fn stats(&self, language: Language) -> PoolStats {
        self.state.lock().get(&language).map(LangState::stats).unwrap_or_default()
    }

    /// Destroy every pool sandbox and refuse further `acquire` calls
    /// (spec.md §4.2 `Shutdown`).
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let all: Vec<SandboxHandle> = {
            let mut state = self.state.lock();
            state.values_mut().flat_map(|l| l.slots.drain().map(|(_, s)| s.handle)).collect()
        };
        for handle in &all {
            self.backend.destroy(handle).await;
        }
    }

    /// One replenishment pass for `language` (spec.md §4.2 algorithm):
    /// compute the deficit, start up to `parallel_batch` creations
    /// concurrently outside the lock, probe readiness, and transition each
    /// slot to `Ready` or `Unhealthy`.
    pub async fn replenish_once(&self, language: Language) {
        let deficit = {
            let mut state = self.state.lock();
            let lang_state = state.entry(language).or_default();
            let stats = lang_state.stats();
            let target = self.config.target_for(language);
            target.saturating_sub(stats.ready + stats.starting)
        };

        if deficit == 0 {
            self.clear_replenishing(language);
            return;
        }

        let batch = deficit.min(self.config.parallel_batch.max(1));
        let created_ids = self.create_batch(language, batch).await;
        self.probe_and_settle(language, created_ids).await;
        self.clear_replenishing(language);
    }

    /// Ask the backend for up to `batch` new sandboxes, recording each as
    /// `Starting`. Creation failures are logged and simply shrink the
    /// batch — the next replenish pass will retry the remaining deficit.
    async fn create_batch(&self, language: Language, batch: usize) -> Vec<SandboxId> {
        let mut created = Vec::with_capacity(batch);
        for _ in 0..batch {
            let now_ms = self.clock.epoch_ms();
            match self.backend.create(language, Provenance::Pool, now_ms).await {
                Ok(handle) => {
                    let id = handle.id;
                    self.state
                        .lock()
                        .entry(language)
                        .or_default()
                        .slots
                        .insert(id, Slot { handle, state: SlotState::Starting });
                    created.push(id);
                }
                Err(e) => {
                    tracing::warn!(%language, error = %e, "sandbox creation failed during replenish");
                }
            }
        }
        created
    }

    /// Poll `/ready` on each newly created slot until `startup_deadline_s`
    /// elapses; settle each into `Ready` (kept) or `Unhealthy` (destroyed).
    async fn probe_and_settle(&self, language: Language, ids: Vec<SandboxId>) {
        if ids.is_empty() {
            return;
        }
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.startup_deadline_s.max(1));
        let mut ready_count = 0usize;

        for id in ids {
            let endpoint = {
                let state = self.state.lock();
                state.get(&language).and_then(|l| l.slots.get(&id)).map(|s| s.handle.agent_endpoint.clone())
            };
            let Some(endpoint) = endpoint else { continue };

            let became_ready = self.poll_ready(&endpoint, deadline).await;
            if became_ready {
                if let Some(lang_state) = self.state.lock().get_mut(&language) {
                    if let Some(slot) = lang_state.slots.get_mut(&id) {
                        slot.state = SlotState::Ready;
                    }
                }
                ready_count += 1;
            } else {
                if let Some(lang_state) = self.state.lock().get_mut(&language) {
                    if let Some(slot) = lang_state.slots.get_mut(&id) {
                        slot.state = SlotState::Unhealthy;
                    }
                }
                if let Some(handle) = self.remove_slot(language, id) {
                    self.backend.destroy(&handle).await;
                }
            }
        }

        if ready_count > 0 {
            let _ = self.events.send(Event::PoolReplenished { language, created: ready_count });
            self.signal_for(language).notify_waiters();
        }
    }

    fn clear_replenishing(&self, language: Language) {
        if let Some(lang_state) = self.state.lock().get_mut(&language) {
            lang_state.replenishing = false;
        }
    }

    fn remove_slot(&self, language: Language, id: SandboxId) -> Option<SandboxHandle> {
        self.state.lock().get_mut(&language)?.slots.remove(&id).map(|s| s.handle)
    }

    async fn poll_ready(&self, endpoint: &str, deadline: tokio::time::Instant) -> bool {
        let url = format!("{endpoint}/ready");
        loop {
            if let Ok(resp) = self.probe_client.get(&url).send().await {
                if resp.status().is_success() {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// One health-check pass (spec.md §4.2 "Health discipline"): probe
    /// every `Ready` slot; two consecutive failures move it to
    /// `Unhealthy -> destroy`. `failure_counts` is owned by the caller's
    /// background task across ticks.
    pub async fn health_check_once(
        &self,
        language: Language,
        failure_counts: &mut HashMap<SandboxId, u32>,
    ) {
        let ready_slots: Vec<(SandboxId, String)> = {
            let state = self.state.lock();
            state
                .get(&language)
                .map(|l| {
                    l.slots
                        .iter()
                        .filter(|(_, s)| s.state == SlotState::Ready)
                        .map(|(id, s)| (*id, s.handle.agent_endpoint.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (id, endpoint) in ready_slots {
            let healthy = self
                .probe_client
                .get(format!("{endpoint}/health"))
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false);

            if healthy {
                failure_counts.remove(&id);
                continue;
            }

            let count = failure_counts.entry(id).or_insert(0);
            *count += 1;
            if *count >= 2 {
                failure_counts.remove(&id);
                if let Some(lang_state) = self.state.lock().get_mut(&language) {
                    if let Some(slot) = lang_state.slots.get_mut(&id) {
                        slot.state = SlotState::Unhealthy;
                    }
                }
                if let Some(handle) = self.remove_slot(language, id) {
                    self.backend.destroy(&handle).await;
                }
            }
        }
    }

    /// Test-only: insert a slot directly in `Ready` state, bypassing
    /// creation and readiness probing entirely. `pub(crate)` so
    /// `orchestrator.rs`'s tests can seed a pool without driving a fake
    /// backend's full create/probe cycle.
    #[cfg(any(test, feature = "test-support"))]
    pub(crate) fn insert_ready(&self, language: Language, handle: SandboxHandle) {
        self.state
            .lock()
            .entry(language)
            .or_default()
            .slots
            .insert(handle.id, Slot { handle, state: SlotState::Ready });
        self.signal_for(language).notify_waiters();
    }
}
