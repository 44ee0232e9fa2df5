// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identity: the opaque grouping of files and interpreter state
//! across calls (spec.md §3 "Session").

use crate::ids::SessionId;
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tenant + user pair a session is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub tenant: String,
    pub user: String,
}

impl Principal {
    pub fn new(tenant: impl Into<String>, user: impl Into<String>) -> Self {
        Self { tenant: tenant.into(), user: user.into() }
    }
}

/// Default session TTL (spec.md §3): 24 hours.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Session metadata as persisted by `SessionRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: SessionId,
    pub principal: Principal,
    pub created_at_ms: u64,
    pub last_access_ms: u64,
    pub language_hint: Option<Language>,
    pub ttl: Duration,
}

impl SessionMeta {
    pub fn new(id: SessionId, principal: Principal, now_ms: u64, ttl: Duration) -> Self {
        Self { id, principal, created_at_ms: now_ms, last_access_ms: now_ms, ttl }
    }

    /// Whether this session's TTL has elapsed as of `now_ms` (spec.md §8 P: Get
    /// of an expired id returns NotFound).
    pub fn is_expired(&self, now_ms: u64) -> bool {
        let ttl_ms = self.ttl.as_millis() as u64;
        now_ms.saturating_sub(self.last_access_ms) >= ttl_ms
    }

    /// Bump `last_access_ms`. Idempotent, side-effect-free besides the
    /// timestamp (spec.md §4.6 invariant).
    pub fn touch(&mut self, now_ms: u64) {
        self.last_access_ms = now_ms;
    }
}

impl SessionMeta {
    crate::setters! {
        option { language_hint: Language }
    }
}
