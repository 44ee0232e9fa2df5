// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque interpreter state blobs (spec.md §3 "StateBlob", §4.5, §9).
//!
//! The core never deserializes this payload — it is produced and consumed
//! only by the in-sandbox agent. Enforced at the type level: [`StateBlob`]
//! wraps `bytes::Bytes` with no decode path exposed outside this crate.

use crate::ids::SessionId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which tier currently holds a session's state (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateTier {
    Hot,
    Cold,
}

/// Opaque serialized interpreter namespace for one session.
///
/// Invariants (spec.md §3): `len(bytes) <= state_max_size_mib`; `hash`
/// always matches `bytes` (computed at construction, never trusted from the
/// wire).
#[derive(Debug, Clone)]
pub struct StateBlob {
    pub session_id: SessionId,
    bytes: Bytes,
    hash: String,
    pub created_at_ms: u64,
    pub last_access_ms: u64,
    pub tier: StateTier,
}

impl StateBlob {
    pub fn new(session_id: SessionId, bytes: Bytes, now_ms: u64, tier: StateTier) -> Self {
        let hash = hash_hex(&bytes);
        Self { session_id, bytes, hash, created_at_ms: now_ms, last_access_ms: now_ms, tier }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Recompute and compare — used to validate a client-uploaded blob
    /// against its claimed hash (spec.md §4.5 `ClientUpload`).
    pub fn hash_matches(&self, claimed: &str) -> bool {
        self.hash == claimed
    }
}

pub fn hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Metadata-only view returned by `StateStore::info` and the `/state/{id}/info`
/// endpoint (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub exists: bool,
    pub size: u64,
    pub hash: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub tier: StateTier,
}
