// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observability events published onto the core's broadcast bus
//! (spec.md §5, §7 — "the event bus's `ExecutionCompleted` payload").
//!
//! REDESIGN FLAGS: a full event-sourcing WAL (replay-from-log
//! materialized state) is not reproduced here — this spec's state is either
//! short-lived (sandboxes, pool slots) or already durable in a dedicated
//! store. Only the broadcast idiom survives, for observability.

use crate::ids::SessionId;
use crate::language::Language;
use crate::sandbox::Provenance;

/// One fact about the pipeline, published by the component that observed it.
///
/// `ExecutionCompleted` events for a given session are observed in the
/// order the server completed them — a single publisher
/// (`tokio::sync::broadcast`), never fanned out from multiple places.
#[derive(Debug, Clone)]
pub enum Event {
    ExecutionCompleted {
        session_id: SessionId,
        language: Language,
        provenance: Provenance,
        exit_code: i32,
        duration_ms: u64,
        error_kind: Option<&'static str>,
    },
    PoolExhausted {
        language: Language,
    },
    PoolReplenished {
        language: Language,
        created: usize,
    },
    StateHotHit {
        session_id: SessionId,
    },
    StateColdPromoted {
        session_id: SessionId,
    },
    SessionCreated {
        session_id: SessionId,
    },
    SessionExpired {
        session_id: SessionId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_completed_is_cloneable() {
        let e = Event::ExecutionCompleted {
            session_id: SessionId::new(),
            language: Language::Py,
            provenance: Provenance::Pool,
            exit_code: 0,
            duration_ms: 12,
            error_kind: None,
        };
        let cloned = e.clone();
        match cloned {
            Event::ExecutionCompleted { exit_code, .. } => assert_eq!(exit_code, 0),
            _ => unreachable!(),
        }
    }
}
