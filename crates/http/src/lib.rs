// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cellrun-http: the public axum surface over the execution pipeline
//! (spec.md §6). Replaces a length-prefixed binary IPC protocol with a
//! real public surface — see SPEC_FULL.md REDESIGN FLAGS — but keeps the
//! same shared listener-context shape: one struct of cloneable handles
//! threaded into every handler, background work kept entirely off the
//! request path.

mod dto;
mod error;
mod routes;

pub use dto::*;
pub use error::ApiError;
pub use routes::{router, AppState};
