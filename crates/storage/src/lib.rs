// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cellrun-storage: the durable and semi-durable stores behind the
//! execution pipeline — tiered interpreter state (spec.md §4.5), session
//! identity (spec.md §4.6), and file artifacts (spec.md §3, §6).

pub mod files;
pub mod object_store;
pub mod sessions;
pub mod state_store;

pub use files::{FileStore, ObjectFileStore};
pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectStoreError, S3ObjectStore};
pub use sessions::{MokaSessionRegistry, SessionRegistry};
pub use state_store::{
    decode_base64url, encode_base64url, Archivable, StateStore, StateStoreError, TieredStateStore,
};
