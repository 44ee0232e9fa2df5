// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque identifiers used throughout the execution pipeline.

crate::define_id! {
    /// Opaque session identifier. ≥16 bytes of entropy, URL-safe.
    pub struct SessionId("sess-");
}

crate::define_id! {
    /// Identifier for a file stored under a session.
    pub struct FileId("file-");
}

crate::define_id! {
    /// Identifier for a live sandbox instance.
    pub struct SandboxId("sbx-");
}
