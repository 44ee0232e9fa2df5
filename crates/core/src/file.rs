// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary artifacts attached to a session (spec.md §3 "StoredFile").

use crate::ids::{FileId, SessionId};
use serde::{Deserialize, Serialize};

/// Metadata for one file stored under a session.
///
/// Invariants enforced by the storage layer at write time: `size <=
/// max_file_size_mib`; session aggregate size `<= max_total_file_size_mib`;
/// `name` contains no path-traversal bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub session_id: SessionId,
    pub file_id: FileId,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub created_at_ms: u64,
}

impl StoredFile {
    pub fn new(
        session_id: SessionId,
        name: impl Into<String>,
        size: u64,
        content_type: Option<String>,
        created_at_ms: u64,
    ) -> Self {
        Self { session_id, file_id: FileId::new(), name: name.into(), size, content_type, created_at_ms }
    }
}

/// Reject filenames containing path-traversal bytes (spec.md §3 invariant).
///
/// Rejects: any `..` path segment, a leading `/`, embedded NUL bytes, and
/// the empty string. Unicode names are otherwise accepted verbatim.
pub fn validate_filename(name: &str) -> Result<(), InvalidFilename> {
    if name.is_empty() {
        return Err(InvalidFilename::Empty);
    }
    if name.contains('\0') {
        return Err(InvalidFilename::NulByte);
    }
    if name.starts_with('/') {
        return Err(InvalidFilename::LeadingSlash);
    }
    if name.split('/').any(|segment| segment == "..") {
        return Err(InvalidFilename::Traversal);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFilename {
    #[error("filename is empty")]
    Empty,
    #[error("filename contains a NUL byte")]
    NulByte,
    #[error("filename starts with '/'")]
    LeadingSlash,
    #[error("filename contains a '..' path segment")]
    Traversal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_is_valid() {
        assert!(validate_filename("out.txt").is_ok());
    }

    #[test]
    fn unicode_name_is_valid() {
        assert!(validate_filename("résumé-café.txt").is_ok());
    }

    #[test]
    fn nested_relative_path_without_traversal_is_valid() {
        assert!(validate_filename("plots/fig1.png").is_ok());
    }

    #[test]
    fn dotdot_segment_is_rejected() {
        assert_eq!(validate_filename("../etc/passwd"), Err(InvalidFilename::Traversal));
        assert_eq!(validate_filename("a/../b"), Err(InvalidFilename::Traversal));
    }

    #[test]
    fn leading_slash_is_rejected() {
        assert_eq!(validate_filename("/etc/passwd"), Err(InvalidFilename::LeadingSlash));
    }

    #[test]
    fn nul_byte_is_rejected() {
        assert_eq!(validate_filename("a\0b"), Err(InvalidFilename::NulByte));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(validate_filename(""), Err(InvalidFilename::Empty));
    }
}
