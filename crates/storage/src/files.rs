// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File storage for `StoredFile` artifacts (spec.md §3, §6).
//!
//! Binary content lives in the shared [`ObjectStore`] under
//! `files/{session}/{file_id}`; metadata lives in an in-process `moka`
//! cache keyed the same way the hot state tier is, consistent with
//! spec.md §6's "Persisted layout".

use crate::object_store::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use cellrun_core::{
    validate_filename, FileId, FileStoreError, FilesConfig, SessionId, StoredFile,
};
use std::sync::Arc;

fn object_key(session_id: SessionId, file_id: FileId) -> String {
    format!("files/{session_id}/{file_id}")
}

#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    async fn upload(
        &self,
        session_id: SessionId,
        name: &str,
        content_type: Option<String>,
        bytes: Bytes,
        now_ms: u64,
    ) -> Result<StoredFile, FileStoreError>;

    async fn download(
        &self,
        session_id: SessionId,
        file_id: FileId,
    ) -> Result<Bytes, FileStoreError>;

    async fn list(&self, session_id: SessionId) -> Vec<StoredFile>;

    async fn delete(&self, session_id: SessionId, file_id: FileId) -> Result<(), FileStoreError>;

    async fn delete_session(&self, session_id: SessionId);
}

pub struct ObjectFileStore<O: ObjectStore> {
    object_store: Arc<O>,
    /// session_id -> (file_id -> metadata), guarded by one lock; entries
    /// are small so holding the lock across a HashMap mutation is fine —
    /// the expensive part (object store I/O) always happens outside it.
    index: parking_lot::Mutex<std::collections::HashMap<SessionId, Vec<StoredFile>>>,
    config: FilesConfig,
}

impl<O: ObjectStore> ObjectFileStore<O> {
    pub fn new(object_store: Arc<O>, config: FilesConfig) -> Self {
        Self { object_store, index: parking_lot::Mutex::new(Default::default()), config }
    }

    fn session_total(&self, session_id: SessionId) -> u64 {
        self.index
            .lock()
            .get(&session_id)
            .map(|files| files.iter().map(|f| f.size).sum())
            .unwrap_or(0)
    }

    fn session_count(&self, session_id: SessionId) -> usize {
        self.index.lock().get(&session_id).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl<O: ObjectStore> FileStore for ObjectFileStore<O> {
    async fn upload(
        &self,
        session_id: SessionId,
        name: &str,
        content_type: Option<String>,
        bytes: Bytes,
        now_ms: u64,
    ) -> Result<StoredFile, FileStoreError> {
        validate_filename(name)?;

        let size = bytes.len() as u64;
        let per_file_limit = self.config.max_file_size_mib * 1024 * 1024;
        if size > per_file_limit {
            return Err(FileStoreError::TooLarge { size, limit: per_file_limit });
        }

        let total_limit = self.config.max_total_file_size_mib * 1024 * 1024;
        let projected = self.session_total(session_id) + size;
        if projected > total_limit {
            return Err(FileStoreError::SessionQuotaExceeded { size: projected, limit: total_limit });
        }

        if self.session_count(session_id) >= self.config.max_files_per_session {
            return Err(FileStoreError::TooManyFiles(self.config.max_files_per_session));
        }

        let file = StoredFile::new(session_id, name, size, content_type, now_ms);
        self.object_store
            .put(&object_key(session_id, file.file_id), bytes)
            .await
            .map_err(|e| FileStoreError::Store(e.to_string()))?;

        self.index.lock().entry(session_id).or_default().push(file.clone());
        Ok(file)
    }

    async fn download(
        &self,
        session_id: SessionId,
        file_id: FileId,
    ) -> Result<Bytes, FileStoreError> {
        self.object_store
            .get(&object_key(session_id, file_id))
            .await
            .map_err(|e| FileStoreError::Store(e.to_string()))?
            .ok_or(FileStoreError::NotFound)
    }

    async fn list(&self, session_id: SessionId) -> Vec<StoredFile> {
        self.index.lock().get(&session_id).cloned().unwrap_or_default()
    }

    async fn delete(&self, session_id: SessionId, file_id: FileId) -> Result<(), FileStoreError> {
        self.object_store
            .delete(&object_key(session_id, file_id))
            .await
            .map_err(|e| FileStoreError::Store(e.to_string()))?;
        let mut index = self.index.lock();
        if let Some(files) = index.get_mut(&session_id) {
            files.retain(|f| f.file_id != file_id);
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: SessionId) {
        let files = self.index.lock().remove(&session_id).unwrap_or_default();
        for file in files {
            let _ = self.object_store.delete(&object_key(session_id, file.file_id)).await;
        }
    }
}
