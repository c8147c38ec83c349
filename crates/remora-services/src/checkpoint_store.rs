//! Checkpoint store.
//!
//! Long-running commands may save intermediate state under their own result
//! id. Checkpoints are opaque blobs kept as one file per id:
//!   {root}/{result_id}
//!
//! Result ids are restricted to `[A-Za-z0-9_-]`, so an id is always a plain
//! file name. Unlike results, checkpoints may be overwritten; the latest save
//! wins. The engine deletes an id's checkpoint once its result is stored.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use bytes::Bytes;
use remora_core::ResultId;

#[derive(Debug, thiserror::Error)]
#[error("failed to {action} {path}: {source}")]
pub struct CheckpointError {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
}

impl CheckpointError {
    fn new(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Directory of checkpoint blobs.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CheckpointError::new("create", &root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn has(&self, id: &ResultId) -> bool {
        self.path(id).exists()
    }

    /// Latest checkpoint for `id`, if any.
    pub fn get(&self, id: &ResultId) -> Result<Option<Bytes>, CheckpointError> {
        let path = self.path(id);
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::new("read", path, e)),
        }
    }

    /// Store a checkpoint, replacing any previous one.
    ///
    /// Writes are atomic: write to temp file, sync, then rename. Readers see
    /// either the old blob or the new one, never a partial write.
    pub fn save(&self, id: &ResultId, data: &[u8]) -> Result<(), CheckpointError> {
        let path = self.path(id);
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .map_err(|e| CheckpointError::new("create", &tmp_path, e))?;
            file.write_all(data)
                .map_err(|e| CheckpointError::new("write", &tmp_path, e))?;
            file.sync_all()
                .map_err(|e| CheckpointError::new("sync", &tmp_path, e))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| CheckpointError::new("rename", &tmp_path, e))?;

        tracing::trace!(id = id.short(), bytes = data.len(), "checkpoint saved");
        Ok(())
    }

    /// Remove the checkpoint for `id`. Returns false if there was none.
    pub fn delete(&self, id: &ResultId) -> Result<bool, CheckpointError> {
        let path = self.path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CheckpointError::new("delete", path, e)),
        }
    }

    fn path(&self, id: &ResultId) -> PathBuf {
        self.root.join(id.as_str())
    }
}
