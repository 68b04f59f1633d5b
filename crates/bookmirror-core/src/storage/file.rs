//! File-backed durable store
//!
//! Each key is stored as `<dir>/<key>.json`. Writes are atomic (write to a
//! temp file, then rename) so a crash never leaves a half-written value.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::DurableStore;

/// Durable store that keeps one file per key in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(Self { dir })
    }

    /// Directory holding the stored values
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl DurableStore for FileStore {
    fn save(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        debug!("Saving {} bytes to {:?}", value.len(), path);
        atomic_write(&path, value.as_bytes())
    }

    fn load(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| StoreError::from_read(e, path))
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io(e, path)),
        }
    }
}

/// Write data to a file atomically
///
/// Writes to a temporary file in the same directory, syncs it, then renames
/// it over the target path.
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StoreError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StoreError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StoreError::from_io(e, temp_path.clone()))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|source| StoreError::Replace {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
