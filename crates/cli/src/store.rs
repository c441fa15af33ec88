//! JSON file persistence for the in-memory store.
//!
//! The whole store is read at startup and written back after a command
//! that can change it. A missing file is an empty store.
//!
//! Every run holds an advisory `fs2` lock on a `<store>.lock` sibling from
//! before the read until after the write: exclusive for commands that
//! mutate, shared for the rest. Two processes changing the same store
//! therefore run one after the other, and the second one sees the first
//! one's commits. The lock lives on a separate file because the store
//! itself is replaced by rename on every save.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use assetflow_storage::{MemoryStorage, StorageError, StoreDump};

/// Used when neither `--store` nor `[store] path` is set.
pub(crate) const DEFAULT_STORE_FILE: &str = "assetflow-store.json";

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreFileError {
    #[error("failed to read store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to lock store {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("store {} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("store {} is opened read-only", path.display())]
    ReadOnly { path: PathBuf },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How a command intends to use the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// A store file held under its lock. Dropping it releases the lock.
#[derive(Debug)]
pub(crate) struct StoreFile {
    path: PathBuf,
    access: Access,
    _lock: File,
}

/// `store.json` -> `store.json.lock`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl StoreFile {
    /// Open the lock file next to `path` and block until the lock is held.
    pub(crate) fn open(path: &Path, access: Access) -> Result<Self, StoreFileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreFileError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let lock_path = sibling(path, ".lock");
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| StoreFileError::Lock {
                path: lock_path.clone(),
                source,
            })?;
        let locked = match access {
            Access::Write => lock.lock_exclusive(),
            Access::Read => lock.lock_shared(),
        };
        locked.map_err(|source| StoreFileError::Lock {
            path: lock_path,
            source,
        })?;
        Ok(StoreFile {
            path: path.to_path_buf(),
            access,
            _lock: lock,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn load(&self) -> Result<MemoryStorage, StoreFileError> {
        if !self.path.exists() {
            return Ok(MemoryStorage::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| StoreFileError::Read {
            path: self.path.clone(),
            source,
        })?;
        let dump: StoreDump = serde_json::from_str(&content).map_err(|source| StoreFileError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(MemoryStorage::from_dump(dump))
    }

    pub(crate) fn save(&self, storage: &MemoryStorage) -> Result<(), StoreFileError> {
        if self.access != Access::Write {
            return Err(StoreFileError::ReadOnly {
                path: self.path.clone(),
            });
        }
        let dump = storage.dump()?;
        let content = serde_json::to_string_pretty(&dump).map_err(|source| StoreFileError::Json {
            path: self.path.clone(),
            source,
        })?;
        // write-then-rename so an interrupted save leaves the old store intact
        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, content).map_err(|source| StoreFileError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreFileError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
