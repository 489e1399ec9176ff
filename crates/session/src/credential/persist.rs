// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value storage for the session credential.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::SessionError;

/// Storage key holding the serialized credential.
pub const CREDENTIAL_KEY: &str = "jwt";

/// Synchronous string key/value storage that survives process restarts.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// One JSON file per key inside a state directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::Storage(format!("read {key}: {e}"))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)
                .map_err(|e| SessionError::Storage(format!("create state dir: {e}")))?;
        }
        save_atomic(&self.path_for(key), value)
            .map_err(|e| SessionError::Storage(format!("write {key}: {e}")))
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!("remove {key}: {e}"))),
        }
    }
}

/// Write a file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
fn save_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

/// In-process storage. Clones share the same map, so a clone handed to a new
/// store behaves like storage that outlived a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
