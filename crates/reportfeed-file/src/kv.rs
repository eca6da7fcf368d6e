//! Durable key-value storage in a single JSON file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, warn};

use reportfeed_core::error::{Error, StoreError};
use reportfeed_core::{LocalStorage, Result};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

type Entries = BTreeMap<String, String>;

/// [`LocalStorage`] kept in one JSON object file.
///
/// The file may hold a session token and remembered credentials, so it is
/// created readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileKeyValue {
    path: PathBuf,
}

impl FileKeyValue {
    /// Use the file at `path`. It is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.path.with_extension("lock"))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn read(&self) -> Result<Entries> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt key-value file");
                Ok(Entries::new())
            }
        }
    }

    fn write(&self, entries: &Entries) -> Result<()> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| {
            Error::Store(StoreError::Malformed {
                message: e.to_string(),
            })
        })?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&temp_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&temp_path, perms)?;
        }

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut Entries)) -> Result<()> {
        let lock = self.lock()?;
        let mut entries = self.read()?;
        f(&mut entries);
        let result = self.write(&entries);
        lock.unlock()?;
        result
    }
}

#[async_trait]
impl LocalStorage for FileKeyValue {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!(key, "Storing value");
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        debug!(key, "Removing value");
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}
