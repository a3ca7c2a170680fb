use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

/// Durable store contents: user id to the last full folder list
pub type BackupMap = BTreeMap<String, Vec<String>>;

/// Errors reading or writing the backup file
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("failed to access backup file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persists each user's last full folder configuration
///
/// Every `keep` reads the complete file, replaces one entry and writes the
/// whole file back through a temp file and rename. Writers inside this
/// process are serialized; several processes sharing one file are not
/// supported.
pub struct FolderBackup {
    path: PathBuf,
    exempt: HashSet<String>,
    io_lock: Mutex<()>,
}

impl FolderBackup {
    pub fn new(path: impl Into<PathBuf>, exempt: HashSet<String>) -> Self {
        Self {
            path: path.into(),
            exempt,
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a folder stays visible while its user is locked
    pub fn is_exempt(&self, folder: &str) -> bool {
        self.exempt.contains(folder)
    }

    /// True when the set carries nothing worth restoring
    pub fn is_trivial(&self, folders: &[String]) -> bool {
        folders.iter().all(|f| self.is_exempt(f))
    }

    /// Store `folders` as the latest full set for `user_id`
    ///
    /// Returns `Ok(true)` when the file changed. Empty or all-exempt sets are
    /// ignored, as is a set equal to the stored one.
    pub fn keep(&self, user_id: &str, folders: &[String]) -> Result<bool, BackupError> {
        if self.is_trivial(folders) {
            return Ok(false);
        }

        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());

        // An unreadable file is replaced rather than blocking backups forever
        let mut store = self.read_store().unwrap_or_else(|e| {
            warn!("{}, starting a fresh backup", e);
            BackupMap::new()
        });

        if store.get(user_id).map(Vec::as_slice) == Some(folders) {
            debug!("Backup for user {} unchanged", user_id);
            return Ok(false);
        }

        store.insert(user_id.to_string(), folders.to_vec());
        self.write_store(&store)?;

        debug!("Backed up {} folders for user {}", folders.len(), user_id);
        Ok(true)
    }

    /// Last persisted full set for `user_id`, empty if none or unreadable
    pub fn restore(&self, user_id: &str) -> Vec<String> {
        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());

        match self.read_store() {
            Ok(mut store) => store.remove(user_id).unwrap_or_default(),
            Err(e) => {
                warn!("{}, nothing to restore for user {}", e, user_id);
                Vec::new()
            }
        }
    }

    /// Whole store, for status output
    pub fn load_all(&self) -> Result<BackupMap, BackupError> {
        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_store()
    }

    fn read_store(&self) -> Result<BackupMap, BackupError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BackupMap::new()),
            Err(source) => {
                return Err(BackupError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(BackupMap::new());
        }

        serde_json::from_str(&content).map_err(|source| BackupError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_store(&self, store: &BackupMap) -> Result<(), BackupError> {
        let content = serde_json::to_string_pretty(store).map_err(|source| {
            BackupError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        atomic_write(&self.path, content.as_bytes()).map_err(|source| BackupError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Write through a sibling temp file, then rename over the target
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)
}
