// # File History Store
//
// File-based implementation of HistoryStore with crash recovery.
//
// ## File Format
//
// A pretty-printed JSON array, oldest entry first:
//
// ```json
// [
//   {
//     "ip": "203.0.113.5",
//     "timestamp": "2025-01-09T12:00:00Z",
//     "location": { "city": "Lisbon", "country": "Portugal" },
//     "dns_outcome": "success",
//     "platform": "Linux"
//   }
// ]
// ```
//
// ## Crash Recovery
//
// - Atomic writes: the new array goes to `<file>.tmp`, is synced, then
//   renamed over the file
// - Backup: the previous file is copied to `<file>.backup` before the rename
// - Corruption: a file that fails to parse is recovered from the backup; if
//   the backup is unusable too, loads and appends fail rather than
//   overwrite the history an operator may still want to repair by hand

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::lock::InstanceLock;
use crate::traits::history_store::{HistoryEntry, HistoryStore, enforce_order};

/// File-based history store
///
/// Opening the store takes the instance lock at `<file>.lock`; it is held
/// until the store is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use wanwatch_core::history::FileHistoryStore;
/// use wanwatch_core::traits::HistoryStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileHistoryStore::open("/var/lib/wanwatch/ip_history.json").await?;
///     println!("last IP: {:?}", store.last_ip().await?);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
    write_guard: Mutex<()>,
    lock: InstanceLock,
}

impl FileHistoryStore {
    /// Open the history file at `path`, creating parent directories
    ///
    /// The file itself is created by the first append.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyRunning`: another process has the store open
    /// - `Error::Persistence`: the directory could not be created
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let lock = InstanceLock::acquire(sibling(&path, "lock"))?;

        Ok(Self {
            path,
            write_guard: Mutex::new(()),
            lock,
        })
    }

    /// Path of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file held by this store
    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }

    fn backup_path(&self) -> PathBuf {
        sibling(&self.path, "backup")
    }

    /// Load entries, falling back to the backup when the file is corrupted
    async fn load_with_recovery(&self) -> Result<Vec<HistoryEntry>, Error> {
        let Some(text) = read_if_exists(&self.path).await? else {
            return Ok(Vec::new());
        };

        let parse_err = match parse(&text) {
            Ok(entries) => return Ok(entries),
            Err(e) => e,
        };

        tracing::warn!(
            "History file {} appears corrupted: {}. Attempting recovery from backup.",
            self.path.display(),
            parse_err
        );

        let backup_path = self.backup_path();
        let recovered = match read_if_exists(&backup_path).await? {
            Some(backup) => parse(&backup).map_err(|e| {
                Error::persistence(format!(
                    "History file {} is corrupted ({}) and backup {} is unusable ({})",
                    self.path.display(),
                    parse_err,
                    backup_path.display(),
                    e
                ))
            })?,
            None => {
                return Err(Error::persistence(format!(
                    "History file {} is corrupted ({}) and no backup exists",
                    self.path.display(),
                    parse_err
                )));
            }
        };

        tracing::info!(
            "Recovered {} history entries from {}",
            recovered.len(),
            backup_path.display()
        );

        if let Err(e) = fs::copy(&backup_path, &self.path).await {
            tracing::error!("Failed to restore history file from backup: {}", e);
        }

        Ok(recovered)
    }

    /// Replace the file with `entries` via temp file and rename
    async fn write_atomic(&self, entries: &[HistoryEntry]) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| Error::persistence(format!("Failed to serialize history: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, self.backup_path()).await
        {
            tracing::warn!("Failed to back up history file: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("History written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryEntry>, Error> {
        self.load_with_recovery().await
    }

    async fn append(&self, entry: HistoryEntry) -> Result<HistoryEntry, Error> {
        let _guard = self.write_guard.lock().await;

        let mut entries = self.load_with_recovery().await?;
        let entry = enforce_order(entries.last(), entry);
        entries.push(entry.clone());

        self.write_atomic(&entries).await?;
        Ok(entry)
    }
}

/// `<file>.<suffix>` next to `path`, keeping the original extension
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("ip_history.json"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

async fn read_if_exists(path: &Path) -> Result<Option<String>, Error> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn parse(text: &str) -> Result<Vec<HistoryEntry>, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
}
