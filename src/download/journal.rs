//! Per-directory resume journal.
//!
//! Each page directory carries a small JSON file recording, per destination
//! file, the source URL, the confirmed remote total and how many bytes were
//! confirmed on disk. A later process uses it to skip complete files without a
//! request and to trust a partial file's offset. The journal is advisory: a
//! missing or unreadable journal only costs a round-trip, and write failures
//! are logged and otherwise ignored.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::constants::JOURNAL_FILE_NAME;

const JOURNAL_VERSION: u32 = 1;

/// State of one destination file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Source URL.
    pub url: String,
    /// Destination file name inside the journal's directory.
    pub destination: String,
    /// Remote total, once a response confirmed it.
    pub expected_total: Option<u64>,
    /// Bytes confirmed on disk at the last transition.
    pub confirmed_bytes: u64,
    /// Whether the file completed and passed verification.
    pub completed: bool,
}

/// The journal of one directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    version: u32,
    entries: BTreeMap<String, JournalEntry>,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Journal {
    /// Path of the journal file for `directory`.
    #[must_use]
    pub fn path_for(directory: &Path) -> PathBuf {
        directory.join(JOURNAL_FILE_NAME)
    }

    /// Loads the journal of `directory`; absent or corrupt journals load empty.
    pub async fn load(directory: &Path) -> Self {
        let path = Self::path_for(directory);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "cannot read journal, ignoring it");
                return Self::default();
            }
        };
        match serde_json::from_slice::<Self>(&raw) {
            Ok(journal) if journal.version == JOURNAL_VERSION => journal,
            Ok(journal) => {
                warn!(path = %path.display(), version = journal.version, "unknown journal version, ignoring it");
                Self::default()
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "corrupt journal, ignoring it");
                Self::default()
            }
        }
    }

    /// Writes the journal into `directory` through a temporary file and rename.
    ///
    /// # Errors
    ///
    /// Returns the IO error of the write or rename.
    pub async fn save(&self, directory: &Path) -> std::io::Result<()> {
        let path = Self::path_for(directory);
        let temp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &path).await
    }

    /// Entry for a destination file name.
    #[must_use]
    pub fn entry(&self, file_name: &str) -> Option<&JournalEntry> {
        self.entries.get(file_name)
    }

    /// Total of a completed transfer of `url` into `file_name`.
    ///
    /// Totals of unfinished entries come from responses that never passed the
    /// size check and are not returned.
    #[must_use]
    pub fn confirmed_total(&self, file_name: &str, url: &str) -> Option<u64> {
        self.entry(file_name)
            .filter(|entry| entry.url == url && entry.completed)
            .and_then(|entry| entry.expected_total)
    }

    /// Inserts or replaces an entry.
    pub fn upsert(&mut self, entry: JournalEntry) {
        self.entries.insert(entry.destination.clone(), entry);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write-through cache of the journals touched by a run.
#[derive(Debug)]
pub struct JournalStore {
    enabled: bool,
    journals: Mutex<HashMap<PathBuf, Journal>>,
}

impl JournalStore {
    /// Creates a store; a disabled store records nothing.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            journals: Mutex::new(HashMap::new()),
        }
    }

    /// Records the state of the file at `destination` and persists its journal.
    pub async fn record(
        &self,
        destination: &Path,
        url: &str,
        expected_total: Option<u64>,
        confirmed_bytes: u64,
        completed: bool,
    ) {
        if !self.enabled {
            return;
        }
        let (Some(directory), Some(file_name)) = (destination.parent(), destination.file_name())
        else {
            return;
        };

        let mut journals = self.journals.lock().await;
        if !journals.contains_key(directory) {
            let loaded = Journal::load(directory).await;
            journals.insert(directory.to_path_buf(), loaded);
        }
        let Some(journal) = journals.get_mut(directory) else {
            return;
        };

        journal.upsert(JournalEntry {
            url: url.to_string(),
            destination: file_name.to_string_lossy().into_owned(),
            expected_total,
            confirmed_bytes,
            completed,
        });

        match journal.save(directory).await {
            Ok(()) => debug!(path = %destination.display(), confirmed_bytes, completed, "journal updated"),
            Err(error) => warn!(
                directory = %directory.display(),
                error = %error,
                "cannot write journal, resume state not recorded"
            ),
        }
    }
}
