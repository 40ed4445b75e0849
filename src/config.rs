//! Store configuration
//!
//! Where the backing store lives and how the connection is tuned.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::observability::Severity;

/// SQLite journal mode applied to file-backed stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

impl Default for JournalMode {
    fn default() -> Self {
        JournalMode::Wal
    }
}

/// Backing store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file (default: none, in-memory store)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Journal mode for file-backed stores (default: wal)
    #[serde(default)]
    pub journal_mode: JournalMode,

    /// How long a writer waits on a locked database (default: 5000)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Minimum severity written by the logger (default: WARN).
    ///
    /// The logger threshold is process-wide: only the first store opened
    /// in a process applies it. Use `Logger::set_min_severity` to change
    /// it later.
    #[serde(default)]
    pub log_level: Severity,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            journal_mode: JournalMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            log_level: Severity::default(),
        }
    }
}

impl StoreConfig {
    /// In-memory store, discarded when the handle drops
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed store at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }
}
