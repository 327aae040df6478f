//! Persistent progress ledger.
//!
//! The ledger is the single source of truth for "is this file already backed
//! up". An entry exists for a source id iff that file has been downloaded,
//! re-uploaded, and validated in some past or current run. The persisted
//! document has exactly two top-level fields (`backed_up_files`, `last_run`)
//! and is replaced atomically on every flush so an interrupted run can never
//! leave a corrupt or partial log behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::errors::EngineError;

/// Record of one completed mirror, keyed by the source item id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Id of the created copy at the destination.
    pub dest_id: String,
    /// Byte length observed at successful validation time.
    pub size: u64,
    /// Source checksum confirmed at validation time, when the backend provides one.
    pub checksum: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// The persisted document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BackupLog {
    pub backed_up_files: HashMap<String, LedgerEntry>,
    pub last_run: Option<DateTime<Utc>>,
}

/// In-memory view of the backup log plus its on-disk location.
///
/// `has` is query-only; `record` performs the check-then-insert as a single
/// atomic step under the internal mutex, so two workers can never both claim
/// completion of the same item.
pub struct Ledger {
    path: PathBuf,
    state: Mutex<BackupLog>,
}

impl Ledger {
    /// Load the ledger from `path`.
    ///
    /// A missing file yields a fresh empty log. An unreadable or corrupt file
    /// is a fatal configuration error for the run: silently discarding history
    /// would cause a full-cost re-transfer, so recovery is left to the explicit
    /// [`Ledger::reset`] administrative action.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let log = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                EngineError::Ledger(format!("cannot read {}: {}", path.display(), e))
            })?;
            let log: BackupLog = serde_json::from_str(&raw).map_err(|e| {
                EngineError::Ledger(format!("corrupt log {}: {}", path.display(), e))
            })?;
            info!(
                "Loaded ledger: {} entries, last run: {:?}",
                log.backed_up_files.len(),
                log.last_run
            );
            log
        } else {
            debug!("No ledger at {}, starting fresh", path.display());
            BackupLog::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(log),
        })
    }

    /// Whether `item_id` already has a completed entry. Side-effect-free.
    pub fn has(&self, item_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.backed_up_files.contains_key(item_id)
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.backed_up_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert an entry for `item_id` unless one already exists.
    ///
    /// Returns `true` if the entry was newly inserted. Check and insert happen
    /// under one lock acquisition.
    pub fn record(&self, item_id: &str, entry: LedgerEntry) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.backed_up_files.contains_key(item_id) {
            return false;
        }
        state.backed_up_files.insert(item_id.to_string(), entry);
        true
    }

    /// Entry for `item_id`, if present.
    pub fn get(&self, item_id: &str) -> Option<LedgerEntry> {
        let state = self.state.lock().unwrap();
        state.backed_up_files.get(item_id).cloned()
    }

    /// Persist the current state, replacing the log file atomically.
    ///
    /// The document is written to a temporary file in the same directory and
    /// renamed over the target, so every observable file content is a complete
    /// valid document.
    pub fn flush(&self) -> Result<(), EngineError> {
        let state = self.state.lock().unwrap();
        self.write_document(&state)
    }

    /// Stamp `last_run` with the current time and persist. Called once at run end.
    pub fn finalize(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.last_run = Some(Utc::now());
        self.write_document(&state)
    }

    /// Explicit administrative reset: overwrite the document with
    /// `{backed_up_files: {}, last_run: null}`. Never invoked on error paths.
    pub fn reset(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        *state = BackupLog::default();
        info!("Ledger reset: {}", self.path.display());
        self.write_document(&state)
    }

    fn write_document(&self, state: &BackupLog) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| EngineError::Ledger(format!("serialize failed: {}", e)))?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))
            .map_err(|e| EngineError::Ledger(format!("temp file failed: {}", e)))?;

        use std::io::Write;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| EngineError::Ledger(format!("write failed: {}", e)))?;

        tmp.persist(&self.path)
            .map_err(|e| EngineError::Ledger(format!("replace failed: {}", e)))?;

        debug!("Flushed ledger ({} entries)", state.backed_up_files.len());
        Ok(())
    }
}
