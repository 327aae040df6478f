//! Per-item transfer worker.
//!
//! A worker takes one [`TransferTask`] end-to-end: download, spool, size
//! check, upload, checksum check, ledger record. Failures are classified at
//! this boundary and turned into [`TaskOutcome`]s; nothing here aborts the run
//! except a ledger flush failure, which is fatal by contract.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::ledger::{Ledger, LedgerEntry};
use crate::remote::{RemoteItem, RemoteStore};
use crate::utils::errors::{EngineError, TransferError};
use crate::validate;

/// One file scheduled for mirroring.
#[derive(Debug, Clone)]
pub struct TransferTask {
    /// The source file (kind is always FILE).
    pub item: RemoteItem,
    /// Id of the already-created mirror folder that should contain the copy.
    pub dest_folder_id: String,
    /// Attempts made so far, across passes.
    pub attempt: u32,
}

impl TransferTask {
    pub fn new(item: RemoteItem, dest_folder_id: String) -> Self {
        Self {
            item,
            dest_folder_id,
            attempt: 0,
        }
    }
}

/// Terminal result of processing one task within a pass.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded {
        bytes: u64,
        /// Whether a server checksum was available and matched. False only
        /// when the backend reports no checksum for this file.
        checksum_validated: bool,
    },
    /// The ledger already had an entry; nothing was transferred.
    Skipped,
    /// Transient failure after exhausting the pass's attempt ceiling.
    FailedRetryable(TransferError),
    /// Terminal failure; no further attempts in any pass.
    FailedTerminal(TransferError),
}

enum AttemptError {
    Transfer(TransferError),
    Fatal(EngineError),
}

impl From<TransferError> for AttemptError {
    fn from(err: TransferError) -> Self {
        AttemptError::Transfer(err)
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(err: std::io::Error) -> Self {
        AttemptError::Transfer(TransferError::Io(err))
    }
}

/// Executes single transfer tasks with local retry.
pub struct TransferWorker<S> {
    store: Arc<S>,
    ledger: Arc<Ledger>,
    spool_dir: PathBuf,
    backoff: Duration,
}

impl<S: RemoteStore> TransferWorker<S> {
    /// `spool_dir` must exist; the orchestrator creates it before dispatch.
    pub fn new(store: Arc<S>, ledger: Arc<Ledger>, spool_dir: PathBuf, backoff: Duration) -> Self {
        Self {
            store,
            ledger,
            spool_dir,
            backoff,
        }
    }

    /// Process one task with up to `ceiling` strictly sequential attempts.
    ///
    /// Transient failures back off exponentially between attempts; a terminal
    /// failure short-circuits immediately. Only a ledger persistence failure
    /// escapes as an error and aborts the run.
    pub async fn process(
        &self,
        task: &mut TransferTask,
        ceiling: u32,
    ) -> Result<TaskOutcome, EngineError> {
        // Workers consult the ledger themselves; the walker's pre-filtering
        // makes this rare, but a resumed retry pass can race a prior success.
        if self.ledger.has(&task.item.id) {
            debug!("Skipped (already backed up): {}", task.item.name);
            return Ok(TaskOutcome::Skipped);
        }

        let mut attempts_this_pass = 0u32;
        loop {
            attempts_this_pass += 1;
            task.attempt += 1;

            match self.attempt_once(&task.item, &task.dest_folder_id).await {
                Ok((bytes, checksum_validated)) => {
                    info!(
                        "Mirrored {} ({} bytes, attempt {})",
                        task.item.name, bytes, task.attempt
                    );
                    return Ok(TaskOutcome::Succeeded {
                        bytes,
                        checksum_validated,
                    });
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Transfer(err)) if !err.is_transient() => {
                    warn!("Terminal failure for {}: {}", task.item.name, err);
                    return Ok(TaskOutcome::FailedTerminal(err));
                }
                Err(AttemptError::Transfer(err)) => {
                    warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempts_this_pass, ceiling, task.item.name, err
                    );
                    if attempts_this_pass >= ceiling {
                        return Ok(TaskOutcome::FailedRetryable(err));
                    }
                    let delay = self.backoff * 2u32.saturating_pow(attempts_this_pass - 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// One full download→validate→upload→validate→record sequence.
    ///
    /// The spool file is a `NamedTempFile`, removed on every exit path when
    /// the guard drops, so temporary storage never leaks across attempts.
    async fn attempt_once(
        &self,
        item: &RemoteItem,
        dest_folder_id: &str,
    ) -> Result<(u64, bool), AttemptError> {
        let content = self.store.download(&item.id).await?;

        let spool = tempfile::Builder::new()
            .prefix("mirror-")
            .suffix(".part")
            .tempfile_in(&self.spool_dir)?;
        let spool_path = spool.path().to_path_buf();
        tokio::fs::write(&spool_path, &content).await?;

        let observed = tokio::fs::metadata(&spool_path).await?.len();
        if let Some(expected) = item.size {
            if !validate::size_matches(expected, observed) {
                return Err(TransferError::SizeMismatch { expected, observed }.into());
            }
        }

        let payload = Bytes::from(tokio::fs::read(&spool_path).await?);
        let receipt = self.store.upload(&item.name, dest_folder_id, payload).await?;

        let mut checksum_validated = false;
        if let (Some(expected), Some(reported)) = (&item.checksum, &receipt.checksum) {
            if !validate::checksum_matches(expected, reported) {
                // Discard the bad copy before the retry creates a fresh one.
                if let Err(e) = self.store.delete(&receipt.id).await {
                    warn!("Could not delete mismatched copy {}: {}", receipt.id, e);
                }
                return Err(TransferError::ChecksumMismatch {
                    expected: expected.clone(),
                    observed: reported.clone(),
                }
                .into());
            }
            checksum_validated = true;
        }

        let entry = LedgerEntry {
            dest_id: receipt.id,
            size: observed,
            checksum: item.checksum.clone(),
            completed_at: Utc::now(),
        };
        if self.ledger.record(&item.id, entry) {
            // Durability: the crash window must only ever cover in-flight items.
            self.ledger.flush().map_err(AttemptError::Fatal)?;
        }

        Ok((observed, checksum_validated))
    }
}
