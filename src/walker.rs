//! Source tree enumeration and destination folder mirroring.
//!
//! The walker produces the flat task list for the orchestrator. Folder
//! structure is mirrored eagerly, before any file beneath it is scheduled, so
//! every task's destination folder exists by the time an upload is attempted.
//! An empty mirrored subfolder is an acceptable terminal state when all of its
//! files later fail.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ledger::Ledger;
use crate::remote::{RemoteItem, RemoteStore};
use crate::transfer::TransferTask;
use crate::utils::errors::{EngineError, TransferError};

/// Attempts for each enumeration/folder-creation call before the walk aborts.
const WALK_ATTEMPTS: u32 = 3;

/// Everything the walk produced.
#[derive(Debug)]
pub struct WalkOutcome {
    pub tasks: Vec<TransferTask>,
    /// Destination folders ensured (created or resolved), excluding the mirror root.
    pub folders: usize,
    /// Files skipped because the ledger already holds a valid entry.
    pub files_skipped: usize,
    /// All files discovered, scheduled or not.
    pub files_total: usize,
}

/// Breadth-first enumerator over the source tree.
pub struct TreeWalker<S> {
    store: Arc<S>,
    ledger: Arc<Ledger>,
    backoff: Duration,
}

impl<S: RemoteStore> TreeWalker<S> {
    pub fn new(store: Arc<S>, ledger: Arc<Ledger>, backoff: Duration) -> Self {
        Self {
            store,
            ledger,
            backoff,
        }
    }

    /// Walk the source tree rooted at `source_id`, mirroring folders under
    /// `dest_root_id` and returning one task per file not yet in the ledger.
    pub async fn walk(&self, source_id: &str, dest_root_id: &str) -> Result<WalkOutcome, EngineError> {
        let mut outcome = WalkOutcome {
            tasks: Vec::new(),
            folders: 0,
            files_skipped: 0,
            files_total: 0,
        };

        let mut queue: VecDeque<(String, String)> =
            VecDeque::from([(source_id.to_string(), dest_root_id.to_string())]);

        while let Some((src_folder, dest_folder)) = queue.pop_front() {
            let children = self.list_with_retry(&src_folder).await?;
            debug!(
                "Walk: {} children under source folder {}",
                children.len(),
                src_folder
            );

            // Existing destination folders, resolved lazily only when this
            // level actually contains folders (prior partial runs).
            let mut existing: Option<HashMap<String, String>> = None;

            for child in children {
                if child.is_folder() {
                    let dest_child = self
                        .ensure_folder_cached(&child.name, &dest_folder, &mut existing)
                        .await?;
                    outcome.folders += 1;
                    queue.push_back((child.id, dest_child));
                } else {
                    outcome.files_total += 1;
                    if self.ledger.has(&child.id) {
                        debug!("Skipping already backed up file: {}", child.name);
                        outcome.files_skipped += 1;
                    } else {
                        outcome.tasks.push(TransferTask::new(child, dest_folder.clone()));
                    }
                }
            }
        }

        info!(
            "Walk complete: {} folders, {} files ({} to transfer, {} already backed up)",
            outcome.folders,
            outcome.files_total,
            outcome.tasks.len(),
            outcome.files_skipped
        );
        Ok(outcome)
    }

    /// Resolve a destination folder named `name` under `parent_id`, creating
    /// it when absent. Used for the mirror root itself.
    pub async fn ensure_folder(&self, name: &str, parent_id: &str) -> Result<String, EngineError> {
        let mut cache = None;
        self.ensure_folder_cached(name, parent_id, &mut cache).await
    }

    async fn ensure_folder_cached(
        &self,
        name: &str,
        parent_id: &str,
        existing: &mut Option<HashMap<String, String>>,
    ) -> Result<String, EngineError> {
        if existing.is_none() {
            let children = self.list_with_retry(parent_id).await?;
            *existing = Some(
                children
                    .into_iter()
                    .filter(RemoteItem::is_folder)
                    .map(|item| (item.name, item.id))
                    .collect(),
            );
        }

        let map = existing.get_or_insert_with(HashMap::new);
        if let Some(id) = map.get(name) {
            debug!("Resolved existing destination folder: {}", name);
            return Ok(id.clone());
        }

        let id = self.create_with_retry(name, parent_id).await?;
        info!("Created destination folder: {}", name);
        map.insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn list_with_retry(&self, folder_id: &str) -> Result<Vec<RemoteItem>, EngineError> {
        self.with_retry("list", folder_id, || self.store.list_children(folder_id))
            .await
    }

    async fn create_with_retry(&self, name: &str, parent_id: &str) -> Result<String, EngineError> {
        self.with_retry("create folder", name, || {
            self.store.create_folder(name, parent_id)
        })
        .await
    }

    /// Walk-phase operations get the same transient-retry treatment as
    /// transfers, but exhausting the attempts aborts the run: without a
    /// complete enumeration no task list can be trusted.
    async fn with_retry<T, F, Fut>(
        &self,
        what: &str,
        subject: &str,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TransferError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() || attempt >= WALK_ATTEMPTS => {
                    return Err(EngineError::Walk(format!(
                        "{} failed for {}: {}",
                        what, subject, err
                    )));
                }
                Err(err) => {
                    warn!(
                        "{} attempt {}/{} failed for {}: {}",
                        what, attempt, WALK_ATTEMPTS, subject, err
                    );
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
