//! Transfer orchestration.
//!
//! Owns the bounded worker pool and drives a run through its phases:
//! WALK → TRANSFER_PASS_1 → TRANSFER_PASS_2 → VERIFY → REPORT. Per-task
//! failures never abort the run; they become report entries. Only ledger
//! persistence failures and catastrophic configuration errors do.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::ledger::Ledger;
use crate::remote::{ItemKind, RemoteStore};
use crate::report::{FailedFile, ReportBuilder, RunReport};
use crate::transfer::{TaskOutcome, TransferTask, TransferWorker};
use crate::utils::errors::{EngineError, TransferError};
use crate::walker::TreeWalker;

/// Attempt ceiling for the initial pass.
const PASS_ONE_ATTEMPTS: u32 = 3;
/// Additional attempts granted in the retry pass.
const PASS_TWO_ATTEMPTS: u32 = 2;

/// Lifecycle of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InProgress,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

/// Global phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Walk,
    TransferPassOne,
    TransferPassTwo,
    Verify,
    Report,
}

/// Terminal state a pass assigned to a task.
fn task_state(outcome: &TaskOutcome) -> TaskState {
    match outcome {
        // A skipped task is complete from the run's point of view.
        TaskOutcome::Succeeded { .. } | TaskOutcome::Skipped => TaskState::Succeeded,
        TaskOutcome::FailedRetryable(_) => TaskState::FailedRetryable,
        TaskOutcome::FailedTerminal(_) => TaskState::FailedTerminal,
    }
}

/// Orchestrator-owned run counters, passed to every worker invocation.
/// No ambient globals; everything a worker reports flows through here.
#[derive(Default)]
struct RunContext {
    transferred: AtomicUsize,
    validated: AtomicUsize,
    skipped: AtomicUsize,
    bytes: AtomicU64,
}

/// Result of one transfer pass.
struct PassOutcome {
    /// Tasks eligible for the next pass, with the error that sent them there.
    retryable: Vec<(TransferTask, TransferError)>,
    /// Tasks that failed terminally within this pass.
    failed: Vec<FailedFile>,
}

/// The mirror engine: one instance per run configuration.
pub struct MirrorEngine<S> {
    store: Arc<S>,
    ledger: Arc<Ledger>,
    config: RunConfig,
    workers: usize,
}

impl<S: RemoteStore> MirrorEngine<S> {
    /// Validate configuration and load the ledger. A corrupt ledger fails
    /// here, before any remote call is made.
    pub fn new(store: Arc<S>, config: RunConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let ledger = Arc::new(Ledger::load(&config.ledger_path)?);
        let workers = config.resolved_workers();
        Ok(Self {
            store,
            ledger,
            config,
            workers,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Execute one full mirror run.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        info!(
            "Starting mirror run: source {} -> parent {} ({} workers)",
            self.config.source_folder_id, self.config.dest_parent_id, self.workers
        );

        // WALK
        info!("Phase: {:?}", RunPhase::Walk);
        let source = self
            .store
            .metadata(&self.config.source_folder_id)
            .await
            .map_err(|e| EngineError::Source(format!("cannot resolve source folder: {}", e)))?;
        if source.kind != ItemKind::Folder {
            return Err(EngineError::Source(format!(
                "source {} is not a folder",
                source.id
            )));
        }

        let backoff = std::time::Duration::from_millis(self.config.retry_backoff_ms);
        let walker = TreeWalker::new(Arc::clone(&self.store), Arc::clone(&self.ledger), backoff);

        let mirror_root_name = format!("{}{}", source.name, self.config.folder_suffix);
        let dest_root = walker
            .ensure_folder(&mirror_root_name, &self.config.dest_parent_id)
            .await?;
        let walk = walker.walk(&source.id, &dest_root).await?;

        let spool_dir = self.prepare_spool_dir()?;
        let ctx = Arc::new(RunContext::default());
        let worker = Arc::new(TransferWorker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.ledger),
            spool_dir,
            backoff,
        ));

        // TRANSFER_PASS_1
        info!(
            "Phase: {:?} ({} tasks)",
            RunPhase::TransferPassOne,
            walk.tasks.len()
        );
        let pass_one = self
            .run_pass(walk.tasks, PASS_ONE_ATTEMPTS, &worker, &ctx)
            .await?;
        let mut failed = pass_one.failed;

        // TRANSFER_PASS_2: one more bounded sweep over retryable failures.
        info!(
            "Phase: {:?} ({} tasks)",
            RunPhase::TransferPassTwo,
            pass_one.retryable.len()
        );
        let retry_tasks: Vec<TransferTask> =
            pass_one.retryable.into_iter().map(|(task, _)| task).collect();
        let pass_two = self
            .run_pass(retry_tasks, PASS_TWO_ATTEMPTS, &worker, &ctx)
            .await?;
        failed.extend(pass_two.failed);

        // Whatever is still retryable after pass 2 is terminally failed.
        for (task, err) in pass_two.retryable {
            warn!(
                "Giving up on {} after {} attempts: {}",
                task.item.name, task.attempt, err
            );
            failed.push(FailedFile::new(&task.item.id, &task.item.name, &err));
        }

        // VERIFY
        info!("Phase: {:?}", RunPhase::Verify);
        let expected = self.ledger.len();
        let (destination_files, verification_ok) =
            match self.count_destination_files(&dest_root).await {
                Ok(count) => {
                    if count != expected {
                        warn!(
                            "Verification mismatch: {} files at destination, {} expected",
                            count, expected
                        );
                    }
                    (count, count == expected)
                }
                Err(e) => {
                    error!("Verification count failed: {}", e);
                    (0, false)
                }
            };

        self.ledger.finalize()?;

        // REPORT
        info!("Phase: {:?}", RunPhase::Report);
        let builder = ReportBuilder {
            folders: walk.folders,
            files_transferred: ctx.transferred.load(Ordering::Relaxed),
            files_skipped: walk.files_skipped + ctx.skipped.load(Ordering::Relaxed),
            total_bytes: ctx.bytes.load(Ordering::Relaxed),
            files_validated: ctx.validated.load(Ordering::Relaxed),
            failed,
            destination_files,
            ledger_entries: expected,
            verification_ok,
            elapsed: started.elapsed(),
        };
        let report = builder.finish();
        info!("{}", report);
        Ok(report)
    }

    /// One bounded-concurrency sweep over a set of tasks.
    ///
    /// Each task runs end-to-end on one worker slot; a task's own attempts are
    /// strictly sequential inside [`TransferWorker::process`]. No ordering is
    /// guaranteed between tasks.
    async fn run_pass(
        &self,
        tasks: Vec<TransferTask>,
        ceiling: u32,
        worker: &Arc<TransferWorker<S>>,
        ctx: &Arc<RunContext>,
    ) -> Result<PassOutcome, EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(tasks.len());

        for mut task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let worker = Arc::clone(worker);
            let ctx = Arc::clone(ctx);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::Config(format!("worker pool closed: {}", e)))?;

                tracing::debug!(
                    "Task {}: {:?} -> {:?}",
                    task.item.name,
                    TaskState::Pending,
                    TaskState::InProgress
                );
                let outcome = worker.process(&mut task, ceiling).await?;
                match &outcome {
                    TaskOutcome::Succeeded {
                        bytes,
                        checksum_validated,
                    } => {
                        ctx.transferred.fetch_add(1, Ordering::Relaxed);
                        ctx.bytes.fetch_add(*bytes, Ordering::Relaxed);
                        if *checksum_validated {
                            ctx.validated.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    TaskOutcome::Skipped => {
                        ctx.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    TaskOutcome::FailedRetryable(_) | TaskOutcome::FailedTerminal(_) => {}
                }
                Ok::<(TransferTask, TaskOutcome), EngineError>((task, outcome))
            }));
        }

        let mut retryable = Vec::new();
        let mut failed = Vec::new();
        let mut fatal: Option<EngineError> = None;
        for handle in handles {
            if fatal.is_some() {
                // The pass is aborting; reap every remaining worker so none
                // keeps mutating the destination after run() has returned.
                handle.abort();
                let _ = handle.await;
                continue;
            }
            match handle.await {
                Ok(Ok((task, outcome))) => {
                    let state = task_state(&outcome);
                    match outcome {
                        TaskOutcome::Succeeded { .. } | TaskOutcome::Skipped => {}
                        TaskOutcome::FailedRetryable(err) => {
                            retryable.push((task, err));
                        }
                        TaskOutcome::FailedTerminal(err) => {
                            failed.push(FailedFile::new(&task.item.id, &task.item.name, &err));
                        }
                    }
                    tracing::debug!("Task settled: {:?}", state);
                }
                // Fatal: ledger persistence failed.
                Ok(Err(engine_err)) => fatal = Some(engine_err),
                Err(join_err) => {
                    error!("Worker task panicked: {}", join_err);
                }
            }
        }
        if let Some(err) = fatal {
            return Err(err);
        }

        Ok(PassOutcome { retryable, failed })
    }

    /// Count files (recursively) under the destination root.
    async fn count_destination_files(&self, root: &str) -> Result<usize, TransferError> {
        let mut count = 0usize;
        let mut queue = vec![root.to_string()];
        while let Some(folder) = queue.pop() {
            for child in self.store.list_children(&folder).await? {
                match child.kind {
                    ItemKind::Folder => queue.push(child.id),
                    ItemKind::File => count += 1,
                }
            }
        }
        Ok(count)
    }

    fn prepare_spool_dir(&self) -> Result<PathBuf, EngineError> {
        let dir = self
            .config
            .spool_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("drive-mirror"));
        std::fs::create_dir_all(&dir).map_err(|e| {
            EngineError::Config(format!("cannot create spool dir {}: {}", dir.display(), e))
        })?;
        Ok(dir)
    }
}
