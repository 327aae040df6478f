//! Final run report.
//!
//! Pure aggregation over walk statistics, terminal task outcomes, and the
//! verification result. Building a report mutates nothing.

use std::fmt;
use std::time::Duration;

use crate::utils::errors::TransferError;

/// One terminally failed file, listed so a rerun can be targeted or diagnosed.
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub id: String,
    pub name: String,
    pub error_kind: &'static str,
    pub error: String,
}

impl FailedFile {
    pub fn new(id: &str, name: &str, err: &TransferError) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            error_kind: err.kind(),
            error: err.to_string(),
        }
    }
}

/// Aggregated outcome of one mirror run.
#[derive(Debug)]
pub struct RunReport {
    /// Destination folders ensured this run (excluding the mirror root).
    pub folders: usize,
    /// Files successfully transferred and validated this run.
    pub files_transferred: usize,
    /// Files skipped because the ledger already held an entry.
    pub files_skipped: usize,
    /// Sum of validated sizes over this run's successful transfers.
    pub total_bytes: u64,
    /// Successful transfers whose server checksum matched the source.
    pub files_validated: usize,
    /// Terminally failed files.
    pub failed: Vec<FailedFile>,
    /// Files counted under the destination root during VERIFY.
    pub destination_files: usize,
    /// Ledger entries after the run (the expected destination count).
    pub ledger_entries: usize,
    /// Whether the VERIFY counts matched.
    pub verification_ok: bool,
    pub elapsed: Duration,
    /// True iff no terminal failures and verification matched.
    pub success: bool,
}

/// Accumulates the pieces of a [`RunReport`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
    pub folders: usize,
    pub files_transferred: usize,
    pub files_skipped: usize,
    pub total_bytes: u64,
    pub files_validated: usize,
    pub failed: Vec<FailedFile>,
    pub destination_files: usize,
    pub ledger_entries: usize,
    pub verification_ok: bool,
    pub elapsed: Duration,
}

impl ReportBuilder {
    pub fn finish(self) -> RunReport {
        let success = self.failed.is_empty() && self.verification_ok;
        RunReport {
            folders: self.folders,
            files_transferred: self.files_transferred,
            files_skipped: self.files_skipped,
            total_bytes: self.total_bytes,
            files_validated: self.files_validated,
            failed: self.failed,
            destination_files: self.destination_files,
            ledger_entries: self.ledger_entries,
            verification_ok: self.verification_ok,
            elapsed: self.elapsed,
            success,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Mirror run {} in {:.1}s",
            if self.success { "succeeded" } else { "finished with failures" },
            self.elapsed.as_secs_f64()
        )?;
        writeln!(
            f,
            "  folders: {}, transferred: {}, skipped: {}, bytes: {}",
            self.folders, self.files_transferred, self.files_skipped, self.total_bytes
        )?;
        writeln!(
            f,
            "  validated: {}/{}, destination files: {} (expected {}), verification: {}",
            self.files_validated,
            self.files_transferred,
            self.destination_files,
            self.ledger_entries,
            if self.verification_ok { "ok" } else { "MISMATCH" }
        )?;
        for failure in &self.failed {
            writeln!(
                f,
                "  failed: {} ({}) [{}] {}",
                failure.name, failure.id, failure.error_kind, failure.error
            )?;
        }
        Ok(())
    }
}
