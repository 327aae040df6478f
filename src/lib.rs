//! Drive Mirror Library
//!
//! Resumable one-way mirroring of a remote folder tree with bounded-concurrency
//! transfer, per-file integrity verification, and a persisted progress ledger
//! so that repeated runs only transfer the delta.

pub mod concurrency;
pub mod config;
pub mod ledger;
pub mod orchestrator;
pub mod remote;
pub mod report;
pub mod transfer;
pub mod utils;
pub mod validate;
pub mod walker;

// Re-export commonly used types
pub use config::RunConfig;
pub use ledger::Ledger;
pub use orchestrator::MirrorEngine;
pub use remote::{ItemKind, RemoteItem, RemoteStore, UploadReceipt};
pub use report::RunReport;
pub use utils::errors::{EngineError, TransferError};

pub type Result<T> = std::result::Result<T, EngineError>;
