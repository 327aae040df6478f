//! Default worker-count selection.
//!
//! The orchestrator takes a plain worker count; only configuration resolution
//! consults the host. The heuristic lives behind a strategy trait so the core
//! stays testable without mocking host introspection.

use sysinfo::System;
use tracing::debug;

/// Hard ceiling on configured worker counts.
pub const MAX_WORKERS: usize = 32;

/// Fallback when host detection yields nothing usable.
pub const FALLBACK_WORKERS: usize = 4;

/// Estimated memory footprint of one in-flight transfer (spool + buffers).
const BYTES_PER_WORKER: u64 = 300 * 1024 * 1024;

/// Pluggable mapping from host figures to a worker count.
pub trait ConcurrencyStrategy {
    fn compute(&self, available_memory: u64, cpu_count: usize) -> usize;
}

/// Default strategy: one worker per ~300 MB of available memory, capped by the
/// CPU count and an upper bound of 8, with a floor of 3.
pub struct MemoryAwareStrategy;

impl ConcurrencyStrategy for MemoryAwareStrategy {
    fn compute(&self, available_memory: u64, cpu_count: usize) -> usize {
        if available_memory == 0 || cpu_count == 0 {
            return FALLBACK_WORKERS;
        }
        let by_memory = (available_memory / BYTES_PER_WORKER) as usize;
        by_memory.min(cpu_count).min(8).max(3)
    }
}

/// Compute the default worker count from the current host.
pub fn detect_workers(strategy: &dyn ConcurrencyStrategy) -> usize {
    let sys = System::new_all();
    let available = sys.available_memory();
    let cpus = sys.cpus().len();
    let workers = strategy.compute(available, cpus);
    debug!(
        "Detected {} workers (available memory: {} bytes, cpus: {})",
        workers, available, cpus
    );
    workers
}
