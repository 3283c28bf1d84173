// Performance metrics module
//
// Lightweight counters for monitoring the daemon

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Daemon metrics
///
/// Uses atomic operations for thread-safe tracking without locks. Shared as
/// `Arc<Metrics>` and logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// RCON commands that returned a response
    pub rcon_commands: AtomicU64,

    /// RCON commands that failed or timed out
    pub rcon_failures: AtomicU64,

    /// Log lines that produced an event
    pub log_lines_processed: AtomicU64,

    /// Log lines that were too short or matched nothing
    pub log_lines_skipped: AtomicU64,

    pub operations_started: AtomicU64,

    pub operations_failed: AtomicU64,

    /// Envelopes handed to subscribers
    pub broadcasts: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rcon_commands: AtomicU64::new(0),
            rcon_failures: AtomicU64::new(0),
            log_lines_processed: AtomicU64::new(0),
            log_lines_skipped: AtomicU64::new(0),
            operations_started: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_rcon_command(&self) {
        self.rcon_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rcon_failure(&self) {
        self.rcon_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_line(&self, matched: bool) {
        if matched {
            self.log_lines_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.log_lines_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_operation_started(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation_failed(&self) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "RCON: {} commands, {} failures",
            self.rcon_commands.load(Ordering::Relaxed),
            self.rcon_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Log lines: {} processed, {} skipped",
            self.log_lines_processed.load(Ordering::Relaxed),
            self.log_lines_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Operations: {} started, {} failed, broadcasts: {}",
            self.operations_started.load(Ordering::Relaxed),
            self.operations_failed.load(Ordering::Relaxed),
            self.broadcasts.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
