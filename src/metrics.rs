// Provisioning metrics module
//
// Lightweight counters for what a provisioning run did: resolver calls, downloads,
// pruned entries and staged shared-data files.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Run-wide provisioning metrics
///
/// Uses atomic operations so the counters can be shared through an `Arc` without locks.
/// The binary logs a summary when a command finishes.
#[derive(Debug)]
pub struct Metrics {
    /// Number of external processes started
    pub tool_invocations: AtomicUsize,

    /// Number of external processes that failed to start, timed out or exited non-zero
    pub tool_failures: AtomicUsize,

    /// Total time spent waiting on external processes in milliseconds
    pub total_tool_time_ms: AtomicU64,

    /// Number of resolver binary downloads
    pub downloads: AtomicUsize,

    /// Number of files and directories removed by pruning
    pub entries_pruned: AtomicUsize,

    /// Number of prune warnings (failed deletes, missing directories, bad rules)
    pub prune_warnings: AtomicUsize,

    /// Number of shared-data files copied into the asset directory
    pub files_staged: AtomicUsize,

    /// Start time of the run
    start_time: Instant,
}

/// Plain copy of the counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tool_invocations: usize,
    pub tool_failures: usize,
    pub total_tool_time_ms: u64,
    pub downloads: usize,
    pub entries_pruned: usize,
    pub prune_warnings: usize,
    pub files_staged: usize,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            tool_invocations: AtomicUsize::new(0),
            tool_failures: AtomicUsize::new(0),
            total_tool_time_ms: AtomicU64::new(0),
            downloads: AtomicUsize::new(0),
            entries_pruned: AtomicUsize::new(0),
            prune_warnings: AtomicUsize::new(0),
            files_staged: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_tool_invocation(&self) {
        self.tool_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_failure(&self) {
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_time(&self, duration: Duration) {
        self.total_tool_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_download(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pruned(&self, entries: usize, warnings: usize) {
        self.entries_pruned.fetch_add(entries, Ordering::Relaxed);
        self.prune_warnings.fetch_add(warnings, Ordering::Relaxed);
    }

    pub fn record_staged(&self, files: usize) {
        self.files_staged.fetch_add(files, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tool_invocations: self.tool_invocations.load(Ordering::Relaxed),
            tool_failures: self.tool_failures.load(Ordering::Relaxed),
            total_tool_time_ms: self.total_tool_time_ms.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            entries_pruned: self.entries_pruned.load(Ordering::Relaxed),
            prune_warnings: self.prune_warnings.load(Ordering::Relaxed),
            files_staged: self.files_staged.load(Ordering::Relaxed),
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!("=== Provisioning Summary ===");
        tracing::info!("Elapsed: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Resolver calls: {} ({} failed, {:.2}s total), downloads: {}",
            s.tool_invocations,
            s.tool_failures,
            s.total_tool_time_ms as f64 / 1000.0,
            s.downloads
        );
        tracing::info!(
            "Pruned entries: {}, prune warnings: {}, staged files: {}",
            s.entries_pruned,
            s.prune_warnings,
            s.files_staged
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_operations() {
        let metrics = Metrics::new();

        metrics.record_tool_invocation();
        metrics.record_tool_invocation();
        metrics.record_tool_failure();
        metrics.record_download();
        metrics.record_pruned(7, 2);
        metrics.record_pruned(1, 0);
        metrics.record_staged(4);

        let s = metrics.snapshot();
        assert_eq!(s.tool_invocations, 2);
        assert_eq!(s.tool_failures, 1);
        assert_eq!(s.downloads, 1);
        assert_eq!(s.entries_pruned, 8);
        assert_eq!(s.prune_warnings, 2);
        assert_eq!(s.files_staged, 4);
    }

    #[test]
    fn test_record_tool_time() {
        let metrics = Metrics::new();
        metrics.record_tool_time(Duration::from_millis(100));
        metrics.record_tool_time(Duration::from_millis(200));
        assert_eq!(metrics.snapshot().total_tool_time_ms, 300);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
