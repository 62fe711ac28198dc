//! Statistics for batches of generation calls.
//!
//! Counts successes and failures (by failure kind), bytes received and
//! latency, and keeps a one-second window for the current completion rate.

use crate::error::FireflyError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Coarse classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credential rejected.
    Authentication,
    /// Rejected locally (bad option, empty prompt, expired session).
    Rejected,
    /// Non-success status from the service.
    Remote,
    /// Payload was not an image.
    Decode,
    /// Transport failure.
    Unavailable,
}

impl FailureKind {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        self as usize
    }

    /// Classify an error.
    pub fn of(error: &FireflyError) -> Self {
        match error {
            FireflyError::Authentication(_) => Self::Authentication,
            FireflyError::Remote { .. } | FireflyError::UnexpectedResponse(_) => Self::Remote,
            FireflyError::Decode(_) => Self::Decode,
            FireflyError::ServiceUnavailable(_) => Self::Unavailable,
            _ => Self::Rejected,
        }
    }
}

/// Statistics tracker for a batch.
#[derive(Debug)]
pub struct StatsTracker {
    /// Start time of the batch.
    start_time: Instant,
    /// Jobs in the batch.
    total_jobs: AtomicUsize,
    /// Successful calls.
    success_count: AtomicU64,
    /// Failed calls, indexed by `FailureKind`.
    failures: [AtomicU64; FailureKind::COUNT],
    /// Image bytes received.
    bytes_received: AtomicU64,
    /// Total latency of successful calls in microseconds.
    total_latency_us: AtomicU64,
    /// Completions in the last second.
    recent: Mutex<VecDeque<Instant>>,
}

impl StatsTracker {
    /// Create a new statistics tracker.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_jobs: AtomicUsize::new(0),
            success_count: AtomicU64::new(0),
            failures: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes_received: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Set the number of jobs in the batch.
    pub fn set_total_jobs(&self, total: usize) {
        self.total_jobs.store(total, Ordering::Relaxed);
    }

    /// Record a successful call.
    pub fn record_success(&self, latency: Duration, bytes: usize) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.record_recent();
    }

    /// Record a failed call.
    pub fn record_failure(&self, kind: FailureKind) {
        self.failures[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.record_recent();
    }

    fn record_recent(&self) {
        let now = Instant::now();
        let mut recent = self.recent.lock();
        recent.push_back(now);
        prune(&mut recent, now);
    }

    /// Completions during the last second.
    pub fn completions_per_second(&self) -> f64 {
        let mut recent = self.recent.lock();
        prune(&mut recent, Instant::now());
        recent.len() as f64
    }

    /// Get the current statistics snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.start_time.elapsed();
        let success = self.success_count.load(Ordering::Relaxed);
        let failures: [u64; FailureKind::COUNT] =
            std::array::from_fn(|i| self.failures[i].load(Ordering::Relaxed));
        let failure_count = failures.iter().sum();
        let total_latency = self.total_latency_us.load(Ordering::Relaxed);

        let avg_latency_ms = if success > 0 {
            (total_latency as f64 / success as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            elapsed,
            total_jobs: self.total_jobs.load(Ordering::Relaxed),
            success_count: success,
            failure_count,
            auth_failures: failures[FailureKind::Authentication.index()],
            rejected: failures[FailureKind::Rejected.index()],
            remote_failures: failures[FailureKind::Remote.index()],
            decode_failures: failures[FailureKind::Decode.index()],
            unavailable: failures[FailureKind::Unavailable.index()],
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            avg_latency_ms,
            current_rate: self.completions_per_second(),
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(recent: &mut VecDeque<Instant>, now: Instant) {
    let Some(cutoff) = now.checked_sub(Duration::from_secs(1)) else {
        return;
    };
    while recent.front().is_some_and(|front| *front < cutoff) {
        recent.pop_front();
    }
}

/// A snapshot of batch statistics.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    /// Elapsed time since the batch started.
    pub elapsed: Duration,
    /// Jobs in the batch.
    pub total_jobs: usize,
    /// Successful calls.
    pub success_count: u64,
    /// Failed calls.
    pub failure_count: u64,
    /// Calls rejected for authentication.
    pub auth_failures: u64,
    /// Calls rejected before sending.
    pub rejected: u64,
    /// Calls answered with an error status.
    pub remote_failures: u64,
    /// Calls whose payload was not an image.
    pub decode_failures: u64,
    /// Calls that hit a transport failure.
    pub unavailable: u64,
    /// Image bytes received.
    pub bytes_received: u64,
    /// Average latency of successful calls in milliseconds.
    pub avg_latency_ms: f64,
    /// Completions during the last second.
    pub current_rate: f64,
}

impl StatsSnapshot {
    /// Calls completed so far.
    pub fn completed(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Get the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let completed = self.completed();
        if completed > 0 {
            (self.success_count as f64 / completed as f64) * 100.0
        } else {
            100.0
        }
    }

    /// Format as a one-line summary for progress output.
    pub fn summary(&self) -> String {
        format!(
            "Done: {}/{} | OK: {} | Failed: {} | Avg: {:.0}ms | {:.1} img/s",
            self.completed(),
            self.total_jobs,
            self.success_count,
            self.failure_count,
            self.avg_latency_ms,
            self.current_rate
        )
    }
}
