//! Concurrent batches of generation calls.
//!
//! Each job is an independent call on a shared [`FireflyClient`]. Jobs run
//! with bounded concurrency and optional pacing; a failing job never affects
//! the others, and every job gets its own outcome in the report.

use crate::client::FireflyClient;
use crate::decode::GeneratedImage;
use crate::error::Result;
use crate::request::GenerationRequest;
use crate::tracker::{FailureKind, StatsSnapshot, StatsTracker};
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one job in a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Position of the job in the submitted list.
    pub index: usize,
    /// Short description of the job, for logs and reports.
    pub input: String,
    /// Time the call took.
    pub latency: Duration,
    /// The image, or why this job failed.
    pub result: Result<GeneratedImage>,
}

impl BatchOutcome {
    /// Check if this job succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs batches of generation requests against one client.
pub struct BatchRunner {
    client: FireflyClient,
    workers: usize,
    rate_limit: Option<NonZeroU32>,
    show_progress: bool,
    /// Tracker of the current or most recent run.
    stats: Mutex<Arc<StatsTracker>>,
}

impl BatchRunner {
    /// Create a runner using the client's configured workers and rate limit.
    pub fn new(client: FireflyClient) -> Self {
        let workers = client.config().request.workers.max(1);
        let rate_limit = client.config().rate_limit_nonzero();
        Self {
            client,
            workers,
            rate_limit,
            show_progress: false,
            stats: Mutex::new(Arc::new(StatsTracker::new())),
        }
    }

    /// Set the number of calls in flight at once.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Pace call starts to at most `per_second`; `None` disables pacing.
    pub fn with_rate_limit(mut self, per_second: Option<NonZeroU32>) -> Self {
        self.rate_limit = per_second;
        self
    }

    /// Show a progress bar on stderr.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run all jobs and collect their outcomes, ordered by job index.
    ///
    /// Statistics start from zero on every run.
    pub async fn run(&self, jobs: Vec<GenerationRequest>) -> BatchReport {
        let total = jobs.len();
        let tracker = Arc::new(StatsTracker::new());
        tracker.set_total_jobs(total);
        *self.stats.lock() = Arc::clone(&tracker);
        info!(jobs = total, workers = self.workers, "Starting batch");

        let progress = self.show_progress.then(|| progress_bar(total));
        let limiter = self
            .rate_limit
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        let started = Instant::now();

        let mut outcomes = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| {
                let client = &self.client;
                let stats = Arc::clone(&tracker);
                let limiter = limiter.as_ref();
                let progress = progress.clone();

                async move {
                    if let Some(limiter) = limiter {
                        limiter.until_ready().await;
                    }

                    let input = job.display_input();
                    let start = Instant::now();
                    let result = client.generate(&job).await;
                    let latency = start.elapsed();

                    match &result {
                        Ok(image) => {
                            debug!(index, latency_ms = latency.as_millis() as u64, "Job succeeded");
                            stats.record_success(latency, image.size());
                        }
                        Err(e) => {
                            warn!(index, input = %input, error = %e, "Job failed");
                            stats.record_failure(FailureKind::of(e));
                        }
                    }

                    if let Some(pb) = &progress {
                        pb.set_message(stats.snapshot().summary());
                        pb.inc(1);
                    }

                    BatchOutcome {
                        index,
                        input,
                        latency,
                        result,
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect::<Vec<_>>()
            .await;

        outcomes.sort_by_key(|o| o.index);

        if let Some(pb) = &progress {
            pb.finish_with_message("Complete!");
        }

        let stats = tracker.snapshot();
        info!(
            succeeded = stats.success_count,
            failed = stats.failure_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );

        BatchReport {
            outcomes,
            elapsed: started.elapsed(),
            stats,
        }
    }

    /// Get the current stats snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.lock().snapshot()
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Result of running a batch.
#[derive(Debug)]
pub struct BatchReport {
    /// One outcome per job, ordered by job index.
    pub outcomes: Vec<BatchOutcome>,
    /// Wall-clock time of the whole batch.
    pub elapsed: Duration,
    /// Final statistics.
    pub stats: StatsSnapshot,
}

impl BatchReport {
    /// Number of successful jobs.
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed jobs.
    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    /// Get the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            100.0
        } else {
            (self.success_count() as f64 / self.outcomes.len() as f64) * 100.0
        }
    }

    /// Successful images with their job index.
    pub fn images(&self) -> impl Iterator<Item = (usize, &GeneratedImage)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|img| (o.index, img)))
    }

    /// Print a summary of the results.
    pub fn print_summary(&self) {
        println!("\n{}", "═".repeat(60));
        println!("                    GENERATION COMPLETE");
        println!("{}", "═".repeat(60));
        println!("  Jobs:             {}", self.outcomes.len());
        println!(
            "  Successful:       {} ({:.1}%)",
            self.success_count(),
            self.success_rate()
        );
        println!("  Failed:           {}", self.failure_count());
        if self.stats.failure_count > 0 {
            println!(
                "    auth: {} | rejected: {} | remote: {} | decode: {} | network: {}",
                self.stats.auth_failures,
                self.stats.rejected,
                self.stats.remote_failures,
                self.stats.decode_failures,
                self.stats.unavailable
            );
        }
        println!("  Elapsed Time:     {:.2}s", self.elapsed.as_secs_f64());
        println!("  Avg Latency:      {:.1}ms", self.stats.avg_latency_ms);
        println!(
            "  Received:         {:.1} KiB",
            self.stats.bytes_received as f64 / 1024.0
        );
        println!("{}", "═".repeat(60));
    }
}
