//! Bounded parallel execution of annotation jobs
//!
//! Each job runs on the blocking pool behind a semaphore permit. Outcomes are
//! streamed back over a channel; a failing or panicking job is recorded and never
//! affects its siblings.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use super::discovery::{Job, Unmatched};
use super::job::{JobRunner, JobSummary};

/// Final state of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded(JobSummary),
    Failed { reason: String },
}

/// Outcome of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub id: String,
    #[serde(flatten)]
    pub status: JobStatus,
    pub elapsed_ms: u64,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded(_))
    }
}

/// Per-job status list of a batch, sorted by slide identifier
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
    pub unmatched: Vec<Unmatched>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn outcome(&self, id: &str) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    /// Log a one-line status per job
    pub fn log(&self) {
        for outcome in &self.outcomes {
            match &outcome.status {
                JobStatus::Succeeded(summary) => info!(
                    "  {}: ok ({} annotated, {} outside ROIs)",
                    outcome.id,
                    summary.annotated,
                    summary.dropped()
                ),
                JobStatus::Failed { reason } => warn!("  {}: FAILED: {}", outcome.id, reason),
            }
        }
        info!(
            "{} of {} jobs succeeded, {} slides skipped for missing inputs",
            self.succeeded(),
            self.outcomes.len(),
            self.unmatched.len()
        );
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar over `total` jobs, drawn to stderr only when `visible`
fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    let target = if visible {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(total as u64), target);
    if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Runs jobs on a bounded worker pool
pub struct Dispatcher {
    runner: Arc<dyn JobRunner>,
    num_workers: usize,
    show_progress: bool,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn JobRunner>, num_workers: usize) -> Self {
        Self {
            runner,
            num_workers: num_workers.max(1),
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while jobs complete
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run every job and collect one outcome per job
    pub async fn run(&self, jobs: Vec<Job>) -> BatchReport {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let (tx, mut rx) = mpsc::channel(total.max(1));

        info!("Dispatching {} jobs on {} workers", total, self.num_workers);

        for job in jobs {
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();

            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let start = Instant::now();
                let id = job.id.clone();

                let status = match tokio::task::spawn_blocking(move || runner.run(&job)).await {
                    Ok(Ok(summary)) => JobStatus::Succeeded(summary),
                    Ok(Err(e)) => {
                        error!("[ERROR] Failed to process {}: {}", id, e);
                        JobStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                    Err(e) => {
                        error!("[ERROR] Job {} aborted: {}", id, e);
                        JobStatus::Failed {
                            reason: format!("job aborted: {}", e),
                        }
                    }
                };

                let _ = tx
                    .send(JobOutcome {
                        id,
                        status,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    })
                    .await;
            });
        }
        drop(tx);

        let progress = progress_bar(total, self.show_progress);
        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            debug!("Finished {} [{}/{}]", outcome.id, outcomes.len() + 1, total);
            progress.set_message(outcome.id.clone());
            progress.inc(1);
            outcomes.push(outcome);
        }
        progress.finish_and_clear();
        outcomes.sort_by(|a, b| a.id.cmp(&b.id));

        BatchReport {
            outcomes,
            unmatched: Vec::new(),
        }
    }
}
