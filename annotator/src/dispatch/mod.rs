//! Discovery and parallel execution of per-slide annotation jobs

pub mod discovery;
pub mod dispatcher;
pub mod job;

pub use discovery::{Discovery, DiscoveryError, Job, discover_jobs};
pub use dispatcher::{BatchReport, Dispatcher, JobOutcome, JobStatus};
pub use job::{JobProcessor, JobRunner, JobSummary};
