//! Collaborators the core reports to but never reads back from.

use async_trait::async_trait;
use tracing::warn;

use crate::error::WorkflowError;
use crate::model::RunSelection;

/// Context for a recoverable failure that was degraded locally.
///
/// An empty `pipeline` means no pipeline was resolved (unmapped repo).
#[derive(Debug, Clone, Copy)]
pub struct FetchFailure<'a> {
    pub pipeline: &'a str,
    pub branch: &'a str,
    pub job_id: Option<&'a str>,
    pub error: &'a WorkflowError,
}

/// Receives recoverable failures so an operator can retry by hand.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, failure: &FetchFailure<'_>);
}

/// Reports through `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, failure: &FetchFailure<'_>) {
        warn!(
            event = "ci.fetch_failed",
            pipeline = %failure.pipeline,
            branch = %failure.branch,
            job_id = failure.job_id.unwrap_or("-"),
            transient = failure.error.is_transient(),
            error = %failure.error,
        );
    }
}

/// Remembers the operator's last pipeline/branch pick.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn persist_selection(&self, selection: &RunSelection) -> anyhow::Result<()>;
}
