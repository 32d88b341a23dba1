//! Raw run payload → [`RunRecord`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;

use crate::error::{CiError, CiResult, WorkflowError};
use crate::model::{Commit, RunRecord, Stage, StageDuration};
use crate::report::{ErrorReporter, FetchFailure};
use crate::wire::{RawBuildDetail, RawRun, RawStage};

/// Looks up the commits behind a run.
#[async_trait]
pub trait ChangeSetFetcher: Send + Sync {
    async fn fetch_change_set(&self, run_id: &str) -> CiResult<Vec<Commit>>;

    /// Pipeline reported alongside fetch failures.
    fn pipeline(&self) -> &str {
        ""
    }

    /// Branch reported alongside fetch failures.
    fn branch(&self) -> &str {
        ""
    }
}

/// Commits of the first change set in a build document.
pub fn commits_from_detail(detail: RawBuildDetail, path: &str) -> CiResult<Vec<Commit>> {
    let Some(first) = detail.change_sets.into_iter().next() else {
        return Ok(Vec::new());
    };

    first
        .items
        .into_iter()
        .map(|item| {
            let timestamp =
                DateTime::from_timestamp_millis(item.timestamp).ok_or_else(|| CiError::Decode {
                    path: path.to_string(),
                    detail: format!("commit timestamp out of range: {}", item.timestamp),
                })?;
            Ok(Commit {
                message: item.msg,
                author: item.author.full_name,
                timestamp,
            })
        })
        .collect()
}

pub fn normalize_stage(raw: &RawStage) -> Stage {
    Stage {
        name: raw.name.clone(),
        status: raw.status.clone(),
        duration: StageDuration::from_millis(raw.duration_millis),
    }
}

pub struct RunNormalizer {
    reporter: Arc<dyn ErrorReporter>,
}

impl RunNormalizer {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }

    /// Normalize one run.
    ///
    /// With `fetch_commits` unset the fetcher is never called. A failed
    /// change-set fetch is reported and leaves `commits` empty.
    pub async fn normalize(
        &self,
        raw: &RawRun,
        fetcher: &dyn ChangeSetFetcher,
        fetch_commits: bool,
    ) -> RunRecord {
        let commits = if fetch_commits {
            match fetcher.fetch_change_set(&raw.id).await {
                Ok(commits) => commits,
                Err(error) => {
                    let error = WorkflowError::from(error);
                    self.reporter.report(&FetchFailure {
                        pipeline: fetcher.pipeline(),
                        branch: fetcher.branch(),
                        job_id: Some(&raw.id),
                        error: &error,
                    });
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        RunRecord {
            name: raw.name.clone(),
            status: raw.status.clone(),
            commits,
            stages: raw.stages.iter().map(normalize_stage).collect(),
        }
    }
}
