//! Deployed tag matrix across repositories and branches.
//!
//! [`BulkTagAggregator`] walks every configured repo/branch pair one at a
//! time and records which tag the branch's runs deployed.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::WorkflowContext;
use crate::error::WorkflowError;
use crate::history::RunHistoryService;
use crate::model::{BranchTarget, BulkTagMatrix};
use crate::report::{ErrorReporter, FetchFailure};
use crate::wire::RawRun;

/// Stage-name fragment identifying a deployment stage.
pub const DEPLOY_STAGE_MARKER: &str = "Deploy to";

/// Tag deployed by a run, read from its first deployment stage name.
///
/// The 4th whitespace-separated token is the tag (`Deploy to QA 67EC11`).
/// Names that stop at the environment (`Deploy to QA`) report the 3rd.
/// Without a deployment stage the tag is empty.
pub fn deployed_tag(run: &RawRun) -> String {
    let Some(stage) = run
        .stages
        .iter()
        .find(|s| s.name.contains(DEPLOY_STAGE_MARKER))
    else {
        return String::new();
    };
    let tokens: Vec<&str> = stage.name.split_whitespace().collect();
    tokens
        .get(3)
        .or_else(|| tokens.get(2))
        .map(|t| t.to_string())
        .unwrap_or_default()
}

/// `"<run name> - <tag>"` of the last run in iteration order.
///
/// Every run overwrites the previous cell, so with a newest-first API the
/// oldest listed run wins. `None` means the run list was empty.
pub fn last_run_cell(runs: &[RawRun]) -> Option<String> {
    let mut cell = None;
    for run in runs {
        cell = Some(format!("{} - {}", run.name, deployed_tag(run)));
    }
    cell
}

pub struct BulkTagAggregator {
    history: Arc<RunHistoryService>,
    reporter: Arc<dyn ErrorReporter>,
}

impl BulkTagAggregator {
    pub fn new(history: Arc<RunHistoryService>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { history, reporter }
    }

    /// Build the matrix for `targets` using `directory` (repo → pipeline).
    ///
    /// A failed fetch leaves its cell absent; an empty run list yields an
    /// empty cell. Every target repo appears in the output, and an unmapped
    /// repo is reported as [`WorkflowError::UnknownRepository`].
    pub async fn aggregate(
        &self,
        ctx: &WorkflowContext,
        directory: &BTreeMap<String, String>,
        targets: &BTreeMap<String, Vec<BranchTarget>>,
    ) -> BulkTagMatrix {
        let mut matrix = BulkTagMatrix::new();

        for (repo, branches) in targets {
            let cells = matrix.entry(repo.clone()).or_default();

            let Some(pipeline) = directory.get(repo) else {
                self.reporter.report(&FetchFailure {
                    pipeline: "",
                    branch: "",
                    job_id: None,
                    error: &WorkflowError::UnknownRepository { repo: repo.clone() },
                });
                continue;
            };

            for branch in branches {
                match self.history.fetch_runs(ctx, pipeline, &branch.raw).await {
                    Ok(runs) => {
                        let cell = last_run_cell(&runs).unwrap_or_default();
                        debug!(event = "bulk.cell", repo = %repo, branch = %branch.name, cell = %cell);
                        cells.insert(branch.name.clone(), cell);
                    }
                    Err(error) => {
                        self.reporter.report(&FetchFailure {
                            pipeline,
                            branch: &branch.raw,
                            job_id: None,
                            error: &WorkflowError::from(error),
                        });
                    }
                }
            }
        }

        matrix
    }
}
