//! Recent run listing and per-job console access.
//!
//! Runs are normalized one at a time so that only one request is in flight
//! against the CI server per workflow.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{SessionCredentials, WorkflowContext};
use crate::error::{CiError, CiResult};
use crate::http::{CiHttpClient, CiRequest};
use crate::model::{Commit, RunRecord, RunSelection};
use crate::normalizer::{commits_from_detail, ChangeSetFetcher, RunNormalizer};
use crate::report::{ErrorReporter, SelectionStore};
use crate::scraper::LogScraper;
use crate::urls;
use crate::wire::{parse_runs, RawBuildDetail, RawRun};

/// Runs listed when the caller does not ask for a specific count.
pub const DEFAULT_RUN_LIMIT: usize = 5;

/// Fetches change sets through the job-run document of one pipeline/branch.
pub struct JobChangeSetFetcher<'a> {
    client: &'a dyn CiHttpClient,
    credentials: &'a SessionCredentials,
    pipeline: &'a str,
    branch: &'a str,
}

impl<'a> JobChangeSetFetcher<'a> {
    pub fn new(
        client: &'a dyn CiHttpClient,
        credentials: &'a SessionCredentials,
        pipeline: &'a str,
        branch: &'a str,
    ) -> Self {
        Self {
            client,
            credentials,
            pipeline,
            branch,
        }
    }
}

#[async_trait]
impl ChangeSetFetcher for JobChangeSetFetcher<'_> {
    async fn fetch_change_set(&self, run_id: &str) -> CiResult<Vec<Commit>> {
        let path = urls::job_run(self.pipeline, self.branch, run_id);
        let detail: RawBuildDetail = self
            .client
            .send(self.credentials, CiRequest::post(&path))
            .await?
            .decode(&path)?;
        commits_from_detail(detail, &path)
    }

    fn pipeline(&self) -> &str {
        self.pipeline
    }

    fn branch(&self) -> &str {
        self.branch
    }
}

pub struct RunHistoryService {
    client: Arc<dyn CiHttpClient>,
    normalizer: RunNormalizer,
    selection_store: Option<Arc<dyn SelectionStore>>,
}

impl RunHistoryService {
    pub fn new(client: Arc<dyn CiHttpClient>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            client,
            normalizer: RunNormalizer::new(reporter),
            selection_store: None,
        }
    }

    pub fn with_selection_store(mut self, store: Arc<dyn SelectionStore>) -> Self {
        self.selection_store = Some(store);
        self
    }

    /// Raw run list for a pipeline/branch, in API order.
    ///
    /// An empty `branch` lists the pipeline-level runs.
    pub async fn fetch_runs(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        branch: &str,
    ) -> CiResult<Vec<RawRun>> {
        let path = urls::job_runs(pipeline, branch);
        debug!(event = "runs.fetch", pipeline = %pipeline, branch = %branch, path = %path);
        let value = self
            .client
            .send(&ctx.credentials, CiRequest::post(&path))
            .await?
            .into_json(&path)?;
        parse_runs(value).map_err(|e| CiError::Decode {
            path,
            detail: e.to_string(),
        })
    }

    /// The `limit` most recent runs, normalized in API order.
    pub async fn list_recent_runs(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        branch: &str,
        limit: usize,
    ) -> CiResult<Vec<RunRecord>> {
        let raw_runs = self.fetch_runs(ctx, pipeline, branch).await?;
        let fetcher = JobChangeSetFetcher::new(
            self.client.as_ref(),
            &ctx.credentials,
            pipeline,
            branch,
        );
        let fetch_commits = ctx.should_fetch_commits(pipeline);

        let mut records = Vec::with_capacity(limit.min(raw_runs.len()));
        for raw in raw_runs.iter().take(limit) {
            records.push(self.normalizer.normalize(raw, &fetcher, fetch_commits).await);
        }

        info!(
            event = "runs.normalized",
            pipeline = %pipeline,
            branch = %branch,
            count = records.len(),
        );
        Ok(records)
    }

    /// Remember `selection`, then list its recent runs.
    ///
    /// A failed save is logged and does not affect the listing.
    pub async fn list_runs_for_selection(
        &self,
        ctx: &WorkflowContext,
        selection: &RunSelection,
        limit: usize,
    ) -> CiResult<Vec<RunRecord>> {
        if let Some(store) = &self.selection_store {
            if let Err(e) = store.persist_selection(selection).await {
                warn!(event = "selection.persist_failed", error = %e);
            }
        }
        self.list_recent_runs(ctx, &selection.pipeline, &selection.branch_option, limit)
            .await
    }

    pub async fn console_text(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        branch: &str,
        job_number: &str,
    ) -> CiResult<String> {
        let path = urls::job_console_text(pipeline, branch, job_number);
        self.client
            .send(&ctx.credentials, CiRequest::post(&path))
            .await?
            .into_text(&path)
    }

    /// Error lines scraped from one job's console log.
    pub async fn job_errors(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        branch: &str,
        job_number: &str,
        scraper: &LogScraper,
    ) -> CiResult<Vec<String>> {
        let text = self.console_text(ctx, pipeline, branch, job_number).await?;
        Ok(scraper.scrape_errors(&text))
    }
}
