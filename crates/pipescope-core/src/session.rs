//! Login and pipeline discovery against the CI server.

use std::collections::BTreeMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tracing::info;

use crate::config::{PipelineEntry, SessionCredentials, WorkflowContext};
use crate::error::{CiResult, WorkflowError};
use crate::http::{CiHttpClient, CiRequest};
use crate::model::UserDetails;
use crate::report::{ErrorReporter, FetchFailure};
use crate::urls;
use crate::wire::{RawCrumb, RawJobList, RawUser};

pub struct SessionService {
    client: Arc<dyn CiHttpClient>,
    reporter: Arc<dyn ErrorReporter>,
}

impl SessionService {
    pub fn new(client: Arc<dyn CiHttpClient>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { client, reporter }
    }

    /// Obtain a fresh anti-forgery crumb using basic auth only.
    pub async fn fetch_crumb(&self, credentials: &SessionCredentials) -> CiResult<String> {
        let crumb: RawCrumb = self
            .client
            .send(credentials, CiRequest::get(urls::CRUMB_ISSUER).basic_only())
            .await?
            .decode(urls::CRUMB_ISSUER)?;
        Ok(crumb.crumb)
    }

    pub async fn user_details(&self, ctx: &WorkflowContext) -> CiResult<UserDetails> {
        let user: RawUser = self
            .client
            .send(&ctx.credentials, CiRequest::post(urls::USER_DETAILS))
            .await?
            .decode(urls::USER_DETAILS)?;
        Ok(UserDetails {
            email: user.email(),
            full_name: user.full_name,
        })
    }

    /// Branch jobs of a multibranch pipeline: raw job name → decoded name.
    pub async fn pipeline_branches(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
    ) -> CiResult<BTreeMap<String, String>> {
        let path = urls::pipeline_jobs(pipeline);
        let jobs: RawJobList = self
            .client
            .send(&ctx.credentials, CiRequest::post(&path))
            .await?
            .decode(&path)?;

        Ok(jobs
            .jobs
            .into_iter()
            .map(|job| {
                let decoded = percent_decode_str(&job.name).decode_utf8_lossy().into_owned();
                (job.name, decoded)
            })
            .collect())
    }

    /// Branch listings for every pipeline not in `excluded`, keyed by repo.
    ///
    /// Pipelines whose listing fails are reported and left out.
    pub async fn refresh_repo_branches(
        &self,
        ctx: &WorkflowContext,
        pipelines: &[PipelineEntry],
        excluded: &[String],
    ) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut repo_branches = BTreeMap::new();
        for entry in pipelines {
            if excluded.iter().any(|e| e == &entry.name) {
                continue;
            }
            match self.pipeline_branches(ctx, &entry.name).await {
                Ok(branches) => {
                    repo_branches.insert(entry.repo.clone(), branches);
                }
                Err(error) => self.reporter.report(&FetchFailure {
                    pipeline: &entry.name,
                    branch: "",
                    job_id: None,
                    error: &WorkflowError::from(error),
                }),
            }
        }
        info!(event = "branches.refreshed", repos = repo_branches.len());
        repo_branches
    }
}
