//! Parameterized build submission: deployment listing and promotions.
//!
//! Listing deployments is a full trigger → queue correlation → console
//! scrape workflow. Promotions and scaling only submit and check that the
//! build was created.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::WorkflowContext;
use crate::error::{CiError, WorkflowError, WorkflowResult};
use crate::http::{CiHttpClient, CiRequest, CiResponse};
use crate::model::{DeployedImage, DisplayTone};
use crate::queue::{extract_queue_id, QueueCorrelationPoller, QueueState};
use crate::scraper::LogScraper;
use crate::urls;

/// HTTP status Jenkins answers with when a build is queued.
pub const CREATED: u16 = 201;

/// Ordered build parameters; setting an existing key replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildParameters(Vec<(String, String)>);

impl BuildParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.0.push((key.to_string(), value.to_string())),
        }
        self
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BuildParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = BuildParameters::new();
        for (k, v) in iter {
            let (k, v): (String, String) = (k.into(), v.into());
            params.set(&k, &v);
        }
        params
    }
}

/// Parse `<registry>/<microservice>:<environment>-<tag>`.
///
/// Missing pieces come back as empty strings instead of failing.
pub fn parse_deployed_image(index: usize, line: &str) -> DeployedImage {
    let image = line.trim().split('/').nth(1).unwrap_or("");
    let mut name_and_rest = image.split(':');
    let microservice = name_and_rest.next().unwrap_or("");
    let tag = name_and_rest
        .next()
        .and_then(|rest| rest.split('-').nth(1))
        .unwrap_or("");

    DeployedImage {
        serial: index + 1,
        microservice: microservice.to_string(),
        tag: tag.to_string(),
        tone: DisplayTone::for_index(index),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionOutcome {
    Promoted { bulk: bool },
}

pub struct DeploymentListingService {
    client: Arc<dyn CiHttpClient>,
    poller: QueueCorrelationPoller,
    scraper: LogScraper,
}

impl DeploymentListingService {
    pub fn new(
        client: Arc<dyn CiHttpClient>,
        poller: QueueCorrelationPoller,
        scraper: LogScraper,
    ) -> Self {
        Self {
            client,
            poller,
            scraper,
        }
    }

    /// Submit `buildWithParameters`; anything but 201 is `JobNotCreated`.
    pub async fn submit(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        params: &BuildParameters,
    ) -> WorkflowResult<CiResponse> {
        let path = urls::build_with_parameters(pipeline, params.iter());
        let not_created = |status| WorkflowError::JobNotCreated {
            pipeline: pipeline.to_string(),
            status,
        };

        match self.client.send(&ctx.credentials, CiRequest::post(&path)).await {
            Ok(resp) if resp.status == CREATED => Ok(resp),
            Ok(resp) => Err(not_created(resp.status)),
            Err(CiError::Status { status, .. }) => Err(not_created(status)),
            Err(e) => Err(e.into()),
        }
    }

    /// Trigger a listing build and return the images it reports.
    pub async fn trigger_and_list_deployments(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        params: &BuildParameters,
    ) -> WorkflowResult<Vec<DeployedImage>> {
        let params = params
            .clone()
            .with("NAMESPACE", "production")
            .with("COLUMNS", "IMAGE");
        let created = self.submit(ctx, pipeline, &params).await?;

        let location = created.location.unwrap_or_default();
        let queue_id = extract_queue_id(&location)?;
        info!(event = "deployments.job_created", pipeline = %pipeline, queue_id = queue_id);

        let build_number = match self.poller.resolve(ctx, pipeline, queue_id).await? {
            QueueState::Resolved(c) => c.build_number,
            _ => None,
        }
        .ok_or_else(|| WorkflowError::NoBuildFound {
            pipeline: pipeline.to_string(),
            queue_id,
        })?;

        let path = urls::job_console_text(pipeline, "", &build_number.to_string());
        let text = self
            .client
            .send(&ctx.credentials, CiRequest::post(&path))
            .await?
            .into_text(&path)?;

        let images: Vec<DeployedImage> = self
            .scraper
            .scrape_deployments(&text)
            .iter()
            .enumerate()
            .map(|(i, line)| parse_deployed_image(i, line))
            .collect();
        info!(
            event = "deployments.listed",
            pipeline = %pipeline,
            build_number = build_number,
            count = images.len(),
        );
        Ok(images)
    }

    /// Submit a (bulk) promotion build.
    pub async fn promote(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        params: &BuildParameters,
        bulk: bool,
    ) -> WorkflowResult<PromotionOutcome> {
        self.submit(ctx, pipeline, params).await?;
        info!(event = "promotion.created", pipeline = %pipeline, bulk = bulk);
        Ok(PromotionOutcome::Promoted { bulk })
    }

    /// Submit a replica scaling build (`ENVIRONMENT`, `REPLICA`,
    /// `MICROSERVICES`).
    pub async fn scale(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        params: &BuildParameters,
    ) -> WorkflowResult<()> {
        self.submit(ctx, pipeline, params).await?;
        info!(
            event = "scale.created",
            pipeline = %pipeline,
            replicas = params.get("REPLICA").unwrap_or("-"),
        );
        Ok(())
    }
}
