//! Queue id → build number correlation for freshly triggered builds.
//!
//! `Triggered → Waiting → Resolved | TimedOut`. The poller never triggers a
//! build itself; it waits once, looks the queue id up in the pipeline's
//! build list and, with the default [`PollPolicy`], gives up after that
//! single lookup.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::{PollPolicy, WorkflowContext};
use crate::error::{CiError, CiResult};
use crate::http::{CiHttpClient, CiRequest};
use crate::model::QueueCorrelation;
use crate::urls;
use crate::wire::{RawBuildList, RawQueueBuild};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueueState {
    Triggered { queue_id: u64 },
    Waiting { queue_id: u64, attempt: u32 },
    Resolved(QueueCorrelation),
    TimedOut(QueueCorrelation),
}

impl QueueState {
    pub fn correlation(&self) -> QueueCorrelation {
        match *self {
            QueueState::Triggered { queue_id } | QueueState::Waiting { queue_id, .. } => {
                QueueCorrelation::pending(queue_id)
            }
            QueueState::Resolved(c) | QueueState::TimedOut(c) => c,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueState::Resolved(_) | QueueState::TimedOut(_))
    }
}

/// Queue id from a `Location` header such as `https://ci/queue/item/123/`.
pub fn extract_queue_id(location: &str) -> CiResult<u64> {
    let invalid = || CiError::QueueLocation {
        location: location.to_string(),
    };

    let url = url::Url::parse(location)
        .or_else(|_| url::Url::parse("http://localhost/").and_then(|base| base.join(location)))
        .map_err(|_| invalid())?;
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();

    let after_item = segments
        .windows(3)
        .find(|w| w[0] == "queue" && w[1] == "item")
        .map(|w| w[2]);
    let candidate = after_item.or_else(|| segments.get(2).copied());

    candidate
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(invalid)
}

/// Build number of the first build queued as `queue_id`.
pub fn find_build(builds: &[RawQueueBuild], queue_id: u64) -> Option<u64> {
    builds
        .iter()
        .find(|b| b.queue_id == Some(queue_id))
        .and_then(|b| b.number)
}

pub struct QueueCorrelationPoller {
    client: Arc<dyn CiHttpClient>,
    policy: PollPolicy,
}

impl QueueCorrelationPoller {
    pub fn new(client: Arc<dyn CiHttpClient>, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// One lookup of the pipeline's build list.
    pub async fn lookup(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        queue_id: u64,
    ) -> CiResult<Option<u64>> {
        let path = urls::builds_from_queue(pipeline);
        let list: RawBuildList = self
            .client
            .send(&ctx.credentials, CiRequest::get(&path))
            .await?
            .decode(&path)?;
        Ok(find_build(&list.builds, queue_id))
    }

    /// Wait, then poll until resolved or the attempts run out.
    ///
    /// Returns [`QueueState::Resolved`] or [`QueueState::TimedOut`]. The wait
    /// is not cancellable.
    pub async fn resolve(
        &self,
        ctx: &WorkflowContext,
        pipeline: &str,
        queue_id: u64,
    ) -> CiResult<QueueState> {
        info!(
            event = "queue.transition",
            pipeline = %pipeline,
            state = ?QueueState::Triggered { queue_id },
        );

        for attempt in 1..=self.policy.attempts() {
            let wait = if attempt == 1 {
                self.policy.initial_wait()
            } else {
                self.policy.retry_interval()
            };
            info!(
                event = "queue.transition",
                pipeline = %pipeline,
                state = ?QueueState::Waiting { queue_id, attempt },
                wait_secs = wait.as_secs(),
            );
            tokio::time::sleep(wait).await;

            if let Some(build_number) = self.lookup(ctx, pipeline, queue_id).await? {
                let resolved = QueueState::Resolved(QueueCorrelation {
                    queue_id,
                    build_number: Some(build_number),
                });
                info!(event = "queue.transition", pipeline = %pipeline, state = ?resolved);
                return Ok(resolved);
            }
        }

        let timed_out = QueueState::TimedOut(QueueCorrelation::pending(queue_id));
        info!(event = "queue.transition", pipeline = %pipeline, state = ?timed_out);
        Ok(timed_out)
    }
}
