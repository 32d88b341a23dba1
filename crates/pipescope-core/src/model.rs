//! Normalized records handed to the presentation layer.
//!
//! Everything here is built fresh per request and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source-control commit attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// Status of a run or stage.
///
/// Statuses outside the known set pass through verbatim as [`RunStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Success,
    InProgress,
    Failed,
    Aborted,
    Unknown,
    Other(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Aborted => "ABORTED",
            RunStatus::Unknown => "UNKNOWN",
            RunStatus::Other(raw) => raw,
        }
    }
}

impl From<&str> for RunStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "SUCCESS" => RunStatus::Success,
            "IN_PROGRESS" => RunStatus::InProgress,
            "FAILED" => RunStatus::Failed,
            "ABORTED" => RunStatus::Aborted,
            "UNKNOWN" => RunStatus::Unknown,
            other => RunStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for RunStatus {
    fn from(raw: String) -> Self {
        RunStatus::from(raw.as_str())
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elapsed time of a stage, kept as the raw millisecond count.
///
/// Rendered as `Nm Ms`: the minutes and seconds components only. Whole
/// hours and sub-second remainders are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageDuration(pub u64);

impl StageDuration {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn millis(&self) -> u64 {
        self.0
    }

    /// Minutes within the hour.
    pub fn minutes(&self) -> u64 {
        (self.0 / 60_000) % 60
    }

    pub fn seconds(&self) -> u64 {
        (self.0 / 1_000) % 60
    }
}

impl fmt::Display for StageDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m {}s", self.minutes(), self.seconds())
    }
}

/// One named phase of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub status: RunStatus,
    pub duration: StageDuration,
}

/// One build execution of a pipeline/branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub name: String,
    pub status: RunStatus,
    pub commits: Vec<Commit>,
    pub stages: Vec<Stage>,
}

/// Link between a submitted build's queue id and its build number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCorrelation {
    pub queue_id: u64,
    /// `None` until a build carrying `queue_id` is seen.
    pub build_number: Option<u64>,
}

impl QueueCorrelation {
    pub fn pending(queue_id: u64) -> Self {
        Self {
            queue_id,
            build_number: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.build_number.is_some()
    }
}

/// Alternating row hint for table output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayTone {
    Primary,
    Secondary,
}

impl DisplayTone {
    /// Primary for even zero-based positions, secondary for odd ones.
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            DisplayTone::Primary
        } else {
            DisplayTone::Secondary
        }
    }
}

/// An image currently deployed for a microservice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedImage {
    /// 1-based position in the scraped log.
    pub serial: usize,
    pub microservice: String,
    pub tag: String,
    pub tone: DisplayTone,
}

/// A branch selected for bulk aggregation.
///
/// `raw` is the URL-encoded job name used in request paths; `name` keys
/// the output matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchTarget {
    pub name: String,
    pub raw: String,
}

/// repo → branch → `"<run name> - <tag>"`.
pub type BulkTagMatrix = BTreeMap<String, BTreeMap<String, String>>;

/// The last pipeline/branch an operator picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSelection {
    #[serde(rename = "pipeLineName", default)]
    pub pipeline: String,
    #[serde(rename = "repoName", default)]
    pub repo: String,
    #[serde(default)]
    pub branch_name: String,
    /// Raw (URL-encoded) branch job name used in request paths.
    #[serde(default)]
    pub branch_option: String,
}

impl RunSelection {
    /// A pipeline is enough; an empty branch selects the pipeline-level job.
    pub fn is_complete(&self) -> bool {
        !self.pipeline.is_empty()
    }
}

/// Identity of the logged-in CI user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub full_name: String,
    pub email: Option<String>,
}
