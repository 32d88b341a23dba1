//! Jenkins API payload shapes.
//!
//! Deserialization-only. Absent fields fall back to defaults.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::model::RunStatus;

fn unknown_status() -> RunStatus {
    RunStatus::Unknown
}

/// Accept `"42"`, `42` or `null` for identifiers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// One entry of `wfapi/runs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRun {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "unknown_status")]
    pub status: RunStatus,
    #[serde(default)]
    pub stages: Vec<RawStage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStage {
    #[serde(default)]
    pub name: String,
    #[serde(default = "unknown_status")]
    pub status: RunStatus,
    #[serde(default)]
    pub duration_millis: u64,
}

/// Decode a run list that is either an array or an object keyed by index.
///
/// Object entries are taken in numeric key order; non-numeric keys follow
/// in string order.
pub fn parse_runs(value: Value) -> Result<Vec<RawRun>, serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| {
                match (a.parse::<u64>(), b.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => a.cmp(b),
                }
            });
            entries
                .into_iter()
                .map(|(_, v)| serde_json::from_value(v))
                .collect()
        }
        other => serde_json::from_value(other),
    }
}

/// `job/.../{jobId}/api/json`, reduced to the change sets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBuildDetail {
    #[serde(default)]
    pub change_sets: Vec<RawChangeSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChangeSet {
    #[serde(default)]
    pub items: Vec<RawChangeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawChangeItem {
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub author: RawAuthor,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAuthor {
    #[serde(default)]
    pub full_name: String,
}

/// `job/{p}/api/json?tree=builds[id,number,result,queueId]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBuildList {
    #[serde(default)]
    pub builds: Vec<RawQueueBuild>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQueueBuild {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub queue_id: Option<u64>,
}

/// `job/{p}/api/json?tree=jobs[name]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobList {
    #[serde(default)]
    pub jobs: Vec<RawJob>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub name: String,
}

/// `crumbIssuer/api/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCrumb {
    pub crumb: String,
    #[serde(default)]
    pub crumb_request_field: Option<String>,
}

/// `me/api/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub property: Vec<Value>,
}

impl RawUser {
    /// First `address` advertised by any user property (the mailer property).
    pub fn email(&self) -> Option<String> {
        self.property
            .iter()
            .find_map(|p| p.get("address").and_then(Value::as_str))
            .map(str::to_string)
    }
}
