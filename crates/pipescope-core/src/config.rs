//! Operator configuration and the per-invocation session context.
//!
//! The on-disk document keeps the key names of the `jenkins.json` file the
//! operators already maintain; new sections are optional.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{BranchTarget, RunSelection};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PIPESCOPE_CONFIG";
/// Config file used when neither a flag nor [`CONFIG_ENV`] is given.
pub const DEFAULT_CONFIG_FILE: &str = "jenkins.json";

/// Base URL and identity used for every CI request. Read-only to the core.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub base_url: String,
    /// Basic-auth user id.
    #[serde(default)]
    pub object_id: String,
    /// Basic-auth API token.
    #[serde(default)]
    pub app_token: String,
    /// Anti-forgery token; empty until login.
    #[serde(default)]
    pub crumb: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
}

impl SessionCredentials {
    pub fn new(base_url: &str, object_id: &str, app_token: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            object_id: object_id.to_string(),
            app_token: app_token.to_string(),
            ..Self::default()
        }
    }

    pub fn with_crumb(mut self, crumb: &str) -> Self {
        self.crumb = crumb.to_string();
        self
    }

    pub fn has_identity(&self) -> bool {
        !self.object_id.is_empty() || !self.app_token.is_empty()
    }

    pub fn is_logged_in(&self) -> bool {
        !self.crumb.is_empty()
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("base_url", &self.base_url)
            .field("object_id", &self.object_id)
            .field("app_token", &"<redacted>")
            .field("crumb", &if self.crumb.is_empty() { "" } else { "<redacted>" })
            .field("user_name", &self.user_name)
            .finish()
    }
}

/// A marker regex fragment with a name for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPattern {
    pub name: String,
    pub marker: String,
}

impl NamedPattern {
    pub fn new(name: &str, marker: &str) -> Self {
        Self {
            name: name.to_string(),
            marker: marker.to_string(),
        }
    }
}

/// Ordered marker lists for the log scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapePatterns {
    #[serde(default = "default_error_patterns")]
    pub errors: Vec<NamedPattern>,
    #[serde(default = "default_deployment_patterns")]
    pub deployments: Vec<NamedPattern>,
}

fn default_error_patterns() -> Vec<NamedPattern> {
    vec![
        NamedPattern::new("error-prefix", r"ERROR:"),
        NamedPattern::new("java-exception", r"java\.lang\.Exception:"),
        NamedPattern::new("aborted", r"ABORTED"),
        NamedPattern::new("exit-code-143", r"script\sreturned\sexit\scode\s143"),
        NamedPattern::new("error", r"error"),
    ]
}

fn default_deployment_patterns() -> Vec<NamedPattern> {
    vec![NamedPattern::new("azure-registry", r"azurecr")]
}

impl Default for ScrapePatterns {
    fn default() -> Self {
        Self {
            errors: default_error_patterns(),
            deployments: default_deployment_patterns(),
        }
    }
}

/// Queue correlation timing.
///
/// The default is a single lookup after a fixed wait; `max_attempts > 1`
/// re-polls every `retry_interval_secs` until a build shows up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollPolicy {
    pub initial_wait_secs: u64,
    pub max_attempts: u32,
    pub retry_interval_secs: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_wait_secs: 13,
            max_attempts: 1,
            retry_interval_secs: 5,
        }
    }
}

impl PollPolicy {
    pub fn initial_wait(&self) -> Duration {
        Duration::from_secs(self.initial_wait_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// At least one lookup is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// A pipeline and the repository it builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEntry {
    pub name: String,
    pub repo: String,
}

/// Branches of one repo to include in the bulk tag matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTagRepo {
    #[serde(default)]
    pub branches: Vec<BranchTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutConfig {
    pub user_info: SessionCredentials,
    #[serde(rename = "pipeLineList", default)]
    pub pipelines: Vec<PipelineEntry>,
    #[serde(rename = "excludePipeLinesForCommits", default)]
    pub exclude_pipelines_for_commits: Vec<String>,
    #[serde(rename = "excludedPipeLines", default)]
    pub excluded_pipelines: Vec<String>,
    /// repo → raw branch job name → decoded branch name.
    #[serde(default)]
    pub repo_branches: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub previous_job_run: RunSelection,
    #[serde(default)]
    pub bulk_tags: BTreeMap<String, BulkTagRepo>,
    #[serde(default)]
    pub scrape_patterns: ScrapePatterns,
    #[serde(default)]
    pub polling: PollPolicy,
}

impl ScoutConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn pipeline_for_repo(&self, repo: &str) -> Option<&str> {
        self.pipelines
            .iter()
            .find(|p| p.repo == repo)
            .map(|p| p.name.as_str())
    }

    /// repo → pipeline name. The first entry wins for duplicated repos.
    pub fn pipeline_directory(&self) -> BTreeMap<String, String> {
        let mut dir = BTreeMap::new();
        for entry in &self.pipelines {
            dir.entry(entry.repo.clone())
                .or_insert_with(|| entry.name.clone());
        }
        dir
    }

    pub fn bulk_targets(&self) -> BTreeMap<String, Vec<BranchTarget>> {
        self.bulk_tags
            .iter()
            .map(|(repo, cfg)| (repo.clone(), cfg.branches.clone()))
            .collect()
    }

    pub fn context(&self) -> WorkflowContext {
        WorkflowContext {
            credentials: self.user_info.clone(),
            exclude_pipelines_for_commits: self.exclude_pipelines_for_commits.clone(),
        }
    }
}

/// Explicit session value threaded through every workflow call.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    pub credentials: SessionCredentials,
    /// Pipelines whose change sets are never fetched.
    pub exclude_pipelines_for_commits: Vec<String>,
}

impl WorkflowContext {
    pub fn new(credentials: SessionCredentials) -> Self {
        Self {
            credentials,
            exclude_pipelines_for_commits: Vec::new(),
        }
    }

    pub fn excluding_commits_for(mut self, pipeline: &str) -> Self {
        self.exclude_pipelines_for_commits.push(pipeline.to_string());
        self
    }

    pub fn should_fetch_commits(&self, pipeline: &str) -> bool {
        !self
            .exclude_pipelines_for_commits
            .iter()
            .any(|p| p == pipeline)
    }
}
