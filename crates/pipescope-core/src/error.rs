//! Error types for CI fetches and operator workflows.

use thiserror::Error;

/// A single request against the CI server failed.
///
/// These are recovered locally by the component that issued the request
/// whenever the enclosing workflow can continue without the result.
#[derive(Debug, Error)]
pub enum CiError {
    /// The request never produced a response.
    #[error("request to {path} failed: {detail}")]
    Transport { path: String, detail: String },

    /// The server answered with a non-success status.
    #[error("request to {path} returned HTTP {status}")]
    Status { path: String, status: u16 },

    /// The response body could not be decoded into the expected shape.
    #[error("could not decode response from {path}: {detail}")]
    Decode { path: String, detail: String },

    /// The response carried a body of the wrong kind (e.g. text instead of JSON).
    #[error("response from {path} was not {expected}")]
    UnexpectedBody { path: String, expected: &'static str },

    /// A queue location header did not contain a numeric queue id.
    #[error("queue location has no queue id: {location}")]
    QueueLocation { location: String },
}

impl CiError {
    /// Whether a manual retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CiError::Transport { .. } | CiError::Status { .. })
    }
}

impl From<reqwest::Error> for CiError {
    fn from(err: reqwest::Error) -> Self {
        let path = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        CiError::Transport {
            path,
            detail: err.to_string(),
        }
    }
}

/// Terminal outcome of one trigger/list workflow invocation.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The parameterized build was not accepted (anything but HTTP 201).
    #[error("job not created for pipeline {pipeline} (HTTP {status})")]
    JobNotCreated { pipeline: String, status: u16 },

    /// No build carried the captured queue id after the configured polls.
    #[error("no build found for pipeline {pipeline} with queue id {queue_id}")]
    NoBuildFound { pipeline: String, queue_id: u64 },

    /// A repository has no pipeline mapping in the configuration.
    #[error("no pipeline configured for repo {repo}")]
    UnknownRepository { repo: String },

    #[error(transparent)]
    Ci(#[from] CiError),
}

/// Errors raised while loading or saving configuration.
impl WorkflowError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkflowError::Ci(e) if e.is_transient())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid scrape pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

pub type CiResult<T> = std::result::Result<T, CiError>;
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_displays_path_and_code() {
        let err = CiError::Status {
            path: "job/app/wfapi/runs".to_string(),
            status: 503,
        };
        let msg = err.to_string();
        assert!(msg.contains("job/app/wfapi/runs"));
        assert!(msg.contains("503"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_decode_error_is_not_transient() {
        let err = CiError::Decode {
            path: "me/api/json".to_string(),
            detail: "missing field".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_no_build_found_displays_queue_id() {
        let err = WorkflowError::NoBuildFound {
            pipeline: "OpenShift-List-Deployments".to_string(),
            queue_id: 99,
        };
        let msg = err.to_string();
        assert!(msg.contains("OpenShift-List-Deployments"));
        assert!(msg.contains("99"));
    }

    #[test]
    fn test_ci_error_converts_into_workflow_error() {
        let err: WorkflowError = CiError::QueueLocation {
            location: "http://ci/queue/".to_string(),
        }
        .into();
        assert!(matches!(err, WorkflowError::Ci(CiError::QueueLocation { .. })));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_workflow_transience_follows_ci_error() {
        let err = WorkflowError::from(CiError::Status {
            path: "job/app/wfapi/runs".to_string(),
            status: 502,
        });
        assert!(err.is_transient());
        assert!(!WorkflowError::UnknownRepository { repo: "om-x".to_string() }.is_transient());
    }
}
