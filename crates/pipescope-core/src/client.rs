//! Jenkins HTTP client
//!
//! reqwest binding of [`CiHttpClient`]: basic auth on every request plus
//! the `Jenkins-Crumb` header unless the request is the crumb fetch itself.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde_json::Value;
use tracing::debug;

use crate::config::SessionCredentials;
use crate::error::{CiError, CiResult};
use crate::http::{AuthMode, CiHttpClient, CiRequest, CiResponse, HttpMethod, ResponseBody};

/// Header carrying the anti-forgery crumb.
pub const CRUMB_HEADER: &str = "Jenkins-Crumb";

/// Absolute URL for a path relative to the session base URL.
pub fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{}{}", base_url, path)
    } else {
        format!("{}/{}", base_url, path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Text,
    Other,
}

fn body_kind(content_type: Option<&str>) -> BodyKind {
    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    if ct.starts_with("application/json") {
        BodyKind::Json
    } else if ct.starts_with("text/plain") {
        BodyKind::Text
    } else {
        BodyKind::Other
    }
}

/// reqwest-backed client; one instance is shared by every workflow.
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    http: reqwest::Client,
}

impl JenkinsClient {
    pub fn new() -> CiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pipescope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CiHttpClient for JenkinsClient {
    async fn send(
        &self,
        credentials: &SessionCredentials,
        request: CiRequest,
    ) -> CiResult<CiResponse> {
        let url = join_url(&credentials.base_url, &request.path);
        debug!(event = "ci.request", method = request.method.as_str(), path = %request.path);

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url).json(&serde_json::json!({})),
        };
        builder = builder.basic_auth(&credentials.object_id, Some(&credentials.app_token));
        if request.auth == AuthMode::Crumb {
            builder = builder.header(CRUMB_HEADER, &credentials.crumb);
        }

        let response = builder.send().await.map_err(|e| CiError::Transport {
            path: request.path.clone(),
            detail: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CiError::Status {
                path: request.path,
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let location = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let kind = body_kind(headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()));

        let body = match kind {
            BodyKind::Json => {
                let value = response.json::<Value>().await.map_err(|e| CiError::Decode {
                    path: request.path.clone(),
                    detail: e.to_string(),
                })?;
                ResponseBody::Json(value)
            }
            BodyKind::Text => ResponseBody::Text(response.text().await?),
            BodyKind::Other => ResponseBody::Empty,
        };

        Ok(CiResponse {
            status: status.as_u16(),
            location,
            body,
        })
    }
}
