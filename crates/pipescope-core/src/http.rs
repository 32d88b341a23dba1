//! The HTTP collaborator seam.
//!
//! Every CI request in the crate goes through [`CiHttpClient`]. The
//! reqwest binding lives in [`crate::client`]; tests use
//! [`crate::fakes::ScriptedCiClient`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::SessionCredentials;
use crate::error::{CiError, CiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// How a request authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Basic auth plus the anti-forgery crumb header.
    Crumb,
    /// Basic auth only; used to obtain the crumb itself.
    BasicOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiRequest {
    /// Path relative to the session base URL.
    pub path: String,
    pub method: HttpMethod,
    pub auth: AuthMode,
}

impl CiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Get,
            auth: AuthMode::Crumb,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Post,
            auth: AuthMode::Crumb,
        }
    }

    pub fn basic_only(mut self) -> Self {
        self.auth = AuthMode::BasicOnly;
        self
    }
}

/// Body decoded according to the response content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CiResponse {
    pub status: u16,
    /// `Location` header, set by Jenkins when a build is queued.
    pub location: Option<String>,
    pub body: ResponseBody,
}

impl CiResponse {
    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            location: None,
            body: ResponseBody::Json(value),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            status: 200,
            location: None,
            body: ResponseBody::Text(text.into()),
        }
    }

    pub fn created(location: impl Into<String>) -> Self {
        Self {
            status: 201,
            location: Some(location.into()),
            body: ResponseBody::Empty,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            location: None,
            body: ResponseBody::Empty,
        }
    }

    pub fn into_json(self, path: &str) -> CiResult<Value> {
        match self.body {
            ResponseBody::Json(value) => Ok(value),
            _ => Err(CiError::UnexpectedBody {
                path: path.to_string(),
                expected: "json",
            }),
        }
    }

    /// Decode the JSON body into `T`.
    pub fn decode<T: DeserializeOwned>(self, path: &str) -> CiResult<T> {
        let value = self.into_json(path)?;
        serde_json::from_value(value).map_err(|e| CiError::Decode {
            path: path.to_string(),
            detail: e.to_string(),
        })
    }

    pub fn into_text(self, path: &str) -> CiResult<String> {
        match self.body {
            ResponseBody::Text(text) => Ok(text),
            _ => Err(CiError::UnexpectedBody {
                path: path.to_string(),
                expected: "text",
            }),
        }
    }
}

/// Sends one request to the CI server.
///
/// Implementations must surface the status code and `Location` header
/// even when the body is neither JSON nor text.
#[async_trait]
pub trait CiHttpClient: Send + Sync {
    async fn send(
        &self,
        credentials: &SessionCredentials,
        request: CiRequest,
    ) -> CiResult<CiResponse>;
}
