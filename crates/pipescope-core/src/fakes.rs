//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedCiClient`, `RecordingReporter` and
//! `MemorySelectionStore` so workflows can be exercised without a CI server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::SessionCredentials;
use crate::error::{CiError, CiResult};
use crate::http::{CiHttpClient, CiRequest, CiResponse, HttpMethod};
use crate::model::RunSelection;
use crate::report::{ErrorReporter, FetchFailure, SelectionStore};

// ---------------------------------------------------------------------------
// ScriptedCiClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Respond(CiResponse),
    Status(u16),
    Transport(String),
}

/// CI client answering from a script keyed by method and path.
///
/// Replies for a key are consumed in order; the last one keeps answering.
/// Unscripted requests fail with HTTP 404.
#[derive(Debug, Default)]
pub struct ScriptedCiClient {
    replies: Mutex<HashMap<(HttpMethod, String), VecDeque<Reply>>>,
    log: Mutex<Vec<CiRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCiClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: HttpMethod, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, method: HttpMethod, path: &str, response: CiResponse) -> &Self {
        self.push(method, path, Reply::Respond(response));
        self
    }

    pub fn fail_status(&self, method: HttpMethod, path: &str, status: u16) -> &Self {
        self.push(method, path, Reply::Status(status));
        self
    }

    pub fn fail_transport(&self, method: HttpMethod, path: &str, detail: &str) -> &Self {
        self.push(method, path, Reply::Transport(detail.to_string()));
        self
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<CiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Highest number of requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, method: HttpMethod, path: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl CiHttpClient for ScriptedCiClient {
    async fn send(
        &self,
        _credentials: &SessionCredentials,
        request: CiRequest,
    ) -> CiResult<CiResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(request.clone());

        // Let any concurrently issued request overlap with this one.
        tokio::task::yield_now().await;

        let reply = self.next_reply(request.method, &request.path);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Status(status)) => Err(CiError::Status {
                path: request.path,
                status,
            }),
            Some(Reply::Transport(detail)) => Err(CiError::Transport {
                path: request.path,
                detail,
            }),
            None => Err(CiError::Status {
                path: request.path,
                status: 404,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Owned copy of a reported [`FetchFailure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFailure {
    pub pipeline: String,
    pub branch: String,
    pub job_id: Option<String>,
    pub error: String,
    pub transient: bool,
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    failures: Mutex<Vec<RecordedFailure>>,
}

impl RecordingReporter {
    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, failure: &FetchFailure<'_>) {
        self.failures.lock().unwrap().push(RecordedFailure {
            pipeline: failure.pipeline.to_string(),
            branch: failure.branch.to_string(),
            job_id: failure.job_id.map(str::to_string),
            error: failure.error.to_string(),
            transient: failure.error.is_transient(),
        });
    }
}

// ---------------------------------------------------------------------------
// MemorySelectionStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    saved: Mutex<Vec<RunSelection>>,
}

impl MemorySelectionStore {
    pub fn saved(&self) -> Vec<RunSelection> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SelectionStore for MemorySelectionStore {
    async fn persist_selection(&self, selection: &RunSelection) -> anyhow::Result<()> {
        self.saved.lock().unwrap().push(selection.clone());
        Ok(())
    }
}
