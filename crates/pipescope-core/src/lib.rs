//! Pipescope Core Library
//!
//! Client-side orchestration over a Jenkins server: recent run history with
//! change sets, console log scraping, deployment listing through triggered
//! builds with queue correlation, promotions, and the bulk tag matrix.
//!
//! Every workflow takes an explicit [`WorkflowContext`] and talks to the
//! server through an injected [`CiHttpClient`], one request at a time.

pub mod bulk;
pub mod client;
pub mod config;
pub mod deployments;
pub mod error;
pub mod fakes;
pub mod history;
pub mod http;
pub mod model;
pub mod normalizer;
pub mod queue;
pub mod report;
pub mod scraper;
pub mod session;
pub mod telemetry;
pub mod urls;
pub mod wire;

pub use bulk::{deployed_tag, BulkTagAggregator};
pub use client::JenkinsClient;
pub use config::{
    PipelineEntry, PollPolicy, ScoutConfig, ScrapePatterns, SessionCredentials, WorkflowContext,
    CONFIG_ENV, DEFAULT_CONFIG_FILE,
};
pub use deployments::{
    parse_deployed_image, BuildParameters, DeploymentListingService, PromotionOutcome,
};
pub use error::{
    CiError, CiResult, ConfigError, ConfigResult, WorkflowError, WorkflowResult,
};
pub use history::{RunHistoryService, DEFAULT_RUN_LIMIT};
pub use http::{CiHttpClient, CiRequest, CiResponse};
pub use model::{
    BranchTarget, BulkTagMatrix, Commit, DeployedImage, DisplayTone, QueueCorrelation,
    RunRecord, RunSelection, RunStatus, Stage, StageDuration, UserDetails,
};
pub use normalizer::{ChangeSetFetcher, RunNormalizer};
pub use queue::{extract_queue_id, QueueCorrelationPoller, QueueState};
pub use report::{ErrorReporter, FetchFailure, SelectionStore, TracingErrorReporter};
pub use scraper::LogScraper;
pub use session::SessionService;
pub use telemetry::init_tracing;
