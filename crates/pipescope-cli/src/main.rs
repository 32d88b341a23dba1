//! Pipescope - Jenkins pipeline scout
//!
//! The `pipescope` command reads the operator's `jenkins.json` and talks to
//! the configured Jenkins server.
//!
//! ## Commands
//!
//! - `login`: Fetch a crumb and the user's details, save them to the config
//! - `branches`: Refresh the branch jobs of every pipeline
//! - `runs`: Show recent runs of a repo/branch
//! - `previous`: Replay the last `runs` selection
//! - `errors` / `console`: Inspect one job's console log
//! - `deployments`: Trigger the listing job and show deployed images
//! - `promote`: Submit a (bulk) promotion build
//! - `scale`: Submit a replica scaling build
//! - `bulk-tags`: Deployed tag matrix across repos and branches

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use pipescope_core::{
    BuildParameters, BulkTagAggregator, CiHttpClient, DeploymentListingService, ErrorReporter,
    JenkinsClient, LogScraper, QueueCorrelationPoller, RunHistoryService, RunRecord, RunSelection,
    ScoutConfig, SelectionStore, SessionService, TracingErrorReporter, WorkflowContext,
    CONFIG_ENV, DEFAULT_CONFIG_FILE, DEFAULT_RUN_LIMIT,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "pipescope")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Jenkins pipeline scout", long_about = None)]
struct Cli {
    /// Path to the operator config file
    #[arg(short, long, global = true, env = CONFIG_ENV, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a crumb and user details, and store them in the config
    Login,

    /// Refresh the branch listing of every pipeline
    Branches {
        /// Write the listing back to the config file
        #[arg(long)]
        save: bool,
    },

    /// Show the most recent runs of a repository's pipeline
    Runs {
        /// Repository name as listed in pipeLineList
        repo: String,

        /// Raw branch job name (omit for single-branch pipelines)
        #[arg(short, long, default_value = "")]
        branch: String,

        /// Number of runs to show
        #[arg(short, long, default_value_t = DEFAULT_RUN_LIMIT)]
        limit: usize,
    },

    /// Replay the last `runs` selection
    Previous {
        #[arg(short, long, default_value_t = DEFAULT_RUN_LIMIT)]
        limit: usize,
    },

    /// Scrape error lines from a job's console log
    Errors {
        repo: String,
        job: String,
        #[arg(short, long, default_value = "")]
        branch: String,
    },

    /// Print a job's console log
    Console {
        repo: String,
        job: String,
        #[arg(short, long, default_value = "")]
        branch: String,
    },

    /// Trigger the deployment listing job and show the deployed images
    Deployments {
        /// Listing pipeline name
        pipeline: String,

        /// Extra build parameter (KEY=VALUE, repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Submit a promotion build
    Promote {
        /// Promotion pipeline name
        pipeline: String,

        /// Build parameter (KEY=VALUE, repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Promote every configured microservice at once
        #[arg(long)]
        bulk: bool,
    },

    /// Submit a replica scaling build
    Scale {
        /// Scaling pipeline name
        pipeline: String,

        /// Target environment (dev, qa, ua)
        #[arg(short, long)]
        environment: String,

        /// Replica count
        #[arg(short, long)]
        replicas: u32,

        /// Comma-separated microservice names
        #[arg(short, long)]
        microservices: String,
    },

    /// Show the deployed tag matrix for the configured bulk repos
    BulkTags,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Writes the last selection back into the config file.
struct FileSelectionStore {
    path: PathBuf,
}

#[async_trait]
impl SelectionStore for FileSelectionStore {
    async fn persist_selection(&self, selection: &RunSelection) -> Result<()> {
        let mut config = ScoutConfig::load(&self.path)?;
        config.previous_job_run = selection.clone();
        config.save(&self.path)?;
        Ok(())
    }
}

struct Runtime {
    config_path: PathBuf,
    config: ScoutConfig,
    client: Arc<dyn CiHttpClient>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Runtime {
    fn load(config_path: &Path, client: Arc<dyn CiHttpClient>) -> Result<Self> {
        let config = ScoutConfig::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?;
        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
            client,
            reporter: Arc::new(TracingErrorReporter),
        })
    }

    fn ctx(&self) -> WorkflowContext {
        self.config.context()
    }

    fn save(&self) -> Result<()> {
        self.config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save config {}", self.config_path.display()))
    }

    fn history(&self) -> RunHistoryService {
        RunHistoryService::new(self.client.clone(), self.reporter.clone()).with_selection_store(
            Arc::new(FileSelectionStore {
                path: self.config_path.clone(),
            }),
        )
    }

    fn scraper(&self) -> Result<LogScraper> {
        LogScraper::new(&self.config.scrape_patterns).context("Invalid scrape patterns")
    }

    fn deployments(&self) -> Result<DeploymentListingService> {
        let poller = QueueCorrelationPoller::new(self.client.clone(), self.config.polling.clone());
        Ok(DeploymentListingService::new(
            self.client.clone(),
            poller,
            self.scraper()?,
        ))
    }

    fn pipeline_for(&self, repo: &str) -> Result<String> {
        self.config
            .pipeline_for_repo(repo)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Repository '{}' is not in pipeLineList", repo))
    }

    /// Display name of a raw branch job, as recorded by `branches --save`.
    fn branch_display(&self, repo: &str, raw: &str) -> String {
        self.config
            .repo_branches
            .get(repo)
            .and_then(|b| b.get(raw))
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_runs(runs: &[RunRecord], json: bool) -> Result<()> {
    if json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }
    for run in runs {
        println!("{} [{}]", run.name, run.status);
        for stage in &run.stages {
            println!("    {:<40} {:<12} {}", stage.name, stage.status, stage.duration);
        }
        for commit in &run.commits {
            println!(
                "    * {} ({}, {})",
                commit.message,
                commit.author,
                commit.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pipescope_core::init_tracing(cli.json, level);

    let client = Arc::new(JenkinsClient::new().context("Failed to build HTTP client")?);
    let mut rt = Runtime::load(&cli.config, client)?;
    let json = cli.json;

    match cli.command {
        Commands::Login => cmd_login(&mut rt, json).await,
        Commands::Branches { save } => cmd_branches(&mut rt, save, json).await,
        Commands::Runs {
            repo,
            branch,
            limit,
        } => cmd_runs(&rt, &repo, &branch, limit, json).await,
        Commands::Previous { limit } => cmd_previous(&rt, limit, json).await,
        Commands::Errors { repo, job, branch } => cmd_errors(&rt, &repo, &branch, &job, json).await,
        Commands::Console { repo, job, branch } => cmd_console(&rt, &repo, &branch, &job).await,
        Commands::Deployments { pipeline, params } => {
            cmd_deployments(&rt, &pipeline, params.into_iter().collect(), json).await
        }
        Commands::Promote {
            pipeline,
            params,
            bulk,
        } => cmd_promote(&rt, &pipeline, params.into_iter().collect(), bulk, json).await,
        Commands::Scale {
            pipeline,
            environment,
            replicas,
            microservices,
        } => {
            let params = BuildParameters::new()
                .with("ENVIRONMENT", &environment)
                .with("REPLICA", &replicas.to_string())
                .with("MICROSERVICES", &microservices);
            cmd_scale(&rt, &pipeline, params).await
        }
        Commands::BulkTags => cmd_bulk_tags(&rt, json).await,
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Fetch a crumb, then the user's details, and save both.
async fn cmd_login(rt: &mut Runtime, json: bool) -> Result<()> {
    let session = SessionService::new(rt.client.clone(), rt.reporter.clone());

    let crumb = session
        .fetch_crumb(&rt.config.user_info)
        .await
        .context("Failed to fetch crumb")?;
    rt.config.user_info.crumb = crumb;

    let user = session
        .user_details(&rt.ctx())
        .await
        .context("Failed to fetch user details")?;
    rt.config.user_info.user_name = user.full_name.clone();
    rt.config.user_info.email = user.email.clone().unwrap_or_default();
    rt.save()?;

    info!(event = "session.logged_in", user = %user.full_name);
    if json {
        return print_json(&user);
    }
    println!("Logged in as {}", user.full_name);
    if let Some(email) = &user.email {
        println!("Email: {}", email);
    }
    Ok(())
}

async fn cmd_branches(rt: &mut Runtime, save: bool, json: bool) -> Result<()> {
    let session = SessionService::new(rt.client.clone(), rt.reporter.clone());
    let repo_branches = session
        .refresh_repo_branches(&rt.ctx(), &rt.config.pipelines, &rt.config.excluded_pipelines)
        .await;

    if json {
        print_json(&repo_branches)?;
    } else {
        for (repo, branches) in &repo_branches {
            println!("{}", repo);
            for name in branches.values() {
                println!("    {}", name);
            }
        }
    }

    if save {
        rt.config.repo_branches = repo_branches;
        rt.save()?;
    }
    Ok(())
}

async fn cmd_runs(rt: &Runtime, repo: &str, branch: &str, limit: usize, json: bool) -> Result<()> {
    let selection = RunSelection {
        pipeline: rt.pipeline_for(repo)?,
        repo: repo.to_string(),
        branch_name: rt.branch_display(repo, branch),
        branch_option: branch.to_string(),
    };
    let runs = rt
        .history()
        .list_runs_for_selection(&rt.ctx(), &selection, limit)
        .await
        .with_context(|| format!("Failed to list runs of '{}'", selection.pipeline))?;
    print_runs(&runs, json)
}

async fn cmd_previous(rt: &Runtime, limit: usize, json: bool) -> Result<()> {
    let selection = &rt.config.previous_job_run;
    if !selection.is_complete() {
        println!("No previous selection. Run 'pipescope runs <repo>' first.");
        return Ok(());
    }
    let runs = rt
        .history()
        .list_recent_runs(&rt.ctx(), &selection.pipeline, &selection.branch_option, limit)
        .await
        .with_context(|| format!("Failed to list runs of '{}'", selection.pipeline))?;
    print_runs(&runs, json)
}

async fn cmd_errors(rt: &Runtime, repo: &str, branch: &str, job: &str, json: bool) -> Result<()> {
    let pipeline = rt.pipeline_for(repo)?;
    let errors = rt
        .history()
        .job_errors(&rt.ctx(), &pipeline, branch, job, &rt.scraper()?)
        .await
        .with_context(|| format!("Failed to fetch console log of {} #{}", pipeline, job))?;

    if json {
        return print_json(&errors);
    }
    if errors.is_empty() {
        println!("No errors found.");
    }
    for line in errors {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_console(rt: &Runtime, repo: &str, branch: &str, job: &str) -> Result<()> {
    let pipeline = rt.pipeline_for(repo)?;
    let text = rt
        .history()
        .console_text(&rt.ctx(), &pipeline, branch, job)
        .await
        .with_context(|| format!("Failed to fetch console log of {} #{}", pipeline, job))?;
    print!("{}", text);
    Ok(())
}

async fn cmd_deployments(
    rt: &Runtime,
    pipeline: &str,
    params: BuildParameters,
    json: bool,
) -> Result<()> {
    let images = rt
        .deployments()?
        .trigger_and_list_deployments(&rt.ctx(), pipeline, &params)
        .await
        .with_context(|| format!("Failed to list deployments via '{}'", pipeline))?;

    if json {
        return print_json(&images);
    }
    if images.is_empty() {
        println!("No deployed images reported.");
    }
    for image in images {
        println!("{:>3}  {:<40} {}", image.serial, image.microservice, image.tag);
    }
    Ok(())
}

async fn cmd_promote(
    rt: &Runtime,
    pipeline: &str,
    params: BuildParameters,
    bulk: bool,
    json: bool,
) -> Result<()> {
    let outcome = rt
        .deployments()?
        .promote(&rt.ctx(), pipeline, &params, bulk)
        .await
        .with_context(|| format!("Failed to promote via '{}'", pipeline))?;

    if json {
        return print_json(&outcome);
    }
    let kind = if bulk { "Bulk promotion" } else { "Promotion" };
    println!("{} job created on '{}'", kind, pipeline);
    Ok(())
}

async fn cmd_scale(rt: &Runtime, pipeline: &str, params: BuildParameters) -> Result<()> {
    rt.deployments()?
        .scale(&rt.ctx(), pipeline, &params)
        .await
        .with_context(|| format!("Failed to scale via '{}'", pipeline))?;
    println!("Scaling job created on '{}'", pipeline);
    Ok(())
}

async fn cmd_bulk_tags(rt: &Runtime, json: bool) -> Result<()> {
    let aggregator = BulkTagAggregator::new(Arc::new(rt.history()), rt.reporter.clone());
    let matrix = aggregator
        .aggregate(&rt.ctx(), &rt.config.pipeline_directory(), &rt.config.bulk_targets())
        .await;

    if json {
        return print_json(&matrix);
    }
    for (repo, cells) in &matrix {
        println!("{}", repo);
        for (branch, cell) in cells {
            println!("    {:<24} {}", branch, cell);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipescope_core::fakes::ScriptedCiClient;
    use pipescope_core::http::HttpMethod;
    use pipescope_core::CiResponse;
    use serde_json::json;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("jenkins.json");
        let doc = json!({
            "userInfo": {"baseUrl": "https://ci.example.com/", "objectId": "bot", "appToken": "t"},
            "pipeLineList": [
                {"name": "om-order-ci", "repo": "om-order"},
                {"name": "bulk-tags", "repo": "bulk"}
            ],
            "excludePipeLinesForCommits": ["om-order-ci"],
            "excludedPipeLines": ["bulk-tags"],
            "repoBranches": {"om-order": {"feature%2Fx": "feature/x"}}
        });
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        path
    }

    fn runtime(path: &Path, client: Arc<ScriptedCiClient>) -> Runtime {
        Runtime::load(path, client).unwrap()
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("ENVIRONMENT=qa").unwrap(),
            ("ENVIRONMENT".to_string(), "qa".to_string())
        );
        assert_eq!(parse_param("A=b=c").unwrap().1, "b=c");
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_cli_parses_runs() {
        let cli = Cli::try_parse_from(["pipescope", "runs", "om-order", "-b", "develop", "-l", "3"])
            .unwrap();
        match cli.command {
            Commands::Runs {
                repo,
                branch,
                limit,
            } => {
                assert_eq!(repo, "om-order");
                assert_eq!(branch, "develop");
                assert_eq!(limit, 3);
            }
            _ => panic!("expected runs"),
        }
    }

    #[tokio::test]
    async fn test_scale_builds_replica_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let client = Arc::new(ScriptedCiClient::new());
        client.respond(
            HttpMethod::Post,
            "job/scale-ci/buildWithParameters?ENVIRONMENT=dev&REPLICA=2&MICROSERVICES=om-order",
            CiResponse::created("https://ci.example.com/queue/item/5/"),
        );
        let params = BuildParameters::new()
            .with("ENVIRONMENT", "dev")
            .with("REPLICA", "2")
            .with("MICROSERVICES", "om-order");

        let rt = runtime(&path, client.clone());
        cmd_scale(&rt, "scale-ci", params).await.unwrap();
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_login_saves_crumb_and_user() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let client = Arc::new(ScriptedCiClient::new());
        client
            .respond(
                HttpMethod::Get,
                "crumbIssuer/api/json",
                CiResponse::json(json!({"crumb": "abc123", "crumbRequestField": "Jenkins-Crumb"})),
            )
            .respond(
                HttpMethod::Post,
                "me/api/json",
                CiResponse::json(json!({"fullName": "Dana Ops", "property": [{"address": "d@x.io"}]})),
            );

        let mut rt = runtime(&path, client);
        cmd_login(&mut rt, false).await.unwrap();

        let saved = ScoutConfig::load(&path).unwrap();
        assert_eq!(saved.user_info.crumb, "abc123");
        assert_eq!(saved.user_info.user_name, "Dana Ops");
        assert_eq!(saved.user_info.email, "d@x.io");
    }

    #[tokio::test]
    async fn test_runs_persists_selection_for_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let client = Arc::new(ScriptedCiClient::new());
        client.respond(
            HttpMethod::Post,
            "job/om-order-ci/job/feature%2Fx/wfapi/runs",
            CiResponse::json(json!([{"id": "4", "name": "#4", "status": "SUCCESS", "stages": []}])),
        );

        let rt = runtime(&path, client.clone());
        cmd_runs(&rt, "om-order", "feature%2Fx", 5, true).await.unwrap();

        let saved = ScoutConfig::load(&path).unwrap();
        assert_eq!(saved.previous_job_run.pipeline, "om-order-ci");
        assert_eq!(saved.previous_job_run.branch_name, "feature/x");

        let rt = runtime(&path, client.clone());
        cmd_previous(&rt, 5, false).await.unwrap();
        assert_eq!(
            client.count(HttpMethod::Post, "job/om-order-ci/job/feature%2Fx/wfapi/runs"),
            2
        );
    }

    #[tokio::test]
    async fn test_unknown_repo_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let rt = runtime(&path, Arc::new(ScriptedCiClient::new()));
        let err = cmd_runs(&rt, "nope", "", 5, false).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_branches_save_skips_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let client = Arc::new(ScriptedCiClient::new());
        client.respond(
            HttpMethod::Post,
            "job/om-order-ci/api/json?tree=jobs[name]",
            CiResponse::json(json!({"jobs": [{"name": "develop"}]})),
        );

        let mut rt = runtime(&path, client.clone());
        cmd_branches(&mut rt, true, false).await.unwrap();

        let saved = ScoutConfig::load(&path).unwrap();
        assert_eq!(saved.repo_branches["om-order"]["develop"], "develop");
        assert_eq!(client.requests().len(), 1);
    }
}
