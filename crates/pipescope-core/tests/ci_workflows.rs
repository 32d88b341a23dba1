//! End-to-end workflows against a scripted CI server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pipescope_core::fakes::{RecordingReporter, ScriptedCiClient};
use pipescope_core::http::HttpMethod;
use pipescope_core::model::BranchTarget;
use pipescope_core::{
    BuildParameters, BulkTagAggregator, CiResponse, DeploymentListingService, DisplayTone,
    LogScraper, PollPolicy, QueueCorrelationPoller, RunHistoryService, ScrapePatterns,
    SessionCredentials, WorkflowContext, WorkflowError,
};
use serde_json::{json, Value};

const LISTING: &str = "OpenShift-List-Deployments";
const LISTING_BUILDS: &str =
    "job/OpenShift-List-Deployments/api/json?tree=builds[id,number,result,queueId]";
const LISTING_SUBMIT: &str =
    "job/OpenShift-List-Deployments/buildWithParameters?ENVIRONMENT=qa&NAMESPACE=production&COLUMNS=IMAGE";
const LISTING_CONSOLE: &str = "job/OpenShift-List-Deployments/4/consoleText";

fn ctx() -> WorkflowContext {
    WorkflowContext::new(SessionCredentials::new("https://ci.example.com/", "bot", "t0ken").with_crumb("c"))
}

fn runs(ids: &[u32]) -> Value {
    json!(ids
        .iter()
        .map(|id| json!({
            "id": id.to_string(),
            "name": format!("#{}", id),
            "status": "SUCCESS",
            "stages": [{"name": "Build", "status": "SUCCESS", "durationMillis": 125000}]
        }))
        .collect::<Vec<_>>())
}

fn change_set(msg: &str) -> CiResponse {
    CiResponse::json(json!({"changeSets": [{"items": [
        {"msg": msg, "author": {"fullName": "Dana Ops"}, "timestamp": 1_700_000_000_000i64}
    ]}]}))
}

fn history(client: &Arc<ScriptedCiClient>, reporter: &Arc<RecordingReporter>) -> RunHistoryService {
    RunHistoryService::new(client.clone(), reporter.clone())
}

fn listing_service(client: &Arc<ScriptedCiClient>) -> DeploymentListingService {
    DeploymentListingService::new(
        client.clone(),
        QueueCorrelationPoller::new(client.clone(), PollPolicy::default()),
        LogScraper::new(&ScrapePatterns::default()).unwrap(),
    )
}

fn queue_builds() -> CiResponse {
    CiResponse::json(json!({"builds": [
        {"id": "3", "number": 3, "result": "SUCCESS", "queueId": 10},
        {"id": "4", "number": 4, "result": null, "queueId": 11}
    ]}))
}

// ---------------------------------------------------------------------------
// Run history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_branch_optional_paths_yield_identical_records() {
    let client = Arc::new(ScriptedCiClient::new());
    client
        .respond(HttpMethod::Post, "job/app/wfapi/runs", CiResponse::json(runs(&[2, 1])))
        .respond(HttpMethod::Post, "job/app/job/main/wfapi/runs", CiResponse::json(runs(&[2, 1])))
        .respond(HttpMethod::Post, "job/app/2/api/json", change_set("fix"))
        .respond(HttpMethod::Post, "job/app/1/api/json", change_set("init"))
        .respond(HttpMethod::Post, "job/app/job/main/2/api/json", change_set("fix"))
        .respond(HttpMethod::Post, "job/app/job/main/1/api/json", change_set("init"));
    let reporter = Arc::new(RecordingReporter::default());
    let svc = history(&client, &reporter);

    let plain = svc.list_recent_runs(&ctx(), "app", "", 5).await.unwrap();
    let branched = svc.list_recent_runs(&ctx(), "app", "main", 5).await.unwrap();

    assert_eq!(plain, branched);
    assert_eq!(plain[0].commits[0].message, "fix");
    assert_eq!(plain[0].stages[0].duration.to_string(), "2m 5s");
    assert_eq!(
        client.paths(),
        vec![
            "job/app/wfapi/runs",
            "job/app/2/api/json",
            "job/app/1/api/json",
            "job/app/job/main/wfapi/runs",
            "job/app/job/main/2/api/json",
            "job/app/job/main/1/api/json",
        ]
    );
    assert!(reporter.failures().is_empty());
}

#[tokio::test]
async fn test_one_change_set_failure_keeps_all_runs() {
    let client = Arc::new(ScriptedCiClient::new());
    client.respond(
        HttpMethod::Post,
        "job/app/job/main/wfapi/runs",
        CiResponse::json(runs(&[5, 4, 3, 2, 1])),
    );
    for id in [5, 4, 2, 1] {
        client.respond(
            HttpMethod::Post,
            &format!("job/app/job/main/{}/api/json", id),
            change_set(&format!("change {}", id)),
        );
    }
    client.fail_status(HttpMethod::Post, "job/app/job/main/3/api/json", 500);
    let reporter = Arc::new(RecordingReporter::default());

    let records = history(&client, &reporter)
        .list_recent_runs(&ctx(), "app", "main", 5)
        .await
        .unwrap();

    assert_eq!(records.len(), 5);
    let empty: Vec<_> = records
        .iter()
        .filter(|r| r.commits.is_empty())
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(empty, vec!["#3"]);

    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].job_id.as_deref(), Some("3"));
    assert_eq!(failures[0].branch, "main");
    assert!(failures[0].transient);
}

#[tokio::test]
async fn test_requests_are_issued_one_at_a_time() {
    let client = Arc::new(ScriptedCiClient::new());
    client.respond(
        HttpMethod::Post,
        "job/app/job/main/wfapi/runs",
        CiResponse::json(runs(&[5, 4, 3, 2, 1])),
    );
    for id in 1..=5 {
        client.respond(
            HttpMethod::Post,
            &format!("job/app/job/main/{}/api/json", id),
            change_set("c"),
        );
    }
    let reporter = Arc::new(RecordingReporter::default());

    history(&client, &reporter)
        .list_recent_runs(&ctx(), "app", "main", 5)
        .await
        .unwrap();

    assert_eq!(client.requests().len(), 6);
    assert_eq!(client.max_in_flight(), 1);
}

// ---------------------------------------------------------------------------
// Deployment listing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_trigger_and_list_deployments() {
    let client = Arc::new(ScriptedCiClient::new());
    client
        .respond(
            HttpMethod::Post,
            LISTING_SUBMIT,
            CiResponse::created("https://ci.example.com/queue/item/11/"),
        )
        .respond(HttpMethod::Get, LISTING_BUILDS, queue_builds())
        .respond(
            HttpMethod::Post,
            LISTING_CONSOLE,
            CiResponse::text(
                "IMAGE\nacme.azurecr.io/om-order:dev-67EC11\nacme.azurecr.io/om-rate:qa-12AB34\nFinished: SUCCESS\n",
            ),
        );
    let params = BuildParameters::new()
        .with("ENVIRONMENT", "qa")
        .with("NAMESPACE", "staging");

    let started = tokio::time::Instant::now();
    let images = listing_service(&client)
        .trigger_and_list_deployments(&ctx(), LISTING, &params)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(13));
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].microservice, "om-order");
    assert_eq!(images[0].tag, "67EC11");
    assert_eq!(images[0].tone, DisplayTone::Primary);
    assert_eq!(images[1].serial, 2);
    assert_eq!(images[1].microservice, "om-rate");
    assert_eq!(images[1].tone, DisplayTone::Secondary);
    assert_eq!(client.paths(), vec![LISTING_SUBMIT, LISTING_BUILDS, LISTING_CONSOLE]);
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_queue_never_reads_console() {
    let client = Arc::new(ScriptedCiClient::new());
    client
        .respond(
            HttpMethod::Post,
            LISTING_SUBMIT,
            CiResponse::created("https://ci.example.com/queue/item/99/"),
        )
        .respond(HttpMethod::Get, LISTING_BUILDS, queue_builds());
    let params = BuildParameters::new().with("ENVIRONMENT", "qa");

    let err = listing_service(&client)
        .trigger_and_list_deployments(&ctx(), LISTING, &params)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::NoBuildFound { queue_id: 99, .. }));
    assert_eq!(client.count(HttpMethod::Post, LISTING_CONSOLE), 0);
}

#[tokio::test(start_paused = true)]
async fn test_submit_without_201_is_job_not_created() {
    let client = Arc::new(ScriptedCiClient::new());
    client.respond(HttpMethod::Post, LISTING_SUBMIT, CiResponse::empty(200));
    let params = BuildParameters::new().with("ENVIRONMENT", "qa");

    let err = listing_service(&client)
        .trigger_and_list_deployments(&ctx(), LISTING, &params)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::JobNotCreated { status: 200, .. }));
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_created_without_location_is_rejected() {
    let client = Arc::new(ScriptedCiClient::new());
    client.respond(HttpMethod::Post, LISTING_SUBMIT, CiResponse::empty(201));
    let params = BuildParameters::new().with("ENVIRONMENT", "qa");

    let err = listing_service(&client)
        .trigger_and_list_deployments(&ctx(), LISTING, &params)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Ci(pipescope_core::CiError::QueueLocation { .. })
    ));
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn test_scale_submits_replica_build() {
    let client = Arc::new(ScriptedCiClient::new());
    client.respond(
        HttpMethod::Post,
        "job/service-scale/buildWithParameters?ENVIRONMENT=qa&REPLICA=3&MICROSERVICES=om-order%2Com-rate",
        CiResponse::created("https://ci.example.com/queue/item/21/"),
    );
    let params = BuildParameters::new()
        .with("ENVIRONMENT", "qa")
        .with("REPLICA", "3")
        .with("MICROSERVICES", "om-order,om-rate");

    listing_service(&client)
        .scale(&ctx(), "service-scale", &params)
        .await
        .unwrap();
    assert_eq!(client.requests().len(), 1);

    client.respond(
        HttpMethod::Post,
        "job/service-scale/buildWithParameters?ENVIRONMENT=ua",
        CiResponse::empty(200),
    );
    let err = listing_service(&client)
        .scale(&ctx(), "service-scale", &BuildParameters::new().with("ENVIRONMENT", "ua"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::JobNotCreated { status: 200, .. }));
}

#[tokio::test]
async fn test_promotion_reports_bulk_flag() {
    let client = Arc::new(ScriptedCiClient::new());
    client.respond(
        HttpMethod::Post,
        "job/promote-all/buildWithParameters?FROM=qa&TO=ua",
        CiResponse::created("https://ci.example.com/queue/item/12/"),
    );
    let params = BuildParameters::new().with("FROM", "qa").with("TO", "ua");

    let outcome = listing_service(&client)
        .promote(&ctx(), "promote-all", &params, true)
        .await
        .unwrap();
    assert_eq!(outcome, pipescope_core::PromotionOutcome::Promoted { bulk: true });

    client.fail_status(HttpMethod::Post, "job/promote-one/buildWithParameters?", 403);
    let err = listing_service(&client)
        .promote(&ctx(), "promote-one", &BuildParameters::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::JobNotCreated { status: 403, .. }));
}

// ---------------------------------------------------------------------------
// Bulk tag matrix
// ---------------------------------------------------------------------------

fn deploy_runs(entries: &[(&str, &[&str])]) -> CiResponse {
    CiResponse::json(json!(entries
        .iter()
        .map(|(name, stages)| json!({
            "id": name.trim_start_matches('#'),
            "name": name,
            "status": "SUCCESS",
            "stages": stages
                .iter()
                .map(|s| json!({"name": s, "status": "SUCCESS", "durationMillis": 1000}))
                .collect::<Vec<_>>()
        }))
        .collect::<Vec<_>>()))
}

fn targets(entries: &[(&str, &str)]) -> BTreeMap<String, Vec<BranchTarget>> {
    let mut targets: BTreeMap<String, Vec<BranchTarget>> = BTreeMap::new();
    for (repo, branch) in entries {
        targets.entry(repo.to_string()).or_default().push(BranchTarget {
            name: branch.to_string(),
            raw: branch.to_string(),
        });
    }
    targets
}

fn directory() -> BTreeMap<String, String> {
    [("om-order", "om-order-ci"), ("om-rate", "om-rate-ci")]
        .into_iter()
        .map(|(r, p)| (r.to_string(), p.to_string()))
        .collect()
}

#[tokio::test]
async fn test_bulk_matrix_reads_deploy_stage() {
    let client = Arc::new(ScriptedCiClient::new());
    client
        .respond(
            HttpMethod::Post,
            "job/om-order-ci/job/develop/wfapi/runs",
            deploy_runs(&[("#5", &["Build"]), ("#4", &["Build", "Deploy to QA"])]),
        )
        .respond(
            HttpMethod::Post,
            "job/om-rate-ci/job/develop/wfapi/runs",
            deploy_runs(&[("#9", &["Deploy to QA"])]),
        );
    let reporter = Arc::new(RecordingReporter::default());
    let aggregator = BulkTagAggregator::new(Arc::new(history(&client, &reporter)), reporter.clone());

    let matrix = aggregator
        .aggregate(
            &ctx(),
            &directory(),
            &targets(&[("om-order", "develop"), ("om-rate", "develop")]),
        )
        .await;

    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix["om-order"]["develop"], "#4 - QA");
    assert_eq!(matrix["om-rate"]["develop"], "#9 - QA");
    assert!(reporter.failures().is_empty());
    assert_eq!(client.max_in_flight(), 1);
}

#[tokio::test]
async fn test_bulk_matrix_isolates_failures() {
    let client = Arc::new(ScriptedCiClient::new());
    client
        .respond(
            HttpMethod::Post,
            "job/om-order-ci/job/develop/wfapi/runs",
            deploy_runs(&[("#7", &["Deploy to UA 1A2B3C"])]),
        )
        .respond(HttpMethod::Post, "job/om-order-ci/job/release/wfapi/runs", CiResponse::json(json!([])))
        .fail_transport(HttpMethod::Post, "job/om-rate-ci/job/develop/wfapi/runs", "connection reset");
    let reporter = Arc::new(RecordingReporter::default());
    let aggregator = BulkTagAggregator::new(Arc::new(history(&client, &reporter)), reporter.clone());

    let matrix = aggregator
        .aggregate(
            &ctx(),
            &directory(),
            &targets(&[
                ("om-order", "develop"),
                ("om-order", "release"),
                ("om-rate", "develop"),
                ("unmapped", "main"),
            ]),
        )
        .await;

    assert_eq!(matrix["om-order"]["develop"], "#7 - 1A2B3C");
    assert_eq!(matrix["om-order"]["release"], "");
    assert!(matrix["om-rate"].is_empty());
    assert!(matrix["unmapped"].is_empty());

    let failures = reporter.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].pipeline, "om-rate-ci");
    assert!(failures[0].transient);
    assert_eq!(failures[1].pipeline, "");
    assert!(failures[1].error.contains("unmapped"));
    assert!(!failures[1].transient);
    assert_eq!(client.requests().len(), 3);
}
