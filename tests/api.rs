use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use fraudgate::api::{create_router, AppState};
use fraudgate::app::Services;
use fraudgate::audit::MemoryAuditSink;
use fraudgate::feed::{self, FeedSettings};
use fraudgate::policy::{PolicyLoader, PolicyWatcher};
use fraudgate::storage::Stores;
use fraudgate::velocity::VelocityConfig;

const POLICY: &str = r#"
policy_id: "api-v1"
rules:
  - id: betting_iban_tr99
    type: BETTING_IBAN_PREFIX
    value: "TR99"
    severity: HIGH
    action: BLOCK_CREDIT
"#;

fn app() -> (Router, NamedTempFile) {
    let mut policy_file = NamedTempFile::new().unwrap();
    writeln!(policy_file, "{}", POLICY).unwrap();

    let (stores, _) = Stores::memory();
    let policy = Arc::new(PolicyWatcher::load(PolicyLoader::new(policy_file.path())));
    let services = Services::build(
        stores,
        policy,
        VelocityConfig::default(),
        Duration::from_secs(5),
        Arc::new(MemoryAuditSink::new()),
    )
    .unwrap();
    let (producer, _consumer) = feed::channel(services.pipeline.clone(), FeedSettings::default());

    let state = Arc::new(AppState {
        services,
        feed: producer,
        database: None,
        metrics: None,
        start_time: Instant::now(),
        version: "test".to_string(),
    });
    (create_router(state), policy_file)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn betting_event(event_id: &str) -> Value {
    json!({
        "eventId": event_id,
        "customerNo": "C1",
        "fromAccount": "TR000001",
        "toAccount": "TR990042",
        "amountCents": 2500,
        "currency": "TRY",
        "channel": "mobile",
        "description": "transfer"
    })
}

#[tokio::test]
async fn test_detection_then_maker_checker_unblock() {
    let (app, _policy) = app();

    let (status, outcome) = send(&app, "POST", "/v1/events", Some(betting_event("evt-1"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(outcome["creditBlocked"], true);
    let case_id = outcome["cases"][0].as_str().unwrap().to_string();

    let (_, risk) = send(&app, "GET", "/v1/customers/C1/risk", None).await;
    assert_eq!(risk["credit_blocked"], true);
    assert_eq!(risk["block_reason"], "Policy hit: betting_iban_tr99");

    let (status, request) = send(
        &app,
        "POST",
        "/v1/admin/customers/C1/request-unblock-credit",
        Some(json!({ "maker": "alice", "reason": "customer verified" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "PENDING");
    assert_eq!(request["case_id"], case_id.as_str());
    let id = request["id"].as_str().unwrap().to_string();

    let approve = format!("/v1/actions/{id}/approve");
    let (status, body) = send(&app, "POST", &approve, Some(json!({ "checker": "alice" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let (status, risk) = send(
        &app,
        "POST",
        &approve,
        Some(json!({ "checker": "bob", "note": "ok" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(risk["credit_blocked"], false);

    let (status, body) = send(&app, "POST", &approve, Some(json!({ "checker": "bob" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (_, executed) = send(&app, "GET", "/v1/actions?status=EXECUTED", None).await;
    assert_eq!(executed.as_array().unwrap().len(), 1);

    let (status, timeline) = send(&app, "GET", &format!("/v1/cases/{case_id}/timeline"), None).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = timeline
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["code"].as_str())
        .collect();
    assert_eq!(
        codes,
        vec![
            "CASE_OPENED",
            "betting_iban_tr99",
            "REQUEST_UNBLOCK_CREDIT",
            "APPROVE_UNBLOCK_CREDIT",
            "EXECUTE_UNBLOCK_CREDIT",
        ]
    );
}

#[tokio::test]
async fn test_redelivered_event_is_idempotent() {
    let (app, _policy) = app();

    let (_, first) = send(&app, "POST", "/v1/events", Some(betting_event("evt-7"))).await;
    let (status, second) = send(&app, "POST", "/v1/events", Some(betting_event("evt-7"))).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["alerts"], second["alerts"]);

    let case_id = first["cases"][0].as_str().unwrap();
    let (_, timeline) = send(&app, "GET", &format!("/v1/cases/{case_id}/timeline"), None).await;
    assert_eq!(timeline.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_whitelist_admin_and_hard_bypass() {
    let (app, _policy) = app();

    let (status, entry) = send(
        &app,
        "POST",
        "/v1/whitelist",
        Some(json!({
            "type": "CUSTOMER",
            "value": "C1",
            "reason": "payroll",
            "created_by": "ops",
            "ticket_ref": "OPS-42"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["hard_bypass"], true);

    let (_, outcome) = send(&app, "POST", "/v1/events", Some(betting_event("evt-2"))).await;
    assert_eq!(outcome["bypassed"], true);
    assert_eq!(outcome["alerts"].as_array().unwrap().len(), 0);

    let (_, listed) = send(&app, "GET", "/v1/whitelist?type=CUSTOMER", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let delete = format!("/v1/whitelist/{}?actor=ops", entry["id"].as_str().unwrap());
    let (status, _) = send(&app, "DELETE", &delete, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "DELETE", &delete, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_case_status_and_notes() {
    let (app, _policy) = app();
    let (_, outcome) = send(&app, "POST", "/v1/events", Some(betting_event("evt-3"))).await;
    let case_id = outcome["cases"][0].as_str().unwrap().to_string();

    let (status, case) = send(
        &app,
        "POST",
        &format!("/v1/cases/{case_id}/status"),
        Some(json!({ "status": "INVESTIGATING", "actor": "analyst" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(case["status"], "INVESTIGATING");

    let (status, note) = send(
        &app,
        "POST",
        &format!("/v1/cases/{case_id}/notes"),
        Some(json!({ "actor": "analyst", "note": "called the customer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["code"], "ANALYST_NOTE");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/cases/{case_id}/status"),
        Some(json!({ "status": "ARCHIVED", "actor": "analyst" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_policy_reload_endpoint() {
    let (app, policy) = app();
    std::fs::write(policy.path(), "policy_id: \"api-v2\"\nrules: []\n").unwrap();

    let (status, body) = send(&app, "POST", "/v1/admin/policy/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["policy_version"], "api-v2");

    std::fs::write(policy.path(), "rules: [").unwrap();
    let (status, _) = send(&app, "POST", "/v1/admin/policy/reload", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["policy_version"], "api-v2");
}

#[tokio::test]
async fn test_event_without_id_is_bad_request() {
    let (app, _policy) = app();

    let (status, body) = send(&app, "POST", "/v1/events", Some(betting_event(""))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let (_, risk) = send(&app, "GET", "/v1/customers/C1/risk", None).await;
    assert_eq!(risk["credit_blocked"], false);
}
