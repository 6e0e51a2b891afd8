use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::Services;
use crate::domain::{
    CaseId, CustomerNo, RequestId, TransactionEvent, WhitelistId, WhitelistUpsert,
};
use crate::error::{FraudError, FraudResult};
use crate::feed::FeedProducer;
use crate::storage::PostgresStore;
use crate::workflow::parse_action_type;

use super::request::{
    ActorQuery, AdminActionRequest, CaseNoteRequest, CaseStatusRequest, CreateActionRequest,
    ListActionsQuery, ReviewRequest, WhitelistQuery,
};
use super::response::{
    ErrorResponse, HealthResponse, PolicyReloadResponse, QueuedResponse, ReadyResponse,
};

/// Shared application state.
pub struct AppState {
    pub services: Services,

    /// Publishing side of the in-process feed
    pub feed: FeedProducer,

    /// Database checked for readiness; `None` with in-memory stores
    pub database: Option<Arc<PostgresStore>>,

    /// Prometheus exposition handle, when the recorder is installed
    pub metrics: Option<PrometheusHandle>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/events", post(handle_event))
        .route("/v1/feed", post(handle_feed))
        .route("/v1/actions", get(handle_list_actions))
        .route("/v1/actions/request", post(handle_create_action))
        .route("/v1/actions/:id/approve", post(handle_approve))
        .route("/v1/actions/:id/reject", post(handle_reject))
        .route(
            "/v1/admin/customers/:customer_no/request-block-credit",
            post(handle_request_block),
        )
        .route(
            "/v1/admin/customers/:customer_no/request-unblock-credit",
            post(handle_request_unblock),
        )
        .route("/v1/admin/policy/reload", post(handle_policy_reload))
        .route(
            "/v1/whitelist",
            get(handle_list_whitelist).post(handle_upsert_whitelist),
        )
        .route("/v1/whitelist/:id", delete(handle_delete_whitelist))
        .route("/v1/cases/:id/status", post(handle_case_status))
        .route("/v1/cases/:id/notes", post(handle_case_note))
        .route("/v1/cases/:id/timeline", get(handle_case_timeline))
        .route("/v1/customers/:customer_no/risk", get(handle_customer_risk))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the pipeline synchronously; 202 means every write for the event
/// is durable and the producer may consider it delivered.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<TransactionEvent>,
) -> FraudResult<impl IntoResponse> {
    let outcome = state.services.pipeline.process(&event).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

async fn handle_feed(
    State(state): State<Arc<AppState>>,
    Json(event): Json<TransactionEvent>,
) -> FraudResult<impl IntoResponse> {
    let event_id = event.event_id.clone();
    state.feed.try_publish(event)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            event_id,
            queued: true,
        }),
    ))
}

async fn handle_create_action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateActionRequest>,
) -> FraudResult<impl IntoResponse> {
    let action_type = parse_action_type(&req.action_type)?;
    let request = state
        .services
        .workflow
        .request(
            CustomerNo::new(req.customer_no),
            req.case_id,
            action_type,
            &req.maker,
            &req.reason,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

async fn handle_approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RequestId>,
    Json(req): Json<ReviewRequest>,
) -> FraudResult<impl IntoResponse> {
    let risk = state
        .services
        .workflow
        .approve_and_execute(id, &req.checker, &req.note)
        .await?;
    Ok(Json(risk))
}

async fn handle_reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RequestId>,
    Json(req): Json<ReviewRequest>,
) -> FraudResult<impl IntoResponse> {
    let request = state
        .services
        .workflow
        .reject(id, &req.checker, &req.note)
        .await?;
    Ok(Json(request))
}

async fn handle_list_actions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListActionsQuery>,
) -> FraudResult<impl IntoResponse> {
    let requests = state
        .services
        .workflow
        .list(query.status()?, query.customer_no())
        .await?;
    Ok(Json(requests))
}

async fn handle_request_block(
    State(state): State<Arc<AppState>>,
    Path(customer_no): Path<String>,
    Json(req): Json<AdminActionRequest>,
) -> FraudResult<impl IntoResponse> {
    let request = state
        .services
        .workflow
        .request_block_credit(CustomerNo::new(customer_no), &req.maker, &req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn handle_request_unblock(
    State(state): State<Arc<AppState>>,
    Path(customer_no): Path<String>,
    Json(req): Json<AdminActionRequest>,
) -> FraudResult<impl IntoResponse> {
    let request = state
        .services
        .workflow
        .request_unblock_credit(CustomerNo::new(customer_no), &req.maker, &req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn handle_policy_reload(State(state): State<Arc<AppState>>) -> FraudResult<impl IntoResponse> {
    let policy_version = state.services.policy.reload()?;
    info!(version = %policy_version, "Policy reloaded on request");
    Ok(Json(PolicyReloadResponse { policy_version }))
}

async fn handle_list_whitelist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WhitelistQuery>,
) -> FraudResult<impl IntoResponse> {
    let entries = state.services.whitelist.list(query.entry_type()?).await?;
    Ok(Json(entries))
}

async fn handle_upsert_whitelist(
    State(state): State<Arc<AppState>>,
    Json(upsert): Json<WhitelistUpsert>,
) -> FraudResult<impl IntoResponse> {
    let entry = state.services.whitelist.upsert(upsert).await?;
    Ok(Json(entry))
}

async fn handle_delete_whitelist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<WhitelistId>,
    Query(query): Query<ActorQuery>,
) -> FraudResult<impl IntoResponse> {
    state.services.whitelist.delete(id, &query.actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_case_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CaseId>,
    Json(req): Json<CaseStatusRequest>,
) -> FraudResult<impl IntoResponse> {
    let case = state
        .services
        .cases
        .update_status(id, req.status()?, &req.actor)
        .await?;
    Ok(Json(case))
}

async fn handle_case_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CaseId>,
    Json(req): Json<CaseNoteRequest>,
) -> FraudResult<impl IntoResponse> {
    let event = state.services.cases.add_note(id, &req.actor, &req.note).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn handle_case_timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CaseId>,
) -> FraudResult<impl IntoResponse> {
    let timeline = state.services.cases.timeline(id).await?;
    Ok(Json(timeline))
}

async fn handle_customer_risk(
    State(state): State<Arc<AppState>>,
    Path(customer_no): Path<String>,
) -> FraudResult<impl IntoResponse> {
    let risk = state.services.risk.get(&CustomerNo::new(customer_no)).await?;
    Ok(Json(risk))
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        policy_version: state.services.policy.current_version(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint.
///
/// An empty rule set is still ready: the pipeline runs fail-open.
async fn handle_ready(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let storage = match &state.database {
        Some(db) => {
            if let Err(e) = db.ping().await {
                return FraudError::from(e).into_response();
            }
            "postgres"
        }
        None => "memory",
    };

    let rules = state.services.policy.subscribe().borrow().len();
    (
        StatusCode::OK,
        Json(ReadyResponse {
            ready: true,
            policy_version: state.services.policy.current_version(),
            policy_rules: rules,
            storage,
        }),
    )
        .into_response()
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> axum::response::Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("metrics are disabled", "NOT_FOUND")),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::feed::{self, FeedSettings};
    use crate::policy::{PolicyLoader, PolicyWatcher};
    use crate::storage::Stores;
    use crate::velocity::VelocityConfig;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_app_state() -> Arc<AppState> {
        let (stores, _) = Stores::memory();
        let policy = Arc::new(PolicyWatcher::load(PolicyLoader::new("does-not-exist.yaml")));
        let services = Services::build(
            stores,
            policy,
            VelocityConfig::default(),
            Duration::from_secs(1),
            Arc::new(MemoryAuditSink::new()),
        )
        .unwrap();
        let (producer, _consumer) = feed::channel(services.pipeline.clone(), FeedSettings::default());

        Arc::new(AppState {
            services,
            feed: producer,
            database: None,
            metrics: None,
            start_time: Instant::now(),
            version: "0.1.0-test".to_string(),
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_app_state());
        let (status, body) = send(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["policy_version"], "fallback");
    }

    #[tokio::test]
    async fn test_ready_with_memory_storage() {
        let app = create_router(test_app_state());
        let (status, body) = send(app, "GET", "/ready", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["storage"], "memory");
        assert_eq!(body["policy_rules"], 0);
    }

    #[tokio::test]
    async fn test_event_is_accepted() {
        let app = create_router(test_app_state());
        let event = json!({
            "eventId": "evt-1",
            "customerNo": "C1",
            "fromAccount": "TR000001",
            "toAccount": "TR000002",
            "amountCents": 100,
            "currency": "TRY",
            "channel": "mobile"
        });

        let (status, body) = send(app, "POST", "/v1/events", Some(event)).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["eventId"], "evt-1");
        assert_eq!(body["bypassed"], false);
    }

    #[tokio::test]
    async fn test_unknown_case_is_404() {
        let app = create_router(test_app_state());
        let uri = format!("/v1/cases/{}/timeline", CaseId::new());

        let (status, body) = send(app, "GET", &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unsupported_action_type_is_400() {
        let app = create_router(test_app_state());
        let body = json!({
            "customer_no": "C1",
            "action_type": "CLOSE_ACCOUNT",
            "maker": "alice",
            "reason": "x"
        });

        let (status, body) = send(app, "POST", "/v1/actions/request", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let app = create_router(test_app_state());
        let (status, _) = send(app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
