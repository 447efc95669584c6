//! HTTP router and handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::HeaderName},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::{login_handler, login_page, logout_handler, session_gate};
use super::rate_limit::{FixedWindowLimiter, client_key};
use crate::airtable::{AirtableClient, ProblemReport, ReportOutcome};
use crate::config::Config;
use crate::envelope::Envelope;
use crate::error::{ApiError, Error};
use crate::workflow::n8n::{N8nClient, WorkflowOutcome};
use crate::workflow::{input, normalize_workflow_result};

/// Shared application state
pub struct AppState {
    /// Resolved configuration
    pub config: Config,
    /// Execution endpoint rate limiter
    pub rate_limiter: FixedWindowLimiter,
    /// n8n upstream client
    pub n8n: N8nClient,
    /// Airtable problem-report client
    pub airtable: AirtableClient,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/login", get(login_page))
        .route("/health", get(health_handler))
        .route("/api/execute-workflow", post(execute_workflow_handler))
        .route("/api/report-problem", post(report_problem_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            session_gate,
        ))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /api/execute-workflow
///
/// The full pipeline: rate limit, body parse, shape validation and
/// normalization, upstream invocation, result normalization, envelope.
/// Every branch answers in the envelope shape; the execution id is
/// assigned here, once, before any other work.
async fn execute_workflow_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started_at = Instant::now();
    let execution_id = Uuid::new_v4().to_string();
    let limit = state.rate_limiter.max_requests();

    let key = client_key(&headers);
    let decision = state.rate_limiter.check(&key);

    if !decision.allowed {
        warn!(execution_id = %execution_id, client = %key, "Rate limit exceeded");
        let envelope = Envelope::failure(
            &execution_id,
            started_at,
            ApiError::message(format!("Rate limit: {limit} requests/minute")),
        );
        return envelope_response(StatusCode::TOO_MANY_REQUESTS, &envelope, Some((limit, 0)));
    }

    let payload = match input::parse_request(&body).and_then(input::normalize) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(execution_id = %execution_id, error = %err, "Request rejected");
            let message = match err {
                Error::BodyParse(_) => "Invalid JSON body",
                _ => "Validation failed",
            };
            let envelope =
                Envelope::failure(&execution_id, started_at, ApiError::message(message));
            return envelope_response(StatusCode::BAD_REQUEST, &envelope, None);
        }
    };

    info!(
        execution_id = %execution_id,
        client = %key,
        has_input = payload.input().is_some(),
        dry_run = payload.dry_run.unwrap_or(false),
        has_json_payload = payload.json_payload.is_some(),
        "Executing workflow"
    );

    let envelope = match state.n8n.invoke(&payload).await {
        WorkflowOutcome::Success(data) => {
            Envelope::success(&execution_id, started_at, normalize_workflow_result(&data))
        }
        WorkflowOutcome::Failure(error) => Envelope::failure(&execution_id, started_at, error),
    };

    info!(
        execution_id = %execution_id,
        success = envelope.success,
        duration_ms = envelope.duration_ms,
        "Workflow execution finished"
    );

    let status =
        StatusCode::from_u16(envelope.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    envelope_response(status, &envelope, Some((limit, decision.remaining)))
}

/// POST /api/report-problem
async fn report_problem_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let report = match parse_report(&body) {
        Ok(report) => report,
        Err(err) => {
            let message = match err {
                Error::BodyParse(_) => "Invalid JSON body",
                _ => "Validation failed",
            };
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": {"message": message}})),
            )
                .into_response();
        }
    };

    match state.airtable.submit(&report).await {
        ReportOutcome::Success(data) => {
            (StatusCode::OK, Json(json!({"success": true, "data": data}))).into_response()
        }
        ReportOutcome::Failure(error) => {
            let status = StatusCode::from_u16(error.status_or_default())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({"success": false, "error": error})),
            )
                .into_response()
        }
    }
}

fn parse_report(body: &[u8]) -> Result<ProblemReport, Error> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::BodyParse(e.to_string()))?;
    let report: ProblemReport =
        serde_json::from_value(value).map_err(|e| Error::Validation(e.to_string()))?;

    let comment_len = report.comment.chars().count();
    if comment_len == 0 || comment_len > 2_000 {
        return Err(Error::Validation(
            "comment must be 1-2000 characters".to_string(),
        ));
    }
    if let Some(id) = &report.execution_id {
        let len = id.chars().count();
        if len == 0 || len > 200 {
            return Err(Error::Validation(
                "executionId must be 1-200 characters".to_string(),
            ));
        }
    }
    Ok(report)
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /: placeholder console shell; the operator UI is served separately.
async fn index_page() -> impl IntoResponse {
    Html(INDEX_PAGE)
}

const INDEX_PAGE: &str = r"<!doctype html>
<html lang='en'>
<head><meta charset='utf-8'><title>n8n-bridge</title></head>
<body>
<h1>n8n-bridge</h1>
<ul>
  <li><code>POST /api/execute-workflow</code></li>
  <li><code>POST /api/report-problem</code></li>
  <li><code>POST /api/auth/login</code> / <code>POST /api/auth/logout</code></li>
  <li><code>GET /health</code></li>
</ul>
</body>
</html>
";

fn envelope_response(
    status: StatusCode,
    envelope: &Envelope,
    rate_headers: Option<(u32, u32)>,
) -> Response {
    let mut response = (status, Json(envelope)).into_response();
    if let Some((limit, remaining)) = rate_headers {
        let headers = response.headers_mut();
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            limit.to_string().parse().unwrap(),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            remaining.to_string().parse().unwrap(),
        );
    }
    response
}
