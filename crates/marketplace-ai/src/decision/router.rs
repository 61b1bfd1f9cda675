use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Serialize;
use serde_json::json;

use super::service::{CallPath, DecisionError, DecisionService};
use super::signals::fraud::{AccountBaseline, FraudCheckRequest};
use super::signals::matching::MatchRequest;
use super::signals::scope::ScopeRequest;
use super::signals::verification::VerificationRequest;

/// Router exposing the synchronous decision endpoints.
pub fn decision_router(service: Arc<DecisionService>) -> Router {
    Router::new()
        .route("/api/v1/fraud/check", post(fraud_check_handler))
        .route("/api/v1/fraud/baseline", post(fraud_baseline_handler))
        .route("/api/v1/match/rank", post(match_rank_handler))
        .route("/api/v1/scope/analyze", post(scope_analyze_handler))
        .route("/api/v1/verification/submit", post(verification_submit_handler))
        .with_state(service)
}

fn respond<T: Serialize>(result: Result<T, DecisionError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, axum::Json(body)).into_response(),
        Err(DecisionError::Validation(error)) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn fraud_check_handler(
    State(service): State<Arc<DecisionService>>,
    axum::Json(request): axum::Json<FraudCheckRequest>,
) -> Response {
    respond(service.check_fraud(request, CallPath::Sync).await)
}

pub(crate) async fn fraud_baseline_handler(
    State(service): State<Arc<DecisionService>>,
    axum::Json(account): axum::Json<AccountBaseline>,
) -> Response {
    respond(service.fraud_baseline(account, CallPath::Sync).await)
}

pub(crate) async fn match_rank_handler(
    State(service): State<Arc<DecisionService>>,
    axum::Json(request): axum::Json<MatchRequest>,
) -> Response {
    respond(service.rank_matches(request, CallPath::Sync).await)
}

pub(crate) async fn scope_analyze_handler(
    State(service): State<Arc<DecisionService>>,
    axum::Json(request): axum::Json<ScopeRequest>,
) -> Response {
    respond(service.analyze_scope(request, CallPath::Sync).await)
}

pub(crate) async fn verification_submit_handler(
    State(service): State<Arc<DecisionService>>,
    axum::Json(request): axum::Json<VerificationRequest>,
) -> Response {
    respond(service.verify(request, CallPath::Sync).await)
}
