//! HTTP endpoint server using Axum

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::core::bootstrap::Services;
use crate::db::HintStore;
use crate::error::{PromotionError, RequestError, StoreError, SuggestError};
use crate::feedback::FeedbackService;
use crate::metrics::Metrics;
use crate::models::{
    FeedbackRequest, FeedbackResponse, MerchantCategoryHint, NormalizedMerchant,
    SuggestionMode, SuggestionRequest, SuggestionResponse,
};
use crate::promotion::{PromotionOptions, PromotionReport, PromotionService};
use crate::signals::SuggestionEngine;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<RwLock<HealthStatus>>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub engine: Arc<SuggestionEngine>,
    pub feedback: Arc<FeedbackService>,
    pub promotion: Arc<PromotionService>,
    pub hints: Arc<dyn HintStore>,
}

impl AppState {
    pub fn new(services: &Services) -> Self {
        Self {
            health: Arc::new(RwLock::new(HealthStatus::default())),
            metrics: services.metrics.clone(),
            start_time: Arc::new(Instant::now()),
            engine: services.engine.clone(),
            feedback: services.feedback.clone(),
            promotion: services.promotion.clone(),
            hints: services.hints.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthStatus {
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Error body: `{"error": {"code", "message"}}`
#[derive(Debug)]
pub enum ApiError {
    Request(RequestError),
    Store(StoreError),
    Promotion(PromotionError),
}

impl From<SuggestError> for ApiError {
    fn from(e: SuggestError) -> Self {
        match e {
            SuggestError::Request(e) => Self::Request(e),
            SuggestError::Store(e) => Self::Store(e),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        Self::Request(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Request(e) => {
                let status = match e {
                    RequestError::UnknownTransactions(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.code(), e.to_string())
            }
            ApiError::Store(e) => {
                error!(error = %e, "Store failure while serving request");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
            }
            ApiError::Promotion(PromotionError::AlreadyRunning) => (
                StatusCode::CONFLICT,
                "promotion_running",
                PromotionError::AlreadyRunning.to_string(),
            ),
            ApiError::Promotion(e) => {
                error!(error = %e, "Promotion run failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "promotion_failed", e.to_string())
            }
        };
        (
            status,
            Json(json!({ "error": { "code": code, "message": message } })),
        )
            .into_response()
    }
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let health = state.health.read().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": health.status,
        "uptime_seconds": uptime_seconds,
        "canary": state.engine.router().mode().to_string(),
        "service": "ledgerlens"
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_in_flight.dec();

    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

/// Wire shape of a suggestion request. `mode` stays a string and `top_k`
/// any JSON number until validation so each gets its own error code.
#[derive(Debug, Deserialize)]
struct SuggestionBody {
    txn_ids: Vec<String>,
    #[serde(default)]
    top_k: Option<serde_json::Number>,
    #[serde(default)]
    mode: Option<String>,
}

impl SuggestionBody {
    fn into_request(self, max_top_k: usize) -> Result<SuggestionRequest, RequestError> {
        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse()?,
            None => SuggestionMode::default(),
        };
        let top_k = match self.top_k {
            Some(raw) => Some(raw.as_i64().ok_or_else(|| RequestError::TopKOutOfRange {
                got: raw.to_string(),
                max: max_top_k,
            })?),
            None => None,
        };
        Ok(SuggestionRequest {
            txn_ids: self.txn_ids,
            top_k,
            mode,
        })
    }
}

fn malformed(rejection: JsonRejection) -> ApiError {
    ApiError::Request(RequestError::Malformed(rejection.body_text()))
}

async fn suggest(
    State(state): State<AppState>,
    payload: Result<Json<SuggestionBody>, JsonRejection>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let Json(body) = payload.map_err(malformed)?;
    let request = body.into_request(state.engine.config().max_top_k)?;
    let response = state.engine.suggest(&request, Utc::now()).await?;
    Ok(Json(response))
}

async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Json<FeedbackResponse> {
    Json(state.feedback.submit(&request, Utc::now()).await)
}

async fn run_promotion(
    State(state): State<AppState>,
    payload: Result<Json<PromotionOptions>, JsonRejection>,
) -> Result<Json<PromotionReport>, ApiError> {
    let Json(options) = payload.map_err(malformed)?;
    state
        .promotion
        .run(options, Utc::now())
        .await
        .map(Json)
        .map_err(ApiError::Promotion)
}

#[derive(Debug, Deserialize)]
struct HintQuery {
    merchant: String,
}

async fn list_hints(
    State(state): State<AppState>,
    Query(params): Query<HintQuery>,
) -> Result<Json<Vec<MerchantCategoryHint>>, ApiError> {
    let merchant = NormalizedMerchant::new(&params.merchant);
    if merchant.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let mut hints = state
        .hints
        .hints_for_merchants(std::slice::from_ref(&merchant))
        .await
        .map_err(ApiError::Store)?;
    hints.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.category_slug.cmp(&b.category_slug))
    });
    Ok(Json(hints))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/suggestions", post(suggest))
        .route("/api/feedback", post(submit_feedback))
        .route("/api/admin/promotions", post(run_promotion))
        .route("/api/hints", get(list_hints))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(
    port: u16,
    services: &Services,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(AppState::new(services));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
