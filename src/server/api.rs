use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::errors::{CallError, StoreError};
use crate::outbound::{CallInitiator, CallPlaced};
use crate::store::SharedStore;
use crate::telephony::SharedTelephony;
use crate::textgen::TextGeneration;
use crate::voice::CallFlow;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: SharedStore,
    pub initiator: CallInitiator,
    pub flow: CallFlow,
    pub textgen: TextGeneration,
    /// Public base URL for provider callbacks; derived from request headers when unset.
    pub base_url: Option<String>,
    pub environment: String,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        store: SharedStore,
        telephony: SharedTelephony,
        textgen: TextGeneration,
        config: &AppConfig,
    ) -> Self {
        Self {
            initiator: CallInitiator::new(store.clone(), telephony),
            flow: CallFlow::new(store.clone(), textgen.clone(), config.flow.clone()),
            store,
            textgen,
            base_url: config.server.base_url.clone(),
            environment: config.environment_name().to_string(),
        }
    }

    /// Configured base URL, or `{X-Forwarded-Proto}://{X-Forwarded-Host | Host}`.
    pub fn base_url_for(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let proto = header("x-forwarded-proto").unwrap_or("http");
        let host = header("x-forwarded-host")
            .or_else(|| header("host"))
            .unwrap_or("localhost");
        format!("{}://{}", proto, host)
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUserRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Store error in API handler");
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/call-user", post(call_user))
        .route("/api/leads", get(list_leads))
        .route("/api/leads/{id}", get(get_lead))
        .route("/api/leads/{id}/assessment", get(assess_lead))
        .route("/api/questions", get(list_questions))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "telephony_configured": state.initiator.telephony_configured(),
        "text_generation_configured": state.textgen.is_enabled(),
        "store_backend": state.store.backend(),
        "environment": state.environment,
    }))
}

/// Shared by `/api/call-user` and `/api/embed`.
pub(crate) async fn place_call(
    state: &AppState,
    headers: &HeaderMap,
    phone_number: &str,
    name: Option<&str>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let base_url = state.base_url_for(headers);
    let CallPlaced { call_sid, lead_id } = state
        .initiator
        .initiate(phone_number, name, &base_url)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Call request failed");
            ApiError::from(e)
        })?;
    Ok(Json(json!({ "success": true, "callSid": call_sid, "leadId": lead_id })))
}

async fn call_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<CallUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let phone = req.phone_number.unwrap_or_default();
    place_call(&state, &headers, &phone, req.name.as_deref()).await
}

async fn list_leads(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let leads = state.store.get_all_leads().await?;
    Ok(Json(json!({ "success": true, "leads": leads })))
}

async fn get_lead(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = state
        .store
        .get_lead_with_responses(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lead not found".into()))?;
    Ok(Json(json!({ "success": true, "lead": lead })))
}

async fn assess_lead(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = state
        .store
        .get_lead_with_responses(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lead not found".into()))?;
    let transcript = lead.transcript();
    let (assessment, follow_up) = tokio::join!(
        state.textgen.assess(&transcript),
        state.textgen.follow_up_question(&transcript),
    );
    Ok(Json(json!({
        "success": true,
        "assessment": assessment,
        "followUpQuestion": follow_up,
    })))
}

async fn list_questions(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let questions = state.store.get_questions().await?;
    Ok(Json(json!({ "success": true, "questions": questions })))
}
