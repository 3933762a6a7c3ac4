//! Provider webhooks. Every response is a voice document with status 200, including failures.

use std::collections::HashMap;

use axum::{
    Form, Router,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::header,
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;

use super::api::SharedState;
use crate::voice::state::{ANSWER_PATH, ENTRY_PATH, QUESTION_PATH};
use crate::voice::{CallFlow, CallState, VoiceResponse};

/// Speech recognition fields the provider posts to the gather action.
#[derive(Debug, Default, Deserialize)]
pub struct SpeechForm {
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
    #[serde(rename = "SpeechResultConfidence", default)]
    pub confidence: Option<String>,
}

pub fn voice_router() -> Router<SharedState> {
    Router::new()
        .route(ENTRY_PATH, post(voice_entry))
        .route(QUESTION_PATH, post(voice_question))
        .route(ANSWER_PATH, post(voice_answer))
}

/// Malformed query strings read as an empty state rather than a rejection.
fn call_state(query: Result<Query<HashMap<String, String>>, QueryRejection>) -> CallState {
    let params = query.map(|Query(p)| p).unwrap_or_default();
    CallState::from_params(&params)
}

fn xml(doc: VoiceResponse) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/xml")], doc.to_xml())
}

async fn voice_entry(
    State(state): State<SharedState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> impl IntoResponse {
    let call = call_state(query);
    tracing::info!(lead_id = call.lead_id.as_deref().unwrap_or(""), "Call answered");
    xml(state.flow.greeting(&call).await)
}

async fn voice_question(
    State(state): State<SharedState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> impl IntoResponse {
    let call = call_state(query);
    let doc = state.flow.ask(&call).await.unwrap_or_else(|e| {
        tracing::error!(
            lead_id = call.lead_id.as_deref().unwrap_or(""),
            question_index = call.question_index,
            error = %e,
            "Error in question webhook"
        );
        CallFlow::apology()
    });
    xml(doc)
}

async fn voice_answer(
    State(state): State<SharedState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    form: Result<Form<SpeechForm>, FormRejection>,
) -> impl IntoResponse {
    let call = call_state(query);
    let speech = form.map(|Form(f)| f).unwrap_or_default();
    let confidence = speech
        .confidence
        .as_deref()
        .and_then(|c| c.trim().parse::<f64>().ok());

    let doc = state
        .flow
        .record(&call, speech.speech_result.as_deref(), confidence)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(
                lead_id = call.lead_id.as_deref().unwrap_or(""),
                question_index = call.question_index,
                error = %e,
                "Error in answer webhook"
            );
            CallFlow::apology()
        });
    xml(doc)
}
