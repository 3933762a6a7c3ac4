//! Embeddable lead form: a self-contained HTML widget plus the JSON endpoint it can post to.

use std::sync::LazyLock;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::{get, post},
};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use super::api::{ApiError, SharedState, place_call};
use crate::voice::twiml::escape;

const WIDGET_TEMPLATE: &str = include_str!("../../templates/embed_widget.html");

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

/// Query parameters accepted by `GET /embed`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetParams {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub button_text: Option<String>,
    pub theme: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub api_url: Option<String>,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
    Blue,
    Green,
}

impl Theme {
    /// Unknown names fall back to light.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "dark" => Theme::Dark,
            "blue" => Theme::Blue,
            "green" => Theme::Green,
            _ => Theme::Light,
        }
    }

    fn palette(self) -> [(&'static str, &'static str); 9] {
        let dark = self == Theme::Dark;
        let (accent, accent_hover) = match self {
            Theme::Blue => ("#3b82f6", "#2563eb"),
            Theme::Green => ("#10b981", "#059669"),
            _ => ("#6366f1", "#4f46e5"),
        };
        let background = match self {
            Theme::Dark => "#1a1a1a",
            Theme::Blue => "#f0f8ff",
            Theme::Green => "#f0fff4",
            Theme::Light => "#ffffff",
        };
        [
            ("background", background),
            ("text", if dark { "#ffffff" } else { "#333333" }),
            ("border", if dark { "#333333" } else { "#e1e5e9" }),
            ("heading", if dark { "#ffffff" } else { "#1a1a1a" }),
            ("muted", if dark { "#cccccc" } else { "#666666" }),
            ("input_background", if dark { "#2a2a2a" } else { "#ffffff" }),
            ("powered_by", if dark { "#666666" } else { "#999999" }),
            ("accent", accent),
            ("accent_hover", accent_hover),
        ]
    }
}

pub fn embed_router() -> Router<SharedState> {
    Router::new()
        .route("/embed", get(widget))
        .route("/api/embed", post(embed_call))
}

/// JSON for an inline `<script>` block; `<` is escaped so user text cannot close the tag.
fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace('<', "\\u003c")
}

/// Render the widget. Every substituted value is escaped for its context.
pub fn render_widget(params: &WidgetParams, default_api_url: &str) -> String {
    let pick = |value: &Option<String>, default: &str| {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(default)
            .to_string()
    };
    let title = pick(&params.title, "AI Lead Capture");
    let subtitle = pick(&params.subtitle, "Get a personalized call from our AI assistant");
    let button_text = pick(&params.button_text, "📞 Start AI Call");
    let width = pick(&params.width, "100%");
    let height = pick(&params.height, "auto");
    let api_url = pick(&params.api_url, default_api_url);
    let success_message = pick(
        &params.success_message,
        "Call initiated successfully! Our AI will call you shortly.",
    );
    let error_message = pick(&params.error_message, "Something went wrong. Please try again.");
    let theme = Theme::parse(params.theme.as_deref().unwrap_or("light"));

    let config = json!({
        "apiUrl": api_url.trim_end_matches('/'),
        "buttonText": button_text,
        "successMessage": success_message,
        "errorMessage": error_message,
    });

    let mut values: Vec<(&str, String)> = vec![
        ("title", escape(&title)),
        ("subtitle", escape(&subtitle)),
        ("button_text", escape(&button_text)),
        ("width", escape(&width)),
        ("height", escape(&height)),
        ("api_url", escape(&api_url)),
        ("config_json", script_json(&config)),
    ];
    values.extend(theme.palette().iter().map(|(k, v)| (*k, v.to_string())));

    PLACEHOLDER
        .replace_all(WIDGET_TEMPLATE, |caps: &regex::Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        })
        .into_owned()
}

async fn widget(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<WidgetParams>,
) -> impl IntoResponse {
    let html = render_widget(&params, &state.base_url_for(&headers));
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
        html,
    )
}

async fn embed_call(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !present(&req.name) || !present(&req.phone_number) {
        return Err(ApiError::BadRequest(
            "Name and phone number are required".into(),
        ));
    }
    let phone = req.phone_number.unwrap_or_default();
    place_call(&state, &headers, &phone, req.name.as_deref()).await
}
