//! HTTP surface: lead API, provider webhooks, the embeddable widget and the static pages.
//!
//! | Module     | Routes                                                        |
//! |------------|---------------------------------------------------------------|
//! | `api`      | `/api/health`, `/api/call-user`, `/api/leads*`, `/api/questions` |
//! | `voice`    | `/voice`, `/voice/question`, `/voice/handle-answer`            |
//! | `embed`    | `/embed`, `/api/embed`                                          |
//! | `embedded` | everything else, served from `assets/`                          |

pub mod api;
pub mod embed;
pub mod embedded;
pub mod voice;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::store::{self, SharedStore};
use crate::telephony;
use crate::textgen::TextGeneration;
use api::{AppState, SharedState};
use embedded::Assets;

/// Listener settings, resolved from `AppConfig` plus CLI flags.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl ServerConfig {
    pub fn from_app(config: &AppConfig, dev_mode: bool) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            dev_mode,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .merge(voice::voice_router())
        .merge(embed::embed_router())
        .fallback(static_handler)
        .with_state(state)
}

/// Serve an embedded page. Unknown paths get the demo page.
async fn static_handler(req: Request<Body>) -> impl IntoResponse {
    let path = match req.uri().path().trim_matches('/') {
        "" => "index.html",
        "admin" => "admin.html",
        other => other,
    };

    if let Some(content) = Assets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return Response::builder()
            .header(header::CONTENT_TYPE, mime.as_ref())
            .body(Body::from(content.data.to_vec()))
            .map(IntoResponse::into_response)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    match Assets::get("index.html") {
        Some(content) => Html(String::from_utf8_lossy(&content.data).to_string()).into_response(),
        None => (StatusCode::NOT_FOUND, "Page not found").into_response(),
    }
}

/// Wire the collaborators from configuration and serve until Ctrl+C.
///
/// `store` overrides backend selection; `None` walks the configured candidates.
pub async fn start_server(
    config: &AppConfig,
    server: ServerConfig,
    store: Option<SharedStore>,
) -> Result<()> {
    let store = match store {
        Some(store) => store,
        None => store::select_store(&config.storage).await,
    };
    let telephony = telephony::from_config(&config.telephony);
    let textgen = TextGeneration::from_config(&config.text_generation);

    tracing::info!(
        backend = store.backend(),
        telephony_configured = telephony.is_configured(),
        text_generation_configured = textgen.is_enabled(),
        environment = config.environment_name(),
        "Collaborators ready"
    );
    if config.server.base_url.is_none() {
        tracing::warn!("No public base URL configured; callback URLs will use the Host header");
    }

    let state = Arc::new(AppState::new(store, telephony, textgen, config));
    let mut app = build_router(state);

    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "leadcall listening");
    println!("leadcall running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
