//! Lead store: leads, the question catalog, and recorded answers.
//!
//! ## Backends
//!
//! | Module        | Backend                                   | Configured by                          |
//! |---------------|-------------------------------------------|----------------------------------------|
//! | `memory`      | Process-local collections                 | always available                       |
//! | `sqlite`      | SQLite file via `rusqlite`                | `storage.db_path` / `LEADCALL_DB_PATH` |
//! | `sheets`      | Google Sheets v4 REST API                 | sheet id + access token                |
//! | `apps_script` | Google Apps Script web app proxy          | script URL + sheet id                  |
//! | `fallback`    | Primary with in-memory secondary          | wraps remote backends                  |
//!
//! `select_store` walks the configured candidates in that priority order (remote first,
//! memory last) and keeps the first one whose `initialize` succeeds.

pub mod apps_script;
pub mod fallback;
pub mod memory;
pub mod models;
pub mod sheets;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::errors::StoreError;

pub use apps_script::AppsScriptStore;
pub use fallback::FallbackStore;
pub use memory::MemoryStore;
pub use models::{Answer, Lead, LeadWithAnswers, Question, TranscriptEntry};
pub use sheets::SheetsStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle used by the HTTP layer and the call flow.
pub type SharedStore = Arc<dyn LeadStore>;

/// Persistence contract every backend satisfies with identical semantics.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    /// Probe connectivity and seed the catalog if needed.
    async fn initialize(&self) -> StoreResult<()>;

    /// Create a lead and return its fresh identifier.
    async fn create_lead(&self, phone_number: &str, name: Option<&str>) -> StoreResult<String>;

    /// Active questions in script order.
    async fn get_questions(&self) -> StoreResult<Vec<Question>>;

    /// Append an answer; returns the response identifier.
    async fn save_response(
        &self,
        lead_id: &str,
        question_id: i64,
        answer: &str,
        confidence: Option<f64>,
    ) -> StoreResult<i64>;

    /// The lead with its answers ordered by question order, or `None` if unknown.
    async fn get_lead_with_responses(&self, lead_id: &str) -> StoreResult<Option<LeadWithAnswers>>;

    /// All leads, newest first.
    async fn get_all_leads(&self) -> StoreResult<Vec<Lead>>;
}

/// Build the candidate list from configuration and keep the first backend that initializes.
pub async fn select_store(config: &StorageConfig) -> SharedStore {
    let mut candidates: Vec<SharedStore> = Vec::new();

    if config.sheets.is_configured() {
        match SheetsStore::from_config(&config.sheets) {
            Ok(store) => candidates.push(Arc::new(store)),
            Err(e) => tracing::warn!(error = %e, "Skipping sheets store"),
        }
    }
    if config.apps_script.is_configured() {
        match AppsScriptStore::from_config(&config.apps_script) {
            Ok(store) => candidates.push(Arc::new(store)),
            Err(e) => tracing::warn!(error = %e, "Skipping apps script store"),
        }
    }
    if let Some(path) = &config.db_path {
        match SqliteStore::open(path) {
            Ok(store) => candidates.push(Arc::new(store)),
            Err(e) => tracing::warn!(error = %e, path = %path.display(), "Skipping sqlite store"),
        }
    }

    first_initialized(candidates).await
}

/// Initialize candidates in order. Remote winners get an in-memory secondary; if nothing
/// initializes, the in-memory store is used on its own.
pub async fn first_initialized(candidates: Vec<SharedStore>) -> SharedStore {
    for candidate in candidates {
        let backend = candidate.backend();
        match candidate.initialize().await {
            Ok(()) => {
                tracing::info!(backend, "Lead store initialized");
                if is_remote(backend) {
                    let secondary = Arc::new(MemoryStore::new());
                    return Arc::new(FallbackStore::new(candidate, secondary));
                }
                return candidate;
            }
            Err(e) => {
                tracing::warn!(backend, error = %e, "Lead store failed to initialize, trying next");
            }
        }
    }
    tracing::info!(backend = "memory", "Using in-memory lead store");
    Arc::new(MemoryStore::new())
}

fn is_remote(backend: &str) -> bool {
    matches!(backend, sheets::BACKEND | apps_script::BACKEND)
}
