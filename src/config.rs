//! Layered configuration for leadcall.
//!
//! Values are resolved in order: built-in defaults → optional TOML file → environment
//! (after `.env` is loaded by `dotenvy` in `main`) → CLI flags applied by the command.
//! Missing credentials never fail loading; each collaborator reports its own
//! "not configured" state instead.
//!
//! # Configuration File Format
//!
//! ```toml
//! environment = "production"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! base_url = "https://abcd-1234.ngrok-free.app"
//!
//! [telephony]
//! account_sid = "AC..."
//! auth_token = "..."
//! from_number = "+14155550100"
//!
//! [text_generation]
//! api_key = "sk-..."
//! model = "gpt-3.5-turbo"
//!
//! [storage]
//! db_path = ".leadcall/leads.db"
//!
//! [storage.sheets]
//! sheet_id = "1AbC..."
//! access_token = "ya29..."
//!
//! [storage.apps_script]
//! url = "https://script.google.com/macros/s/.../exec"
//! sheet_id = "1AbC..."
//!
//! [flow]
//! max_retries = 3
//! dedupe_answers = false
//! gather_timeout_secs = 8
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "leadcall.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Reported by the health endpoint only.
    pub environment: Option<String>,
    pub server: ServerSettings,
    pub telephony: TelephonyConfig,
    pub text_generation: TextGenConfig,
    pub storage: StorageConfig,
    pub flow: FlowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Public URL the telephony provider can reach. When unset, derived per request
    /// from the `Host` header.
    pub base_url: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub api_base: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: "https://api.twilio.com".to_string(),
        }
    }
}

impl TelephonyConfig {
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file; when unset the relational backend is not a candidate.
    pub db_path: Option<PathBuf>,
    pub sheets: SheetsConfig,
    pub apps_script: AppsScriptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub sheet_id: Option<String>,
    /// OAuth bearer token with the spreadsheets scope.
    pub access_token: Option<String>,
    pub api_base: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            sheet_id: None,
            access_token: None,
            api_base: "https://sheets.googleapis.com/v4".to_string(),
        }
    }
}

impl SheetsConfig {
    pub fn is_configured(&self) -> bool {
        self.sheet_id.is_some() && self.access_token.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppsScriptConfig {
    pub url: Option<String>,
    pub sheet_id: Option<String>,
}

impl AppsScriptConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.sheet_id.is_some()
    }
}

/// Knobs for the call-flow state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Re-asks allowed per question after an empty utterance. `None` keeps asking forever.
    pub max_retries: Option<u32>,
    /// Skip persisting an answer when one already exists for the same lead and question.
    pub dedupe_answers: bool,
    /// Seconds the provider waits for speech to start.
    pub gather_timeout_secs: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            dedupe_answers: false,
            gather_timeout_secs: 8,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (or `leadcall.toml` if present) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Overlay environment variables. `lookup` is injected so tests never touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(env) = get("LEADCALL_ENV").or_else(|| get("NODE_ENV")) {
            self.environment = Some(env);
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = get("APP_BASE_URL") {
            self.server.base_url = Some(url);
        }

        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.telephony.account_sid = Some(v);
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.telephony.auth_token = Some(v);
        }
        if let Some(v) = get("TWILIO_PHONE_NUMBER") {
            self.telephony.from_number = Some(v);
        }
        if let Some(v) = get("TWILIO_API_BASE") {
            self.telephony.api_base = v;
        }

        if let Some(v) = get("OPENAI_API_KEY") {
            self.text_generation.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.text_generation.model = v;
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.text_generation.api_base = v;
        }

        if let Some(v) = get("LEADCALL_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("GOOGLE_SHEET_ID") {
            self.storage.sheets.sheet_id = Some(v.clone());
            self.storage.apps_script.sheet_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_SHEETS_ACCESS_TOKEN") {
            self.storage.sheets.access_token = Some(v);
        }
        if let Some(v) = get("GOOGLE_SHEETS_API_BASE") {
            self.storage.sheets.api_base = v;
        }
        if let Some(v) = get("GOOGLE_APPS_SCRIPT_URL") {
            self.storage.apps_script.url = Some(v);
        }

        if let Some(v) = get("LEADCALL_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.flow.max_retries = Some(v);
        }
        if let Some(v) = get("LEADCALL_DEDUPE_ANSWERS") {
            self.flow.dedupe_answers = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn environment_name(&self) -> &str {
        self.environment.as_deref().unwrap_or("development")
    }
}
