//! Database bootstrap: `leadcall init`.

use std::path::Path;

use anyhow::{Context, Result};
use leadcall::store::{LeadStore, SqliteStore};

pub const DEFAULT_DB_PATH: &str = ".leadcall/leads.db";

pub async fn cmd_init(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    store
        .initialize()
        .await
        .context("Failed to seed question catalog")?;
    let questions = store.get_questions().await?;
    println!(
        "Lead database initialized at {} ({} active questions)",
        db_path.display(),
        questions.len()
    );
    Ok(())
}
