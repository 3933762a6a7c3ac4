//! Outbound call from the terminal: `leadcall call <phone>`.

use anyhow::{Context, Result};
use leadcall::config::AppConfig;
use leadcall::outbound::{CallInitiator, to_e164};
use leadcall::store;
use leadcall::telephony;

pub async fn cmd_call(config: &AppConfig, phone: &str, name: Option<&str>) -> Result<()> {
    // Validate before touching any backend.
    to_e164(phone)?;

    let base_url = config.server.base_url.as_deref().context(
        "No public base URL configured; set APP_BASE_URL so the provider can reach the webhooks",
    )?;

    let store = store::select_store(&config.storage).await;
    let initiator = CallInitiator::new(store, telephony::from_config(&config.telephony));
    let placed = initiator
        .initiate(phone, name, base_url)
        .await
        .context("Failed to place call")?;

    println!("{}", serde_json::to_string_pretty(&placed)?);
    Ok(())
}
