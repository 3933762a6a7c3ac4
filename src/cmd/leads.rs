//! Lead inspection: `leadcall leads [--id]`.

use anyhow::{Result, bail};
use leadcall::config::AppConfig;
use leadcall::store;

pub async fn cmd_leads(config: &AppConfig, id: Option<&str>) -> Result<()> {
    let store = store::select_store(&config.storage).await;
    let output = match id {
        Some(id) => match store.get_lead_with_responses(id).await? {
            Some(lead) => serde_json::to_string_pretty(&lead)?,
            None => bail!("Lead not found: {}", id),
        },
        None => serde_json::to_string_pretty(&store.get_all_leads().await?)?,
    };
    println!("{}", output);
    Ok(())
}
