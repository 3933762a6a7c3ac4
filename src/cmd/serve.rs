//! HTTP server command: `leadcall serve`.

use std::path::PathBuf;

use anyhow::Result;
use leadcall::config::AppConfig;
use leadcall::server::{self, ServerConfig};

pub async fn cmd_serve(
    mut config: AppConfig,
    port: Option<u16>,
    host: Option<String>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(path) = db_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        config.storage.db_path = Some(path);
    }

    // Skip the browser outside dev mode; production hosts are usually headless.
    if dev {
        let url = format!("http://localhost:{}", config.server.port);
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "Failed to open browser");
            }
        });
    }

    let server_config = ServerConfig::from_app(&config, dev);
    server::start_server(&config, server_config, None).await
}
