//! `hearthd [path/to/hearth.toml]`
//!
//! Seeds the accounts listed in the config file, then serves websocket
//! logins until killed. Logging is controlled by `RUST_LOG` (default
//! `info`).

use std::fs;

use anyhow::{Context, Result};
use hearth::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "hearth.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at '{path}'"))?;
    let config = ServerConfig::from_toml(&text)
        .with_context(|| format!("Failed to load config from '{path}'"))?;

    tracing::info!(accounts = config.accounts.len(), "hashing account passwords");
    let gatekeeper = tokio::task::spawn_blocking({
        let config = config.clone();
        move || config.gatekeeper()
    })
    .await
    .context("Password hashing task failed")?
    .context("Failed to seed accounts")?;

    let server = config
        .server_builder()
        .build(gatekeeper)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(addr = %server.local_addr()?, "hearthd ready");

    server.run().await?;
    Ok(())
}
