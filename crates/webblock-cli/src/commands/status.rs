//! `webblock status`: one-shot read of the server aggregate.

use anyhow::Result;
use webblock_client::{StatusClient, SyncConfig};

pub async fn run(config: &SyncConfig) -> Result<()> {
    let client = StatusClient::new(config.http_url(), config.status_timeout);
    match client.fetch_status().await {
        Some(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        None => anyhow::bail!("server unreachable at {}", client.base_url()),
    }
}
