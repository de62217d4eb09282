//! `webblock hook`: forward one agent hook event to the server.
//!
//! Agent plugins pipe their hook payload on stdin. Fields beyond the ones the
//! server reads (transcript paths, prompts, tool input) are ignored.

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use webblock_client::{StatusClient, SyncConfig};
use webblock_core::HookPayload;

pub async fn run(config: &SyncConfig, event: Option<&str>) -> Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read hook payload from stdin")?;
    let payload = parse_payload(&input, event)?;

    let client = StatusClient::new(config.http_url(), config.status_timeout);
    client
        .post_hook(&payload)
        .await
        .with_context(|| format!("failed to deliver hook to {}", client.base_url()))?;
    Ok(())
}

/// Parse a hook payload, letting `event` replace `hook_event_name`.
pub fn parse_payload(input: &str, event: Option<&str>) -> Result<HookPayload> {
    let mut value: serde_json::Value =
        serde_json::from_str(input).context("hook payload is not valid JSON")?;
    if let Some(event) = event {
        let obj = value
            .as_object_mut()
            .context("hook payload must be a JSON object")?;
        obj.insert("hook_event_name".into(), event.into());
    }
    serde_json::from_value(value).context("hook payload is missing required fields")
}
