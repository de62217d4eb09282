//! Plain HTTP access to the server: one-shot status reads and hook posts.

use std::time::Duration;

use tracing::{debug, warn};
use webblock_core::{BlockerError, BlockerResult, HookPayload, Snapshot};

/// Thin wrapper over the server's `GET /status` and `POST /hook`.
#[derive(Debug, Clone)]
pub struct StatusClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl StatusClient {
    /// `base_url` is e.g. `http://127.0.0.1:8765`; every request is bounded
    /// by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the current aggregate. Any failure (refused, timed out, non-2xx,
    /// unparseable body) yields `None`.
    pub async fn fetch_status(&self) -> Option<Snapshot> {
        let url = format!("{}/status", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<Snapshot>().await {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        warn!(url = %url, error = %e, "failed to parse status response");
                        None
                    }
                }
            }
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "status fetch returned non-success");
                None
            }
            Err(e) => {
                debug!(url = %url, error = %e, "status fetch failed");
                None
            }
        }
    }

    /// Deliver one hook event.
    pub async fn post_hook(&self, payload: &HookPayload) -> BlockerResult<()> {
        let url = format!("{}/hook", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BlockerError::Timeout
                } else {
                    BlockerError::Transport(e.to_string())
                }
            })?;
        let status = response.status();
        if status.is_success() {
            debug!(session = %payload.session_id, event = %payload.hook_event_name, "hook delivered");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(BlockerError::InvalidMessage(format!(
                "server rejected hook ({status}): {body}"
            )))
        }
    }
}
