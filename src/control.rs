//! Exit-node switching
//!
//! Switching is a single synchronous request with no retry. Callers re-run the
//! aggregator afterwards to observe the new selection.

use std::fmt;

use reqwest::StatusCode;
use tracing::{info, instrument, warn};

use crate::sources::proxy::ProxyApi;

/// Errors raised when switching exit nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// Request never got an HTTP response
    Transport(String),

    /// Controller answered with something other than 204
    UnexpectedStatus(u16),
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchError::Transport(msg) => write!(f, "failed to switch node: {}", msg),
            SwitchError::UnexpectedStatus(status) => {
                write!(f, "failed to switch node: status {}", status)
            }
        }
    }
}

impl std::error::Error for SwitchError {}

/// Selects the active exit node of the managed group
#[derive(Debug, Clone)]
pub struct NodeControl {
    api: ProxyApi,
}

impl NodeControl {
    pub fn new(api: ProxyApi) -> Self {
        Self { api }
    }

    #[instrument(skip(self), fields(group = %self.api.config().group))]
    pub async fn switch_exit_node(&self, name: &str) -> Result<(), SwitchError> {
        let group = self.api.config().group.as_str();
        let response = self
            .api
            .request(reqwest::Method::PUT, &["proxies", group])
            .timeout(self.api.config().switch_timeout())
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| {
                warn!("switch request failed: {e}");
                SwitchError::Transport(e.to_string())
            })?;

        if response.status() != StatusCode::NO_CONTENT {
            warn!("switch rejected with status {}", response.status());
            return Err(SwitchError::UnexpectedStatus(response.status().as_u16()));
        }

        info!("switched exit node to {name}");
        Ok(())
    }
}
