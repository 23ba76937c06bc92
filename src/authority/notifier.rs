//! Push transport from the authority to client listeners

use crate::domain::messages::{UpdateRequest, UpdateResponse, UPDATE_PATH};
use crate::domain::ports::{CallableAddress, ClientNotifier, View};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Configuration for pushes to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Per-delivery timeout
    pub push_timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            push_timeout_ms: 2_000,
        }
    }
}

impl NotifierConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

/// Delivers views to `POST {address}/v1/view/update`
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    config: NotifierConfig,
    http: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.push_timeout())
            .connect_timeout(config.push_timeout())
            .build()?;

        Ok(Self { config, http })
    }

    fn send_error(&self, address: &CallableAddress, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                operation: format!("push to {}", address),
                duration: self.config.push_timeout(),
            }
        } else if e.is_connect() {
            Error::ClientUnreachable {
                address: address.to_string(),
                reason: e.to_string(),
            }
        } else {
            Error::Transport(e)
        }
    }
}

#[async_trait]
impl ClientNotifier for HttpNotifier {
    async fn push(&self, address: &CallableAddress, view: &View) -> Result<bool> {
        let request = UpdateRequest { view: view.clone() };

        let response = self
            .http
            .post(address.endpoint(UPDATE_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Dispatch(format!(
                "{} answered push with status {}",
                address, status
            )));
        }

        let ack: UpdateResponse = response.json().await?;
        trace!(%address, accepted = ack.accepted, "Pushed view");
        Ok(ack.accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_push_to_closed_port() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let address = CallableAddress::from_host_port("127.0.0.1", port).unwrap();
        let notifier = HttpNotifier::new(NotifierConfig::default()).unwrap();

        let result = notifier.push(&address, &View::new()).await;
        assert_matches!(result, Err(Error::ClientUnreachable { .. }));
    }
}
