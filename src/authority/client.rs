//! Authority RPC Client
//!
//! Implements the client side of the authority contract over JSON/HTTP.
//! Each client process owns one `HttpAuthority`; the address passed to
//! `register` is sent as the origin of later puts so the authority does not
//! push a client's own write back to it.

use crate::domain::messages::{
    ApiErrorResponse, PutRequest, PutResponse, RegisterRequest, RegisterResponse, CLIENTS_PATH,
    VIEW_PATH,
};
use crate::domain::ports::{Authority, CallableAddress, View};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the authority client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityClientConfig {
    /// Authority base URL
    pub endpoint: String,
    /// Transport timeout for each request
    pub request_timeout_ms: u64,
    /// Transport timeout for establishing a connection
    pub connect_timeout_ms: u64,
}

impl Default for AuthorityClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7700".to_string(),
            request_timeout_ms: 5_000,
            connect_timeout_ms: 2_000,
        }
    }
}

impl AuthorityClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// =============================================================================
// HTTP Authority
// =============================================================================

/// Authority stub speaking JSON over HTTP
pub struct HttpAuthority {
    config: AuthorityClientConfig,
    /// Normalized base URL without trailing slash
    endpoint: String,
    http: reqwest::Client,
    /// Address registered by this client, sent as put origin
    origin: RwLock<Option<CallableAddress>>,
}

impl std::fmt::Debug for HttpAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthority")
            .field("endpoint", &self.endpoint)
            .field("origin", &*self.origin.read())
            .finish()
    }
}

impl HttpAuthority {
    /// Create a new authority client
    pub fn new(config: AuthorityClientConfig) -> Result<Self> {
        let url = reqwest::Url::parse(&config.endpoint).map_err(|e| {
            Error::Configuration(format!("Invalid authority URL {}: {}", config.endpoint, e))
        })?;
        let endpoint = url.as_str().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            config,
            endpoint,
            http,
            origin: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Classify a failed send
    fn send_error(&self, operation: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                operation: operation.to_string(),
                duration: self.config.request_timeout(),
            }
        } else if e.is_connect() {
            Error::AuthorityUnreachable {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }
        } else {
            Error::Transport(e)
        }
    }

    /// Turn a non-success status into `AuthorityRejected`
    async fn check(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        Err(Error::AuthorityRejected {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn register(&self, address: &CallableAddress) -> Result<()> {
        let request = RegisterRequest {
            address: address.clone(),
        };

        let response = self
            .http
            .post(self.url(CLIENTS_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error("register", e))?;
        let ack: RegisterResponse = Self::check("register", response).await?.json().await?;

        debug!(
            %address,
            newly_registered = ack.newly_registered,
            "Registered with authority"
        );
        *self.origin.write() = Some(ack.address);
        Ok(())
    }

    async fn fetch(&self) -> Result<View> {
        let response = self
            .http
            .get(self.url(VIEW_PATH))
            .send()
            .await
            .map_err(|e| self.send_error("fetch", e))?;

        Ok(Self::check("fetch", response).await?.json().await?)
    }

    async fn put(&self, view: &View) -> Result<()> {
        let request = PutRequest {
            view: view.clone(),
            origin: self.origin.read().clone(),
        };

        let response = self
            .http
            .put(self.url(VIEW_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error("put", e))?;
        let report: PutResponse = Self::check("put", response).await?.json().await?;

        debug!(
            entries = view.len(),
            delivered = report.delivered,
            failed = report.failed,
            "Authority accepted view"
        );
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config() {
        let config = AuthorityClientConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:7700");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_endpoint_normalization() {
        let authority = HttpAuthority::new(AuthorityClientConfig {
            endpoint: "http://authority.local:7700/".into(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(authority.endpoint(), "http://authority.local:7700");
        assert_eq!(authority.url(VIEW_PATH), "http://authority.local:7700/v1/view");
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = HttpAuthority::new(AuthorityClientConfig {
            endpoint: "nom_server.nom_server".into(),
            ..Default::default()
        });
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_authority() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let authority = HttpAuthority::new(AuthorityClientConfig {
            endpoint: format!("http://127.0.0.1:{}", port),
            ..Default::default()
        })
        .unwrap();

        let result = authority.fetch().await;
        assert_matches!(result, Err(Error::AuthorityUnreachable { .. }));
    }
}
