//! Endpoint Listener Server
//!
//! Binds the client's callable endpoint, publishes its address to the
//! owning client, then serves inbound pushes until the process exits.

use crate::cache::metrics::CacheMetrics;
use crate::domain::ports::{CallableAddress, UpdateEntryPointRef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::rest::ListenerRouter;

// =============================================================================
// Listener Configuration
// =============================================================================

/// Configuration for the endpoint listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (port 0 picks an ephemeral port)
    pub bind_addr: SocketAddr,
    /// Host advertised in the callable address; defaults to the bound IP
    pub advertise_host: Option<String>,
    /// How long startup waits for the listener to publish its address
    pub ready_timeout_ms: u64,
    /// Max push body size
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertise_host: None,
            ready_timeout_ms: 5_000,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl ListenerConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Host a remote caller should use to reach `local_addr`
    fn advertised_host(&self, local_addr: SocketAddr) -> String {
        match &self.advertise_host {
            Some(host) => host.clone(),
            None if local_addr.ip().is_unspecified() => "127.0.0.1".to_string(),
            None => local_addr.ip().to_string(),
        }
    }
}

// =============================================================================
// Listener Handle
// =============================================================================

/// A listener that has bound and published its callable address
#[derive(Debug)]
pub struct ListenerHandle {
    address: CallableAddress,
    local_addr: SocketAddr,
    task: JoinHandle<Result<()>>,
}

impl ListenerHandle {
    /// Address registered with the authority
    pub fn address(&self) -> &CallableAddress {
        &self.address
    }

    /// Socket the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the accept loop is still running
    pub fn is_serving(&self) -> bool {
        !self.task.is_finished()
    }
}

// =============================================================================
// Endpoint Listener
// =============================================================================

/// Remote endpoint listener owned by a view cache client
pub struct EndpointListener {
    config: ListenerConfig,
    entry_point: UpdateEntryPointRef,
    metrics: Option<Arc<CacheMetrics>>,
}

impl EndpointListener {
    /// Create a listener dispatching into `entry_point`
    pub fn new(config: ListenerConfig, entry_point: UpdateEntryPointRef) -> Self {
        Self {
            config,
            entry_point,
            metrics: None,
        }
    }

    /// Count dispatch failures and serve `/metrics` from `metrics`
    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the accept loop and wait until it has a callable address.
    ///
    /// Returns once the address is published. A bind failure, or a loop
    /// that dies before publishing, is returned as an error rather than
    /// leaving the caller waiting.
    pub async fn start(self) -> Result<ListenerHandle> {
        let ready_timeout = self.config.ready_timeout();
        let bind_addr = self.config.bind_addr;
        let (ready_tx, ready_rx) = oneshot::channel();

        let mut router = ListenerRouter::new(self.entry_point)
            .with_max_body_size(self.config.max_body_size);
        if let Some(metrics) = self.metrics {
            router = router.with_metrics(metrics);
        }

        let task = tokio::spawn(run_listener(self.config, router, ready_tx));

        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(Ok((local_addr, address)))) => Ok(ListenerHandle {
                address,
                local_addr,
                task,
            }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::ListenerNotReady),
            Err(_) => {
                task.abort();
                Err(Error::Timeout {
                    operation: format!("listener bind on {}", bind_addr),
                    duration: ready_timeout,
                })
            }
        }
    }
}

type ReadySender = oneshot::Sender<Result<(SocketAddr, CallableAddress)>>;

/// Bind, publish the address, and serve forever
async fn run_listener(
    config: ListenerConfig,
    router: ListenerRouter,
    ready_tx: ReadySender,
) -> Result<()> {
    let bound = bind(&config).await;
    let (listener, local_addr, address) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            error!("Endpoint listener failed to start: {}", e);
            let _ = ready_tx.send(Err(e));
            return Ok(());
        }
    };

    info!(%address, %local_addr, "Endpoint listener bound");
    if ready_tx.send(Ok((local_addr, address))).is_err() {
        // Owner gave up waiting
        return Ok(());
    }

    axum::serve(listener, router.build()).await.map_err(|e| {
        error!("Endpoint listener stopped: {}", e);
        Error::Internal(format!("Endpoint listener error: {}", e))
    })
}

async fn bind(
    config: &ListenerConfig,
) -> Result<(tokio::net::TcpListener, SocketAddr, CallableAddress)> {
    let bind_error = |e: std::io::Error| Error::ListenerBind {
        addr: config.bind_addr.to_string(),
        reason: e.to_string(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;
    let address =
        CallableAddress::from_host_port(&config.advertised_host(local_addr), local_addr.port())?;

    Ok((listener, local_addr, address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{UpdateEntryPoint, UpdateSource, View};
    use assert_matches::assert_matches;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        views: Mutex<Vec<View>>,
    }

    impl UpdateEntryPoint for Recorder {
        fn update_view(&self, view: View, _source: UpdateSource) -> bool {
            self.views.lock().push(view);
            true
        }
    }

    #[test]
    fn test_default_config() {
        let config = ListenerConfig::default();
        assert_eq!(config.bind_addr.port(), 0);
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.ready_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_advertised_host() {
        let config = ListenerConfig::default();
        let any: SocketAddr = "0.0.0.0:7701".parse().unwrap();
        assert_eq!(config.advertised_host(any), "127.0.0.1");

        let config = ListenerConfig {
            advertise_host: Some("controller-1.local".into()),
            ..Default::default()
        };
        assert_eq!(config.advertised_host(any), "controller-1.local");
    }

    #[tokio::test]
    async fn test_start_publishes_bound_address() {
        let listener = EndpointListener::new(ListenerConfig::default(), Arc::new(Recorder::default()));
        let handle = listener.start().await.unwrap();

        assert_ne!(handle.local_addr().port(), 0);
        assert_eq!(
            handle.address().as_str(),
            format!("http://127.0.0.1:{}", handle.local_addr().port())
        );
        assert!(handle.is_serving());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ListenerConfig {
            bind_addr: taken.local_addr().unwrap(),
            ..Default::default()
        };

        let result = EndpointListener::new(config, Arc::new(Recorder::default()))
            .start()
            .await;
        assert_matches!(result, Err(Error::ListenerBind { .. }));
    }

    #[tokio::test]
    async fn test_serves_pushes_after_start() {
        let recorder = Arc::new(Recorder::default());
        let handle = EndpointListener::new(ListenerConfig::default(), recorder.clone())
            .start()
            .await
            .unwrap();

        let response = reqwest::Client::new()
            .post(handle.address().endpoint(crate::domain::UPDATE_PATH))
            .json(&serde_json::json!({"view": {"5": 7}}))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(recorder.views.lock().len(), 1);
    }
}
