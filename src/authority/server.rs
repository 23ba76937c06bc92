//! Authority Server
//!
//! Runs a [`ViewAuthority`] behind its REST API.

use crate::authority::notifier::{HttpNotifier, NotifierConfig};
use crate::authority::rest::AuthorityRouter;
use crate::authority::service::{ViewAuthority, ViewAuthorityConfig};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Configuration for the authority server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityServerConfig {
    /// API bind address
    pub bind_addr: SocketAddr,
    pub authority: ViewAuthorityConfig,
    pub notifier: NotifierConfig,
}

impl Default for AuthorityServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7700)),
            authority: ViewAuthorityConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

/// Reference authority served over HTTP
#[derive(Debug)]
pub struct AuthorityServer {
    config: AuthorityServerConfig,
    authority: Arc<ViewAuthority>,
}

impl AuthorityServer {
    pub fn new(config: AuthorityServerConfig) -> Result<Self> {
        let notifier = Arc::new(HttpNotifier::new(config.notifier.clone())?);
        let authority = ViewAuthority::new(config.authority.clone(), notifier);
        Ok(Self { config, authority })
    }

    pub fn authority(&self) -> &Arc<ViewAuthority> {
        &self.authority
    }

    /// Bind the configured address and serve until the process exits
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| Error::ListenerBind {
                addr: self.config.bind_addr.to_string(),
                reason: e.to_string(),
            })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "Starting view authority");

        let app = AuthorityRouter::new(self.authority).build();
        axum::serve(listener, app).await.map_err(|e| {
            error!("Authority server stopped: {}", e);
            Error::Internal(format!("Authority server error: {}", e))
        })
    }
}
