//! View Cache - Write-Through Replica of a Shared Network View
//!
//! Each participating process keeps a local copy of a shared key/value view.
//! Reads are served locally; every local write is pushed to a central view
//! authority, which fans the new view out to every other registered client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐        register / fetch / put         ┌─────────────────────┐
//! │   Client process    │ ─────────────────────────────────────>│   View Authority    │
//! │                     │                                        │                     │
//! │  ViewCache          │                                        │  canonical View     │
//! │   └ local View      │        POST /v1/view/update            │  ClientRegistry     │
//! │  EndpointListener <─┼────────────────────────────────────────┤  fan-out notifier   │
//! └─────────────────────┘                                        └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: The client-side cache and its lifecycle
//! - [`listener`]: Endpoint listener receiving pushed views
//! - [`authority`]: Authority RPC client and a reference authority
//! - [`config`]: YAML configuration file
//! - [`domain`]: Core domain types, traits and wire messages
//! - [`error`]: Error types and handling

pub mod authority;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod listener;

// Re-export commonly used types
pub use authority::{
    AuthorityClientConfig, AuthorityServer, AuthorityServerConfig, HttpAuthority,
    InProcessAuthority, ViewAuthority, ViewAuthorityConfig,
};

pub use cache::{CacheEvent, ClientState, ViewCache, ViewCacheConfig};

pub use config::{ClientConfig, Config};

pub use domain::ports::{
    Authority, AuthorityRef, CallableAddress, ClientNotifier, UpdateEntryPoint, UpdateSource,
    View, ViewKey, ViewValue,
};

pub use error::{Error, ErrorAction, Result};

pub use listener::{EndpointListener, ListenerConfig, ListenerHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
