//! View Cache Client
//!
//! A local replica of the shared view, kept consistent with the authority:
//! - **Reads** are served from the replica with no remote call
//! - **Writes** are applied locally, then the whole view is `put` to the
//!   authority before the write returns
//! - **Pushes** from the authority (or the hosting platform) replace the
//!   replica wholesale, last push wins
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐                     ┌──────────────────────┐
//! │          ViewCache           │                     │    View Authority    │
//! │                              │   put(whole view)   │                      │
//! │  write(f) ───────────────────┼────────────────────>│  canonical view      │
//! │                              │                     │                      │
//! │  ┌────────────────────────┐  │  update(new view)   │  fan-out to every    │
//! │  │   EndpointListener     │<─┼─────────────────────┤  other client        │
//! │  │   (own task, axum)     │  │                     │                      │
//! │  └──────────┬─────────────┘  │                     └──────────────────────┘
//! │             v                │
//! │     update_view(view)        │
//! └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use view_cache::{HttpAuthority, AuthorityClientConfig, ViewCache, ViewCacheConfig};
//! use std::sync::Arc;
//!
//! let authority = Arc::new(HttpAuthority::new(AuthorityClientConfig::default())?);
//! let cache = ViewCache::initialize(ViewCacheConfig::default(), authority).await?;
//!
//! cache.on_update(|view, source| println!("{} pushed {}", source, view));
//!
//! cache.insert("5", 7).await?;
//! assert_eq!(cache.get("5"), Some(7.into()));
//! ```

pub mod client;
pub mod events;
pub mod metrics;
pub mod state;

// Re-export main types
pub use client::{UpdateHandler, ViewCache, ViewCacheConfig};
pub use events::CacheEvent;
pub use metrics::{CacheMetrics, CacheStatsSnapshot};
pub use state::ClientState;
