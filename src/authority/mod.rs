//! View Authority
//!
//! Both sides of the authority contract:
//! - [`HttpAuthority`]: the client's RPC stub for `register`/`fetch`/`put`
//! - [`ViewAuthority`]: a reference authority holding the canonical view
//!   and fanning updates out to registered clients, served over HTTP by
//!   [`AuthorityServer`] or used in-process through [`InProcessAuthority`]

pub mod client;
pub mod events;
pub mod local;
pub mod notifier;
pub mod registry;
pub mod rest;
pub mod server;
pub mod service;

pub use client::{AuthorityClientConfig, HttpAuthority};
pub use events::AuthorityEvent;
pub use local::InProcessAuthority;
pub use notifier::{HttpNotifier, NotifierConfig};
pub use registry::{ClientRegistry, RegistrationRecord, RegistryStatsSnapshot};
pub use rest::AuthorityRouter;
pub use server::{AuthorityServer, AuthorityServerConfig};
pub use service::{FanOutReport, ViewAuthority, ViewAuthorityConfig};
