//! Domain Ports - Core types and trait definitions for the view cache
//!
//! These traits define the boundaries between the cache and the systems it
//! talks to: the authority that owns the canonical view, the client entry
//! point that receives pushes, and the authority-side push transport.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// View
// =============================================================================

/// Key type of the shared view
pub type ViewKey = String;

/// Opaque value payload stored under a view key
pub type ViewValue = Value;

/// Shared network/control state replicated by value between the authority
/// and every client.
///
/// Keys are ordered so two views with the same content serialize
/// identically on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct View(BTreeMap<ViewKey, ViewValue>);

impl View {
    /// Create an empty view
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&ViewValue> {
        self.0.get(key)
    }

    /// Insert or update a key, returning the previous value
    pub fn insert(&mut self, key: impl Into<ViewKey>, value: impl Into<ViewValue>) -> Option<ViewValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<ViewValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&ViewKey, &ViewValue)> {
        self.0.iter()
    }

    /// Iterate keys in order
    pub fn keys(&self) -> impl Iterator<Item = &ViewKey> {
        self.0.keys()
    }

    pub fn into_inner(self) -> BTreeMap<ViewKey, ViewValue> {
        self.0
    }
}

impl From<BTreeMap<ViewKey, ViewValue>> for View {
    fn from(entries: BTreeMap<ViewKey, ViewValue>) -> Self {
        Self(entries)
    }
}

impl<K, V> FromIterator<(K, V)> for View
where
    K: Into<ViewKey>,
    V: Into<ViewValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Callable Address
// =============================================================================

/// Network-resolvable handle of a client's endpoint listener.
///
/// Always an absolute `http` or `https` base URL without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallableAddress(String);

impl CallableAddress {
    /// Parse and validate an address
    pub fn parse(raw: &str) -> Result<Self> {
        let url = reqwest::Url::parse(raw.trim())
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidAddress(format!(
                    "{}: unsupported scheme {}",
                    raw, other
                )))
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::InvalidAddress(format!("{}: missing host", raw)));
        }

        Ok(Self(url.as_str().trim_end_matches('/').to_string()))
    }

    /// Build the address of a listener reachable at `host:port`
    pub fn from_host_port(host: &str, port: u16) -> Result<Self> {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        Self::parse(&format!("http://{}:{}", host, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full URL of `path` on this address
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl std::fmt::Display for CallableAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CallableAddress {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<CallableAddress> for String {
    fn from(address: CallableAddress) -> Self {
        address.0
    }
}

// =============================================================================
// Update Source
// =============================================================================

/// Origin of a pushed view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// Invalidation pushed by the authority
    Authority,
    /// Event notification from the hosting platform
    Platform,
}

impl std::fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateSource::Authority => write!(f, "authority"),
            UpdateSource::Platform => write!(f, "platform"),
        }
    }
}

// =============================================================================
// Authority Port
// =============================================================================

/// Remote contract of the view authority, as seen by a client
#[async_trait]
pub trait Authority: Send + Sync {
    /// Record the client's callable address so pushes can reach it.
    ///
    /// Idempotent per address.
    async fn register(&self, address: &CallableAddress) -> Result<()>;

    /// Fetch the canonical view
    async fn fetch(&self) -> Result<View>;

    /// Replace the canonical view with `view`.
    ///
    /// The authority pushes the new view to every other registered client.
    async fn put(&self, view: &View) -> Result<()>;

    /// Human-readable endpoint used in logs
    fn endpoint(&self) -> &str;
}

// =============================================================================
// Update Entry Point Port
// =============================================================================

/// Target of pushed views, implemented by the client cache.
///
/// Called by the endpoint listener on behalf of the authority, or directly
/// by a hosting platform delivering network events.
pub trait UpdateEntryPoint: Send + Sync {
    /// Replace the local view with `view`. Returns whether delivery was
    /// accepted.
    fn update_view(&self, view: View, source: UpdateSource) -> bool;
}

// =============================================================================
// Client Notifier Port
// =============================================================================

/// Authority-side transport used to push views to registered clients
#[async_trait]
pub trait ClientNotifier: Send + Sync {
    /// Deliver `view` to the client listening at `address`
    async fn push(&self, address: &CallableAddress, view: &View) -> Result<bool>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type AuthorityRef = Arc<dyn Authority>;
pub type UpdateEntryPointRef = Arc<dyn UpdateEntryPoint>;
pub type ClientNotifierRef = Arc<dyn ClientNotifier>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_wire_format() {
        let view: View = [("5", json!(7)), ("9", json!(1))].into_iter().collect();

        let encoded = serde_json::to_string(&view).unwrap();
        assert_eq!(encoded, r#"{"5":7,"9":1}"#);

        let decoded: View = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, view);
    }

    #[test]
    fn test_view_mutation() {
        let mut view = View::new();
        assert!(view.is_empty());

        assert_eq!(view.insert("3", 4), None);
        assert_eq!(view.insert("3", 5), Some(json!(4)));
        assert_eq!(view.get("3"), Some(&json!(5)));
        assert_eq!(view.len(), 1);

        assert_eq!(view.remove("3"), Some(json!(5)));
        assert!(!view.contains_key("3"));
    }

    #[test]
    fn test_view_display() {
        let view: View = [("a", json!(1)), ("b", json!("x"))].into_iter().collect();
        assert_eq!(view.to_string(), r#"{a: 1, b: "x"}"#);
        assert_eq!(View::new().to_string(), "{}");
    }

    #[test]
    fn test_callable_address_normalization() {
        let address = CallableAddress::parse("http://127.0.0.1:7701/").unwrap();
        assert_eq!(address.as_str(), "http://127.0.0.1:7701");
        assert_eq!(
            address.endpoint("/v1/view/update"),
            "http://127.0.0.1:7701/v1/view/update"
        );

        let v6 = CallableAddress::from_host_port("::1", 8080).unwrap();
        assert_eq!(v6.as_str(), "http://[::1]:8080");
    }

    #[test]
    fn test_callable_address_rejects_invalid() {
        assert!(CallableAddress::parse("").is_err());
        assert!(CallableAddress::parse("not a url").is_err());
        assert!(CallableAddress::parse("ftp://host:21").is_err());

        let decoded: std::result::Result<CallableAddress, _> = serde_json::from_str(r#""""#);
        assert!(decoded.is_err());
    }

    #[test]
    fn test_update_source_display() {
        assert_eq!(format!("{}", UpdateSource::Authority), "authority");
        assert_eq!(format!("{}", UpdateSource::Platform), "platform");
    }
}
