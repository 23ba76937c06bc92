//! Configuration file loading
//!
//! Optional YAML file with a section per role:
//!
//! ```yaml
//! client:
//!   authority:
//!     endpoint: http://controller:7700
//!   cache:
//!     call_timeout_ms: 2000
//!     listener:
//!       bind_addr: 0.0.0.0:0
//!       advertise_host: worker-3.local
//! authority:
//!   bind_addr: 0.0.0.0:7700
//!   authority:
//!     max_push_failures: 5
//!   notifier:
//!     push_timeout_ms: 1000
//! ```
//!
//! Missing sections and fields take their defaults.

use crate::authority::{AuthorityClientConfig, AuthorityServerConfig};
use crate::cache::ViewCacheConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the `client` role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub authority: AuthorityClientConfig,
    pub cache: ViewCacheConfig,
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub authority: AuthorityServerConfig,
}

impl Config {
    /// Parse configuration from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_yaml(
            r#"
client:
  authority:
    endpoint: http://controller:7700
  cache:
    listener:
      advertise_host: worker-3.local
authority:
  authority:
    max_push_failures: 5
"#,
        )
        .unwrap();

        assert_eq!(config.client.authority.endpoint, "http://controller:7700");
        assert_eq!(config.client.authority.request_timeout_ms, 5_000);
        assert_eq!(
            config.client.cache.listener.advertise_host.as_deref(),
            Some("worker-3.local")
        );
        assert_eq!(config.client.cache.call_timeout_ms, 5_000);
        assert_eq!(config.authority.authority.max_push_failures, 5);
        assert_eq!(config.authority.bind_addr.port(), 7700);
        assert_eq!(config.authority.notifier.push_timeout_ms, 2_000);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.client.authority.endpoint, "http://127.0.0.1:7700");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "authority:\n  bind_addr: 127.0.0.1:7800").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.authority.bind_addr.port(), 7800);
    }

    #[test]
    fn test_invalid_yaml() {
        let result = Config::from_yaml("client: [unterminated");
        assert_matches!(result, Err(Error::YamlParse(_)));

        let result = Config::load("/nonexistent/view-cache.yaml");
        assert_matches!(result, Err(Error::Configuration(_)));
    }
}
