//! Client Lifecycle
//!
//! Forward-only lifecycle of a view cache client. `Active` is the only
//! steady state; pushes and local writes happen inside it.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a view cache client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    /// Constructed, listener not started
    Uninitialized,
    /// Listener bound and callable address known
    Listening,
    /// Authority acknowledged the registration
    Registered,
    /// Initial view fetched
    Synchronized,
    /// Serving reads, writes, and pushes
    Active,
}

impl ClientState {
    /// The state that follows this one, if any
    pub fn next(self) -> Option<ClientState> {
        match self {
            ClientState::Uninitialized => Some(ClientState::Listening),
            ClientState::Listening => Some(ClientState::Registered),
            ClientState::Registered => Some(ClientState::Synchronized),
            ClientState::Synchronized => Some(ClientState::Active),
            ClientState::Active => None,
        }
    }

    pub fn is_active(self) -> bool {
        self == ClientState::Active
    }

    /// Whether the callable address has been bound
    pub fn has_address(self) -> bool {
        self >= ClientState::Listening
    }
}

impl Default for ClientState {
    fn default() -> Self {
        ClientState::Uninitialized
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Uninitialized => write!(f, "uninitialized"),
            ClientState::Listening => write!(f, "listening"),
            ClientState::Registered => write!(f, "registered"),
            ClientState::Synchronized => write!(f, "synchronized"),
            ClientState::Active => write!(f, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_order() {
        let mut state = ClientState::default();
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            assert!(next > state);
            state = next;
            seen.push(state);
        }

        assert_eq!(
            seen,
            vec![
                ClientState::Uninitialized,
                ClientState::Listening,
                ClientState::Registered,
                ClientState::Synchronized,
                ClientState::Active,
            ]
        );
        assert!(state.is_active());
    }

    #[test]
    fn test_has_address() {
        assert!(!ClientState::Uninitialized.has_address());
        assert!(ClientState::Listening.has_address());
        assert!(ClientState::Active.has_address());
    }
}
