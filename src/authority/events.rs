//! Authority Events
//!
//! Events emitted by the view authority for external consumers to react to
//! client lifecycle and fan-out outcomes.

use crate::domain::ports::CallableAddress;
use serde::{Deserialize, Serialize};

/// Events emitted by the view authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuthorityEvent {
    /// A new client address was registered
    ClientRegistered { address: CallableAddress },

    /// A client was dropped after repeated failed deliveries
    ClientRemoved {
        address: CallableAddress,
        consecutive_failures: u32,
    },

    /// The canonical view was replaced
    ViewReplaced {
        entries: usize,
        origin: Option<CallableAddress>,
    },

    /// A push to a client failed
    DeliveryFailed {
        address: CallableAddress,
        error: String,
    },
}

impl AuthorityEvent {
    /// Get the client address associated with this event (if any)
    pub fn address(&self) -> Option<&CallableAddress> {
        match self {
            AuthorityEvent::ClientRegistered { address } => Some(address),
            AuthorityEvent::ClientRemoved { address, .. } => Some(address),
            AuthorityEvent::DeliveryFailed { address, .. } => Some(address),
            AuthorityEvent::ViewReplaced { origin, .. } => origin.as_ref(),
        }
    }

    /// Check if this is a client lifecycle event
    pub fn is_client_event(&self) -> bool {
        matches!(
            self,
            AuthorityEvent::ClientRegistered { .. } | AuthorityEvent::ClientRemoved { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_address() {
        let address = CallableAddress::parse("http://10.0.0.2:7701").unwrap();

        let event = AuthorityEvent::ClientRegistered {
            address: address.clone(),
        };
        assert_eq!(event.address(), Some(&address));
        assert!(event.is_client_event());

        let event = AuthorityEvent::ViewReplaced {
            entries: 3,
            origin: None,
        };
        assert_eq!(event.address(), None);
        assert!(!event.is_client_event());
    }
}
