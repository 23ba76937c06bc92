//! Cache Events
//!
//! Events emitted by the view cache for monitoring and for application
//! logic layered on top of the cache.

use crate::cache::state::ClientState;
use crate::domain::ports::UpdateSource;
use serde::{Deserialize, Serialize};

/// Events emitted by the view cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// Lifecycle transition
    StateChanged { from: ClientState, to: ClientState },

    /// A local write reached the authority
    WriteForwarded { entries: usize },

    /// A local write was applied but the authority did not acknowledge it
    WriteThroughFailed { entries: usize, error: String },

    /// A pushed view replaced the local view
    UpdateApplied { source: UpdateSource, entries: usize },

    /// The full view was re-sent after a failed write-through
    Resynced { entries: usize, attempts: u32 },
}

impl CacheEvent {
    /// Size of the view the event refers to (if any)
    pub fn entries(&self) -> Option<usize> {
        match self {
            CacheEvent::WriteForwarded { entries } => Some(*entries),
            CacheEvent::WriteThroughFailed { entries, .. } => Some(*entries),
            CacheEvent::UpdateApplied { entries, .. } => Some(*entries),
            CacheEvent::Resynced { entries, .. } => Some(*entries),
            CacheEvent::StateChanged { .. } => None,
        }
    }

    /// Check if this is an error event
    pub fn is_error(&self) -> bool {
        matches!(self, CacheEvent::WriteThroughFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let applied = CacheEvent::UpdateApplied {
            source: UpdateSource::Authority,
            entries: 2,
        };
        assert_eq!(applied.entries(), Some(2));
        assert!(!applied.is_error());

        let failed = CacheEvent::WriteThroughFailed {
            entries: 1,
            error: "timed out".to_string(),
        };
        assert!(failed.is_error());

        let changed = CacheEvent::StateChanged {
            from: ClientState::Synchronized,
            to: ClientState::Active,
        };
        assert_eq!(changed.entries(), None);
    }
}
