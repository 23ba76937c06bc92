//! Client Registry
//!
//! Registration records of every client the authority pushes to, keyed by
//! callable address. Registration is idempotent per address.

use crate::domain::ports::CallableAddress;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Registration Record
// =============================================================================

/// Authority-side record of one registered client
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRecord {
    pub address: CallableAddress,
    pub registered_at: DateTime<Utc>,
    /// Last successful push
    pub last_delivery_at: Option<DateTime<Utc>>,
    /// Failed pushes since the last success
    pub consecutive_failures: u32,
}

impl RegistrationRecord {
    fn new(address: CallableAddress) -> Self {
        Self {
            address,
            registered_at: Utc::now(),
            last_delivery_at: None,
            consecutive_failures: 0,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct RegistryStats {
    registrations: AtomicU64,
    removals: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Snapshot of registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub clients: u64,
    pub registrations: u64,
    pub removals: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

// =============================================================================
// Client Registry
// =============================================================================

/// Concurrent table of registered clients
#[derive(Debug)]
pub struct ClientRegistry {
    clients: DashMap<CallableAddress, RegistrationRecord>,
    /// Failed pushes in a row after which a client is dropped (0 = never)
    max_consecutive_failures: u32,
    stats: RegistryStats,
}

impl ClientRegistry {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            clients: DashMap::new(),
            max_consecutive_failures,
            stats: RegistryStats::default(),
        }
    }

    /// Register `address`. Returns false when it was already registered,
    /// in which case the existing record is left untouched.
    pub fn register(&self, address: CallableAddress) -> bool {
        match self.clients.entry(address) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let record = RegistrationRecord::new(entry.key().clone());
                entry.insert(record);
                self.stats.registrations.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Remove a client
    pub fn deregister(&self, address: &CallableAddress) -> Option<RegistrationRecord> {
        let removed = self.clients.remove(address).map(|(_, record)| record);
        if removed.is_some() {
            self.stats.removals.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn get(&self, address: &CallableAddress) -> Option<RegistrationRecord> {
        self.clients.get(address).map(|record| record.clone())
    }

    pub fn contains(&self, address: &CallableAddress) -> bool {
        self.clients.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Every registered address except `origin`
    pub fn push_targets(&self, origin: Option<&CallableAddress>) -> Vec<CallableAddress> {
        let mut targets: Vec<_> = self
            .clients
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|address| Some(address) != origin)
            .collect();
        targets.sort();
        targets
    }

    /// All records ordered by address
    pub fn records(&self) -> Vec<RegistrationRecord> {
        let mut records: Vec<_> = self.clients.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.address.cmp(&b.address));
        records
    }

    /// Record a successful push
    pub fn record_delivery(&self, address: &CallableAddress) {
        if let Some(mut record) = self.clients.get_mut(address) {
            record.last_delivery_at = Some(Utc::now());
            record.consecutive_failures = 0;
        }
        self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed push. Returns the dropped record if this failure
    /// reached the removal threshold.
    pub fn record_failure(&self, address: &CallableAddress) -> Option<RegistrationRecord> {
        self.stats.delivery_failures.fetch_add(1, Ordering::Relaxed);

        let failures = {
            let mut record = self.clients.get_mut(address)?;
            record.consecutive_failures += 1;
            record.consecutive_failures
        };

        if self.max_consecutive_failures > 0 && failures >= self.max_consecutive_failures {
            self.deregister(address)
        } else {
            None
        }
    }

    pub fn stats(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            clients: self.clients.len() as u64,
            registrations: self.stats.registrations.load(Ordering::Relaxed),
            removals: self.stats.removals.load(Ordering::Relaxed),
            deliveries: self.stats.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.stats.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> CallableAddress {
        CallableAddress::from_host_port("127.0.0.1", port).unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ClientRegistry::new(3);

        assert!(registry.register(addr(7701)));
        let first = registry.get(&addr(7701)).unwrap();

        assert!(!registry.register(addr(7701)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&addr(7701)).unwrap(), first);
        assert_eq!(registry.stats().registrations, 1);
    }

    #[test]
    fn test_push_targets_exclude_origin() {
        let registry = ClientRegistry::new(3);
        registry.register(addr(7701));
        registry.register(addr(7702));
        registry.register(addr(7703));

        assert_eq!(
            registry.push_targets(Some(&addr(7702))),
            vec![addr(7701), addr(7703)]
        );
        assert_eq!(registry.push_targets(None).len(), 3);
    }

    #[test]
    fn test_failures_remove_after_threshold() {
        let registry = ClientRegistry::new(2);
        registry.register(addr(7701));

        assert!(registry.record_failure(&addr(7701)).is_none());
        let removed = registry.record_failure(&addr(7701)).unwrap();

        assert_eq!(removed.consecutive_failures, 2);
        assert!(!registry.contains(&addr(7701)));
        assert_eq!(registry.stats().removals, 1);
    }

    #[test]
    fn test_delivery_resets_failures() {
        let registry = ClientRegistry::new(2);
        registry.register(addr(7701));

        registry.record_failure(&addr(7701));
        registry.record_delivery(&addr(7701));
        assert!(registry.record_failure(&addr(7701)).is_none());

        let record = registry.get(&addr(7701)).unwrap();
        assert_eq!(record.consecutive_failures, 1);
        assert!(record.last_delivery_at.is_some());
    }

    #[test]
    fn test_zero_threshold_never_removes() {
        let registry = ClientRegistry::new(0);
        registry.register(addr(7701));
        for _ in 0..10 {
            assert!(registry.record_failure(&addr(7701)).is_none());
        }
        assert!(registry.contains(&addr(7701)));
    }
}
