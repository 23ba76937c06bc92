//! View Authority Service
//!
//! Owns the canonical view and the client registry. Every accepted put
//! replaces the view and is pushed to each registered client except the
//! writer before the put is acknowledged.

use crate::authority::events::AuthorityEvent;
use crate::authority::registry::{ClientRegistry, RegistrationRecord, RegistryStatsSnapshot};
use crate::domain::messages::PutResponse;
use crate::domain::ports::{CallableAddress, ClientNotifierRef, View};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the view authority
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewAuthorityConfig {
    /// Failed pushes in a row before a client is dropped (0 = never)
    pub max_push_failures: u32,
    /// Event channel capacity
    pub event_channel_capacity: usize,
}

impl Default for ViewAuthorityConfig {
    fn default() -> Self {
        Self {
            max_push_failures: 3,
            event_channel_capacity: 1024,
        }
    }
}

// =============================================================================
// Fan-out Report
// =============================================================================

/// Outcome of pushing one put to the other clients
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
    /// Clients dropped by this fan-out
    pub removed: Vec<CallableAddress>,
}

impl From<FanOutReport> for PutResponse {
    fn from(report: FanOutReport) -> Self {
        PutResponse {
            delivered: report.delivered,
            failed: report.failed,
            removed: report.removed,
        }
    }
}

// =============================================================================
// View Authority
// =============================================================================

/// Reference authority holding the canonical view
pub struct ViewAuthority {
    view: RwLock<View>,
    registry: ClientRegistry,
    notifier: ClientNotifierRef,
    /// Held across replace and fan-out so pushes leave in put order
    put_gate: tokio::sync::Mutex<()>,
    event_tx: broadcast::Sender<AuthorityEvent>,
}

impl std::fmt::Debug for ViewAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewAuthority")
            .field("entries", &self.view.read().len())
            .field("clients", &self.registry.len())
            .finish()
    }
}

impl ViewAuthority {
    pub fn new(config: ViewAuthorityConfig, notifier: ClientNotifierRef) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Arc::new(Self {
            view: RwLock::new(View::new()),
            registry: ClientRegistry::new(config.max_push_failures),
            notifier,
            put_gate: tokio::sync::Mutex::new(()),
            event_tx,
        })
    }

    /// Subscribe to authority events
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorityEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: AuthorityEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Register a client. Returns false if the address was already known.
    pub fn register(&self, address: CallableAddress) -> bool {
        let inserted = self.registry.register(address.clone());
        if inserted {
            info!(%address, clients = self.registry.len(), "Client registered");
            self.emit_event(AuthorityEvent::ClientRegistered { address });
        } else {
            debug!(%address, "Client already registered");
        }
        inserted
    }

    /// Drop a client
    pub fn deregister(&self, address: &CallableAddress) -> Option<RegistrationRecord> {
        let record = self.registry.deregister(address)?;
        info!(%address, "Client deregistered");
        self.emit_event(AuthorityEvent::ClientRemoved {
            address: address.clone(),
            consecutive_failures: record.consecutive_failures,
        });
        Some(record)
    }

    /// Current canonical view
    pub fn fetch(&self) -> View {
        self.view.read().clone()
    }

    /// Replace the canonical view and push it to every registered client
    /// other than `origin`.
    pub async fn put(&self, view: View, origin: Option<&CallableAddress>) -> FanOutReport {
        let _gate = self.put_gate.lock().await;

        let entries = view.len();
        *self.view.write() = view.clone();
        self.emit_event(AuthorityEvent::ViewReplaced {
            entries,
            origin: origin.cloned(),
        });

        let targets = self.registry.push_targets(origin);
        debug!(entries, targets = targets.len(), "Fanning out view");

        let pushes = targets.iter().map(|address| self.notifier.push(address, &view));
        let outcomes = join_all(pushes).await;

        let mut report = FanOutReport::default();
        for (address, outcome) in targets.into_iter().zip(outcomes) {
            let error = match outcome {
                Ok(true) => {
                    self.registry.record_delivery(&address);
                    report.delivered += 1;
                    continue;
                }
                Ok(false) => "delivery not accepted".to_string(),
                Err(e) => e.to_string(),
            };

            report.failed += 1;
            warn!(%address, error = %error, "Push to client failed");
            self.emit_event(AuthorityEvent::DeliveryFailed {
                address: address.clone(),
                error,
            });

            if let Some(record) = self.registry.record_failure(&address) {
                warn!(
                    %address,
                    failures = record.consecutive_failures,
                    "Dropping unresponsive client"
                );
                self.emit_event(AuthorityEvent::ClientRemoved {
                    address: address.clone(),
                    consecutive_failures: record.consecutive_failures,
                });
                report.removed.push(address);
            }
        }

        report
    }

    /// Registered clients ordered by address
    pub fn clients(&self) -> Vec<RegistrationRecord> {
        self.registry.records()
    }

    pub fn registry_stats(&self) -> RegistryStatsSnapshot {
        self.registry.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ClientNotifier;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingNotifier {
        pushes: Mutex<Vec<(CallableAddress, View)>>,
        unreachable: Mutex<HashSet<CallableAddress>>,
    }

    #[async_trait]
    impl ClientNotifier for RecordingNotifier {
        async fn push(&self, address: &CallableAddress, view: &View) -> Result<bool> {
            if self.unreachable.lock().contains(address) {
                return Err(Error::ClientUnreachable {
                    address: address.to_string(),
                    reason: "connection refused".into(),
                });
            }
            self.pushes.lock().push((address.clone(), view.clone()));
            Ok(true)
        }
    }

    fn addr(port: u16) -> CallableAddress {
        CallableAddress::from_host_port("127.0.0.1", port).unwrap()
    }

    fn authority(notifier: Arc<RecordingNotifier>) -> Arc<ViewAuthority> {
        ViewAuthority::new(ViewAuthorityConfig::default(), notifier)
    }

    #[tokio::test]
    async fn test_put_fans_out_to_other_clients() {
        let notifier = Arc::new(RecordingNotifier::default());
        let authority = authority(notifier.clone());
        authority.register(addr(7701));
        authority.register(addr(7702));

        let view: View = [("5", json!(7))].into_iter().collect();
        let report = authority.put(view.clone(), Some(&addr(7701))).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(*notifier.pushes.lock(), vec![(addr(7702), view.clone())]);
        assert_eq!(authority.fetch(), view);
    }

    #[tokio::test]
    async fn test_put_without_origin_reaches_everyone() {
        let notifier = Arc::new(RecordingNotifier::default());
        let authority = authority(notifier.clone());
        authority.register(addr(7701));
        authority.register(addr(7702));

        let report = authority.put(View::new(), None).await;
        assert_eq!(report.delivered, 2);
    }

    #[tokio::test]
    async fn test_register_emits_once() {
        let authority = authority(Arc::new(RecordingNotifier::default()));
        let mut events = authority.subscribe();

        assert!(authority.register(addr(7701)));
        assert!(!authority.register(addr(7701)));

        assert_eq!(
            events.try_recv().unwrap(),
            AuthorityEvent::ClientRegistered { address: addr(7701) }
        );
        assert!(events.try_recv().is_err());
        assert_eq!(authority.clients().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_client_removed() {
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.unreachable.lock().insert(addr(7702));
        let authority = authority(notifier.clone());
        authority.register(addr(7701));
        authority.register(addr(7702));

        for _ in 0..2 {
            let report = authority.put(View::new(), Some(&addr(7701))).await;
            assert_eq!(report.failed, 1);
            assert!(report.removed.is_empty());
        }

        let report = authority.put(View::new(), Some(&addr(7701))).await;
        assert_eq!(report.removed, vec![addr(7702)]);
        assert_eq!(authority.clients().len(), 1);
        assert_eq!(authority.registry_stats().removals, 1);
    }

    #[test]
    fn test_report_into_response() {
        let response: PutResponse = FanOutReport {
            delivered: 2,
            failed: 1,
            removed: vec![addr(7703)],
        }
        .into();
        assert_eq!(response.delivered, 2);
        assert_eq!(response.removed, vec![addr(7703)]);
    }
}
