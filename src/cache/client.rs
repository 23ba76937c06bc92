//! View Cache Client
//!
//! Holds the local replica of the view, writes every local mutation
//! through to the authority, and accepts pushed views from the endpoint
//! listener.

use crate::cache::events::CacheEvent;
use crate::cache::metrics::{CacheMetrics, CacheStatsSnapshot};
use crate::cache::state::ClientState;
use crate::domain::ports::{
    AuthorityRef, CallableAddress, UpdateEntryPoint, UpdateEntryPointRef, UpdateSource, View,
    ViewKey, ViewValue,
};
use crate::error::{Error, Result};
use crate::listener::{EndpointListener, ListenerConfig, ListenerHandle};
use backoff::ExponentialBackoffBuilder;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the view cache client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewCacheConfig {
    /// Endpoint listener configuration
    pub listener: ListenerConfig,
    /// Upper bound on each register/fetch/put round-trip
    pub call_timeout_ms: u64,
    /// Upper bound on `resync_with_backoff`
    pub resync_max_elapsed_ms: u64,
    /// Event channel capacity
    pub event_channel_capacity: usize,
}

impl Default for ViewCacheConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            call_timeout_ms: 5_000,
            resync_max_elapsed_ms: 30_000,
            event_channel_capacity: 1024,
        }
    }
}

impl ViewCacheConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn resync_max_elapsed(&self) -> Duration {
        Duration::from_millis(self.resync_max_elapsed_ms)
    }
}

/// Application callback run after a pushed view is applied
pub type UpdateHandler = Arc<dyn Fn(&View, UpdateSource) + Send + Sync>;

// =============================================================================
// View Cache
// =============================================================================

/// Write-through client cache of the shared view
pub struct ViewCache {
    config: ViewCacheConfig,
    /// Authority owning the canonical view
    authority: AuthorityRef,
    /// Local replica; every read and write goes through this lock
    view: RwLock<View>,
    /// Pushed views applied so far; bumped under the `view` write lock
    push_generation: AtomicU64,
    /// Serializes local writes so puts leave in mutation order
    write_gate: tokio::sync::Mutex<()>,
    /// Callable address, set once the listener is bound
    address: OnceLock<CallableAddress>,
    state: RwLock<ClientState>,
    handlers: RwLock<Vec<UpdateHandler>>,
    listener: Mutex<Option<ListenerHandle>>,
    metrics: Arc<CacheMetrics>,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl std::fmt::Debug for ViewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewCache")
            .field("authority", &self.authority.endpoint())
            .field("address", &self.address.get())
            .field("state", &self.state())
            .field("entries", &self.len())
            .finish()
    }
}

impl ViewCache {
    fn new(config: ViewCacheConfig, authority: AuthorityRef) -> Result<Self> {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Ok(Self {
            config,
            authority,
            view: RwLock::new(View::new()),
            push_generation: AtomicU64::new(0),
            write_gate: tokio::sync::Mutex::new(()),
            address: OnceLock::new(),
            state: RwLock::new(ClientState::Uninitialized),
            handlers: RwLock::new(Vec::new()),
            listener: Mutex::new(None),
            metrics: Arc::new(CacheMetrics::new()?),
            event_tx,
        })
    }

    /// Start the listener, register with the authority, and fetch the
    /// initial view.
    ///
    /// Registration waits until the listener has a bound address. Any
    /// failure along the way is returned as [`Error::Startup`] and no
    /// cache is produced.
    pub async fn initialize(config: ViewCacheConfig, authority: AuthorityRef) -> Result<Arc<Self>> {
        let cache = Arc::new(Self::new(config, authority)?);
        cache.start().await?;
        Ok(cache)
    }

    async fn start(self: &Arc<Self>) -> Result<()> {
        info!(authority = self.authority.endpoint(), "Initializing view cache");

        let entry_point: UpdateEntryPointRef = self.clone();
        let handle = EndpointListener::new(self.config.listener.clone(), entry_point)
            .with_metrics(self.metrics.clone())
            .start()
            .await
            .map_err(|e| e.during_startup("listen"))?;
        let address = handle.address().clone();
        let _ = self.address.set(address.clone());
        *self.listener.lock() = Some(handle);
        self.advance();

        self.call("register", self.authority.register(&address))
            .await
            .map_err(|e| e.during_startup("register"))?;
        self.advance();

        // Pushes can arrive as soon as registration is acknowledged
        let generation = self.push_generation.load(Ordering::Acquire);
        let fetched = self
            .call("fetch", self.authority.fetch())
            .await
            .map_err(|e| e.during_startup("fetch"))?;
        let entries = {
            let mut view = self.view.write();
            if self.push_generation.load(Ordering::Acquire) == generation {
                *view = fetched;
            } else {
                debug!("Push arrived during fetch, keeping pushed view");
            }
            view.len()
        };
        self.metrics.set_view_entries(entries);
        self.advance();
        self.advance();

        info!(%address, entries, "View cache active");
        Ok(())
    }

    /// Move to the next lifecycle state
    fn advance(&self) {
        let (from, to) = {
            let mut state = self.state.write();
            let from = *state;
            let Some(to) = from.next() else {
                return;
            };
            *state = to;
            (from, to)
        };

        debug!(%from, %to, "Client state changed");
        self.emit_event(CacheEvent::StateChanged { from, to });
    }

    /// Run a remote call bounded by the configured timeout
    async fn call<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let duration = self.config.call_timeout();
        match tokio::time::timeout(duration, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                duration,
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Run `f` against the current local view. No remote call is made.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&View) -> R,
    {
        f(&self.view.read())
    }

    /// Copy of the current local view
    pub fn snapshot(&self) -> View {
        self.view.read().clone()
    }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<ViewValue> {
        self.view.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.view.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.read().is_empty()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply `mutate` to the local view and forward the entire resulting
    /// view to the authority.
    ///
    /// On [`Error::WriteThrough`] the local mutation stays applied and the
    /// local view is ahead of the authority until [`ViewCache::resync`]
    /// succeeds.
    ///
    /// # Cancellation
    ///
    /// Not cancellation safe. Dropping the future after the local apply
    /// leaves the mutation local with no error and no
    /// [`CacheEvent::WriteThroughFailed`]; call [`ViewCache::resync`] to
    /// forward it.
    pub async fn write<F, R>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut View) -> R + Send,
        R: Send,
    {
        let _gate = self.write_gate.lock().await;

        let (result, snapshot) = {
            let mut view = self.view.write();
            let result = mutate(&mut view);
            (result, view.clone())
        };
        self.metrics.set_view_entries(snapshot.len());

        self.forward(&snapshot).await?;
        Ok(result)
    }

    /// Set `key` to `value`, returning the previous value
    pub async fn insert<K, V>(&self, key: K, value: V) -> Result<Option<ViewValue>>
    where
        K: Into<ViewKey> + Send,
        V: Into<ViewValue> + Send,
    {
        let (key, value) = (key.into(), value.into());
        self.write(move |view| view.insert(key, value)).await
    }

    /// Remove `key`, returning its value
    pub async fn remove(&self, key: &str) -> Result<Option<ViewValue>> {
        self.write(|view| view.remove(key)).await
    }

    /// Send the current full view to the authority once
    pub async fn resync(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let snapshot = self.snapshot();
        self.forward(&snapshot).await
    }

    /// Retry [`ViewCache::resync`] with exponential backoff while the
    /// failure is retryable
    pub async fn resync_with_backoff(&self) -> Result<()> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_elapsed_time(Some(self.config.resync_max_elapsed()))
            .build();
        let attempts = AtomicU32::new(0);

        backoff::future::retry(policy, || {
            let attempts = &attempts;
            async move {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.resync().await.map_err(|e| {
                    if e.is_retryable() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await?;

        let attempts = attempts.load(Ordering::Relaxed);
        info!(attempts, "Resynchronized view with authority");
        self.emit_event(CacheEvent::Resynced {
            entries: self.len(),
            attempts,
        });
        Ok(())
    }

    async fn forward(&self, snapshot: &View) -> Result<()> {
        let entries = snapshot.len();

        match self.call("put", self.authority.put(snapshot)).await {
            Ok(()) => {
                self.metrics.record_write_forwarded();
                debug!(entries, "Write forwarded to authority");
                self.emit_event(CacheEvent::WriteForwarded { entries });
                Ok(())
            }
            Err(e) => {
                self.metrics.record_write_failure();
                warn!(entries, error = %e, "Write-through failed, local view is ahead of the authority");
                self.emit_event(CacheEvent::WriteThroughFailed {
                    entries,
                    error: e.to_string(),
                });
                Err(e.write_through())
            }
        }
    }

    // =========================================================================
    // Composition surface
    // =========================================================================

    /// Run `handler` after every pushed view is applied
    pub fn on_update<F>(&self, handler: F)
    where
        F: Fn(&View, UpdateSource) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    /// Entry point a hosting platform can deliver network events to
    pub fn entry_point(self: &Arc<Self>) -> UpdateEntryPointRef {
        self.clone()
    }

    fn emit_event(&self, event: CacheEvent) {
        let _ = self.event_tx.send(event);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Callable address registered with the authority
    pub fn address(&self) -> Option<&CallableAddress> {
        self.address.get()
    }

    /// Whether the endpoint listener is still accepting pushes
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .map_or(false, ListenerHandle::is_serving)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }
}

impl UpdateEntryPoint for ViewCache {
    /// Replace the whole local view. Last push wins; there is no merge and
    /// no version check.
    fn update_view(&self, view: View, source: UpdateSource) -> bool {
        let entries = view.len();
        let previous = {
            let mut current = self.view.write();
            self.push_generation.fetch_add(1, Ordering::Release);
            std::mem::replace(&mut *current, view.clone())
        };

        info!(%source, from = previous.len(), to = entries, "Updating view");
        debug!("Updating view from {} to {}", previous, view);

        self.metrics.record_update(source);
        self.metrics.set_view_entries(entries);
        self.emit_event(CacheEvent::UpdateApplied { source, entries });

        let handlers = self.handlers.read().clone();
        for handler in handlers {
            handler(&view, source);
        }

        true
    }
}
