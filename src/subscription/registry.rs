//! Listener registry and watch task orchestration.
//!
//! The registry owns the map of subscription key to [`SubscriptionState`]. A key's transport
//! watch is active exactly when its listener set is non-empty: the first registration spawns the
//! watch task, the last removal aborts it and discards the key. All mutation goes through the
//! registry handle; watch tasks and retry timers carry clones of it.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::{
    subscription::{
        backfill::{self, BackfillRequest},
        dispatch,
        reconnect::{ReconnectConfig, ReconnectState},
    },
    transport::{ChainTransport, TransportError, WatchStream},
    types::{CallbackId, ChainEvent, EventCallback, SubscriptionKind},
};

pub(crate) struct SubscriptionState {
    pub(super) callbacks: HashMap<CallbackId, EventCallback>,
    pub(super) watch: Option<JoinHandle<()>>,
    pub(super) started: bool,
    pub(super) reconnect: ReconnectState,
}

impl SubscriptionState {
    fn new(config: ReconnectConfig) -> Self {
        Self {
            callbacks: HashMap::new(),
            watch: None,
            started: false,
            reconnect: ReconnectState::new(config),
        }
    }
}

pub(super) struct Shared<T> {
    pub(super) transport: Arc<T>,
    pub(super) subs: Mutex<HashMap<SubscriptionKind, SubscriptionState>>,
    pub(super) reconnect_config: Mutex<ReconnectConfig>,
    pub(super) next_callback_id: AtomicU64,
    pub(super) shutting_down: AtomicBool,
    pub(super) backfills: Mutex<JoinSet<()>>,
    pub(super) drain_timeout: Duration,
}

/// Cheaply cloneable handle to one watcher's subscription state.
pub(crate) struct SubscriptionRegistry<T: ChainTransport> {
    pub(super) shared: Arc<Shared<T>>,
}

impl<T: ChainTransport> Clone for SubscriptionRegistry<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T: ChainTransport> SubscriptionRegistry<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        reconnect_config: ReconnectConfig,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                subs: Mutex::new(HashMap::new()),
                reconnect_config: Mutex::new(reconnect_config),
                next_callback_id: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
                backfills: Mutex::new(JoinSet::new()),
                drain_timeout,
            }),
        }
    }

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    pub(super) fn lock_subs(&self) -> MutexGuard<'_, HashMap<SubscriptionKind, SubscriptionState>> {
        self.shared.subs.lock().expect("subscription map lock poisoned")
    }

    /// Replace the reconnect policy for keys created from now on.
    pub(crate) fn set_reconnect_config(
        &self,
        base_delay: Option<Duration>,
        max_attempts: Option<usize>,
    ) {
        let mut config =
            self.shared.reconnect_config.lock().expect("reconnect config lock poisoned");
        if let Some(base_delay) = base_delay {
            config.base_delay = base_delay;
        }
        if let Some(max_attempts) = max_attempts {
            config.max_attempts = max_attempts;
        }
        info!(
            base_delay_ms = config.base_delay.as_millis() as u64,
            max_attempts = config.max_attempts,
            "reconnect policy updated for future subscriptions"
        );
    }

    /// Add `callback` under `kind`'s key, starting the transport watch if this is the first
    /// listener (or if the key had stalled). Never blocks.
    pub(crate) fn register(
        &self,
        kind: SubscriptionKind,
        callback: EventCallback,
    ) -> SubscriptionGuard<T> {
        let id = self.shared.next_callback_id.fetch_add(1, Ordering::Relaxed);
        let guard = SubscriptionGuard { registry: self.clone(), kind: kind.clone(), id };

        if self.is_shutting_down() {
            warn!(key = %kind, "registration ignored, watcher is shutting down");
            return guard;
        }

        let needs_start = {
            let config =
                *self.shared.reconnect_config.lock().expect("reconnect config lock poisoned");
            let mut subs = self.lock_subs();
            let state = subs.entry(kind.clone()).or_insert_with(|| SubscriptionState::new(config));
            state.callbacks.insert(id, callback);
            debug!(key = %kind, listeners = state.callbacks.len(), "listener registered");

            // Registering on a stalled key (no watch, no timer pending) forces a fresh start.
            if !state.started && !state.reconnect.has_pending_timer() {
                state.started = true;
                state.reconnect.prepare_restart();
                true
            } else {
                false
            }
        };

        if needs_start {
            self.spawn_watch(kind);
        }
        guard
    }

    pub(crate) fn unregister(&self, kind: &SubscriptionKind, id: CallbackId) {
        let mut subs = self.lock_subs();
        let Some(state) = subs.get_mut(kind) else { return };
        if state.callbacks.remove(&id).is_none() {
            return;
        }
        if state.callbacks.is_empty() {
            if let Some(watch) = state.watch.take() {
                watch.abort();
            }
            state.reconnect.cancel_timer();
            subs.remove(kind);
            info!(key = %kind, "last listener removed, watch stopped");
        } else {
            debug!(key = %kind, "listener removed");
        }
    }

    /// Remove every listener whose key matches `matches`, stopping the corresponding watches.
    pub(crate) fn unregister_matching(&self, matches: impl Fn(&SubscriptionKind) -> bool) {
        let mut subs = self.lock_subs();
        subs.retain(|kind, state| {
            if !matches(kind) {
                return true;
            }
            state.callbacks.clear();
            if let Some(watch) = state.watch.take() {
                watch.abort();
            }
            state.reconnect.cancel_timer();
            info!(key = %kind, "all listeners removed, watch stopped");
            false
        });
    }

    /// Snapshot one callback by id, if it is still registered.
    pub(crate) fn callback(&self, kind: &SubscriptionKind, id: CallbackId) -> Option<EventCallback> {
        self.lock_subs().get(kind).and_then(|state| state.callbacks.get(&id)).map(Arc::clone)
    }

    /// Record that data arrived on `kind`'s watch and snapshot its listener set for delivery.
    ///
    /// Resetting the attempt counter here means any transport data marks the watch healthy,
    /// independent of what the listeners do with it.
    pub(crate) fn confirm_data(&self, kind: &SubscriptionKind) -> Vec<(CallbackId, EventCallback)> {
        let mut subs = self.lock_subs();
        let Some(state) = subs.get_mut(kind) else { return Vec::new() };
        state.reconnect.note_success();
        state.callbacks.iter().map(|(id, callback)| (*id, Arc::clone(callback))).collect()
    }

    pub(crate) fn spawn_backfill(
        &self,
        kind: SubscriptionKind,
        target: CallbackId,
        request: BackfillRequest,
    ) {
        if self.is_shutting_down() {
            return;
        }
        let registry = self.clone();
        let mut backfills = self.shared.backfills.lock().expect("backfill set lock poisoned");
        backfills.spawn(async move {
            match backfill::run(&registry, &kind, target, request).await {
                Ok(delivered) => {
                    info!(key = %kind, delivered, "historical backfill complete");
                }
                Err(err) => {
                    error!(key = %kind, error = %err, "historical backfill failed");
                }
            }
        });
    }

    fn spawn_watch(&self, kind: SubscriptionKind) {
        let registry = self.clone();
        let task_kind = kind.clone();
        let handle = tokio::spawn(async move {
            registry.watch_loop(task_kind).await;
        });

        let mut subs = self.lock_subs();
        match subs.get_mut(&kind) {
            Some(state) => state.watch = Some(handle),
            // Key vanished between spawn and bookkeeping.
            None => handle.abort(),
        }
    }

    async fn watch_loop(self, kind: SubscriptionKind) {
        let mut stream = match self.open_stream(&kind).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(key = %kind, error = %err, "failed to establish watch");
                self.on_stream_error(&kind);
                return;
            }
        };
        info!(key = %kind, "watch established");
        self.mark_established(&kind);

        loop {
            match stream.next().await {
                Some(Ok(event)) => {
                    if self.is_shutting_down() {
                        return;
                    }
                    dispatch::dispatch(&self, &kind, &event);
                }
                Some(Err(err)) => {
                    error!(key = %kind, error = %err, "watch stream failed");
                    break;
                }
                None => {
                    warn!(key = %kind, "watch stream ended");
                    break;
                }
            }
        }

        self.on_stream_error(&kind);
    }

    /// Open the transport watch for `kind`, mapped to a uniform [`ChainEvent`] stream.
    ///
    /// Pending-transaction hashes are hydrated into full records here; hashes the node cannot
    /// resolve (or whose lookup fails) are skipped without affecting the watch.
    async fn open_stream(
        &self,
        kind: &SubscriptionKind,
    ) -> Result<WatchStream<ChainEvent>, TransportError> {
        let transport = Arc::clone(&self.shared.transport);
        match kind {
            SubscriptionKind::Block => {
                let blocks = transport.watch_blocks().await?;
                Ok(Box::pin(blocks.map(|item| item.map(ChainEvent::Block))))
            }
            SubscriptionKind::PendingTransaction => {
                let hashes = transport.watch_pending_transactions().await?;
                let hydrated = hashes
                    .then(move |item| {
                        let transport = Arc::clone(&transport);
                        async move {
                            match item {
                                Ok(hash) => match transport.transaction_by_hash(hash).await {
                                    Ok(Some(tx)) => Some(Ok(ChainEvent::Transaction(tx))),
                                    Ok(None) => {
                                        debug!(%hash, "pending transaction not retrievable, skipping");
                                        None
                                    }
                                    Err(err) => {
                                        warn!(%hash, error = %err, "failed to hydrate pending transaction, skipping");
                                        None
                                    }
                                },
                                Err(err) => Some(Err(err)),
                            }
                        }
                    })
                    .filter_map(|item| item);
                Ok(Box::pin(hydrated))
            }
            SubscriptionKind::ContractEvent { address, event } => {
                let logs = transport.watch_contract_event(*address, event).await?;
                Ok(Box::pin(logs.map(|item| item.map(ChainEvent::ContractEvent))))
            }
        }
    }

    /// The transport accepted the watch; the key is active even before any data arrives.
    fn mark_established(&self, kind: &SubscriptionKind) {
        if let Some(state) = self.lock_subs().get_mut(kind) {
            state.reconnect.note_established();
        }
    }

    /// The watch for `kind` is down; decide whether to schedule a restart.
    fn on_stream_error(&self, kind: &SubscriptionKind) {
        if self.is_shutting_down() {
            return;
        }
        let delay = {
            let mut subs = self.lock_subs();
            let Some(state) = subs.get_mut(kind) else { return };
            state.watch = None;
            state.started = false;
            if state.callbacks.is_empty() {
                subs.remove(kind);
                return;
            }
            let Some(delay) = state.reconnect.next_delay() else {
                error!(
                    key = %kind,
                    max_attempts = state.reconnect.max_attempts(),
                    "reconnect attempts exhausted, subscription stalled"
                );
                return;
            };
            delay
        };

        info!(key = %kind, delay_ms = delay.as_millis() as u64, "scheduling watch restart");
        self.schedule_restart(kind.clone(), delay);
    }

    fn schedule_restart(&self, kind: SubscriptionKind, delay: Duration) {
        let registry = self.clone();
        let timer_kind = kind.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.on_backoff_elapsed(timer_kind);
        });

        let mut subs = self.lock_subs();
        match subs.get_mut(&kind) {
            Some(state) => state.reconnect.set_timer(handle.abort_handle()),
            None => handle.abort(),
        }
    }

    fn on_backoff_elapsed(&self, kind: SubscriptionKind) {
        if self.is_shutting_down() {
            return;
        }
        {
            let mut subs = self.lock_subs();
            let Some(state) = subs.get_mut(&kind) else { return };
            state.reconnect.clear_timer();
            // Nobody wants this subscription anymore; don't reconnect.
            if state.callbacks.is_empty() {
                subs.remove(&kind);
                return;
            }
            state.started = true;
        }
        debug!(key = %kind, "backoff elapsed, re-establishing watch");
        self.spawn_watch(kind);
    }
}

/// Handle returned by a registration; call [`unsubscribe`](Self::unsubscribe) to remove the
/// listener. Dropping the guard without calling it leaves the listener registered.
#[must_use = "dropping the guard does not unsubscribe; keep it to call `unsubscribe` later"]
pub struct SubscriptionGuard<T: ChainTransport> {
    registry: SubscriptionRegistry<T>,
    kind: SubscriptionKind,
    id: CallbackId,
}

impl<T: ChainTransport> SubscriptionGuard<T> {
    /// Remove the listener. If it was the last one for its key, the underlying watch stops.
    pub fn unsubscribe(self) {
        self.registry.unregister(&self.kind, self.id);
    }

    pub(crate) fn callback_id(&self) -> CallbackId {
        self.id
    }
}
