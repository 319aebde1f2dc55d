//! Public subscription facade.

use std::{sync::Arc, time::Duration};

use alloy::{
    primitives::Address,
    rpc::types::{Header, Log, Transaction},
};

use crate::{
    subscription::{
        ReconnectConfig, SubscriptionGuard, backfill::BackfillRequest,
        registry::SubscriptionRegistry,
    },
    transport::ChainTransport,
    types::{ChainEvent, SubscriptionKind},
};

mod builder;

pub use builder::{DEFAULT_DRAIN_TIMEOUT, EventWatcherBuilder};

/// Optional parameters for [`EventWatcher::on_contract_event`].
///
/// Setting `from_block` triggers a historical backfill that runs concurrently with the live
/// watch; see the [crate docs](crate) for the resulting at-least-once delivery guarantee.
/// `to_block` bounds the backfill and defaults to the chain height when the scan starts.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContractEventOptions {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

/// Resilient subscriptions to blocks, pending transactions and contract events.
///
/// One `EventWatcher` owns one subscription registry; multiple watchers in the same process are
/// fully independent. Cloning the watcher clones the handle, not the state.
///
/// # Example
///
/// ```no_run
/// # use alloy::providers::{Provider, ProviderBuilder};
/// # use event_watcher::EventWatcherBuilder;
/// #
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = ProviderBuilder::new().connect("ws://localhost:8545").await?;
/// let watcher = EventWatcherBuilder::new().connect(provider.root().clone())?;
///
/// let guard = watcher.on_block(|header| {
///     println!("new block: {}", header.inner.number);
/// });
///
/// // ... later
/// guard.unsubscribe();
/// watcher.destroy(true).await;
/// # Ok(())
/// # }
/// ```
pub struct EventWatcher<T: ChainTransport> {
    registry: SubscriptionRegistry<T>,
}

impl<T: ChainTransport> Clone for EventWatcher<T> {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone() }
    }
}

impl<T: ChainTransport> EventWatcher<T> {
    /// Build a watcher over a custom transport with default reconnect settings.
    #[must_use]
    pub fn with_transport(transport: T) -> Self {
        Self::new(Arc::new(transport), ReconnectConfig::default(), DEFAULT_DRAIN_TIMEOUT)
    }

    pub(crate) fn new(
        transport: Arc<T>,
        reconnect: ReconnectConfig,
        drain_timeout: Duration,
    ) -> Self {
        Self { registry: SubscriptionRegistry::new(transport, reconnect, drain_timeout) }
    }

    /// Listen for new block headers.
    pub fn on_block(
        &self,
        callback: impl Fn(Header) + Send + Sync + 'static,
    ) -> SubscriptionGuard<T> {
        self.registry.register(
            SubscriptionKind::Block,
            Arc::new(move |event| {
                if let ChainEvent::Block(header) = event {
                    callback(header);
                }
            }),
        )
    }

    /// Listen for pending transactions, hydrated into full records.
    pub fn on_transaction(
        &self,
        callback: impl Fn(Transaction) + Send + Sync + 'static,
    ) -> SubscriptionGuard<T> {
        self.registry.register(
            SubscriptionKind::PendingTransaction,
            Arc::new(move |event| {
                if let ChainEvent::Transaction(tx) = event {
                    callback(tx);
                }
            }),
        )
    }

    /// Listen for logs emitted by `address` for the given event signature
    /// (e.g. `"Transfer(address,address,uint256)"`).
    ///
    /// With `options.from_block` set, past logs in `[from_block, to_block]` are fetched once and
    /// delivered to `callback` in ascending `(block_number, log_index)` order, concurrently with
    /// the live watch. A failed scan is logged; it does not affect the live subscription.
    pub fn on_contract_event(
        &self,
        address: Address,
        event: &str,
        callback: impl Fn(Log) + Send + Sync + 'static,
        options: ContractEventOptions,
    ) -> SubscriptionGuard<T> {
        let kind = SubscriptionKind::ContractEvent { address, event: event.to_owned() };
        let guard = self.registry.register(
            kind.clone(),
            Arc::new(move |chain_event| {
                if let ChainEvent::ContractEvent(log) = chain_event {
                    callback(log);
                }
            }),
        );

        if let Some(from_block) = options.from_block {
            self.registry.spawn_backfill(
                kind,
                guard.callback_id(),
                BackfillRequest {
                    address,
                    event: event.to_owned(),
                    from_block,
                    to_block: options.to_block,
                },
            );
        }
        guard
    }

    /// Remove every block listener and stop the block watch.
    pub fn off_block(&self) {
        self.registry.unregister_matching(|kind| matches!(kind, SubscriptionKind::Block));
    }

    /// Remove every pending-transaction listener and stop its watch.
    pub fn off_transaction(&self) {
        self.registry
            .unregister_matching(|kind| matches!(kind, SubscriptionKind::PendingTransaction));
    }

    /// Remove contract event listeners for `address`, restricted to one event signature when
    /// `event` is given, and stop the corresponding watches.
    pub fn off_contract_event(&self, address: Address, event: Option<&str>) {
        self.registry.unregister_matching(move |kind| match kind {
            SubscriptionKind::ContractEvent { address: key_address, event: key_event } => {
                *key_address == address && event.is_none_or(|name| key_event == name)
            }
            _ => false,
        });
    }

    /// Override the reconnect policy for subscriptions created after this call. Keys already in
    /// backoff keep their original schedule in flight.
    pub fn set_reconnect_config(&self, base_delay: Option<Duration>, max_attempts: Option<usize>) {
        self.registry.set_reconnect_config(base_delay, max_attempts);
    }

    /// Tear down every subscription and timer. Idempotent.
    ///
    /// With `wait_for_cleanup` the call also drains in-flight backfills (bounded by the drain
    /// timeout) and guarantees no listener fires after it returns; without it, in-flight
    /// deliveries may still land shortly after.
    pub async fn destroy(&self, wait_for_cleanup: bool) {
        self.registry.shutdown(wait_for_cleanup).await;
    }
}
