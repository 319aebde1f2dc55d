//! Event-Watcher maintains resilient push subscriptions to an EVM node.
//!
//! The main entry point is [`EventWatcher`], built via [`EventWatcherBuilder`] on top of an
//! Alloy provider (or any custom [`ChainTransport`]).
//!
//! Register listeners with [`EventWatcher::on_block`], [`EventWatcher::on_transaction`] and
//! [`EventWatcher::on_contract_event`]. Each registration returns a [`SubscriptionGuard`] whose
//! [`unsubscribe`](SubscriptionGuard::unsubscribe) removes the listener again. All listeners for
//! the same subscription key (blocks, pending transactions, or one (address, event) pair) share a
//! single underlying transport watch.
//!
//! # Reconnection
//!
//! When a watch stream fails, the watcher tears it down and re-establishes it after a linear
//! backoff: the n-th retry waits `base_delay * n`. Once `max_attempts` consecutive retries have
//! failed the subscription stalls; listeners stay registered but receive nothing until one of
//! them re-registers. Any data arriving on a watch resets its attempt counter.
//!
//! # Historical backfill
//!
//! [`EventWatcher::on_contract_event`] optionally backfills past logs from a starting block. The
//! backfill runs concurrently with the live watch, so events near the range boundary can be
//! delivered twice — delivery is at-least-once. Consumers that need exactly-once semantics
//! should deduplicate on `(transaction_hash, log_index)`.
//!
//! # Teardown
//!
//! [`EventWatcher::destroy`] cancels every watch and pending retry timer. With
//! `wait_for_cleanup = true` it also drains in-flight backfills (bounded by the configured drain
//! timeout) before returning, after which no listener is invoked again.

pub mod subscription;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;

mod error;
mod types;
mod watcher;

pub use error::WatcherError;
pub use subscription::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, ReconnectConfig, SubscriptionGuard,
};
pub use transport::{ChainTransport, RpcTransport, TransportError, WatchStream};
pub use types::{ChainEvent, SubscriptionKind};
pub use watcher::{
    ContractEventOptions, DEFAULT_DRAIN_TIMEOUT, EventWatcher, EventWatcherBuilder,
};
