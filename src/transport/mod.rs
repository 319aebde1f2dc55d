//! The transport seam between the subscription machinery and an actual RPC connection.
//!
//! [`ChainTransport`] is the narrow interface the watcher consumes: a handful of unary calls
//! plus three watch constructors that return live streams. [`RpcTransport`] implements it over
//! an Alloy [`RootProvider`](alloy::providers::RootProvider) with per-call retries and timeouts;
//! tests substitute a scripted implementation.

use std::{pin::Pin, sync::Arc};

use alloy::{
    primitives::{Address, B256},
    rpc::types::{Filter, Header, Log, Transaction},
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;
use tokio_stream::Stream;

mod rpc;

pub use rpc::{DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY, RpcTransport};

/// A live push stream handed out by a `watch_*` call.
///
/// The stream yields items until the transport fails; a failure is reported either as an `Err`
/// item or by the stream ending. Dropping the stream cancels the underlying watch.
pub type WatchStream<T> = Pin<Box<dyn Stream<Item = Result<T, TransportError>> + Send>>;

/// Errors produced by a [`ChainTransport`].
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The underlying RPC transport returned an error.
    #[error("RPC error: {0}")]
    Rpc(Arc<RpcError<TransportErrorKind>>),

    /// A timeout elapsed while waiting for an RPC response.
    #[error("Operation timed out")]
    Timeout,

    /// A watch stream ended (for example, the underlying WebSocket connection closed).
    #[error("Watch stream closed")]
    StreamClosed,
}

impl From<RpcError<TransportErrorKind>> for TransportError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        TransportError::Rpc(Arc::new(error))
    }
}

/// Chain access consumed by the subscription machinery.
///
/// Unary calls are expected to apply their own retry policy; watch establishment failures and
/// stream failures are handled by the watcher's reconnect logic, not here.
pub trait ChainTransport: Send + Sync + 'static {
    /// Current chain height.
    fn block_number(&self) -> impl Future<Output = Result<u64, TransportError>> + Send;

    /// Logs matching `filter`, over the filter's full block range.
    fn logs(&self, filter: &Filter) -> impl Future<Output = Result<Vec<Log>, TransportError>> + Send;

    /// Hydrate a transaction hash into a full record. `None` if the node does not know the hash.
    fn transaction_by_hash(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<Transaction>, TransportError>> + Send;

    /// Watch new block headers.
    fn watch_blocks(
        &self,
    ) -> impl Future<Output = Result<WatchStream<Header>, TransportError>> + Send;

    /// Watch pending transaction hashes.
    fn watch_pending_transactions(
        &self,
    ) -> impl Future<Output = Result<WatchStream<B256>, TransportError>> + Send;

    /// Watch logs emitted by `address` for the given event signature
    /// (e.g. `"Transfer(address,address,uint256)"`).
    fn watch_contract_event(
        &self,
        address: Address,
        event: &str,
    ) -> impl Future<Output = Result<WatchStream<Log>, TransportError>> + Send;
}
