use std::time::Duration;

use alloy::{
    network::Ethereum,
    primitives::{Address, B256},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Header, Log, Transaction},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tracing::info;

use crate::transport::{ChainTransport, TransportError, WatchStream};

/// Default total timeout per RPC call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default maximum number of retry attempts per RPC call.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default base delay between call retries.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// [`ChainTransport`] over an Alloy provider, with built-in retry and timeout mechanisms.
///
/// Unary calls are retried with exponential backoff up to `max_retries` and bounded by a total
/// `call_timeout`. Watch establishment goes through the same policy; a watch stream that later
/// fails is the caller's concern (the watcher reconnects at the subscription level).
#[derive(Clone, Debug)]
pub struct RpcTransport {
    provider: RootProvider<Ethereum>,
    call_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
}

impl RpcTransport {
    /// Wrap `provider` with default retry and timeout settings.
    #[must_use]
    pub fn new(provider: RootProvider<Ethereum>) -> Self {
        Self {
            provider,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
        }
    }

    /// Set the total timeout for a single RPC operation, retries included.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the maximum number of retry attempts per RPC operation.
    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff between call retries.
    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Get a reference to the wrapped provider.
    #[must_use]
    pub fn provider(&self) -> &RootProvider<Ethereum> {
        &self.provider
    }

    /// Execute `operation` with exponential backoff and a total timeout.
    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, TransportError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let retry_strategy = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay);

        timeout(
            self.call_timeout,
            operation
                .retry(retry_strategy)
                .notify(|err: &RpcError<TransportErrorKind>, dur: Duration| {
                    info!(error = %err, "RPC error, retrying after {:?}", dur);
                })
                .sleep(tokio::time::sleep),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(TransportError::from)
    }
}

impl ChainTransport for RpcTransport {
    async fn block_number(&self) -> Result<u64, TransportError> {
        self.with_retry(|| async { self.provider.get_block_number().await }).await
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, TransportError> {
        self.with_retry(|| async { self.provider.get_logs(filter).await }).await
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Transaction>, TransportError> {
        self.with_retry(|| async { self.provider.get_transaction_by_hash(hash).await }).await
    }

    async fn watch_blocks(&self) -> Result<WatchStream<Header>, TransportError> {
        let subscription =
            self.with_retry(|| async { self.provider.subscribe_blocks().await }).await?;
        Ok(Box::pin(subscription.into_stream().map(Ok::<_, TransportError>)))
    }

    async fn watch_pending_transactions(&self) -> Result<WatchStream<B256>, TransportError> {
        let subscription = self
            .with_retry(|| async { self.provider.subscribe_pending_transactions().await })
            .await?;
        Ok(Box::pin(subscription.into_stream().map(Ok::<_, TransportError>)))
    }

    async fn watch_contract_event(
        &self,
        address: Address,
        event: &str,
    ) -> Result<WatchStream<Log>, TransportError> {
        let filter = Filter::new().address(address).event(event);
        let subscription =
            self.with_retry(|| async { self.provider.subscribe_logs(&filter).await }).await?;
        Ok(Box::pin(subscription.into_stream().map(Ok::<_, TransportError>)))
    }
}
