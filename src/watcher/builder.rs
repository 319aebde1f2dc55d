use std::{sync::Arc, time::Duration};

use alloy::{network::Ethereum, providers::RootProvider};

use crate::{
    WatcherError,
    subscription::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, ReconnectConfig},
    transport::{ChainTransport, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY, RpcTransport},
    watcher::EventWatcher,
};

/// Default bound on waiting for in-flight backfills during [`EventWatcher::destroy`].
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for an [`EventWatcher`].
///
/// Configures the subscription-level reconnect policy, the shutdown drain bound and the per-call
/// retry behavior of the underlying [`RpcTransport`].
pub struct EventWatcherBuilder {
    base_delay: Duration,
    max_attempts: usize,
    drain_timeout: Duration,
    call_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
}

impl Default for EventWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventWatcherBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
        }
    }

    /// Set the base delay of the linear watch-reconnect backoff; the n-th retry waits
    /// `base_delay * n`. Must be greater than zero.
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the maximum number of consecutive watch-reconnect attempts per subscription key.
    /// Zero disables automatic reconnection entirely.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the bound on waiting for in-flight backfills during a waited
    /// [`destroy`](EventWatcher::destroy).
    #[must_use]
    pub fn drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Set the total timeout per RPC call, retries included.
    #[must_use]
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Set the maximum number of retries per RPC call.
    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay of the per-call exponential retry backoff.
    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Build the watcher over an Alloy provider.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidBaseDelay`] if the configured base delay is zero.
    pub fn connect(
        self,
        provider: RootProvider<Ethereum>,
    ) -> Result<EventWatcher<RpcTransport>, WatcherError> {
        let transport = RpcTransport::new(provider)
            .call_timeout(self.call_timeout)
            .max_retries(self.max_retries)
            .min_delay(self.min_delay);
        self.connect_transport(transport)
    }

    /// Build the watcher over a custom [`ChainTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidBaseDelay`] if the configured base delay is zero.
    pub fn connect_transport<T: ChainTransport>(
        self,
        transport: T,
    ) -> Result<EventWatcher<T>, WatcherError> {
        if self.base_delay.is_zero() {
            return Err(WatcherError::InvalidBaseDelay);
        }
        let reconnect =
            ReconnectConfig { base_delay: self.base_delay, max_attempts: self.max_attempts };
        Ok(EventWatcher::new(Arc::new(transport), reconnect, self.drain_timeout))
    }
}
