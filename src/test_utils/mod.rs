//! Scripted transport and fixtures for exercising the watcher without a node.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use alloy::{
    primitives::{Address, B256, Bytes, LogData},
    rpc::types::{Filter, Header, Log, Transaction},
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::Instant,
};
use tokio_stream::{StreamExt, wrappers::UnboundedReceiverStream};

use crate::transport::{ChainTransport, TransportError, WatchStream};

type Feed<T> = UnboundedSender<Result<T, TransportError>>;

#[derive(Default)]
struct MockInner {
    block_number: u64,
    logs: Vec<Log>,
    fail_logs: bool,
    transactions: HashMap<B256, Transaction>,
    fail_tx_lookups: usize,
    fail_watches: usize,
    block_feeds: Vec<Feed<Header>>,
    tx_feeds: Vec<Feed<B256>>,
    log_feeds: HashMap<(Address, String), Vec<Feed<Log>>>,
    watch_attempts: Vec<(String, Instant)>,
}

/// A [`ChainTransport`] driven entirely by the test.
///
/// Watches are backed by unbounded channels the test pushes into; establishment failures,
/// stream failures, and unary-call results are all scriptable. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
    active_watches: Arc<AtomicUsize>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label under which contract-event watch attempts are recorded.
    #[must_use]
    pub fn log_label(address: Address, event: &str) -> String {
        format!("log:{address}:{event}")
    }

    pub fn set_block_number(&self, number: u64) {
        self.lock().block_number = number;
    }

    pub fn set_logs(&self, logs: Vec<Log>) {
        self.lock().logs = logs;
    }

    /// Make the next `logs` call fail.
    pub fn fail_next_logs(&self) {
        self.lock().fail_logs = true;
    }

    pub fn insert_transaction(&self, hash: B256, tx: Transaction) {
        self.lock().transactions.insert(hash, tx);
    }

    /// Make the next `count` transaction lookups fail.
    pub fn fail_next_transaction_lookups(&self, count: usize) {
        self.lock().fail_tx_lookups = count;
    }

    /// Make the next `count` watch establishment attempts fail.
    pub fn fail_next_watches(&self, count: usize) {
        self.lock().fail_watches = count;
    }

    /// Number of currently live watch streams (across all kinds).
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.active_watches.load(Ordering::SeqCst)
    }

    /// Number of watch establishment attempts recorded under `label`, failed ones included.
    #[must_use]
    pub fn watch_count(&self, label: &str) -> usize {
        self.lock().watch_attempts.iter().filter(|(l, _)| l == label).count()
    }

    /// Timestamps of the watch establishment attempts recorded under `label`.
    #[must_use]
    pub fn watch_times(&self, label: &str) -> Vec<Instant> {
        self.lock()
            .watch_attempts
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn push_block(&self, header: Header) {
        self.lock().block_feeds.retain(|feed| feed.send(Ok(header.clone())).is_ok());
    }

    pub fn push_pending(&self, hash: B256) {
        self.lock().tx_feeds.retain(|feed| feed.send(Ok(hash)).is_ok());
    }

    pub fn push_log(&self, address: Address, event: &str, log: Log) {
        let mut inner = self.lock();
        if let Some(feeds) = inner.log_feeds.get_mut(&(address, event.to_owned())) {
            feeds.retain(|feed| feed.send(Ok(log.clone())).is_ok());
        }
    }

    /// Fail every live block watch stream.
    pub fn break_block_watch(&self) {
        let mut inner = self.lock();
        for feed in inner.block_feeds.drain(..) {
            let _ = feed.send(Err(TransportError::StreamClosed));
        }
    }

    /// Fail every live pending-transaction watch stream.
    pub fn break_pending_watch(&self) {
        let mut inner = self.lock();
        for feed in inner.tx_feeds.drain(..) {
            let _ = feed.send(Err(TransportError::StreamClosed));
        }
    }

    /// Fail every live watch stream for one contract event key.
    pub fn break_log_watch(&self, address: Address, event: &str) {
        let mut inner = self.lock();
        if let Some(feeds) = inner.log_feeds.remove(&(address, event.to_owned())) {
            for feed in feeds {
                let _ = feed.send(Err(TransportError::StreamClosed));
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.inner.lock().expect("mock transport lock poisoned")
    }

    fn begin_watch(&self, label: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.watch_attempts.push((label.to_owned(), Instant::now()));
        if inner.fail_watches > 0 {
            inner.fail_watches -= 1;
            return Err(TransportError::StreamClosed);
        }
        Ok(())
    }

    fn guarded<T: Send + 'static>(
        &self,
        rx: UnboundedReceiver<Result<T, TransportError>>,
    ) -> WatchStream<T> {
        let guard = WatchGuard::new(Arc::clone(&self.active_watches));
        Box::pin(UnboundedReceiverStream::new(rx).map(move |item| {
            let _keep_alive = &guard;
            item
        }))
    }
}

struct WatchGuard(Arc<AtomicUsize>);

impl WatchGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChainTransport for MockTransport {
    async fn block_number(&self) -> Result<u64, TransportError> {
        Ok(self.lock().block_number)
    }

    async fn logs(&self, _filter: &Filter) -> Result<Vec<Log>, TransportError> {
        let mut inner = self.lock();
        if inner.fail_logs {
            inner.fail_logs = false;
            return Err(TransportError::Timeout);
        }
        Ok(inner.logs.clone())
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Transaction>, TransportError> {
        let mut inner = self.lock();
        if inner.fail_tx_lookups > 0 {
            inner.fail_tx_lookups -= 1;
            return Err(TransportError::Timeout);
        }
        Ok(inner.transactions.get(&hash).cloned())
    }

    async fn watch_blocks(&self) -> Result<WatchStream<Header>, TransportError> {
        self.begin_watch("block")?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().block_feeds.push(tx);
        Ok(self.guarded(rx))
    }

    async fn watch_pending_transactions(&self) -> Result<WatchStream<B256>, TransportError> {
        self.begin_watch("pending")?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().tx_feeds.push(tx);
        Ok(self.guarded(rx))
    }

    async fn watch_contract_event(
        &self,
        address: Address,
        event: &str,
    ) -> Result<WatchStream<Log>, TransportError> {
        self.begin_watch(&Self::log_label(address, event))?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().log_feeds.entry((address, event.to_owned())).or_default().push(tx);
        Ok(self.guarded(rx))
    }
}

/// Address fixture with every byte set to `byte`.
#[must_use]
pub fn address(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// Header fixture at the given height.
#[must_use]
pub fn header(number: u64) -> Header {
    Header {
        hash: B256::with_last_byte(number as u8),
        inner: alloy::consensus::Header { number, ..Default::default() },
        total_difficulty: None,
        size: None,
    }
}

/// Log fixture positioned at `(block_number, log_index)`.
#[must_use]
pub fn log(address: Address, block_number: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address,
            data: LogData::new_unchecked(vec![], Bytes::new()),
        },
        block_hash: None,
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(B256::with_last_byte(0x11)),
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

/// Minimal legacy transaction fixture with the given hash.
#[must_use]
pub fn transaction(hash: B256) -> Transaction {
    serde_json::from_value(serde_json::json!({
        "hash": hash,
        "nonce": "0x0",
        "from": "0x0000000000000000000000000000000000000001",
        "to": null,
        "value": "0x0",
        "gas": "0x5208",
        "gasPrice": "0x1",
        "input": "0x",
        "v": "0x1b",
        "r": "0x1",
        "s": "0x1",
        "type": "0x0",
        "blockHash": null,
        "blockNumber": null,
        "transactionIndex": null
    }))
    .expect("valid legacy transaction fixture")
}
