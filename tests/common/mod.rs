#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use event_watcher::{EventWatcher, EventWatcherBuilder, test_utils::MockTransport};

pub const TRANSFER: &str = "Transfer(address,address,uint256)";
pub const APPROVAL: &str = "Approval(address,address,uint256)";

/// A watcher over a scripted transport, with the given reconnect policy.
pub fn setup_watcher(
    base_delay_ms: u64,
    max_attempts: usize,
) -> (EventWatcher<MockTransport>, MockTransport) {
    let mock = MockTransport::new();
    let watcher = EventWatcherBuilder::new()
        .base_delay(Duration::from_millis(base_delay_ms))
        .max_attempts(max_attempts)
        .connect_transport(mock.clone())
        .expect("valid watcher config");
    (watcher, mock)
}

/// Shared sink for recording listener deliveries.
pub fn sink<T: Send + 'static>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn drain<T: Clone>(sink: &Arc<Mutex<Vec<T>>>) -> Vec<T> {
    sink.lock().expect("sink poisoned").clone()
}

/// Let spawned tasks make progress without advancing the paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock by `ms`, firing any due timers, then settle.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}
