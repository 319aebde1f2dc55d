//! Aggregate teardown of every subscription, timer and in-flight backfill.

use std::sync::atomic::Ordering;

use tokio::{task::JoinSet, time::timeout};
use tracing::{debug, info, warn};

use crate::{subscription::registry::SubscriptionRegistry, transport::ChainTransport};

impl<T: ChainTransport> SubscriptionRegistry<T> {
    /// Tear everything down. Idempotent: after the first call completes, further calls return
    /// immediately.
    ///
    /// Every subscription's listener set is cleared and its watch task and pending retry timer
    /// aborted, so no timer fires after this returns. With `wait_for_drain` the aborted watch
    /// tasks are joined (an abort only lands at the task's next await point, so a listener
    /// mid-delivery gets to finish first) and the in-flight backfills are awaited (bounded by
    /// the drain timeout, then aborted); no listener is invoked after return. Without it both
    /// finish in the background and their deliveries are discarded against the now-empty
    /// registry.
    ///
    /// Aborting the watch tasks drops their transport streams, which releases the underlying
    /// connection once the caller drops its own transport handle.
    pub(crate) async fn shutdown(&self, wait_for_drain: bool) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(wait_for_drain, "shutting down event watcher");

        let mut watch_tasks = Vec::new();
        {
            let mut subs = self.lock_subs();
            for (kind, mut state) in subs.drain() {
                state.callbacks.clear();
                if let Some(watch) = state.watch.take() {
                    watch.abort();
                    watch_tasks.push(watch);
                }
                state.reconnect.cancel_timer();
                debug!(key = %kind, "subscription torn down");
            }
        }

        let mut backfills: JoinSet<()> = {
            let mut set = self.shared.backfills.lock().expect("backfill set lock poisoned");
            std::mem::take(&mut *set)
        };

        if wait_for_drain {
            for watch in watch_tasks {
                let _ = watch.await;
            }
            let drained = timeout(self.shared.drain_timeout, async {
                while backfills.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!("backfill drain timed out, aborting remaining scans");
                backfills.abort_all();
                while backfills.join_next().await.is_some() {}
            }
        } else {
            backfills.detach_all();
        }

        info!("event watcher shut down");
    }
}
