//! One-shot bounded scan of historical contract logs.
//!
//! A backfill runs concurrently with its key's live watch rather than before it, so events at or
//! after the resolved upper bound may be delivered twice (once by each path) if a block lands
//! between resolving the bound and the watch attaching. Delivery is at-least-once; callers that
//! need exactly-once semantics deduplicate on `(transaction_hash, log_index)`.

use alloy::{primitives::Address, rpc::types::Filter};
use tracing::{debug, warn};

use crate::{
    subscription::{dispatch, registry::SubscriptionRegistry},
    transport::{ChainTransport, TransportError},
    types::{CallbackId, ChainEvent, SubscriptionKind},
};

/// Parameters for one historical scan. Not retained after the scan completes.
#[derive(Clone, Debug)]
pub(crate) struct BackfillRequest {
    pub(crate) address: Address,
    pub(crate) event: String,
    pub(crate) from_block: u64,
    /// Defaults to the chain height at the time the scan starts.
    pub(crate) to_block: Option<u64>,
}

/// Run the scan and deliver its results to the target callback, in ascending
/// `(block_number, log_index)` order. Returns the number of delivered logs.
///
/// The query always completes before the target's registration is checked; if the callback was
/// unregistered in the meantime the results are discarded, not errored. A panic in the callback
/// is isolated per delivery and does not abort the remaining deliveries.
pub(crate) async fn run<T: ChainTransport>(
    registry: &SubscriptionRegistry<T>,
    kind: &SubscriptionKind,
    target: CallbackId,
    request: BackfillRequest,
) -> Result<usize, TransportError> {
    let to_block = match request.to_block {
        Some(block) => block,
        None => registry.transport().block_number().await?,
    };
    if request.from_block > to_block {
        warn!(
            key = %kind,
            from_block = request.from_block,
            to_block,
            "backfill range is empty, nothing to scan"
        );
        return Ok(0);
    }

    let filter = Filter::new()
        .address(request.address)
        .event(&request.event)
        .from_block(request.from_block)
        .to_block(to_block);
    let mut logs = registry.transport().logs(&filter).await?;

    // Transport log ordering is not guaranteed; logs missing ordering fields sort last.
    logs.sort_by_key(|log| (log.block_number.unwrap_or(u64::MAX), log.log_index.unwrap_or(u64::MAX)));

    let Some(callback) = registry.callback(kind, target) else {
        debug!(key = %kind, "backfill target unregistered, discarding results");
        return Ok(0);
    };

    let delivered = logs.len();
    let target_set = [(target, callback)];
    for log in logs {
        dispatch::deliver(kind, &ChainEvent::ContractEvent(log), &target_set);
    }
    Ok(delivered)
}
