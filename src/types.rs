use std::{fmt, sync::Arc};

use alloy::{
    primitives::Address,
    rpc::types::{Header, Log, Transaction},
};

/// Identity of one logical watch.
///
/// Two registrations with the same key share a single transport watch. For contract events the
/// key is the (address, event signature) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Block,
    PendingTransaction,
    ContractEvent { address: Address, event: String },
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKind::Block => f.write_str("block"),
            SubscriptionKind::PendingTransaction => f.write_str("pending-transaction"),
            SubscriptionKind::ContractEvent { address, event } => {
                write!(f, "contract-event:{address}:{event}")
            }
        }
    }
}

/// A decoded payload delivered to listeners.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    Block(Header),
    Transaction(Transaction),
    ContractEvent(Log),
}

/// A registered listener. Panics inside the callback are isolated per delivery.
pub(crate) type EventCallback = Arc<dyn Fn(ChainEvent) + Send + Sync>;

pub(crate) type CallbackId = u64;
