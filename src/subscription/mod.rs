//! The resilient subscription core: registry, reconnection, dispatch, backfill and teardown.
//!
//! One [`SubscriptionRegistry`](registry::SubscriptionRegistry) instance exists per
//! [`EventWatcher`](crate::EventWatcher). It owns the map of subscription key to listener set,
//! and every mutation of that map funnels through its methods; watch tasks, retry timers and
//! backfill tasks hold clones of the registry handle rather than any ambient state.

pub(crate) mod backfill;
pub(crate) mod dispatch;
pub(crate) mod lifecycle;
pub(crate) mod reconnect;
pub(crate) mod registry;

pub use reconnect::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, ReconnectConfig};
pub use registry::SubscriptionGuard;
