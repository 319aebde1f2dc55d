use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to callers at setup time.
///
/// Steady-state failures (a watch stream dying, a listener panicking, a backfill scan failing)
/// are never returned from the subscription API; they are logged and handled by the reconnect
/// and backfill machinery instead.
#[derive(Error, Debug, Clone)]
pub enum WatcherError {
    /// The underlying transport failed while setting up.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The configured reconnect base delay is invalid (must be greater than zero).
    #[error("Reconnect base delay must be greater than zero")]
    InvalidBaseDelay,
}
