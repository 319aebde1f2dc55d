//! Per-key reconnect state: linear backoff with a capped attempt count.
//!
//! The policy is deliberately linear rather than exponential: the n-th retry waits
//! `base_delay * n`, widening the gap between attempts without the runaway growth of an
//! exponential schedule. Once `max_attempts` retries have failed without any data arriving in
//! between, the key stalls and nothing further is scheduled.

use std::time::Duration;

use tokio::task::AbortHandle;

/// Default base delay between watch reconnection attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default maximum number of consecutive reconnection attempts per subscription key.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Reconnect policy applied to subscription keys.
///
/// Updated via [`EventWatcher::set_reconnect_config`](crate::EventWatcher::set_reconnect_config);
/// the update only affects keys created after the call. Keys already in backoff keep their
/// original schedule in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_attempts: usize,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { base_delay: DEFAULT_BASE_DELAY, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

/// Where a subscription key currently stands in its reconnect lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Created, watch not yet established.
    Idle,
    /// Watch established and delivering.
    Active,
    /// Watch down, a retry timer is pending.
    Backoff,
    /// Attempts exhausted; nothing further is scheduled.
    Stalled,
}

/// Reconnect bookkeeping for one subscription key.
///
/// Owned by the registry alongside the key's listener set and destroyed with it.
#[derive(Debug)]
pub(crate) struct ReconnectState {
    attempts: usize,
    timer: Option<AbortHandle>,
    base_delay: Duration,
    max_attempts: usize,
    phase: Phase,
}

impl ReconnectState {
    pub(crate) fn new(config: ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            timer: None,
            base_delay: config.base_delay,
            max_attempts: config.max_attempts,
            phase: Phase::Idle,
        }
    }

    pub(crate) fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub(crate) fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// The transport accepted the watch. Attempts keep their place until data arrives.
    pub(crate) fn note_established(&mut self) {
        self.phase = Phase::Active;
    }

    /// Data arrived on the watch: the key is healthy again.
    pub(crate) fn note_success(&mut self) {
        self.attempts = 0;
        self.phase = Phase::Active;
    }

    /// The watch failed. Returns the delay before the next attempt, or `None` when attempts are
    /// exhausted, in which case the key transitions to [`Phase::Stalled`].
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            self.phase = Phase::Stalled;
            return None;
        }
        let delay = self.base_delay * (self.attempts as u32 + 1);
        self.attempts += 1;
        self.phase = Phase::Backoff;
        Some(delay)
    }

    pub(crate) fn set_timer(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    /// The timer fired on its own; forget the handle without aborting.
    pub(crate) fn clear_timer(&mut self) {
        self.timer = None;
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// A caller is forcing a restart on a stalled or idle key.
    pub(crate) fn prepare_restart(&mut self) {
        self.attempts = 0;
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(base_ms: u64, max_attempts: usize) -> ReconnectState {
        ReconnectState::new(ReconnectConfig {
            base_delay: Duration::from_millis(base_ms),
            max_attempts,
        })
    }

    #[test]
    fn delays_grow_linearly() {
        let mut reconnect = state(1000, 3);

        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(2000)));
        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(3000)));
        assert_eq!(reconnect.next_delay(), None);
        assert_eq!(reconnect.phase, Phase::Stalled);
    }

    #[test]
    fn success_resets_the_schedule() {
        let mut reconnect = state(500, 5);

        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(1000)));

        reconnect.note_success();
        assert_eq!(reconnect.phase, Phase::Active);
        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn establishment_marks_the_key_active_without_resetting_attempts() {
        let mut reconnect = state(1000, 3);

        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(1000)));
        reconnect.note_established();
        assert_eq!(reconnect.phase, Phase::Active);

        // Only data resets the counter; a connect-then-fail loop keeps climbing the schedule.
        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn zero_max_attempts_stalls_immediately() {
        let mut reconnect = state(1000, 0);

        assert_eq!(reconnect.next_delay(), None);
        assert_eq!(reconnect.phase, Phase::Stalled);
    }

    #[test]
    fn restart_clears_exhaustion() {
        let mut reconnect = state(1000, 1);

        assert!(reconnect.next_delay().is_some());
        assert_eq!(reconnect.next_delay(), None);

        reconnect.prepare_restart();
        assert_eq!(reconnect.phase, Phase::Idle);
        assert_eq!(reconnect.next_delay(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn default_config_matches_constants() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, DEFAULT_BASE_DELAY);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }
}
