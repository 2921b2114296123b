//! Broker connection state machine.
//!
//! The transition function is pure: the supervisor performs I/O, turns
//! the outcome into a [`ConnectionEvent`], and asks [`transition`] for the
//! next state. All retry bookkeeping lives in the state values.

use std::time::Duration;

/// Reconnect policy: fixed delay, bounded or unbounded attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before each reconnect attempt.
    pub delay: Duration,
    /// Consecutive failures tolerated; 0 = unlimited.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }

    /// Delay before dialing after `failures` consecutive failures.
    pub fn delay_before(&self, failures: u32) -> Duration {
        if failures == 0 {
            Duration::ZERO
        } else {
            self.delay
        }
    }

    /// Whether `failures` consecutive failures exhaust the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_retries > 0 && failures >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 0)
    }
}

/// Where the supervisor is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; `failures` consecutive attempts have failed.
    Disconnected { failures: u32 },
    /// Dialing the broker.
    Connecting { failures: u32 },
    /// Connected, declaring topology and registering the consumer.
    Declaring,
    /// Receiving messages.
    Consuming,
    /// Stop requested; terminal.
    ShuttingDown,
    /// Retry budget exhausted; terminal.
    Failed { failures: u32 },
}

impl ConnectionState {
    pub fn initial() -> Self {
        ConnectionState::Disconnected { failures: 0 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::ShuttingDown | ConnectionState::Failed { .. })
    }
}

/// Outcome reported by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Start a connection attempt.
    Dial,
    /// Connection and channel are open.
    Connected,
    /// Topology declared and consumer registered.
    Declared,
    /// Connection attempt failed or an open connection was lost.
    Lost,
    /// Explicit stop signal.
    ShutdownRequested,
}

/// Compute the next state. Events that make no sense in the current
/// state leave it unchanged.
pub fn transition(state: ConnectionState, event: ConnectionEvent, policy: &RetryPolicy) -> ConnectionState {
    use ConnectionEvent as E;
    use ConnectionState as S;

    if state.is_terminal() {
        return state;
    }

    match (state, event) {
        (_, E::ShutdownRequested) => S::ShuttingDown,

        (S::Disconnected { failures }, E::Dial) => S::Connecting { failures },

        // A successful connection resets the counter
        (S::Connecting { .. }, E::Connected) => S::Declaring,

        (S::Declaring, E::Declared) => S::Consuming,

        (S::Connecting { failures }, E::Lost) => lost(failures, policy),
        (S::Declaring | S::Consuming, E::Lost) => lost(0, policy),

        (state, _) => state,
    }
}

fn lost(previous_failures: u32, policy: &RetryPolicy) -> ConnectionState {
    let failures = previous_failures.saturating_add(1);
    if policy.exhausted(failures) {
        ConnectionState::Failed { failures }
    } else {
        ConnectionState::Disconnected { failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionEvent as E;
    use ConnectionState as S;

    fn run(events: &[ConnectionEvent], policy: &RetryPolicy) -> ConnectionState {
        events
            .iter()
            .fold(S::initial(), |state, event| transition(state, *event, policy))
    }

    #[test]
    fn test_happy_path() {
        let policy = RetryPolicy::default();
        assert_eq!(run(&[E::Dial, E::Connected, E::Declared], &policy), S::Consuming);
    }

    #[test]
    fn test_failures_accumulate_and_reset_on_connect() {
        let policy = RetryPolicy::default();
        let state = run(&[E::Dial, E::Lost, E::Dial, E::Lost], &policy);
        assert_eq!(state, S::Disconnected { failures: 2 });

        let state = [E::Dial, E::Connected, E::Declared, E::Lost]
            .iter()
            .fold(state, |s, e| transition(s, *e, &policy));
        assert_eq!(state, S::Disconnected { failures: 1 });
    }

    #[test]
    fn test_broker_drop_waits_configured_delay() {
        let policy = RetryPolicy::new(Duration::from_secs(7), 0);
        assert_eq!(policy.delay_before(0), Duration::ZERO);

        let state = run(&[E::Dial, E::Connected, E::Declared, E::Lost], &policy);
        let S::Disconnected { failures } = state else {
            panic!("unexpected state {state:?}");
        };
        assert_eq!(policy.delay_before(failures), Duration::from_secs(7));
    }

    #[test]
    fn test_budget_exhaustion_is_terminal() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 2);
        let state = run(&[E::Dial, E::Lost, E::Dial, E::Lost], &policy);
        assert_eq!(state, S::Failed { failures: 2 });
        assert_eq!(transition(state, E::Dial, &policy), state);
        assert_eq!(transition(state, E::ShutdownRequested, &policy), state);
    }

    #[test]
    fn test_unlimited_budget() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 0);
        let events: Vec<_> = (0..100).flat_map(|_| [E::Dial, E::Lost]).collect();
        assert_eq!(run(&events, &policy), S::Disconnected { failures: 100 });
    }

    #[test]
    fn test_shutdown_from_any_live_state() {
        let policy = RetryPolicy::default();
        for state in [
            S::Disconnected { failures: 3 },
            S::Connecting { failures: 0 },
            S::Declaring,
            S::Consuming,
        ] {
            assert_eq!(transition(state, E::ShutdownRequested, &policy), S::ShuttingDown);
        }
    }

    #[test]
    fn test_out_of_order_events_are_ignored() {
        let policy = RetryPolicy::default();
        assert_eq!(transition(S::Consuming, E::Connected, &policy), S::Consuming);
        assert_eq!(transition(S::initial(), E::Declared, &policy), S::initial());
    }
}
