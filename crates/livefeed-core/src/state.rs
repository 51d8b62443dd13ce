//! Connection state machine.
//!
//! [`ChannelStatus`] is what the transport reports; [`ConnectionState`] is
//! the supervisor's view of one subscription, driven solely by those
//! reports plus the retry budget. Modelling the state as a closed
//! enumeration with explicit transition rules makes illegal transitions
//! (e.g. event delivery while `Closed`) a representable bug to test
//! against rather than an implicit assumption.

use std::fmt;

// ---------------------------------------------------------------------------
// ChannelStatus
// ---------------------------------------------------------------------------

/// Status transitions reported by the transport for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The channel is being established.
    Connecting,
    /// The channel is live; events will flow.
    Established,
    /// The channel failed.
    Error,
    /// The channel timed out. Treated identically to `Error` for retry
    /// purposes.
    TimedOut,
    /// The channel was torn down deliberately.
    Closed,
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The supervisor's view of one subscription's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connect attempt has started yet.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// The channel is live.
    Established,
    /// The channel failed; a retry may be pending.
    Error,
    /// The channel timed out; a retry may be pending.
    TimedOut,
    /// The retry budget is spent. The subscription stays queryable but
    /// will not reconnect on its own.
    Exhausted,
    /// Explicitly torn down. Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for states from which no reconnect will happen.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Closed)
    }

    /// Returns `true` if the transition `self -> next` is legal.
    ///
    /// `Closed` admits nothing. `Exhausted` admits only `Closed`. Every
    /// other state may move to `Closed` (explicit teardown is always
    /// allowed) and follows the connect/fail/retry cycle otherwise.
    #[must_use]
    pub fn can_transition(&self, next: ConnectionState) -> bool {
        use ConnectionState as S;
        match self {
            S::Closed => false,
            S::Exhausted => matches!(next, S::Closed),
            S::Idle => matches!(next, S::Connecting | S::Closed),
            S::Connecting => matches!(
                next,
                S::Connecting | S::Established | S::Error | S::TimedOut | S::Closed
            ),
            S::Established => {
                matches!(next, S::Connecting | S::Error | S::TimedOut | S::Closed)
            }
            S::Error | S::TimedOut => matches!(
                next,
                S::Connecting | S::Error | S::TimedOut | S::Exhausted | S::Closed
            ),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Established => "established",
            Self::Error => "error",
            Self::TimedOut => "timed-out",
            Self::Exhausted => "exhausted",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState as S;

    const ALL: [S; 7] = [
        S::Idle,
        S::Connecting,
        S::Established,
        S::Error,
        S::TimedOut,
        S::Exhausted,
        S::Closed,
    ];

    #[test]
    fn test_closed_is_terminal() {
        for next in ALL {
            assert!(!S::Closed.can_transition(next), "closed -> {next}");
        }
        assert!(S::Closed.is_terminal());
    }

    #[test]
    fn test_exhausted_only_closes() {
        for next in ALL {
            let legal = S::Exhausted.can_transition(next);
            assert_eq!(legal, next == S::Closed, "exhausted -> {next}");
        }
        assert!(S::Exhausted.is_terminal());
    }

    #[test]
    fn test_every_live_state_can_close() {
        for from in [S::Idle, S::Connecting, S::Established, S::Error, S::TimedOut] {
            assert!(from.can_transition(S::Closed), "{from} -> closed");
            assert!(!from.is_terminal());
        }
    }

    #[test]
    fn test_connect_cycle() {
        assert!(S::Idle.can_transition(S::Connecting));
        assert!(S::Connecting.can_transition(S::Established));
        assert!(S::Established.can_transition(S::Error));
        assert!(S::Error.can_transition(S::Connecting));
        assert!(S::Error.can_transition(S::Exhausted));
        assert!(S::TimedOut.can_transition(S::Connecting));
        assert!(S::TimedOut.can_transition(S::Exhausted));
    }

    #[test]
    fn test_illegal_transitions() {
        // No reconnect without a failure in between.
        assert!(!S::Idle.can_transition(S::Established));
        assert!(!S::Idle.can_transition(S::Exhausted));
        // Established never jumps straight to Exhausted.
        assert!(!S::Established.can_transition(S::Exhausted));
        // Connecting can't exhaust without a reported failure.
        assert!(!S::Connecting.can_transition(S::Exhausted));
    }

    #[test]
    fn test_repeated_failures_are_legal() {
        // A second Error while a retry is pending is a legal self-loop.
        assert!(S::Error.can_transition(S::Error));
        assert!(S::Error.can_transition(S::TimedOut));
        assert!(S::TimedOut.can_transition(S::Error));
    }

    #[test]
    fn test_display() {
        assert_eq!(S::Established.to_string(), "established");
        assert_eq!(S::TimedOut.to_string(), "timed-out");
    }
}
