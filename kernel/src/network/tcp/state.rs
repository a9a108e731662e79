//! state implements the TCP state machine as a tagged variant, per
//! RFC 793 section 3.2, rather than a set of per-state singleton
//! objects: the connection holds a `State` value and dispatches on
//! it directly, so the compiler can check that every state handles
//! every operation (even if only by rejecting it).

use crate::tcp::{Segment, TcpError};

/// State is the current position of a connection in the TCP state
/// diagram.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

/// Outcome is the advisory result of delivering a segment to the
/// state machine: whether the connection should continue, or be torn
/// down by its owner.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Continue,
    TearDown,
}

impl State {
    /// can_open reports whether `open` may be called from this
    /// state.
    pub fn can_open(self) -> bool {
        matches!(self, State::Closed)
    }

    /// can_close reports whether `close` may be called from this
    /// state.
    pub fn can_close(self) -> bool {
        matches!(
            self,
            State::Listen | State::SynSent | State::SynRcvd | State::Established | State::CloseWait
        )
    }

    /// can_write reports whether user data may be queued for
    /// transmission from this state.
    pub fn can_write(self) -> bool {
        matches!(self, State::Established | State::CloseWait)
    }

    /// can_read reports whether the receive queue may be drained
    /// from this state.
    pub fn can_read(self) -> bool {
        matches!(
            self,
            State::Established | State::FinWait1 | State::FinWait2
        )
    }

    /// next_after_open returns the state reached by an active or
    /// passive open from `Closed`.
    pub fn next_after_open(active: bool) -> State {
        if active {
            State::SynSent
        } else {
            State::Listen
        }
    }

    /// next_after_close returns the state reached by a user-issued
    /// close from the current state, given whether a FIN has to
    /// travel on the wire.
    pub fn next_after_close(self) -> Result<(State, bool), TcpError> {
        match self {
            State::Listen | State::SynSent => Ok((State::Closed, false)),
            State::SynRcvd | State::Established => Ok((State::FinWait1, true)),
            State::CloseWait => Ok((State::LastAck, true)),
            _ => Err(TcpError::InvalidStateForOperation),
        }
    }

    /// next_after_segment returns the state reached after receiving
    /// a segment with the given flags, and whether the connection
    /// should be torn down.
    ///
    /// This only tracks the flag-driven component of RFC 793's state
    /// transition table; sequence-number bookkeeping (SND.UNA,
    /// RCV.NXT, ...) is handled by the connection itself.
    pub fn next_after_segment(self, segment: &Segment) -> (State, Outcome) {
        match (self, segment.syn, segment.fin, segment.ack) {
            (State::Listen, true, _, _) => (State::SynRcvd, Outcome::Continue),
            (State::SynSent, true, _, true) => (State::Established, Outcome::Continue),
            (State::SynSent, true, _, false) => (State::SynRcvd, Outcome::Continue),
            (State::SynRcvd, _, false, true) => (State::Established, Outcome::Continue),
            (State::SynRcvd, _, true, _) => (State::Closed, Outcome::TearDown),
            (State::Established, _, true, _) => (State::CloseWait, Outcome::Continue),
            (State::FinWait1, _, true, true) => (State::TimeWait, Outcome::Continue),
            (State::FinWait1, _, true, false) => (State::Closing, Outcome::Continue),
            (State::FinWait1, _, false, true) => (State::FinWait2, Outcome::Continue),
            (State::FinWait2, _, true, _) => (State::TimeWait, Outcome::Continue),
            (State::Closing, _, _, true) => (State::TimeWait, Outcome::Continue),
            (State::LastAck, _, _, true) => (State::Closed, Outcome::TearDown),
            (State::TimeWait, _, _, _) => (State::TimeWait, Outcome::Continue),
            (current, ..) => (current, Outcome::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passive_open_reaches_listen() {
        assert_eq!(State::next_after_open(false), State::Listen);
    }

    #[test]
    fn active_open_reaches_syn_sent() {
        assert_eq!(State::next_after_open(true), State::SynSent);
    }

    #[test]
    fn close_from_non_closable_state_errors() {
        assert_eq!(
            State::Closed.next_after_close(),
            Err(TcpError::InvalidStateForOperation)
        );
    }

    #[test]
    fn close_from_established_sends_fin() {
        assert_eq!(
            State::Established.next_after_close(),
            Ok((State::FinWait1, true))
        );
    }

    #[test]
    fn syn_ack_from_syn_sent_completes_handshake() {
        let segment = Segment { syn: true, fin: false, ack: true, seq: 0, ack_num: 0, window: 0 };
        assert_eq!(
            State::SynSent.next_after_segment(&segment),
            (State::Established, Outcome::Continue)
        );
    }
}
