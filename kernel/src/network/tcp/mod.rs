//! tcp implements a single TCP connection's transmission control
//! block and the state-machine dispatch that drives it, per RFC 793.
//!
//! Congestion control, retransmission timers, and accurate RTT/RTO
//! estimation are not implemented; this is the state-machine
//! skeleton and the send/receive queues it protects.

pub mod state;

use crate::packet::Packet;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use state::{Outcome, State};
use time::Instant;

/// TcpError is returned when a connection operation cannot proceed
/// in the connection's current state.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TcpError {
    InvalidStateForOperation,
}

/// Segment is the subset of an incoming TCP header the state machine
/// needs to decide a transition, plus the payload bookkeeping the
/// connection needs to update its TCB.
///
#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub seq: u32,
    pub ack_num: u32,
    pub window: u16,
    pub syn: bool,
    pub fin: bool,
    pub ack: bool,
}

/// Tcb is a connection's Transmission Control Block, as described in
/// RFC 793 section 3.2.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct Tcb {
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_wnd: u16,
    pub snd_up: u16,
    pub snd_wl1: u32,
    pub snd_wl2: u32,
    pub iss: u32,

    pub rcv_nxt: u32,
    pub rcv_wnd: u16,
    pub rcv_up: u16,
    pub irs: u32,
}

/// RemoteSocket identifies the other end of a connection.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemoteSocket {
    pub address: [u8; 4],
    pub port: u16,
}

/// OutgoingSegment pairs a segment header (the flags and sequence
/// numbers a driver needs to build a wire-format TCP header) with
/// its optional payload. Control segments (SYN, FIN, and the bare
/// ACKs the state machine emits on its own) carry no payload.
///
#[derive(Debug)]
pub struct OutgoingSegment {
    pub segment: Segment,
    pub payload: Option<Box<Packet>>,
}

const MAX_SEGMENT_SIZE: usize = 1460;

/// Connection is a single TCP connection: its TCB, its current
/// state, and the byte queues moving data to and from the
/// application above it.
///
pub struct Connection {
    local_port: u16,
    remote: RemoteSocket,
    state: State,
    previous_state: State,
    tcb: Tcb,

    receive_queue: VecDeque<Box<Packet>>,
    rcv_buffer_offset: usize,
    send_queue: VecDeque<OutgoingSegment>,
}

impl Connection {
    /// new creates a connection in the Closed state for the given
    /// local port and remote socket.
    ///
    pub fn new(local_port: u16, remote: RemoteSocket) -> Connection {
        Connection {
            local_port,
            remote,
            state: State::Closed,
            previous_state: State::Closed,
            tcb: Tcb::default(),
            receive_queue: VecDeque::new(),
            rcv_buffer_offset: 0,
            send_queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn tcb(&self) -> Tcb {
        self.tcb
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote(&self) -> RemoteSocket {
        self.remote
    }

    fn transition(&mut self, next: State) {
        self.previous_state = self.state;
        self.state = next;
    }

    /// generate_iss derives an Initial Send Sequence number from the
    /// monotonic tick counter, salted per connection so that two
    /// connections opened within the same tick still receive
    /// distinct sequence numbers.
    ///
    fn generate_iss(&self, now: Instant) -> u32 {
        let salt = (self.local_port as u32) ^ ((self.remote.port as u32) << 16);
        (now.ticks() as u32).wrapping_add(salt)
    }

    /// enqueue_control_segment queues a payload-less segment built
    /// from the connection's current send/receive state, optionally
    /// carrying SYN or FIN. SYN and FIN each consume one sequence
    /// number, so SND.NXT advances past whichever of them is set;
    /// `ack` is the caller's choice, since the very first SYN of an
    /// active open has nothing yet to acknowledge.
    ///
    fn enqueue_control_segment(&mut self, syn: bool, fin: bool, ack: bool) {
        let segment = Segment {
            seq: self.tcb.snd_nxt,
            ack_num: self.tcb.rcv_nxt,
            window: self.tcb.rcv_wnd,
            syn,
            fin,
            ack,
        };
        self.send_queue.push_back(OutgoingSegment { segment, payload: None });
        if syn || fin {
            self.tcb.snd_nxt = self.tcb.snd_nxt.wrapping_add(1);
        }
    }

    /// open drives an active or passive open from the Closed state.
    ///
    /// An active open enqueues a SYN segment and moves to SynSent; a
    /// passive open moves straight to Listen with no wire activity.
    ///
    pub fn open(&mut self, active: bool, now: Instant) -> Result<(), TcpError> {
        if !self.state.can_open() {
            return Err(TcpError::InvalidStateForOperation);
        }

        self.tcb.iss = self.generate_iss(now);
        self.tcb.snd_una = self.tcb.iss;
        self.tcb.snd_nxt = self.tcb.iss;

        self.transition(State::next_after_open(active));

        if active {
            // Nothing has been received yet, so this SYN carries no ACK.
            self.enqueue_control_segment(true, false, false);
        }

        Ok(())
    }

    /// close drives a user-issued close: from Established it starts
    /// the active-close sequence (FinWait1); from Listen/SynSent it
    /// tears down immediately with no wire activity.
    ///
    pub fn close(&mut self) -> Result<(), TcpError> {
        let (next, sends_fin) = self.state.next_after_close()?;
        self.transition(next);
        if sends_fin {
            self.enqueue_control_segment(false, true, true);
        }
        Ok(())
    }

    /// receive updates the send window from the segment and
    /// dispatches it to the state machine, returning whether the
    /// connection should be torn down by its owner.
    ///
    /// Segments that complete or continue the handshake (a SYN we
    /// must acknowledge, the final ACK of an active open) or that
    /// carry a FIN leave a reply queued for the driver.
    ///
    pub fn receive(&mut self, segment: &Segment, payload: Option<Box<Packet>>) -> Outcome {
        let previous = self.state;

        self.tcb.snd_wnd = segment.window;

        if segment.syn {
            self.tcb.irs = segment.seq;
            self.tcb.rcv_nxt = segment.seq.wrapping_add(1);
        } else if let Some(packet) = &payload {
            self.tcb.rcv_nxt = self.tcb.rcv_nxt.wrapping_add(packet.len() as u32);
        }

        if segment.ack {
            self.tcb.snd_una = segment.ack_num;
        }

        if segment.fin {
            self.tcb.rcv_nxt = self.tcb.rcv_nxt.wrapping_add(1);
        }

        if let Some(packet) = payload {
            self.receive_queue.push_back(packet);
        }

        let (next, outcome) = previous.next_after_segment(segment);

        if outcome == Outcome::Continue {
            if next == State::SynRcvd && segment.syn {
                // Passive or simultaneous open: acknowledge their SYN
                // with ours.
                self.enqueue_control_segment(true, false, true);
            } else if previous == State::SynSent && next == State::Established {
                // Active open completing: the final ACK of the
                // three-way handshake.
                self.enqueue_control_segment(false, false, true);
            } else if segment.fin {
                // Any other FIN still needs acknowledging.
                self.enqueue_control_segment(false, false, true);
            }
        }

        self.transition(next);
        outcome
    }

    /// write packetizes up to `buf.len()` bytes of application data
    /// into one or more segments on the send queue, stamped with the
    /// current SND.NXT/RCV.NXT. Data is not actually transmitted
    /// here; see the driver's `transmit`.
    ///
    pub fn write<F>(&mut self, buf: &[u8], mut allocate: F) -> Result<usize, TcpError>
    where
        F: FnMut(usize) -> Box<Packet>,
    {
        if !self.state.can_write() {
            return Err(TcpError::InvalidStateForOperation);
        }

        let mut written = 0;
        while written < buf.len() {
            let chunk_len = core::cmp::min(MAX_SEGMENT_SIZE, buf.len() - written);
            let mut packet = allocate(chunk_len);
            packet.as_mut_slice()[..chunk_len].copy_from_slice(&buf[written..written + chunk_len]);
            written += chunk_len;

            let segment = Segment {
                seq: self.tcb.snd_nxt,
                ack_num: self.tcb.rcv_nxt,
                window: self.tcb.rcv_wnd,
                syn: false,
                fin: false,
                ack: true,
            };
            self.tcb.snd_nxt = self.tcb.snd_nxt.wrapping_add(chunk_len as u32);
            self.send_queue.push_back(OutgoingSegment { segment, payload: Some(packet) });
        }

        Ok(written)
    }

    /// read copies as many bytes as are available (up to `buf.len()`)
    /// from the head of the receive queue, returning the number of
    /// bytes copied. Short reads are permitted.
    ///
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TcpError> {
        if !self.state.can_read() {
            return Err(TcpError::InvalidStateForOperation);
        }

        let mut copied = 0;
        while copied < buf.len() {
            let Some(packet) = self.receive_queue.front() else {
                break;
            };

            let available = &packet.as_slice()[self.rcv_buffer_offset..];
            let n = core::cmp::min(available.len(), buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&available[..n]);
            copied += n;
            self.rcv_buffer_offset += n;

            if self.rcv_buffer_offset >= packet.len() {
                self.receive_queue.pop_front();
                self.rcv_buffer_offset = 0;
            } else {
                break;
            }
        }

        Ok(copied)
    }

    /// pop_send_queue removes and returns the next segment ready for
    /// transmission, for the driver to hand to the Ethernet layer.
    ///
    pub fn pop_send_queue(&mut self) -> Option<OutgoingSegment> {
        self.send_queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::NoopReleaser;
    use alloc::sync::Arc;

    fn remote() -> RemoteSocket {
        RemoteSocket { address: [10, 0, 0, 2], port: 80 }
    }

    fn packet(size: usize) -> Box<Packet> {
        let layout = core::alloc::Layout::from_size_align(size.max(1), 1).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        Box::new(unsafe { Packet::new(ptr, size.max(1), size, Arc::new(NoopReleaser)) })
    }

    #[test]
    fn three_way_handshake() {
        let mut conn = Connection::new(1234, remote());
        conn.open(true, Instant::new(0)).unwrap();
        assert_eq!(conn.state(), State::SynSent);

        let iss = conn.tcb().iss;

        let syn = conn.pop_send_queue().expect("open queues a SYN");
        assert!(conn.pop_send_queue().is_none());
        assert!(syn.payload.is_none());
        assert!(syn.segment.syn);
        assert!(!syn.segment.ack);
        assert_eq!(syn.segment.seq, iss);
        assert_eq!(syn.segment.ack_num, 0);

        let syn_ack = Segment { syn: true, fin: false, ack: true, seq: 400, ack_num: iss.wrapping_add(1), window: 65535 };
        let outcome = conn.receive(&syn_ack, None);

        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(conn.state(), State::Established);
        assert_eq!(conn.tcb().irs, 400);
        assert_eq!(conn.tcb().rcv_nxt, 401);
        assert_eq!(conn.tcb().snd_una, iss.wrapping_add(1));

        let ack = conn.pop_send_queue().expect("handshake completion queues an ACK");
        assert!(conn.pop_send_queue().is_none());
        assert!(ack.payload.is_none());
        assert!(!ack.segment.syn);
        assert!(!ack.segment.fin);
        assert!(ack.segment.ack);
        assert_eq!(ack.segment.seq, iss.wrapping_add(1));
        assert_eq!(ack.segment.ack_num, 401);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut conn = Connection::new(1234, remote());
        conn.open(true, Instant::new(0)).unwrap();
        let iss = conn.tcb().iss;
        conn.receive(
            &Segment { syn: true, fin: false, ack: true, seq: 1, ack_num: iss.wrapping_add(1), window: 65535 },
            None,
        );
        assert_eq!(conn.state(), State::Established);

        conn.receive(
            &Segment { syn: false, fin: false, ack: true, seq: 2, ack_num: iss.wrapping_add(1), window: 65535 },
            Some(packet(5)),
        );

        let mut buf = [0u8; 5];
        let n = conn.read(&mut buf).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn write_rejected_before_established() {
        let mut conn = Connection::new(1234, remote());
        let err = conn.write(b"hello", |n| packet(n)).unwrap_err();
        assert_eq!(err, TcpError::InvalidStateForOperation);
    }
}
