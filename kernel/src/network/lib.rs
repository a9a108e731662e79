#![no_std]

// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! network implements the protocol layers above the device driver:
//! Ethernet framing and dispatch, the packet type shared with the
//! driver, and a hand-rolled TCP connection and state machine.
//!
//! Congestion control, retransmission timers, IP fragmentation and
//! reassembly, and any protocol above TCP are out of scope; this
//! crate only carries the frame and segment plumbing those layers
//! would build on.

extern crate alloc;

pub mod ethernet;
pub mod packet;
pub mod tcp;

/// Error is the shared error type for the protocol layers in this
/// crate.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// MalformedFrame indicates a precondition violation while
    /// building or transmitting a frame (for example, an unset
    /// destination address or ethertype).
    MalformedFrame,

    /// UnknownEthertype indicates a received frame's ethertype did
    /// not match any registered delegate.
    UnknownEthertype(u16),
}
