//! ethernet implements the layer 2 Ethernet protocol: parsing and
//! dispatching received frames by ethertype, and stamping the source
//! address on frames we transmit.

use crate::packet::Packet;
use crate::Error;
use alloc::boxed::Box;
use core::fmt;
use core::ops::Deref;

/// MAC_SIZE is the size of a MAC address, in bytes.
///
pub const MAC_SIZE: usize = 6;

/// HEADER_SIZE is the size of an Ethernet II header: destination,
/// source, and ethertype.
///
pub const HEADER_SIZE: usize = 2 * MAC_SIZE + 2;

/// A MAC address.
///
/// MAC addresses are used to identify Ethernet devices.
///
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Mac([u8; MAC_SIZE]);

impl Mac {
    /// The broadcast MAC address.
    ///
    /// The broadcast MAC address, ff:ff:ff:ff:ff:ff, indicates
    /// that a frame should be received by all receivers,
    /// regardless of their local MAC address.
    ///
    pub const BROADCAST: Mac = Mac([0xff; MAC_SIZE]);

    /// The all-zero MAC address, used to detect an unset destination.
    ///
    pub const UNSPECIFIED: Mac = Mac([0; MAC_SIZE]);

    /// new returns a new MAC address.
    ///
    #[inline]
    pub const fn new(bytes: [u8; MAC_SIZE]) -> Mac {
        Mac(bytes)
    }
}

// Note we only implement Deref, not DerefMut,
// so you can only get read access to the bytes.
//
impl Deref for Mac {
    type Target = [u8; MAC_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// EtherType identifies the protocol carried by an Ethernet frame's
/// payload.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    Arp,
    WakeOnLan,
    Vlan,
    /// Other carries the raw ethertype value for a type we don't
    /// dispatch, or the frame's length for an IEEE 802.3 length
    /// field (values of 1500 or below).
    Other(u16),
}

impl EtherType {
    fn from_u16(value: u16) -> EtherType {
        match value {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            0x0806 => EtherType::Arp,
            0x0842 => EtherType::WakeOnLan,
            0x8100 => EtherType::Vlan,
            other => EtherType::Other(other),
        }
    }
}

/// Delegate is invoked with a full frame (header included) when
/// [`Ethernet::bottom`] dispatches it to a protocol handler.
///
pub type Delegate = fn(Packet);

fn drop_delegate(_packet: Packet) {}

/// Ethernet demultiplexes received frames by ethertype and stamps
/// our MAC address as the source of frames we transmit.
///
/// The Ethernet header is never stripped before a frame reaches a
/// delegate; each delegate knows to skip past [`HEADER_SIZE`] itself.
///
pub struct Ethernet {
    mac: Mac,
    ipv4: Delegate,
    ipv6: Delegate,
    arp: Delegate,
    physical_out: fn(Packet) -> Result<(), Error>,
}

impl Ethernet {
    /// new constructs an Ethernet layer for a device with address
    /// `mac`, transmitting via `physical_out`. Until assigned with
    /// the `on_*` setters, every protocol delegate silently drops
    /// its frames.
    ///
    pub fn new(mac: Mac, physical_out: fn(Packet) -> Result<(), Error>) -> Ethernet {
        Ethernet {
            mac,
            ipv4: drop_delegate,
            ipv6: drop_delegate,
            arp: drop_delegate,
            physical_out,
        }
    }

    /// mac returns our local MAC address.
    pub fn mac(&self) -> Mac {
        self.mac
    }

    pub fn on_ipv4(&mut self, delegate: Delegate) {
        self.ipv4 = delegate;
    }

    pub fn on_ipv6(&mut self, delegate: Delegate) {
        self.ipv6 = delegate;
    }

    pub fn on_arp(&mut self, delegate: Delegate) {
        self.arp = delegate;
    }

    /// bottom handles a frame received from the device, dispatching
    /// it to the delegate matching its ethertype.
    ///
    pub fn bottom(&self, packet: Packet) {
        if packet.len() < HEADER_SIZE {
            return;
        }

        let ethertype = u16::from_be_bytes([packet.as_slice()[12], packet.as_slice()[13]]);

        match EtherType::from_u16(ethertype) {
            EtherType::Ipv4 => (self.ipv4)(packet),
            EtherType::Ipv6 => (self.ipv6)(packet),
            EtherType::Arp => (self.arp)(packet),
            EtherType::WakeOnLan => {}
            EtherType::Vlan => serial::debug!("ethernet: dropping VLAN-tagged frame"),
            EtherType::Other(value) => {
                serial::debug!("ethernet: dropping frame with unknown ethertype {:#06x}", value)
            }
        }
    }

    /// transmit stamps our MAC address as the frame's source and
    /// hands it to the physical layer.
    ///
    /// Fails with [`Error::MalformedFrame`] if the destination or
    /// ethertype fields are unset.
    ///
    pub fn transmit(&self, mut packet: Box<Packet>) -> Result<(), Error> {
        if packet.len() < HEADER_SIZE {
            return Err(Error::MalformedFrame);
        }

        {
            let data = packet.as_mut_slice();
            if data[0..MAC_SIZE] == *Mac::UNSPECIFIED {
                return Err(Error::MalformedFrame);
            }
            if data[12] == 0 && data[13] == 0 {
                return Err(Error::MalformedFrame);
            }

            data[MAC_SIZE..2 * MAC_SIZE].copy_from_slice(&*self.mac);
        }

        (self.physical_out)(*packet)
    }
}
