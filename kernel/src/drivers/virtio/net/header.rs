//! header describes the virtio-net per-packet header and device
//! configuration layout, as described in section 5.1 of the virtio
//! specification.

use bitflags::bitflags;

bitflags! {
    /// HeaderFlags represents the flags field of a [`Header`].
    ///
    pub struct HeaderFlags: u8 {
        /// NEEDS_CHECKSUM indicates that the packet needs its
        /// checksum computed by the recipient.
        const NEEDS_CHECKSUM = 1;

        /// DATA_VALID indicates that the checksum has already been
        /// verified.
        const DATA_VALID = 2;

        /// RSC_INFO indicates that the header carries receive
        /// segment coalescing information.
        const RSC_INFO = 4;
    }
}

/// GsoType describes the kind of segmentation offload a packet
/// requires, none of which this driver negotiates or produces.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum GsoType {
    None = 0,
    TcpV4 = 1,
    Udp = 3,
    TcpV6 = 4,
    Ecn = 0x80,
}

/// Header is the 12-byte struct virtio_net_header, prepended to every
/// frame exchanged with the device.
///
/// This driver negotiates no offloads, so every field is zero on
/// transmit and is expected to be zero (ignored) on receive.
///
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Header {
    pub flags: u8,
    pub gso_type: u8,
    pub header_len: u16,
    pub gso_size: u16,
    pub checksum_start: u16,
    pub checksum_offset: u16,
    pub num_buffers: u16,
}

/// SIZE is the size in bytes of [`Header`].
///
pub const SIZE: usize = 12;

/// Config mirrors struct virtio_net_config, the device-specific
/// configuration space described in section 5.1.4:
///
/// ```c
/// struct virtio_net_config {
///     u8 mac[6];
///     le16 status;
///     le16 max_virtqueue_pairs;
///     le16 mtu;
/// };
/// ```
///
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub mac: [u8; 6],
    pub status: u16,
    pub max_virtqueue_pairs: u16,
    pub mtu: u16,
}
