#![no_std]

// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! virtio implements a virtio legacy network device: its transport,
//! split-ring descriptor queues, and a driver that moves Ethernet frames
//! between the queues and a fixed-capacity buffer pool.
//!
//! This crate deliberately only ever speaks to one kind of device: a
//! virtio-net NIC, negotiated over the legacy (pre-1.0) port I/O
//! transport described in section 4.1.4.8 of the virtio specification.
//! Other virtio device classes and the modern (1.1, MMIO/PCI capability)
//! transport are not implemented here.

extern crate alloc;

pub mod net;
pub mod ring;
pub mod transport;

use bitflags::bitflags;

bitflags! {
    /// DeviceStatus represents the driver status field, as described
    /// in section 2.1.
    ///
    pub struct DeviceStatus: u8 {
        /// RESET indicates that the device has not yet been found
        /// by the driver.
        const RESET = 0;

        /// ACKNOWLEDGE indicates that the driver has noticed the
        /// device.
        const ACKNOWLEDGE = 1;

        /// DRIVER indicates that the driver knows how to drive the
        /// device.
        const DRIVER = 2;

        /// FAILED indicates that something went wrong with the
        /// driver, and it has given up on the device.
        const FAILED = 128;

        /// FEATURES_OK indicates that the driver has acknowledged
        /// all the features it understands, and feature negotiation
        /// is complete.
        const FEATURES_OK = 8;

        /// DRIVER_OK indicates that the driver is set up and ready
        /// to drive the device.
        const DRIVER_OK = 4;

        /// DEVICE_NEEDS_RESET indicates that the device has
        /// experienced an error from which it cannot recover.
        const DEVICE_NEEDS_RESET = 64;
    }
}

bitflags! {
    /// InterruptStatus represents the reason bits set in the ISR
    /// status register.
    ///
    pub struct InterruptStatus: u8 {
        /// QUEUE_INTERRUPT indicates that a virtqueue has had a
        /// buffer used.
        const QUEUE_INTERRUPT = 1 << 0;

        /// DEVICE_CONFIG_INTERRUPT indicates that the device
        /// configuration has changed.
        const DEVICE_CONFIG_INTERRUPT = 1 << 1;
    }
}

/// InitError describes why a driver failed to bring a device up.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitError {
    /// MissingRequiredFeatures indicates that the device did not
    /// advertise one or more features the driver cannot do without.
    MissingRequiredFeatures(u32),

    /// DeviceRefusedFeatures indicates that the device did not
    /// accept the feature set the driver wrote back, shown by the
    /// FEATURES_OK bit not sticking.
    DeviceRefusedFeatures,
}
