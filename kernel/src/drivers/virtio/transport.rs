//! transport implements the legacy virtio transport: a device's
//! registers, exposed as port I/O in its PCI BAR0, as described in
//! section 4.1.4 of the virtio specification (pre-1.0 / legacy layout).

use crate::{DeviceStatus, InterruptStatus};
use x86_64::instructions::port::Port;

// Register offsets within BAR0, per the legacy virtio layout.
const DEVICE_FEATURES: u16 = 0;
const DRIVER_FEATURES: u16 = 4;
const QUEUE_ADDRESS: u16 = 8;
const QUEUE_SIZE: u16 = 12;
const QUEUE_SELECT: u16 = 14;
const QUEUE_NOTIFY: u16 = 16;
const DEVICE_STATUS: u16 = 18;
const ISR_STATUS: u16 = 19;
const DEVICE_CONFIG: u16 = 20;

/// QUEUE_ALIGN is the alignment, in bytes, required of a virtqueue's
/// used ring, per section 2.6.2. The legacy layout publishes a single
/// page-frame-number covering the whole queue, so the descriptor
/// table, available ring and used ring are packed into one
/// `QUEUE_ALIGN`-aligned allocation.
///
pub const QUEUE_ALIGN: usize = 4096;

/// Transport is the legacy virtio register interface: everything a
/// driver needs to negotiate features, size and publish virtqueues,
/// and exchange notifications with the device.
///
pub struct Transport {
    port_base: u16,
    irq: usize,
}

impl Transport {
    /// new constructs a legacy transport over the given device's
    /// BAR0 port range and IRQ line.
    ///
    /// # Safety
    ///
    /// `port_base` must be the I/O port base address of a virtio
    /// legacy device's BAR0.
    ///
    pub unsafe fn new(port_base: u16, irq: usize) -> Transport {
        Transport { port_base, irq }
    }

    /// irq returns the device's PCI IRQ line.
    ///
    pub fn irq(&self) -> usize {
        self.irq
    }

    /// read_device_features returns the device's 32-bit feature
    /// bitmap.
    ///
    pub fn read_device_features(&self) -> u32 {
        unsafe { Port::new(self.port_base + DEVICE_FEATURES).read() }
    }

    /// write_driver_features writes back the subset of features the
    /// driver has chosen to enable.
    ///
    pub fn write_driver_features(&self, features: u32) {
        unsafe { Port::new(self.port_base + DRIVER_FEATURES).write(features) };
    }

    /// read_status returns the current device status bits.
    ///
    pub fn read_status(&self) -> DeviceStatus {
        let status: u8 = unsafe { Port::new(self.port_base + DEVICE_STATUS).read() };
        DeviceStatus::from_bits_truncate(status)
    }

    /// write_status overwrites the device status bits.
    ///
    pub fn write_status(&self, status: DeviceStatus) {
        unsafe { Port::new(self.port_base + DEVICE_STATUS).write(status.bits()) };
    }

    /// add_status sets additional status bits, leaving any already
    /// set untouched.
    ///
    pub fn add_status(&self, status: DeviceStatus) {
        let current = self.read_status();
        self.write_status(current | status);
    }

    /// select_queue selects the virtqueue that subsequent
    /// queue_size/set_queue_address/notify_queue calls address.
    ///
    pub fn select_queue(&self, index: u16) {
        unsafe { Port::new(self.port_base + QUEUE_SELECT).write(index) };
    }

    /// queue_size returns the number of descriptors in the
    /// currently selected queue.
    ///
    pub fn queue_size(&self) -> u16 {
        unsafe { Port::new(self.port_base + QUEUE_SIZE).read() }
    }

    /// set_queue_address publishes the page-frame number of the
    /// currently selected queue's combined descriptor/available/used
    /// ring allocation.
    ///
    pub fn set_queue_address(&self, pfn: u32) {
        unsafe { Port::new(self.port_base + QUEUE_ADDRESS).write(pfn) };
    }

    /// notify_queue kicks the device, indicating that the available
    /// ring of the given queue has advanced.
    ///
    pub fn notify_queue(&self, index: u16) {
        unsafe { Port::new(self.port_base + QUEUE_NOTIFY).write(index) };
    }

    /// read_interrupt_status reads (and, per the legacy spec, clears)
    /// the ISR status register.
    ///
    pub fn read_interrupt_status(&self) -> InterruptStatus {
        let bits: u8 = unsafe { Port::new(self.port_base + ISR_STATUS).read() };
        InterruptStatus::from_bits_truncate(bits)
    }

    /// read_device_config_u8 reads a byte from the device-specific
    /// configuration space, beginning at offset 20.
    ///
    pub fn read_device_config_u8(&self, offset: u16) -> u8 {
        unsafe { Port::new(self.port_base + DEVICE_CONFIG + offset).read() }
    }

    /// read_device_config_u16 reads a little-endian 16-bit value from
    /// the device-specific configuration space.
    ///
    pub fn read_device_config_u16(&self, offset: u16) -> u16 {
        unsafe { Port::new(self.port_base + DEVICE_CONFIG + offset).read() }
    }
}
