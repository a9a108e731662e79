#![no_std]

//! pci describes a PCI device's configuration space and the raw port I/O
//! used to read and write its fields.
//!
//! Bus enumeration is not implemented here; a [`Device`] is expected to be
//! constructed by whatever owns PCI discovery and handed to a driver.

use core::fmt;
use x86_64::instructions::port::Port;

pub const CONFIG_ADDRESS: u16 = 0xcf8;
pub const CONFIG_DATA: u16 = 0xcfc;

pub const NONE: u16 = 0xffff;

// See https://en.wikipedia.org/wiki/PCI_configuration_space#/media/File:Pci-config-space.svg

pub const VENDOR_ID: u8 = 0x00; // u16
pub const DEVICE_ID: u8 = 0x02; // u16
pub const COMMAND: u8 = 0x04; // u16
pub const STATUS: u8 = 0x06; // u16
pub const REVISION_ID: u8 = 0x08; // u8
pub const SUBCLASS: u8 = 0x0a; // u8
pub const CLASS: u8 = 0x0b; // u8
pub const HEADER_TYPE: u8 = 0x0e; // u8
pub const SUBSYSTEM_VENDOR_ID: u8 = 0x2c; // u16
pub const SUBSYSTEM_ID: u8 = 0x2e; // u16
pub const INTERRUPT_LINE: u8 = 0x3c; // u8

pub const BAR0: u8 = 0x10; // u32
pub const BAR1: u8 = 0x14; // u32
pub const BAR2: u8 = 0x18; // u32
pub const BAR3: u8 = 0x1c; // u32
pub const BAR4: u8 = 0x20; // u32
pub const BAR5: u8 = 0x24; // u32

/// Device represents a PCI device's identity and configuration space.
///
pub struct Device {
    pub bus: u8,
    pub slot: u8,
    pub func: u8,

    pub vendor: u16,
    pub device: u16,
    pub devtype: u16,
    pub subsystem_vendor: u16,
    pub subsystem: u16,
}

// set_address sets the PCI slot.
//
fn set_address(bus: u8, slot: u8, func: u8, field: u8) {
    let lbus = bus as u32;
    let lslot = slot as u32;
    let lfunc = func as u32;
    let lfield = field as u32;

    let address = (lbus << 16) | (lslot << 11) | (lfunc << 8) | (lfield & 0xfc) | 0x80000000;

    unsafe {
        Port::new(CONFIG_ADDRESS).write(address);
    }
}

// The read_X and write_X functions below are fairly
// straightforward. They're all duplicated as methods
// on a device, simply because it would be fiddly and
// tedious to maintain a device as we go along through
// the discovery process.

fn read_u8(bus: u8, slot: u8, func: u8, field: u8) -> u8 {
    set_address(bus, slot, func, field);
    unsafe { Port::new(CONFIG_DATA + (field as u16 & 3)).read() }
}

fn read_u16(bus: u8, slot: u8, func: u8, field: u8) -> u16 {
    set_address(bus, slot, func, field);
    unsafe { Port::new(CONFIG_DATA + (field as u16 & 2)).read() }
}

fn read_u32(bus: u8, slot: u8, func: u8, field: u8) -> u32 {
    set_address(bus, slot, func, field);
    unsafe { Port::new(CONFIG_DATA + (field as u16 & 0)).read() }
}

fn write_u8(bus: u8, slot: u8, func: u8, field: u8, value: u8) {
    set_address(bus, slot, func, field);
    unsafe { Port::new(CONFIG_DATA).write(value) };
}

fn write_u16(bus: u8, slot: u8, func: u8, field: u8, value: u16) {
    set_address(bus, slot, func, field);
    unsafe { Port::new(CONFIG_DATA).write(value) };
}

fn write_u32(bus: u8, slot: u8, func: u8, field: u8, value: u32) {
    set_address(bus, slot, func, field);
    unsafe { Port::new(CONFIG_DATA).write(value) };
}

impl Device {
    /// probe reads a device's identity at the given bus/slot/function,
    /// returning None if no device is present there.
    ///
    pub fn probe(bus: u8, slot: u8, func: u8) -> Option<Device> {
        let data = read_u32(bus, slot, func, VENDOR_ID);
        let vendor = (data & 0xffff) as u16;
        if vendor == NONE {
            return None;
        }

        let device = (data >> 16) as u16;
        let class = read_u8(bus, slot, func, CLASS) as u16;
        let subclass = read_u8(bus, slot, func, SUBCLASS) as u16;
        let devtype = (class << 8) | subclass;

        let data = read_u32(bus, slot, func, SUBSYSTEM_VENDOR_ID);
        let subsystem_vendor = (data & 0xffff) as u16;
        let subsystem = (data >> 16) as u16;

        Some(Device {
            bus,
            slot,
            func,
            vendor,
            device,
            devtype,
            subsystem_vendor,
            subsystem,
        })
    }

    pub fn read_field_u8(&self, field: u8) -> u8 {
        read_u8(self.bus, self.slot, self.func, field)
    }

    pub fn read_field_u16(&self, field: u8) -> u16 {
        read_u16(self.bus, self.slot, self.func, field)
    }

    pub fn read_field_u32(&self, field: u8) -> u32 {
        read_u32(self.bus, self.slot, self.func, field)
    }

    pub fn write_field_u8(&self, field: u8, value: u8) {
        write_u8(self.bus, self.slot, self.func, field, value);
    }

    pub fn write_field_u16(&self, field: u8, value: u16) {
        write_u16(self.bus, self.slot, self.func, field, value);
    }

    pub fn write_field_u32(&self, field: u8, value: u32) {
        write_u32(self.bus, self.slot, self.func, field, value);
    }

    /// get_irq returns the device's assigned legacy IRQ line.
    ///
    pub fn get_irq(&self) -> usize {
        self.read_field_u8(INTERRUPT_LINE) as usize
    }

    /// bar returns the raw value of one of the device's six
    /// Base Address Registers.
    ///
    pub fn bar(&self, index: u8) -> u32 {
        let field = match index {
            0 => BAR0,
            1 => BAR1,
            2 => BAR2,
            3 => BAR3,
            4 => BAR4,
            5 => BAR5,
            _ => panic!("invalid BAR index {}", index),
        };

        self.read_field_u32(field)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PCI device with vendor={:04x}, device={:04x}, type={:04x}, subsystem vendor={:04x}, subsystem={:04x}",
            self.vendor, self.device, self.devtype, self.subsystem_vendor, self.subsystem
        )
    }
}
