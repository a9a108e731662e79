//! ring implements a virtio split virtqueue, as described in section
//! 2.6: a descriptor table, an available ring (driver to device) and
//! a used ring (device to driver), packed into one page-aligned
//! allocation and published to the device as a single page frame
//! number.

use crate::transport::{Transport, QUEUE_ALIGN};
use alloc::alloc::{alloc_zeroed, dealloc};
use bitflags::bitflags;
use core::alloc::Layout;
use core::sync::atomic::{fence, Ordering};

bitflags! {
    /// DescriptorFlags represents the set of flags that can be used
    /// in a split virtqueue descriptor's flags field.
    ///
    struct DescriptorFlags: u16 {
        /// NEXT indicates that the buffer continues into the
        /// descriptor referenced by the current descriptor's next
        /// field.
        const NEXT = 1;

        /// WRITE marks a buffer as write-only for the device. If
        /// WRITE is absent, the descriptor is read-only for the
        /// device.
        const WRITE = 2;
    }
}

/// Descriptor represents a single split virtqueue descriptor, as
/// described in section 2.6.5.
///
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
struct Descriptor {
    addr: u64,
    len: u32,
    flags: u16,
    next: u16,
}

/// Direction indicates which side of a [`Token`] owns the write
/// access to its buffer.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// In means the device may write to the buffer (used for RX).
    In,

    /// Out means the device only reads the buffer (used for TX).
    Out,
}

/// Token is a single scatter-gather fragment handed to
/// [`DescriptorRing::enqueue`].
///
#[derive(Clone, Copy, Debug)]
pub struct Token {
    pub addr: usize,
    pub len: u32,
    pub direction: Direction,
}

/// Completion is a buffer the device has finished with, returned by
/// [`DescriptorRing::dequeue`].
///
#[derive(Clone, Copy, Debug)]
pub struct Completion {
    pub addr: usize,
    pub len: u32,
}

/// RingError is returned when a ring operation cannot proceed.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RingError {
    /// RingFull indicates that there are not enough free descriptors
    /// to enqueue every token in a chain. Enqueue is all-or-nothing:
    /// no partial chain is ever published on a RingFull error.
    RingFull,
}

#[repr(C)]
struct AvailRing {
    flags: u16,
    idx: u16,
    ring: [u16; 0], // variable length; indexed manually.
}

#[repr(C)]
struct UsedElem {
    id: u32,
    len: u32,
}

#[repr(C)]
struct UsedRing {
    flags: u16,
    idx: u16,
    ring: [UsedElem; 0], // variable length; indexed manually.
}

/// DescriptorRing is one virtio split virtqueue: a descriptor table
/// plus the available/used rings used to exchange ownership of
/// descriptor chains with the device.
///
pub struct DescriptorRing {
    queue_index: u16,
    size: u16,

    mem: *mut u8,
    layout: Layout,

    desc_offset: usize,
    avail_offset: usize,
    used_offset: usize,

    free_head: u16,
    num_free: u16,
    last_used_idx: u16,
    avail_idx: u16,
}

unsafe impl Send for DescriptorRing {}

impl DescriptorRing {
    /// new allocates and publishes a new virtqueue of the device's
    /// reported size for `queue_index`, via `select_queue` and
    /// `set_queue_address` on `transport`.
    ///
    pub fn new(queue_index: u16, size: u16, transport: &Transport) -> DescriptorRing {
        let desc_size = 16 * size as usize;
        let avail_size = 4 + 2 * size as usize;
        let used_offset_unaligned = desc_size + avail_size;
        let used_offset = align_up(used_offset_unaligned, 4);
        let used_size = 4 + 8 * size as usize;
        let total = align_up(used_offset + used_size, QUEUE_ALIGN);

        let layout = Layout::from_size_align(total, QUEUE_ALIGN).expect("invalid virtqueue layout");
        let mem = unsafe { alloc_zeroed(layout) };
        assert!(!mem.is_null(), "failed to allocate virtqueue memory");

        // Descriptors start the chain free, linked in order.
        for i in 0..size {
            let desc = unsafe { &mut *(mem.add(i as usize * 16) as *mut Descriptor) };
            desc.next = if i + 1 < size { i + 1 } else { 0 };
        }

        let pfn = (mem as usize / QUEUE_ALIGN) as u32;
        transport.select_queue(queue_index);
        transport.set_queue_address(pfn);

        DescriptorRing {
            queue_index,
            size,
            mem,
            layout,
            desc_offset: 0,
            avail_offset: desc_size,
            used_offset,
            free_head: 0,
            num_free: size,
            last_used_idx: 0,
            avail_idx: 0,
        }
    }

    fn descriptor(&self, index: u16) -> &mut Descriptor {
        unsafe { &mut *(self.mem.add(self.desc_offset + index as usize * 16) as *mut Descriptor) }
    }

    fn avail(&self) -> &mut AvailRing {
        unsafe { &mut *(self.mem.add(self.avail_offset) as *mut AvailRing) }
    }

    fn avail_ring_entry(&self, i: u16) -> &mut u16 {
        let offset = self.avail_offset + 4 + i as usize * 2;
        unsafe { &mut *(self.mem.add(offset) as *mut u16) }
    }

    fn used(&self) -> &UsedRing {
        unsafe { &*(self.mem.add(self.used_offset) as *const UsedRing) }
    }

    fn used_ring_entry(&self, i: u16) -> &UsedElem {
        let offset = self.used_offset + 4 + i as usize * 8;
        unsafe { &*(self.mem.add(offset) as *const UsedElem) }
    }

    /// num_descriptors returns the total number of descriptors in
    /// the ring (free and in-flight).
    ///
    pub fn num_descriptors(&self) -> u16 {
        self.size
    }

    /// num_free returns the number of descriptors not currently
    /// attached to an in-flight chain.
    ///
    pub fn num_free(&self) -> u16 {
        self.num_free
    }

    /// enqueue threads `tokens` into consecutive free descriptors and
    /// publishes the chain to the device. Enqueue is all-or-nothing:
    /// if there are not enough free descriptors for every token, no
    /// descriptors are consumed and [`RingError::RingFull`] is
    /// returned.
    ///
    pub fn enqueue(&mut self, tokens: &[Token]) -> Result<(), RingError> {
        if tokens.len() > self.num_free as usize {
            return Err(RingError::RingFull);
        }

        let head = self.free_head;
        let mut cur = head;
        for (i, token) in tokens.iter().enumerate() {
            let next = self.descriptor(cur).next;
            let desc = self.descriptor(cur);
            desc.addr = token.addr as u64;
            desc.len = token.len;

            let mut flags = DescriptorFlags::empty();
            if token.direction == Direction::In {
                flags |= DescriptorFlags::WRITE;
            }
            if i + 1 < tokens.len() {
                flags |= DescriptorFlags::NEXT;
            }
            desc.flags = flags.bits();

            if i + 1 < tokens.len() {
                cur = next;
            } else {
                self.free_head = next;
            }
        }

        self.num_free -= tokens.len() as u16;

        let slot = self.avail_idx % self.size;
        *self.avail_ring_entry(slot) = head;

        // The descriptor writes above must be visible before we
        // publish the new available index.
        fence(Ordering::Release);

        self.avail_idx = self.avail_idx.wrapping_add(1);
        self.avail().idx = self.avail_idx;

        Ok(())
    }

    /// new_incoming returns the number of used-ring entries the
    /// device has published since the last [`dequeue`](Self::dequeue) call.
    ///
    pub fn new_incoming(&self) -> u16 {
        self.used().idx.wrapping_sub(self.last_used_idx)
    }

    /// dequeue returns the next completion from the used ring, or
    /// `None` if the device has not completed any new descriptor
    /// chains since the last call.
    ///
    pub fn dequeue(&mut self) -> Option<Completion> {
        if self.new_incoming() == 0 {
            return None;
        }

        fence(Ordering::Acquire);

        let slot = self.last_used_idx % self.size;
        let elem = self.used_ring_entry(slot);
        let id = elem.id as u16;
        let len = elem.len;

        let addr = self.descriptor(id).addr as usize;

        // Return the whole chain starting at `id` to the free list.
        let mut cur = id;
        loop {
            let desc = self.descriptor(cur);
            let has_next = DescriptorFlags::from_bits_truncate(desc.flags).contains(DescriptorFlags::NEXT);
            self.num_free += 1;
            if !has_next {
                desc.next = self.free_head;
                self.free_head = id;
                break;
            }
            cur = desc.next;
        }

        self.last_used_idx = self.last_used_idx.wrapping_add(1);

        Some(Completion { addr, len })
    }

    /// kick notifies the device that the available ring has
    /// advanced.
    ///
    pub fn kick(&self, transport: &Transport) {
        transport.notify_queue(self.queue_index);
    }

    /// enable_interrupts clears the flag suppressing used-buffer
    /// notifications from the device for this queue.
    ///
    pub fn enable_interrupts(&mut self) {
        self.avail().flags = 0;
    }

    /// disable_interrupts sets the flag suppressing used-buffer
    /// notifications from the device for this queue, for the
    /// duration of a service loop that will poll the ring directly.
    ///
    pub fn disable_interrupts(&mut self) {
        self.avail().flags = 1;
    }
}

impl Drop for DescriptorRing {
    fn drop(&mut self) {
        unsafe { dealloc(self.mem, self.layout) };
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}
