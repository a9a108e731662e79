//! bufferpool implements a fixed-capacity pool of page-aligned,
//! DMA-suitable buffers.
//!
//! The pool owns one contiguous allocation of `bufcount * bufsize`
//! bytes and hands out fixed-size slices of it. Buffers have two
//! faces: the raw face, used by the device, and the offset face,
//! `device_offset` bytes into the buffer, used by upper layers so
//! that a device-specific header (the virtio-net header, here) is
//! never visible above the driver.

use alloc::alloc::{alloc, dealloc};
use alloc::vec::Vec;
use core::alloc::Layout;

const PAGE_SIZE: usize = 4096;

/// PoolError is returned by pool operations that cannot proceed.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolError {
    /// PoolExhausted indicates the free list was empty at the time
    /// of an acquire. The pool does not grow dynamically; callers
    /// that cannot tolerate exhaustion should treat this as fatal,
    /// but the `Result` return keeps the decision at the call site
    /// rather than inside the pool itself.
    PoolExhausted,
}

/// BufferPool owns a fixed number of fixed-size, page-aligned
/// buffers, suitable for handing to a DMA-capable device.
///
pub struct BufferPool {
    region: *mut u8,
    layout: Layout,
    bufcount: usize,
    bufsize: usize,
    device_offset: usize,
    free: spin::Mutex<Vec<usize>>,
}

unsafe impl Send for BufferPool {}
unsafe impl Sync for BufferPool {}

impl BufferPool {
    /// new allocates `bufcount` buffers of `bufsize` bytes each from
    /// the global allocator, as one page-aligned region, and returns
    /// a pool with every buffer initially free.
    ///
    /// `device_offset` is the number of bytes at the start of each
    /// buffer reserved for a device-specific header; it must be
    /// strictly less than `bufsize`.
    ///
    pub fn new(bufcount: usize, bufsize: usize, device_offset: usize) -> BufferPool {
        assert!(device_offset < bufsize, "device_offset must be within a buffer");

        let layout = Layout::from_size_align(bufcount * bufsize, PAGE_SIZE)
            .expect("invalid buffer pool layout");
        let region = unsafe { alloc(layout) };
        assert!(!region.is_null(), "failed to allocate buffer pool");

        let mut free = Vec::with_capacity(bufcount);
        for i in 0..bufcount {
            free.push(region as usize + i * bufsize);
        }

        BufferPool {
            region,
            layout,
            bufcount,
            bufsize,
            device_offset,
            free: spin::Mutex::new(free),
        }
    }

    /// bufsize returns the capacity of each buffer, including the
    /// device header reserved by `device_offset`.
    ///
    pub fn bufsize(&self) -> usize {
        self.bufsize
    }

    /// device_offset returns the number of bytes reserved at the
    /// start of each buffer for a device-specific header.
    ///
    pub fn device_offset(&self) -> usize {
        self.device_offset
    }

    /// acquire_raw removes and returns the address of a free buffer,
    /// at its raw (device-visible) face.
    ///
    pub fn acquire_raw(&self) -> Result<usize, PoolError> {
        self.free.lock().pop().ok_or(PoolError::PoolExhausted)
    }

    /// acquire_offset removes and returns the address of a free
    /// buffer, offset past the reserved device header.
    ///
    pub fn acquire_offset(&self) -> Result<usize, PoolError> {
        self.acquire_raw().map(|addr| addr + self.device_offset)
    }

    fn region_range(&self) -> core::ops::Range<usize> {
        let start = self.region as usize;
        start..(start + self.bufcount * self.bufsize)
    }

    /// release_raw returns a buffer to the free list, addressed at
    /// its raw face. Addresses that do not fall within the pool's
    /// region, are not aligned to a buffer boundary, or carry the
    /// wrong size are silently ignored: this keeps release safe to
    /// call with a foreign or already-released address.
    ///
    pub fn release_raw(&self, addr: usize, size: usize) {
        if size != self.bufsize {
            serial::debug!("bufferpool: ignoring release of size {} (expected {})", size, self.bufsize);
            return;
        }

        let range = self.region_range();
        if !range.contains(&addr) {
            serial::debug!("bufferpool: ignoring release of foreign address {:#x}", addr);
            return;
        }

        if (addr - range.start) % self.bufsize != 0 {
            serial::debug!("bufferpool: ignoring release of misaligned address {:#x}", addr);
            return;
        }

        self.free.lock().push(addr);
    }

    /// release_offset returns a buffer to the free list, addressed
    /// at its offset face. See [`release_raw`](Self::release_raw)
    /// for the rejection rules.
    ///
    pub fn release_offset(&self, addr: usize, size: usize) {
        if addr < self.device_offset {
            return;
        }

        self.release_raw(addr - self.device_offset, size + self.device_offset);
    }

    /// available returns the number of buffers currently on the free
    /// list. Intended for tests and diagnostics.
    ///
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        unsafe { dealloc(self.region, self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let pool = BufferPool::new(4, 2048, 16);

        let mut bufs = Vec::new();
        for _ in 0..4 {
            bufs.push(pool.acquire_raw().expect("buffer should be available"));
        }

        assert_eq!(pool.acquire_raw(), Err(PoolError::PoolExhausted));

        for addr in &bufs {
            pool.release_raw(*addr, 2048);
        }

        assert_eq!(pool.available(), 4);

        let mut reacquired = Vec::new();
        for _ in 0..4 {
            reacquired.push(pool.acquire_raw().expect("buffer should be available"));
        }
        reacquired.sort_unstable();
        bufs.sort_unstable();
        assert_eq!(reacquired, bufs);
    }

    #[test]
    fn foreign_release_is_ignored() {
        let pool = BufferPool::new(4, 2048, 16);
        let buf = pool.acquire_raw().expect("buffer should be available");
        let before = pool.available();

        pool.release_raw(buf + 1, 2048);
        assert_eq!(pool.available(), before);

        pool.release_raw(buf, 2048);
        assert_eq!(pool.available(), before + 1);
    }

    #[test]
    fn offset_faces_round_trip() {
        let pool = BufferPool::new(2, 2048, 16);
        let raw = pool.acquire_raw().expect("buffer should be available");
        pool.release_raw(raw, 2048);

        let offset = pool.acquire_offset().expect("buffer should be available");
        assert_eq!(offset, raw + 16);

        pool.release_offset(offset, 2048 - 16);
        assert_eq!(pool.available(), 2);
    }
}
