//! net implements the virtio-net device driver: feature negotiation,
//! the RX/TX descriptor rings, the interrupt handler, the RX/TX
//! "zipper" service loop, and the transmit backlog chain.

pub mod bufferpool;
pub mod header;

use crate::ring::{Completion, DescriptorRing, Direction, RingError, Token};
use crate::transport::Transport;
use crate::{DeviceStatus, InitError, InterruptStatus};
use alloc::boxed::Box;
use alloc::sync::Arc;
use bufferpool::BufferPool;
use interrupts::{register_irq, Irq, IrqHandler};
use network::ethernet::Mac;
use network::packet::{Packet, Releaser};
use x86_64::structures::idt::InterruptStackFrame;

const VIRTIO_NET_F_MAC: u32 = 1 << 5;
const VIRTIO_NET_F_STATUS: u32 = 1 << 16;
const REQUIRED_FEATURES: u32 = VIRTIO_NET_F_MAC | VIRTIO_NET_F_STATUS;

const RX_QUEUE: u16 = 0;
const TX_QUEUE: u16 = 1;

const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Link is invoked with every frame the device receives. The default
/// implementation drops the frame.
pub type Link = fn(Packet);

fn drop_link(_packet: Packet) {}

/// Backpressure is invoked when the TX backlog has fully drained and
/// at least one TX descriptor has become free, with an upper bound
/// on how many more packets the caller may immediately hand to
/// `transmit`.
pub type Backpressure = fn(usize);

fn ignore_backpressure(_free_slots: usize) {}

struct PoolReleaser(Arc<BufferPool>);

impl Releaser for PoolReleaser {
    fn release(&self, addr: usize, size: usize) {
        self.0.release_offset(addr, size);
    }
}

/// NetDriver drives a single virtio-net device: it owns the device's
/// transport, its RX/TX rings, and the buffer pool backing them.
pub struct NetDriver {
    transport: Transport,
    rx: DescriptorRing,
    tx: DescriptorRing,
    pool: Arc<BufferPool>,
    releaser: Arc<dyn Releaser>,
    mac: Mac,

    link_out: Link,
    transmit_queue_available: Backpressure,
    backlog: Option<Box<Packet>>,
}

impl NetDriver {
    /// new negotiates features, sizes and publishes the RX/TX
    /// virtqueues, pre-fills RX with buffers from a freshly created
    /// pool, and reads the device's MAC address. The device is left
    /// with `DRIVER_OK` set and RX already kicked; the caller still
    /// needs to register the returned IRQ line (see [`install`]).
    pub fn new(transport: Transport, bufcount: usize) -> Result<NetDriver, InitError> {
        transport.write_status(DeviceStatus::empty());
        transport.add_status(DeviceStatus::ACKNOWLEDGE);
        transport.add_status(DeviceStatus::DRIVER);

        let device_features = transport.read_device_features();
        if device_features & REQUIRED_FEATURES != REQUIRED_FEATURES {
            transport.add_status(DeviceStatus::FAILED);
            return Err(InitError::MissingRequiredFeatures(
                REQUIRED_FEATURES & !device_features,
            ));
        }

        transport.write_driver_features(device_features & REQUIRED_FEATURES);
        transport.add_status(DeviceStatus::FEATURES_OK);
        if !transport.read_status().contains(DeviceStatus::FEATURES_OK) {
            transport.add_status(DeviceStatus::FAILED);
            return Err(InitError::DeviceRefusedFeatures);
        }

        transport.select_queue(RX_QUEUE);
        let rx_size = transport.queue_size();
        let rx = DescriptorRing::new(RX_QUEUE, rx_size, &transport);

        transport.select_queue(TX_QUEUE);
        let tx_size = transport.queue_size();
        let tx = DescriptorRing::new(TX_QUEUE, tx_size, &transport);

        let pool = Arc::new(BufferPool::new(bufcount, DEFAULT_BUFFER_SIZE, header::SIZE));
        let releaser: Arc<dyn Releaser> = Arc::new(PoolReleaser(Arc::clone(&pool)));

        let mut mac_bytes = [0u8; 6];
        for (i, byte) in mac_bytes.iter_mut().enumerate() {
            *byte = transport.read_device_config_u8(i as u16);
        }
        let mac = Mac::new(mac_bytes);

        transport.add_status(DeviceStatus::DRIVER_OK);

        let mut driver = NetDriver {
            transport,
            rx,
            tx,
            pool,
            releaser,
            mac,
            link_out: drop_link,
            transmit_queue_available: ignore_backpressure,
            backlog: None,
        };

        for _ in 0..(rx_size / 2) {
            driver.refill_rx_one();
        }

        driver.rx.kick(&driver.transport);

        Ok(driver)
    }

    /// mac returns the device's negotiated MAC address.
    pub fn mac(&self) -> Mac {
        self.mac
    }

    /// irq returns the device's PCI IRQ line.
    pub fn irq(&self) -> usize {
        self.transport.irq()
    }

    pub fn on_link_out(&mut self, link_out: Link) {
        self.link_out = link_out;
    }

    pub fn on_transmit_queue_available(&mut self, callback: Backpressure) {
        self.transmit_queue_available = callback;
    }

    fn refill_rx_one(&mut self) {
        let raw = self
            .pool
            .acquire_raw()
            .expect("buffer pool exhausted refilling RX ring");

        let header_len = header::SIZE as u32;
        let payload_len = (self.pool.bufsize() - header::SIZE) as u32;
        let tokens = [
            Token { addr: raw, len: header_len, direction: Direction::In },
            Token { addr: raw + header::SIZE, len: payload_len, direction: Direction::In },
        ];

        match self.rx.enqueue(&tokens) {
            Ok(()) => {}
            Err(RingError::RingFull) => self.pool.release_raw(raw, self.pool.bufsize()),
        }
    }

    fn deliver_rx(&mut self, completion: Completion) {
        let payload_len = (completion.len as usize).saturating_sub(header::SIZE);
        let capacity = self.pool.bufsize() - header::SIZE;
        let payload_addr = (completion.addr + header::SIZE) as *mut u8;

        let packet = unsafe {
            Packet::with_device_offset(
                payload_addr,
                capacity,
                payload_len,
                Arc::clone(&self.releaser),
                header::SIZE,
            )
        };

        (self.link_out)(packet);
    }

    fn append_backlog(&mut self, packet: Box<Packet>) {
        match &mut self.backlog {
            Some(head) => head.push_tail(packet),
            None => self.backlog = Some(packet),
        }
    }

    /// transmit sends as much of `chain` as the TX ring currently has
    /// room for; any remainder is appended to the driver's backlog,
    /// to be drained as TX completions free up descriptors.
    ///
    /// Every packet in `chain` must have been allocated with a
    /// device offset of `header::SIZE` (as RX packets from this
    /// driver's own pool are): the virtio-net header is written into
    /// that reserved region immediately before the payload, so the
    /// two descriptors enqueued per packet (header, then payload)
    /// address disjoint, adjacent regions of the same buffer rather
    /// than overlapping it.
    pub fn transmit(&mut self, chain: Box<Packet>) {
        let mut current = Some(chain);
        let mut transmitted = 0usize;

        while let Some(mut packet) = current.take() {
            if self.tx.num_free() < 2 {
                self.append_backlog(packet);
                break;
            }

            let next = packet.take_tail();

            debug_assert_eq!(packet.device_offset(), header::SIZE);
            let payload_addr = packet.addr();
            let payload_len = packet.len() as u32;
            let (header_addr, _raw_capacity) = packet.into_raw_parts();

            unsafe { core::ptr::write_bytes(header_addr as *mut u8, 0, header::SIZE) };

            // Two descriptors per packet (header, payload): a ring
            // of N descriptors admits N/2 packets, not N.
            let tokens = [
                Token { addr: header_addr, len: header::SIZE as u32, direction: Direction::Out },
                Token { addr: payload_addr, len: payload_len, direction: Direction::Out },
            ];

            self.tx
                .enqueue(&tokens)
                .expect("checked for two free descriptors above");

            transmitted += 1;
            current = next;
        }

        if transmitted > 0 {
            self.tx.kick(&self.transport);
        }
    }

    fn drain_backlog(&mut self) {
        if let Some(packet) = self.backlog.take() {
            self.transmit(packet);
        }

        if self.backlog.is_none() && self.tx.num_free() > 0 {
            (self.transmit_queue_available)(self.tx.num_free() as usize / 2);
        }
    }

    /// service_queues is the zipper: while either ring has a new
    /// completion, it handles at most one from RX, then at most one
    /// from TX, before looping again. This bounds how long a burst
    /// on one ring can starve the other.
    pub fn service_queues(&mut self) {
        self.rx.disable_interrupts();
        self.tx.disable_interrupts();

        let mut rx_progressed = false;
        let mut tx_progressed = false;

        loop {
            let mut progressed = false;

            if self.rx.new_incoming() > 0 {
                if let Some(completion) = self.rx.dequeue() {
                    rx_progressed = true;
                    progressed = true;
                    self.deliver_rx(completion);
                    self.refill_rx_one();
                }
            }

            if self.tx.new_incoming() > 0 {
                if let Some(completion) = self.tx.dequeue() {
                    tx_progressed = true;
                    progressed = true;
                    self.pool.release_raw(completion.addr, self.pool.bufsize());
                }
            }

            if !progressed {
                break;
            }
        }

        self.rx.enable_interrupts();
        self.tx.enable_interrupts();

        if rx_progressed {
            self.rx.kick(&self.transport);
        }

        if tx_progressed {
            self.drain_backlog();
        }
    }

    fn handle_irq(&mut self) {
        let status = self.transport.read_interrupt_status();

        if status.contains(InterruptStatus::QUEUE_INTERRUPT) {
            self.service_queues();
        }

        if status.contains(InterruptStatus::DEVICE_CONFIG_INTERRUPT) {
            let mut mac_bytes = [0u8; 6];
            for (i, byte) in mac_bytes.iter_mut().enumerate() {
                *byte = self.transport.read_device_config_u8(i as u16);
            }
            self.mac = Mac::new(mac_bytes);
        }
    }
}

// The interrupts crate's IrqHandler is a bare function pointer with
// no captured state, so the single installed NetDriver lives behind
// a static mutex, matching the pattern used elsewhere in this
// codebase for singleton hardware state (the PIC, the IDT).
static DRIVER: spin::Mutex<Option<NetDriver>> = spin::Mutex::new(None);

/// install brings up a virtio-net device, registers its interrupt
/// handler, and stores it as the single active driver instance.
///
/// Only one virtio-net device may be installed at a time.
pub fn install(transport: Transport, bufcount: usize) -> Result<(), InitError> {
    let driver = NetDriver::new(transport, bufcount)?;
    let irq = Irq::new_unsafe(driver.irq() as u8);

    *DRIVER.lock() = Some(driver);
    register_irq(irq, irq_handler as IrqHandler);

    Ok(())
}

/// with_driver runs `f` against the installed driver, if any. Used
/// by callers that need to configure `on_link_out` /
/// `on_transmit_queue_available` or call `transmit` directly.
pub fn with_driver<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut NetDriver) -> R,
{
    DRIVER.lock().as_mut().map(f)
}

fn irq_handler(_frame: InterruptStackFrame, irq: Irq) {
    if let Some(driver) = DRIVER.lock().as_mut() {
        driver.handle_irq();
    }
    irq.acknowledge();
}
