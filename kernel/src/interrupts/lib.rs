#![no_std]

// Copyright 2021 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Handles hardware interrupts via the [Programmable Interrupt Controller](https://en.wikipedia.org/wiki/Programmable_interrupt_controller) (PIC).
//!
//! This crate owns only the IRQ facade: the PIC and the IDT's IRQ vectors.
//! CPU exception handling and the rest of the IDT are set up elsewhere,
//! before any of this crate's code runs.
//!
//! The PIC's IRQs are registered using the [`register_irq`] function,
//! making it easier to handle IRQs without needing to know the details of
//! the PIC. IRQ handlers don't need to acknowledge the PIC themselves; they
//! are passed the IRQ number and can acknowledge it with [`Irq::acknowledge`].
//!
//! # Examples
//!
//! Register a simple ticker using the [Programmable Interval Timer](https://en.wikipedia.org/wiki/Programmable_interval_timer) (PIT):
//!
//! ```ignore
//! static TICKER: AtomicU64 = AtomicU64::new(0);
//!
//! fn timer_interrupt_handler(_stack_frame: InterruptStackFrame, irq: Irq) {
//!     TICKER.fetch_add(1, Ordering::Relaxed);
//!     irq.acknowledge();
//! }
//!
//! fn init() {
//!     const PIT_IRQ: Irq = Irq::new_unsafe(0);
//!     register_irq(PIT_IRQ, timer_interrupt_handler);
//! }
//! ```

mod irq;

use lazy_static::lazy_static;
use pic8259::ChainedPics;
use x86_64::structures::idt::InterruptDescriptorTable;

pub use irq::{register_irq, Irq, IrqHandler};

/// Loads the IRQ vectors of the [Interrupt Descriptor Table](https://en.wikipedia.org/wiki/Interrupt_descriptor_table) (IDT)
/// and initializes the [Programmable Interrupt Controller](https://en.wikipedia.org/wiki/Programmable_interrupt_controller) (PIC).
///
/// The PIC is remapped from its initial offsets so that it does not overlap
/// with CPU exceptions. All IRQs are masked by default; individual IRQs can
/// be enabled by registering a handler using [`register_irq`].
///
/// The rest of the IDT (CPU exception vectors) must already be installed by
/// the caller; this crate only adds the 16 IRQ vectors.
///
pub fn init() {
    IDT.load();
    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        pics.disable(); // We disable all PIC lines by default.
    }
}

lazy_static! {
    /// IDT is our interrupt descriptor table, configured with
    /// default dispatching handlers for the 16 IRQ vectors.
    ///
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        for (i, handler) in irq::IRQ_HANDLERS.iter().enumerate() {
            idt[PIC_1_OFFSET + i].set_handler_fn(*handler);
        }

        idt
    };
}

pub(crate) const PIC_1_OFFSET: usize = 32;
const PIC_2_OFFSET: usize = PIC_1_OFFSET + 8;

/// PICS is the set of programmable interrupt controllers.
///
/// PICS can be used to acknowledge an interrupt.
///
pub(crate) static PICS: spin::Mutex<ChainedPics> =
    spin::Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET as u8, PIC_2_OFFSET as u8) });
