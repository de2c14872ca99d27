//! Concrete MMIO bindings for the real-time core's UART and free-running
//! timer. Register layout is vaguely modeled on a 16550 (matching the
//! `LCR_8N2_BREAK_*` constants in [`crate::hw`]) with a separate
//! free-running cycle counter, which is what this SoC family actually
//! exposes on both the tiny and larger real-time cores.
//!
//! Base addresses are supplied by the binary (board bring-up — clocks,
//! pin muxing — is out of scope here), so this module only defines the
//! register block shapes and the trait impls, never a `static` instance.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::register_structs;

use crate::hw::{HwTimer, InterruptGate, Uart};

register_structs! {
    #[allow(non_snake_case)]
    pub UartRegisters {
        (0x00 => pub LCR: ReadWrite<u8>),
        (0x01 => _reserved0),
        (0x04 => pub LSR: ReadOnly<u32>),
        (0x08 => pub THR: ReadWrite<u32>),
        (0x0C => @END),
    }
}

const LSR_TX_FIFO_NOT_FULL: u32 = 1 << 0;
const LSR_TX_IDLE: u32 = 1 << 1;

register_structs! {
    #[allow(non_snake_case)]
    pub TimerRegisters {
        (0x00 => pub COUNTER: ReadOnly<u32>),
        (0x04 => @END),
    }
}

/// # Safety
/// `base` must point at a live UART register block for the lifetime of
/// the handle, and no other code may alias it.
pub struct BoardUart {
    regs: *mut UartRegisters,
}

unsafe impl Send for BoardUart {}

impl BoardUart {
    /// # Safety
    /// See struct docs.
    pub const unsafe fn new(base: *mut UartRegisters) -> Self {
        Self { regs: base }
    }

    fn regs(&self) -> &UartRegisters {
        unsafe { &*self.regs }
    }
}

impl Uart for BoardUart {
    fn configure_8n2_250k(&mut self) {
        self.regs().LCR.set(crate::hw::LCR_8N2_BREAK_CLEAR);
    }

    fn write_lcr_absolute(&mut self, value: u8) {
        self.regs().LCR.set(value);
    }

    fn tx_idle(&self) -> bool {
        self.regs().LSR.get() & LSR_TX_IDLE != 0
    }

    fn tx_ready(&self) -> bool {
        self.regs().LSR.get() & LSR_TX_FIFO_NOT_FULL != 0
    }

    fn write_byte(&mut self, byte: u8) {
        self.regs().THR.set(byte as u32);
    }
}

/// # Safety
/// `base` must point at a live free-running counter register for the
/// lifetime of the handle.
pub struct BoardTimer {
    regs: *const TimerRegisters,
    ticks_per_us: u32,
}

unsafe impl Send for BoardTimer {}

impl BoardTimer {
    /// # Safety
    /// See struct docs. `ticks_per_us` comes from the board's clock tree
    /// (out of scope here).
    pub const unsafe fn new(base: *const TimerRegisters, ticks_per_us: u32) -> Self {
        Self { regs: base, ticks_per_us }
    }
}

impl HwTimer for BoardTimer {
    fn now_ticks(&self) -> u32 {
        unsafe { (*self.regs).COUNTER.get() }
    }

    fn ticks_per_us(&self) -> u32 {
        self.ticks_per_us
    }
}

/// Disables/restores this core's interrupt line via `critical-section`,
/// so both the tiny-core (where this is the only gate ever used) and the
/// large-core (where it brackets just the BREAK/MAB burst, not the whole
/// transmit thread) share one implementation.
#[cfg(feature = "large-core")]
pub struct CriticalSectionGate;

#[cfg(feature = "large-core")]
impl InterruptGate for CriticalSectionGate {
    type State = critical_section::RestoreState;

    fn disable() -> Self::State {
        unsafe { critical_section::acquire() }
    }

    fn restore(state: Self::State) {
        unsafe { critical_section::release(state) }
    }
}

/// Tiny-core gate: a single bit in a core-local interrupt-enable register,
/// toggled directly since this core has no `critical-section` backend of
/// its own (no target support, see DESIGN.md).
#[cfg(feature = "tiny-core")]
pub struct TinyCoreGate;

#[cfg(feature = "tiny-core")]
impl InterruptGate for TinyCoreGate {
    type State = u32;

    fn disable() -> Self::State {
        let prev = tiny_core_irq_enable_read();
        tiny_core_irq_enable_write(0);
        prev
    }

    fn restore(state: Self::State) {
        tiny_core_irq_enable_write(state);
    }
}

#[cfg(feature = "tiny-core")]
const TINY_CORE_IRQ_ENABLE: *mut u32 = 0x4000_0000 as *mut u32;

#[cfg(feature = "tiny-core")]
fn tiny_core_irq_enable_read() -> u32 {
    unsafe { core::ptr::read_volatile(TINY_CORE_IRQ_ENABLE) }
}

#[cfg(feature = "tiny-core")]
fn tiny_core_irq_enable_write(v: u32) {
    unsafe { core::ptr::write_volatile(TINY_CORE_IRQ_ENABLE, v) }
}
