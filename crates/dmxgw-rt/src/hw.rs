//! Hardware abstraction the frame engine drives. Kept as small traits so
//! the timing-critical algorithm in [`crate::frame`] is unit-testable on
//! the host against [`MockUart`]/[`MockTimer`] without a target chip.

/// The UART's line-control register, as an absolute value, never a
/// read-modify-write. 8 data bits, 2 stop bits, no parity, DLAB=0,
/// BREAK=0 — the "known good" configuration this driver always restores
/// to. A naive read-modify-write around BREAK leaves a window where a
/// concurrent write (or a latched hardware condition) can strand the
/// BREAK bit asserted, observed in practice as a halved frame rate.
pub const LCR_8N2_BREAK_CLEAR: u8 = 0b0000_0111;
/// Same configuration with BREAK asserted.
pub const LCR_8N2_BREAK_SET: u8 = LCR_8N2_BREAK_CLEAR | 0b0100_0000;

/// Polling access to one UART channel at 250 kBaud / 8N2.
pub trait Uart {
    /// One-time hardware setup: baud rate generator, 8N2, FIFOs.
    fn configure_8n2_250k(&mut self);

    /// Absolute LCR write (never read-modify-write). Used only around the
    /// BREAK window.
    fn write_lcr_absolute(&mut self, value: u8);

    /// True once the TX FIFO is empty AND the shift register has finished
    /// draining the last bit — i.e. the line is idle and a fresh BREAK can
    /// safely be asserted.
    fn tx_idle(&self) -> bool;

    /// Non-blocking: true if there is room in the TX FIFO for at least one
    /// more byte.
    fn tx_ready(&self) -> bool;

    /// Push one byte into the TX FIFO. Caller must have checked
    /// `tx_ready()` (tiny-core, FIFO-stuffed) or is willing to spin
    /// internally until there is room (large-core, direct polling write).
    fn write_byte(&mut self, byte: u8);
}

/// A free-running hardware counter, independent of CPU clock-gating or
/// frequency scaling. BREAK/MAB busy-waits are measured against this, never
/// against a CPU-cycle loop (cycle counts drift with cache/pipeline state).
pub trait HwTimer {
    /// Current tick count. Wraps; callers only ever compare deltas.
    fn now_ticks(&self) -> u32;

    /// Timer ticks per microsecond.
    fn ticks_per_us(&self) -> u32;

    /// Busy-wait at least `us` microseconds.
    fn busy_wait_us(&self, us: u32) {
        let start = self.now_ticks();
        let target = us.saturating_mul(self.ticks_per_us().max(1));
        while self.now_ticks().wrapping_sub(start) < target {
            core::hint::spin_loop();
        }
    }
}

/// Disables/restores interrupts around the BREAK/MAB critical region. No
/// allocation, no mutex, no logging may happen while this is held.
pub trait InterruptGate {
    type State;
    fn disable() -> Self::State;
    fn restore(state: Self::State);
}

/// Test/host double for [`Uart`]. FIFO depth mirrors the tiny-core's
/// 64-byte hardware FIFO so FIFO-stuffing behavior is exercised too.
#[cfg(any(test, feature = "std-mocks"))]
pub struct MockUart {
    pub lcr: u8,
    pub fifo_len: usize,
    pub fifo_capacity: usize,
    pub shift_register_busy: bool,
    pub sent: heapless::Vec<u8, 1600>,
}

#[cfg(any(test, feature = "std-mocks"))]
impl MockUart {
    pub fn new(fifo_capacity: usize) -> Self {
        Self {
            lcr: LCR_8N2_BREAK_CLEAR,
            fifo_len: 0,
            fifo_capacity,
            shift_register_busy: false,
            sent: heapless::Vec::new(),
        }
    }

    /// Test hook: simulate the FIFO draining over time.
    pub fn drain(&mut self, n: usize) {
        self.fifo_len = self.fifo_len.saturating_sub(n);
    }
}

#[cfg(any(test, feature = "std-mocks"))]
impl Uart for MockUart {
    fn configure_8n2_250k(&mut self) {
        self.lcr = LCR_8N2_BREAK_CLEAR;
    }

    fn write_lcr_absolute(&mut self, value: u8) {
        self.lcr = value;
    }

    fn tx_idle(&self) -> bool {
        self.fifo_len == 0 && !self.shift_register_busy
    }

    fn tx_ready(&self) -> bool {
        self.fifo_len < self.fifo_capacity
    }

    fn write_byte(&mut self, byte: u8) {
        self.fifo_len += 1;
        let _ = self.sent.push(byte);
    }
}

#[cfg(any(test, feature = "std-mocks"))]
pub struct MockTimer {
    pub ticks: core::cell::Cell<u32>,
    pub ticks_per_us: u32,
}

#[cfg(any(test, feature = "std-mocks"))]
impl MockTimer {
    pub fn new(ticks_per_us: u32) -> Self {
        Self {
            ticks: core::cell::Cell::new(0),
            ticks_per_us,
        }
    }

    pub fn advance(&self, ticks: u32) {
        self.ticks.set(self.ticks.get().wrapping_add(ticks));
    }
}

#[cfg(any(test, feature = "std-mocks"))]
impl HwTimer for MockTimer {
    fn now_ticks(&self) -> u32 {
        self.ticks.get()
    }

    fn ticks_per_us(&self) -> u32 {
        self.ticks_per_us
    }

    // Test override: advance the virtual clock instead of spinning, so
    // unit tests don't busy-wait on wall time.
    fn busy_wait_us(&self, us: u32) {
        self.advance(us.saturating_mul(self.ticks_per_us.max(1)));
    }
}
