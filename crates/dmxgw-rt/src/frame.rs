//! The timing-critical half of the frame algorithm.
//! Two entry points share the BREAK/MAB sequence:
//!
//! - [`run_cycle`]: the large-core variant's single synchronous call per
//!   frame, run from its own dedicated-core thread. Waits (bounded) for the
//!   line to go idle, then blocks through BREAK/MAB/513 bytes.
//! - [`TinyTx`] + [`dmx_poll`]: the tiny-core variant's cooperative state
//!   machine, called once per bare main-loop iteration. BREAK/MAB is still
//!   issued as a single interrupts-disabled burst, but the 513 data bytes
//!   are FIFO-stuffed incrementally across iterations so the main loop
//!   keeps draining the incoming command ring between bytes.
//!
//! Both call into [`DmxEngine`] only for the snapshot and the post-frame
//! bookkeeping; neither holds the universe lock (there isn't one — the
//! snapshot in step 3 *is* the double buffer) during BREAK/MAB.

use crate::engine::DmxEngine;
use crate::hw::{HwTimer, InterruptGate, Uart, LCR_8N2_BREAK_CLEAR, LCR_8N2_BREAK_SET};

/// Idle-wait timeout before a stalled shift register is counted as an
/// error and the cycle gives up on this frame (tries fresh next time).
const TX_IDLE_TIMEOUT_US: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    FrameSent,
    Disabled,
}

/// Large-core variant: one call transmits one complete frame synchronously.
pub fn run_cycle<U: Uart, T: HwTimer, G: InterruptGate>(
    engine: &mut DmxEngine,
    uart: &mut U,
    timer: &T,
) -> CycleOutcome {
    if !engine.is_enabled() {
        return CycleOutcome::Disabled;
    }

    let wait_start = timer.now_ticks();
    let timeout_ticks = TX_IDLE_TIMEOUT_US.saturating_mul(timer.ticks_per_us());
    while !uart.tx_idle() {
        if timer.now_ticks().wrapping_sub(wait_start) > timeout_ticks {
            engine.record_error();
            break;
        }
    }

    let snapshot = engine.snapshot();
    emit_break_mab::<U, T, G>(uart, timer, engine.timing().break_us, engine.timing().mab_us);

    for &byte in snapshot.iter() {
        while !uart.tx_ready() {
            core::hint::spin_loop();
        }
        uart.write_byte(byte);
    }

    engine.record_frame(timer.now_ticks(), timer.ticks_per_us());
    CycleOutcome::FrameSent
}

/// The interrupts-disabled BREAK/MAB burst shared by both variants.
/// LCR writes are absolute, never read-modify-write.
fn emit_break_mab<U: Uart, T: HwTimer, G: InterruptGate>(
    uart: &mut U,
    timer: &T,
    break_us: u16,
    mab_us: u16,
) {
    let state = G::disable();
    uart.write_lcr_absolute(LCR_8N2_BREAK_SET);
    timer.busy_wait_us(break_us as u32);
    uart.write_lcr_absolute(LCR_8N2_BREAK_CLEAR);
    timer.busy_wait_us(mab_us as u32);
    G::restore(state);
}

/// Tiny-core cooperative transmit state, driven by [`dmx_poll`].
pub enum TinyTxState {
    Idle { waiting_since: Option<u32> },
    TxData {
        frame: [u8; crate::engine::UNIVERSE_LEN],
        pos: usize,
    },
}

pub struct TinyTx {
    state: TinyTxState,
}

impl Default for TinyTx {
    fn default() -> Self {
        Self::new()
    }
}

impl TinyTx {
    pub const fn new() -> Self {
        Self {
            state: TinyTxState::Idle { waiting_since: None },
        }
    }
}

/// Advance the tiny-core transmit state machine by one main-loop
/// iteration. Never blocks.
pub fn dmx_poll<U: Uart, T: HwTimer, G: InterruptGate>(
    engine: &mut DmxEngine,
    tx: &mut TinyTx,
    uart: &mut U,
    timer: &T,
    now_ticks: u32,
) {
    match &mut tx.state {
        TinyTxState::Idle { waiting_since } => {
            if !engine.is_enabled() {
                *waiting_since = None;
                return;
            }
            if !uart.tx_idle() {
                let start = *waiting_since.get_or_insert(now_ticks);
                let timeout_ticks = TX_IDLE_TIMEOUT_US.saturating_mul(timer.ticks_per_us());
                if now_ticks.wrapping_sub(start) > timeout_ticks {
                    engine.record_error();
                    *waiting_since = None;
                }
                return;
            }
            *waiting_since = None;
            let frame = engine.snapshot();
            emit_break_mab::<U, T, G>(uart, timer, engine.timing().break_us, engine.timing().mab_us);
            tx.state = TinyTxState::TxData { frame, pos: 0 };
        }
        TinyTxState::TxData { frame, pos } => {
            while *pos < frame.len() && uart.tx_ready() {
                uart.write_byte(frame[*pos]);
                *pos += 1;
            }
            if *pos == frame.len() {
                engine.record_frame(now_ticks, timer.ticks_per_us());
                tx.state = TinyTxState::Idle { waiting_since: None };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{MockTimer, MockUart};

    struct NoGate;
    impl InterruptGate for NoGate {
        type State = ();
        fn disable() -> Self::State {}
        fn restore(_: Self::State) {}
    }

    #[test]
    fn run_cycle_sends_513_bytes_in_order() {
        let mut engine = DmxEngine::new();
        engine.enable();
        engine.set_channels(0, &[0xFF]).unwrap();
        let mut uart = MockUart::new(16);
        let timer = MockTimer::new(1);

        let outcome = run_cycle::<_, _, NoGate>(&mut engine, &mut uart, &timer);
        assert_eq!(outcome, CycleOutcome::FrameSent);
        assert_eq!(uart.sent.len(), crate::engine::UNIVERSE_LEN);
        assert_eq!(uart.sent[0], 0x00); // start code
        assert_eq!(uart.sent[1], 0xFF); // slot 1
        assert_eq!(engine.status().frame_count, 1);
    }

    #[test]
    fn run_cycle_disabled_does_nothing() {
        let mut engine = DmxEngine::new();
        let mut uart = MockUart::new(16);
        let timer = MockTimer::new(1);
        let outcome = run_cycle::<_, _, NoGate>(&mut engine, &mut uart, &timer);
        assert_eq!(outcome, CycleOutcome::Disabled);
        assert_eq!(uart.sent.len(), 0);
    }

    #[test]
    fn stalled_shift_register_counts_error_but_keeps_running() {
        let mut engine = DmxEngine::new();
        engine.enable();
        let mut uart = MockUart::new(16);
        uart.shift_register_busy = true; // never goes idle
        let timer = MockTimer::new(1);

        // MockTimer::busy_wait_us fast-forwards the clock rather than
        // spinning on wall time, so this resolves immediately in tests.
        let start_errors = engine.error_count();
        let _ = run_cycle::<_, _, NoGate>(&mut engine, &mut uart, &timer);
        assert!(engine.error_count() > start_errors);
    }

    #[test]
    fn tiny_core_fifo_stuffs_across_polls() {
        let mut engine = DmxEngine::new();
        engine.enable();
        let mut tx = TinyTx::new();
        let mut uart = MockUart::new(64); // 64-byte FIFO
        let timer = MockTimer::new(1);

        // First poll: idle -> break/mab -> TxData, fills up to FIFO capacity.
        dmx_poll::<_, _, NoGate>(&mut engine, &mut tx, &mut uart, &timer, 0);
        assert_eq!(uart.sent.len(), 64);
        assert!(!matches!(tx.state, TinyTxState::Idle { .. }));

        // Simulate FIFO draining, then keep polling until the frame completes.
        for _ in 0..20 {
            uart.drain(64);
            dmx_poll::<_, _, NoGate>(&mut engine, &mut tx, &mut uart, &timer, 0);
            if matches!(tx.state, TinyTxState::Idle { .. }) {
                break;
            }
        }
        assert!(matches!(tx.state, TinyTxState::Idle { .. }));
        assert_eq!(uart.sent.len(), crate::engine::UNIVERSE_LEN);
        assert_eq!(engine.status().frame_count, 1);
    }
}
