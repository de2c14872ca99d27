//! The two variants' main-loop orchestration, built on top of
//! [`crate::frame`] and [`crate::dispatcher`]. Kept separate from the
//! `#![no_main]` binaries so it stays unit-testable: board bring-up
//! (clocks, pin muxing, the reserved-clocks declaration DESIGN.md calls
//! out) is the only thing left to the binaries.

use dmxgw_ipc::{MailboxMessage, MailboxPort, Ring};
use dmxgw_wire::Decoder;

use crate::dispatcher::{self, PostAction};
use crate::engine::DmxEngine;
use crate::frame::{self, TinyTx};
use crate::hw::{HwTimer, InterruptGate, Uart};

/// One iteration of the tiny-core cooperative main loop: drain whatever
/// bytes are waiting in the A→B ring (the mailbox ISR only ever pushes
/// into that lock-free ring; this loop is the sole consumer), dispatch at
/// most one complete command, and advance the DMX transmit state machine.
///
/// Returns `true` if the dispatcher asked for a SoC reset — the caller
/// (the binary, which owns the actual reset register) issues it only
/// after this function returns, so the OK response has already been
/// pushed onto the outgoing ring.
#[allow(clippy::too_many_arguments)]
pub fn tiny_core_step<const CAP_IN: usize, const CAP_OUT: usize, U, T, G>(
    engine: &mut DmxEngine,
    decoder: &mut Decoder,
    tx_state: &mut TinyTx,
    rx_ring: &mut Ring<CAP_IN>,
    tx_ring: &mut Ring<CAP_OUT>,
    uart: &mut U,
    timer: &T,
    now_ticks: u32,
) -> bool
where
    U: Uart,
    T: HwTimer,
    G: InterruptGate,
{
    let mut reset_requested = false;

    if let Some(byte) = rx_ring.pop() {
        if let Some(result) = decoder.feed(byte) {
            let (resp, action) = match result {
                Ok(frame) => dispatcher::dispatch(engine, frame.op, frame.payload()),
                Err(e) => (dispatcher::protocol_error_response(e), PostAction::None),
            };
            tx_ring.push_slice(resp.bytes());
            reset_requested = action == PostAction::ResetRequested;
        }
    }

    frame::dmx_poll::<U, T, G>(engine, tx_state, uart, timer, now_ticks);

    reset_requested
}

/// Checks the tiny-core's A→B mailbox doorbell and, if a message is
/// pending, acknowledges it and reports it — the ISR-equivalent, called
/// from the main loop since this port models interrupts as cooperative
/// polling rather than true preemption (see DESIGN.md).
pub fn poll_mailbox(port: &MailboxPort) -> Option<MailboxMessage> {
    port.poll().inspect(|_| port.ack())
}

/// Large-core variant: the command-receive side. Call whenever the IPC
/// callback/thread wakes up with new bytes. Unlike the tiny core, this can
/// afford to decode a whole batch per wakeup.
pub fn large_core_command_batch<const CAP_IN: usize, const CAP_OUT: usize>(
    engine_mutate: &mut dyn FnMut(&mut dyn FnMut(&mut DmxEngine)),
    decoder: &mut Decoder,
    rx_ring: &mut Ring<CAP_IN>,
    tx_ring: &mut Ring<CAP_OUT>,
) -> bool {
    let mut reset_requested = false;
    while let Some(byte) = rx_ring.pop() {
        if let Some(result) = decoder.feed(byte) {
            let mut resp_holder = None;
            let mut action_holder = PostAction::None;
            engine_mutate(&mut |engine: &mut DmxEngine| {
                let (resp, action) = match result {
                    Ok(ref frame) => dispatcher::dispatch(engine, frame.op, frame.payload()),
                    Err(e) => (dispatcher::protocol_error_response(e), PostAction::None),
                };
                resp_holder = Some(resp);
                action_holder = action;
            });
            if let Some(resp) = resp_holder {
                tx_ring.push_slice(resp.bytes());
            }
            reset_requested |= action_holder == PostAction::ResetRequested;
        }
    }
    reset_requested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{MockTimer, MockUart};
    use dmxgw_wire::{encode_into, CommandId, CMD_MAGIC};

    struct NoGate;
    impl InterruptGate for NoGate {
        type State = ();
        fn disable() -> Self::State {}
        fn restore(_: Self::State) {}
    }

    #[test]
    fn tiny_core_step_dispatches_one_command_per_ring_byte_drain() {
        let mut engine = DmxEngine::new();
        let mut decoder = Decoder::new();
        let mut tx_state = TinyTx::new();
        let mut rx_ring: Ring<64> = Ring::new();
        let mut tx_ring: Ring<64> = Ring::new();
        let mut uart = MockUart::new(64);
        let timer = MockTimer::new(1);

        let mut frame_bytes = [0u8; 16];
        let n = encode_into(&mut frame_bytes, CMD_MAGIC, CommandId::Enable as u8, &[]).unwrap();
        rx_ring.push_slice(&frame_bytes[..n]);

        let mut reset = false;
        for t in 0..n as u32 + 1 {
            reset |= tiny_core_step::<64, 64, _, _, NoGate>(
                &mut engine,
                &mut decoder,
                &mut tx_state,
                &mut rx_ring,
                &mut tx_ring,
                &mut uart,
                &timer,
                t,
            );
        }
        assert!(!reset);
        assert!(engine.is_enabled());
        assert!(!tx_ring.is_empty());
    }
}
