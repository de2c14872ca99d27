//! Tiny-core entry point: single-threaded cooperative main loop.
//!
//! Board bring-up (clocks, pin muxing, the reserved-memory regions this
//! binary's statics are linked into) is handled by the board support
//! crate and a linker script, neither of which lives here — this file
//! only wires already-configured hardware into [`dmxgw_rt::run_loop`].
#![no_std]
#![no_main]

extern crate panic_halt;

use dmxgw_ipc::{MailboxPort, MailboxRegisters, Ring};
use dmxgw_rt::board::{BoardTimer, BoardUart, TimerRegisters, TinyCoreGate, UartRegisters};
use dmxgw_rt::{run_loop, DmxEngine, TinyTx};
use dmxgw_wire::Decoder;

// Populated by the board support crate's linker script; placeholders here
// mark where those addresses come from, not what they are.
const UART_BASE: *mut UartRegisters = 0x1000_0000 as *mut UartRegisters;
const TIMER_BASE: *const TimerRegisters = 0x1000_1000 as *const TimerRegisters;
const TIMER_TICKS_PER_US: u32 = 48;
const MAILBOX_A2B_BASE: *mut MailboxRegisters = 0x1000_2000 as *mut MailboxRegisters;

const RING_CAP: usize = 4096;

#[link_section = ".shared_ipc"]
static mut A_TO_B_RING: Ring<RING_CAP> = Ring::new();
#[link_section = ".shared_ipc"]
static mut B_TO_A_RING: Ring<RING_CAP> = Ring::new();

#[no_mangle]
pub unsafe extern "C" fn _start() -> ! {
    let mut uart = unsafe { BoardUart::new(UART_BASE) };
    uart.configure_8n2_250k();
    let timer = unsafe { BoardTimer::new(TIMER_BASE, TIMER_TICKS_PER_US) };
    let mailbox = unsafe { MailboxPort::new(MAILBOX_A2B_BASE) };

    // Drain anything that landed before this loop was ready to see it,
    // then route the doorbell onto whatever line the board support crate
    // configured for it.
    let _ = mailbox.drain_pending_at_init();

    let mut engine = DmxEngine::new();
    let mut decoder = Decoder::new();
    let mut tx_state = TinyTx::new();

    #[allow(static_mut_refs)]
    let rx_ring = unsafe { &mut A_TO_B_RING };
    #[allow(static_mut_refs)]
    let tx_ring = unsafe { &mut B_TO_A_RING };

    let mut now: u32 = 0;
    loop {
        if run_loop::poll_mailbox(&mailbox).is_some() {
            // A byte (or a batch) landed in the ring; the ring itself
            // carries the bytes, this doorbell only says "look".
        }

        let reset_requested = run_loop::tiny_core_step::<RING_CAP, RING_CAP, _, _, TinyCoreGate>(
            &mut engine,
            &mut decoder,
            &mut tx_state,
            rx_ring,
            tx_ring,
            &mut uart,
            &timer,
            now,
        );

        if reset_requested {
            system_reset();
        }

        now = timer.now_ticks();
    }
}

fn system_reset() -> ! {
    // Board-specific reset register write; out of scope here (see
    // module docs). A real implementation never returns from this call.
    loop {
        core::hint::spin_loop();
    }
}
