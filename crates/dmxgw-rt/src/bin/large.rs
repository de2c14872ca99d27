//! Larger-core entry point: two threads sharing one mutex-protected
//! [`DmxEngine`] — a DMX transmit thread running [`run_cycle`]
//! at the configured refresh rate, and a command-receive thread draining
//! the IPC ring and dispatching against the same engine.
//!
//! As with the tiny-core binary, board bring-up and actual thread
//! spawning are the board/RTOS support crate's job, not this file's —
//! what's here is the per-thread body each of those threads runs, plus
//! the shared state they're both handed.
#![no_std]
#![no_main]

extern crate panic_halt;

use core::cell::RefCell;

use critical_section::Mutex as CsMutex;
use dmxgw_ipc::{MailboxPort, MailboxRegisters, Ring};
use dmxgw_rt::board::{BoardTimer, BoardUart, CriticalSectionGate, TimerRegisters, UartRegisters};
use dmxgw_rt::{run_loop, CycleOutcome, DmxEngine};
use dmxgw_wire::Decoder;

const UART_BASE: *mut UartRegisters = 0x2000_0000 as *mut UartRegisters;
const TIMER_BASE: *const TimerRegisters = 0x2000_1000 as *const TimerRegisters;
const TIMER_TICKS_PER_US: u32 = 48;
const MAILBOX_A2B_BASE: *mut MailboxRegisters = 0x2000_2000 as *mut MailboxRegisters;

const RING_CAP: usize = 4096;

#[link_section = ".shared_ipc"]
static mut A_TO_B_RING: Ring<RING_CAP> = Ring::new();
#[link_section = ".shared_ipc"]
static mut B_TO_A_RING: Ring<RING_CAP> = Ring::new();

/// The one mutex the two-thread design calls for: taken briefly by the command thread
/// around `set_channels`/`enable`/etc, and briefly by the transmit thread
/// around `snapshot()` — never held across the BREAK/MAB burst or the
/// 513-byte write, both of which run outside the lock.
static ENGINE: CsMutex<RefCell<DmxEngine>> = CsMutex::new(RefCell::new(DmxEngine::new()));

/// Entry point for the DMX transmit thread. Called by the RTOS/board
/// support crate on its own stack; never returns.
#[no_mangle]
pub unsafe extern "C" fn dmx_transmit_thread_main() -> ! {
    let mut uart = unsafe { BoardUart::new(UART_BASE) };
    uart.configure_8n2_250k();
    let timer = unsafe { BoardTimer::new(TIMER_BASE, TIMER_TICKS_PER_US) };

    loop {
        let period_us = critical_section::with(|cs| ENGINE.borrow(cs).borrow().timing().frame_period_us());
        let outcome = critical_section::with(|cs| {
            let mut engine = ENGINE.borrow(cs).borrow_mut();
            run_loop_run_cycle(&mut engine, &mut uart, &timer)
        });
        if outcome == CycleOutcome::Disabled {
            timer.busy_wait_us(period_us);
        }
    }
}

/// `run_cycle` takes `&mut DmxEngine` directly; this thin wrapper exists
/// only so the critical-section closure above reads as one line instead
/// of re-deriving the generic parameters inline each call.
fn run_loop_run_cycle(
    engine: &mut DmxEngine,
    uart: &mut BoardUart,
    timer: &BoardTimer,
) -> CycleOutcome {
    dmxgw_rt::run_cycle::<BoardUart, BoardTimer, CriticalSectionGate>(engine, uart, timer)
}

/// Entry point for the command-receive thread. Drains the A→B ring,
/// dispatches against the shared engine, and pushes responses onto B→A.
#[no_mangle]
pub unsafe extern "C" fn command_receive_thread_main() -> ! {
    let mailbox = unsafe { MailboxPort::new(MAILBOX_A2B_BASE) };
    let _ = mailbox.drain_pending_at_init();
    let mut decoder = Decoder::new();

    #[allow(static_mut_refs)]
    let rx_ring = unsafe { &mut A_TO_B_RING };
    #[allow(static_mut_refs)]
    let tx_ring = unsafe { &mut B_TO_A_RING };

    loop {
        if run_loop::poll_mailbox(&mailbox).is_none() {
            continue;
        }

        let reset_requested = critical_section::with(|cs| {
            let mut engine = ENGINE.borrow(cs).borrow_mut();
            let mut mutate = |f: &mut dyn FnMut(&mut DmxEngine)| f(&mut *engine);
            run_loop::large_core_command_batch::<RING_CAP, RING_CAP>(
                &mut mutate,
                &mut decoder,
                rx_ring,
                tx_ring,
            )
        });

        if reset_requested {
            system_reset();
        }
    }
}

fn system_reset() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

#[no_mangle]
pub unsafe extern "C" fn _start() -> ! {
    // The board/RTOS support crate spawns `dmx_transmit_thread_main` and
    // `command_receive_thread_main` on the dedicated core's two threads
    // from here; spawning itself is RTOS-specific and out of scope.
    unsafe { dmx_transmit_thread_main() }
}
