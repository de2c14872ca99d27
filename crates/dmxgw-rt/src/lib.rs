//! Real-time DMX512 frame engine and command dispatcher — C2 and C4 of the
//! gateway. `no_std`, no allocation, hardware access kept behind the
//! [`hw`] traits so [`engine`]/[`frame`]/[`dispatcher`] are unit-testable
//! on the host.
//!
//! Two binaries (`dmxgw-rt-tiny`, `dmxgw-rt-large`, behind the `tiny-core`
//! and `large-core` features respectively) wire this library to real
//! hardware and to [`dmxgw_ipc`]; see the module docs below for the concurrency model
//! each assumes.
// `no_std` for real targets; `cargo test` runs on the host and needs std
// linked for the test harness itself (the tests only ever touch
// `core`/`heapless` types).
#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod dispatcher;
pub mod engine;
pub mod frame;
pub mod hw;
pub mod run_loop;

pub use dispatcher::{dispatch, PostAction, Response};
pub use engine::{DmxEngine, EngineStatus, RangeError, TimingParams};
pub use frame::{dmx_poll, run_cycle, CycleOutcome, TinyTx};
pub use hw::{HwTimer, InterruptGate, Uart};
pub use run_loop::{large_core_command_batch, poll_mailbox, tiny_core_step};
