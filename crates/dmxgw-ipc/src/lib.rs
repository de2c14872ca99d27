//! IPC Transport (C3): shared-memory vring ring buffers plus mailbox
//! doorbells, carrying raw bytes between the real-time core and its
//! command dispatcher on one side, and the Linux client on the other.
//!
//! Two [`ring::Ring`]s (A→B and B→A) and one [`mailbox::MailboxPort`] per
//! direction make up a link. Messages are delivered in order on each ring;
//! zero-copy is permitted (callers may read/write the ring in place) but
//! not required by this crate.
#![cfg_attr(not(test), no_std)]

pub mod mailbox;
pub mod ring;

pub use mailbox::{MailboxMessage, MailboxPort, MailboxRegisters, MAILBOX_MAGIC};
pub use ring::{Backpressure, Ring};
