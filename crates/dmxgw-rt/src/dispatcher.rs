//! Command Dispatcher (C4): decodes framed commands arriving over the IPC
//! ring, validates and invokes the engine, and always produces exactly one
//! framed response — unless the link itself has failed, which
//! is the caller's concern, not this module's.

use dmxgw_wire::{CommandId, ProtocolError, Status, MAX_PAYLOAD, RESP_MAGIC};

use crate::engine::DmxEngine;

/// 4-byte magic guarding SYSTEM_RESET (tiny-core only), so a corrupted or
/// misrouted frame can never trigger a reset by accident.
pub const SYSTEM_RESET_MAGIC: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// Holds a response frame's encoded bytes. Sized for the largest response
/// payload (`GET_STATUS`/`GET_TIMING` are tiny; this is dominated by the
/// framing overhead, not payload size — dispatcher responses never carry
/// the whole universe).
pub struct Response {
    pub buf: [u8; 32],
    pub len: usize,
}

impl Response {
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn encode(status: Status, payload: &[u8]) -> Self {
        let mut buf = [0u8; 32];
        let len = dmxgw_wire::encode_into(&mut buf, RESP_MAGIC, status as u8, payload)
            .expect("dispatcher responses always fit in 32 bytes");
        Self { buf, len }
    }
}

fn le16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

fn le32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Outcome of dispatching one frame, beyond the response bytes: whether the
/// caller should now perform a SoC reset (tiny-core only, and only after
/// the OK response for it has already been sent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    None,
    ResetRequested,
}

/// Dispatches one decoded command frame against `engine`, returning the
/// framed response and any post-response action.
pub fn dispatch(engine: &mut DmxEngine, op: u8, payload: &[u8]) -> (Response, PostAction) {
    let Some(cmd) = CommandId::from_u8(op) else {
        return (Response::encode(Status::InvalidCommand, &[]), PostAction::None);
    };

    match cmd {
        CommandId::SetChannels => {
            if payload.len() < 2 {
                return (Response::encode(Status::InvalidLength, &[]), PostAction::None);
            }
            let start = u16::from_le_bytes([payload[0], payload[1]]);
            let values = &payload[2..];
            match engine.set_channels(start, values) {
                Ok(()) => (Response::encode(Status::Ok, &[]), PostAction::None),
                Err(_) => (Response::encode(Status::Error, &[]), PostAction::None),
            }
        }
        CommandId::GetStatus => {
            let s = engine.status();
            let mut body = [0u8; 9];
            body[0] = s.enabled as u8;
            body[1..5].copy_from_slice(&le32(s.frame_count));
            body[5..9].copy_from_slice(&le32(s.fps_x100));
            (Response::encode(Status::Ok, &body), PostAction::None)
        }
        CommandId::Enable => {
            engine.enable();
            (Response::encode(Status::Ok, &[]), PostAction::None)
        }
        CommandId::Disable => {
            engine.disable();
            (Response::encode(Status::Ok, &[]), PostAction::None)
        }
        CommandId::Blackout => {
            engine.blackout();
            (Response::encode(Status::Ok, &[]), PostAction::None)
        }
        CommandId::SetTiming => {
            if payload.len() != 6 {
                return (Response::encode(Status::InvalidLength, &[]), PostAction::None);
            }
            let hz = u16::from_le_bytes([payload[0], payload[1]]);
            let brk = u16::from_le_bytes([payload[2], payload[3]]);
            let mab = u16::from_le_bytes([payload[4], payload[5]]);
            match engine.set_timing(hz, brk, mab) {
                Ok(()) => (Response::encode(Status::Ok, &[]), PostAction::None),
                Err(_) => (Response::encode(Status::Error, &[]), PostAction::None),
            }
        }
        CommandId::GetTiming => {
            let t = engine.timing();
            let mut body = [0u8; 6];
            body[0..2].copy_from_slice(&le16(t.refresh_hz));
            body[2..4].copy_from_slice(&le16(t.break_us));
            body[4..6].copy_from_slice(&le16(t.mab_us));
            (Response::encode(Status::Ok, &body), PostAction::None)
        }
        CommandId::SystemReset => {
            if payload.len() == 4 && payload == SYSTEM_RESET_MAGIC {
                engine.disable();
                (Response::encode(Status::Ok, &[]), PostAction::ResetRequested)
            } else {
                (Response::encode(Status::InvalidLength, &[]), PostAction::None)
            }
        }
    }
}

/// Builds the protocol-error response for a frame the wire codec itself
/// rejected before it ever reached [`dispatch`] (bad magic/checksum/length).
pub fn protocol_error_response(err: ProtocolError) -> Response {
    Response::encode(err.into(), &[])
}

/// Payloads never exceed this from a well-formed command; kept here so
/// ring-sizing decisions in the binaries have one source of truth.
pub const MAX_COMMAND_PAYLOAD: usize = MAX_PAYLOAD;
