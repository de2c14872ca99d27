//! Wire codec for the DMX gateway command/response protocol (C1).
//!
//! Stateless framing over a byte stream:
//!
//! ```text
//! Command:  AA | op     | len_lo | len_hi | payload[len] | xor
//! Response: BB | status | len_lo | len_hi | payload[len] | xor
//! ```
//!
//! `len` is little-endian. The checksum is the XOR of every byte preceding
//! it. [`Decoder`] drives itself one byte at a time so the same state
//! machine can sit behind an interrupt-fed ring buffer on the real-time
//! side or behind a buffered `read()` on the Linux side — no allocation,
//! `no_std`, no dependencies.
#![cfg_attr(not(test), no_std)]

/// Command-frame magic byte.
pub const CMD_MAGIC: u8 = 0xAA;
/// Response-frame magic byte.
pub const RESP_MAGIC: u8 = 0xBB;

/// Maximum payload length a frame may carry. `SET_CHANNELS` with all 512
/// slots plus a 2-byte start offset comfortably fits; this also bounds the
/// fixed-size buffer the decoder carries with no allocation.
pub const MAX_PAYLOAD: usize = 1024;

/// Command opcodes (C4 dispatch table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    SetChannels = 0x01,
    GetStatus = 0x02,
    Enable = 0x03,
    Disable = 0x04,
    Blackout = 0x05,
    SetTiming = 0x06,
    GetTiming = 0x07,
    /// Tiny-core variant only: 4-byte magic-guarded reset.
    SystemReset = 0x7F,
}

impl CommandId {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::SetChannels),
            0x02 => Some(Self::GetStatus),
            0x03 => Some(Self::Enable),
            0x04 => Some(Self::Disable),
            0x05 => Some(Self::Blackout),
            0x06 => Some(Self::SetTiming),
            0x07 => Some(Self::GetTiming),
            0x7F => Some(Self::SystemReset),
            _ => None,
        }
    }
}

/// Response status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    BadMagic = 0x01,
    BadChecksum = 0x02,
    OverLength = 0x03,
    InvalidLength = 0x04,
    InvalidCommand = 0x05,
    Error = 0x06,
}

impl Status {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::Ok),
            0x01 => Some(Self::BadMagic),
            0x02 => Some(Self::BadChecksum),
            0x03 => Some(Self::OverLength),
            0x04 => Some(Self::InvalidLength),
            0x05 => Some(Self::InvalidCommand),
            0x06 => Some(Self::Error),
            _ => None,
        }
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::BadMagic => write!(f, "bad_magic"),
            Self::BadChecksum => write!(f, "bad_checksum"),
            Self::OverLength => write!(f, "over_length"),
            Self::InvalidLength => write!(f, "invalid_length"),
            Self::InvalidCommand => write!(f, "invalid_command"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Errors the decoder can report. Never fatal: the decoder resets to `Idle`
/// and keeps consuming bytes after any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    BadMagic,
    BadChecksum,
    OverLength,
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadMagic => write!(f, "bad magic byte"),
            Self::BadChecksum => write!(f, "checksum mismatch"),
            Self::OverLength => write!(f, "payload length exceeds maximum"),
        }
    }
}

impl From<ProtocolError> for Status {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::BadMagic => Status::BadMagic,
            ProtocolError::BadChecksum => Status::BadChecksum,
            ProtocolError::OverLength => Status::OverLength,
        }
    }
}

/// A fully decoded frame: either a command (`magic == CMD_MAGIC`, `op` is
/// the [`CommandId`] byte) or a response (`magic == RESP_MAGIC`, `op` is
/// the [`Status`] byte).
#[derive(Debug, Clone)]
pub struct Frame {
    pub magic: u8,
    pub op: u8,
    pub payload: [u8; MAX_PAYLOAD],
    pub len: usize,
}

impl Frame {
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    pub fn is_command(&self) -> bool {
        self.magic == CMD_MAGIC
    }

    pub fn is_response(&self) -> bool {
        self.magic == RESP_MAGIC
    }
}

/// Writes a frame into `out`, returning the number of bytes written.
///
/// Fails only if `out` is too small or `payload.len() > MAX_PAYLOAD`.
pub fn encode_into(out: &mut [u8], magic: u8, op: u8, payload: &[u8]) -> Option<usize> {
    if payload.len() > MAX_PAYLOAD {
        return None;
    }
    let total = 4 + payload.len() + 1;
    if out.len() < total {
        return None;
    }
    out[0] = magic;
    out[1] = op;
    let len = payload.len() as u16;
    out[2] = (len & 0xFF) as u8;
    out[3] = (len >> 8) as u8;
    out[4..4 + payload.len()].copy_from_slice(payload);
    let xor = checksum(&out[..4 + payload.len()]);
    out[4 + payload.len()] = xor;
    Some(total)
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Byte-by-byte restartable decoder. Feed bytes one at a time (from an
/// interrupt-fed ring buffer, a `read()` loop, anything); `feed` returns
/// `Some` exactly when a frame boundary is reached, successfully or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Idle,
    ExpectOp,
    ExpectLenLo,
    ExpectLenHi,
    ExpectData,
    ExpectChecksum,
}

pub struct Decoder {
    state: DecodeState,
    magic: u8,
    op: u8,
    len: u16,
    buf: [u8; MAX_PAYLOAD],
    filled: usize,
    running_xor: u8,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            magic: 0,
            op: 0,
            len: 0,
            buf: [0u8; MAX_PAYLOAD],
            filled: 0,
            running_xor: 0,
        }
    }

    fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.filled = 0;
        self.running_xor = 0;
    }

    /// Feed one byte. Returns `None` while still mid-frame, `Some(Ok(frame))`
    /// on a complete, checksum-valid frame, or `Some(Err(e))` on a framing
    /// error — in both `Some` cases the decoder has already reset to `Idle`
    /// and is ready for the next frame.
    pub fn feed(&mut self, byte: u8) -> Option<Result<Frame, ProtocolError>> {
        match self.state {
            DecodeState::Idle => {
                if byte == CMD_MAGIC || byte == RESP_MAGIC {
                    self.magic = byte;
                    self.running_xor = byte;
                    self.state = DecodeState::ExpectOp;
                }
                // Anything else: stay in Idle, resync on next byte.
                None
            }
            DecodeState::ExpectOp => {
                self.op = byte;
                self.running_xor ^= byte;
                self.state = DecodeState::ExpectLenLo;
                None
            }
            DecodeState::ExpectLenLo => {
                self.len = byte as u16;
                self.running_xor ^= byte;
                self.state = DecodeState::ExpectLenHi;
                None
            }
            DecodeState::ExpectLenHi => {
                self.len |= (byte as u16) << 8;
                self.running_xor ^= byte;
                if self.len as usize > MAX_PAYLOAD {
                    self.reset();
                    return Some(Err(ProtocolError::OverLength));
                }
                self.filled = 0;
                self.state = if self.len == 0 {
                    DecodeState::ExpectChecksum
                } else {
                    DecodeState::ExpectData
                };
                None
            }
            DecodeState::ExpectData => {
                self.buf[self.filled] = byte;
                self.running_xor ^= byte;
                self.filled += 1;
                if self.filled == self.len as usize {
                    self.state = DecodeState::ExpectChecksum;
                }
                None
            }
            DecodeState::ExpectChecksum => {
                let ok = byte == self.running_xor;
                let frame = Frame {
                    magic: self.magic,
                    op: self.op,
                    payload: self.buf,
                    len: self.filled,
                };
                self.reset();
                if ok {
                    Some(Ok(frame))
                } else {
                    Some(Err(ProtocolError::BadChecksum))
                }
            }
        }
    }

    /// Feed a whole slice, returning the first completed frame/error (if
    /// any) and the number of bytes consumed up to and including it.
    /// Leftover bytes in `bytes` past the returned count were not yet fed.
    pub fn feed_slice(&mut self, bytes: &[u8]) -> Option<(usize, Result<Frame, ProtocolError>)> {
        for (i, &b) in bytes.iter().enumerate() {
            if let Some(result) = self.feed(b) {
                return Some((i + 1, result));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(magic: u8, op: u8, payload: &[u8]) -> Frame {
        let mut buf = [0u8; MAX_PAYLOAD + 8];
        let n = encode_into(&mut buf, magic, op, payload).unwrap();
        let mut dec = Decoder::new();
        let (consumed, result) = dec.feed_slice(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        result.unwrap()
    }

    #[test]
    fn encode_decode_roundtrip_empty_payload() {
        let frame = roundtrip(CMD_MAGIC, CommandId::Enable as u8, &[]);
        assert_eq!(frame.magic, CMD_MAGIC);
        assert_eq!(frame.op, CommandId::Enable as u8);
        assert_eq!(frame.len, 0);
    }

    #[test]
    fn encode_decode_roundtrip_with_payload() {
        let payload = [0x00, 0x00, 0xFF];
        let frame = roundtrip(CMD_MAGIC, CommandId::SetChannels as u8, &payload);
        assert_eq!(frame.payload(), &payload);
    }

    #[test]
    fn response_roundtrip() {
        let payload = [1u8, 0, 0, 0, 0x0C, 0x0B, 0x00, 0x00];
        let frame = roundtrip(RESP_MAGIC, Status::Ok as u8, &payload);
        assert!(frame.is_response());
        assert_eq!(frame.payload(), &payload);
    }

    #[test]
    fn bad_checksum_resets_and_resyncs() {
        let mut buf = [0u8; 16];
        let n = encode_into(&mut buf, CMD_MAGIC, CommandId::Enable as u8, &[]).unwrap();
        buf[n - 1] ^= 0xFF; // corrupt checksum
        let mut dec = Decoder::new();
        let (consumed, result) = dec.feed_slice(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(result.unwrap_err(), ProtocolError::BadChecksum);

        // decoder must be back at Idle and able to decode a fresh frame
        let mut buf2 = [0u8; 16];
        let n2 = encode_into(&mut buf2, CMD_MAGIC, CommandId::Disable as u8, &[]).unwrap();
        let (_, result2) = dec.feed_slice(&buf2[..n2]).unwrap();
        assert_eq!(result2.unwrap().op, CommandId::Disable as u8);
    }

    #[test]
    fn bad_magic_byte_is_skipped_until_resync() {
        let mut dec = Decoder::new();
        // junk byte, then a valid frame
        assert!(dec.feed(0x00).is_none());
        let mut buf = [0u8; 16];
        let n = encode_into(&mut buf, CMD_MAGIC, CommandId::GetStatus as u8, &[]).unwrap();
        let (_, result) = dec.feed_slice(&buf[..n]).unwrap();
        assert_eq!(result.unwrap().op, CommandId::GetStatus as u8);
    }

    #[test]
    fn over_length_is_rejected() {
        let mut dec = Decoder::new();
        dec.feed(CMD_MAGIC);
        dec.feed(CommandId::SetChannels as u8);
        dec.feed(0xFF); // len_lo
        let result = dec.feed(0xFF); // len_hi -> len = 0xFFFF > MAX_PAYLOAD
        assert_eq!(result.unwrap().unwrap_err(), ProtocolError::OverLength);
    }

    #[test]
    fn decode_any_byte_sequence_never_panics() {
        let mut dec = Decoder::new();
        for seed in 0u32..2000 {
            let b = ((seed.wrapping_mul(2654435761)) >> 24) as u8;
            let _ = dec.feed(b);
        }
    }
}
