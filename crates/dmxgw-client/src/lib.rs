//! Client Library (C5): opens the shared tty endpoint to the real-time
//! peer, configures raw mode, and performs one request/response exchange
//! per call with a wall-clock timeout — the only way anything on the
//! Linux side talks to the DMX engine.
//!
//! One function per command the engine understands. Concurrent calls on the same
//! [`Client`] are serialized by `&mut self`; if two processes want the
//! same endpoint, each pays the full packet round-trip.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use dmxgw_wire::{CommandId, Decoder, ProtocolError, Status, CMD_MAGIC};

const DEFAULT_DEVICE: &str = "/dev/ttyRPMSG0";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything that can go wrong making one call through the client.
#[derive(Debug)]
pub enum ClientError {
    /// No response arrived within the configured wall-clock bound.
    Timeout,
    /// The peer reported backpressure (its IPC ring stayed full).
    Backpressure,
    /// Opening or configuring the tty endpoint failed.
    TransportFault(io::Error),
    /// The remote dispatcher returned a non-OK status.
    Remote(Status),
    /// The response frame itself failed to decode.
    Protocol(ProtocolError),
    /// The response decoded but its status byte or payload didn't match
    /// what the caller asked for (unrecognized status, short payload).
    MalformedResponse,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for a response"),
            Self::Backpressure => write!(f, "peer reported backpressure"),
            Self::TransportFault(e) => write!(f, "transport fault: {e}"),
            Self::Remote(s) => write!(f, "remote error: {s}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::MalformedResponse => write!(f, "response payload did not match the expected shape"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TransportFault(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        Self::TransportFault(e)
    }
}

/// `{enabled, frame_count, fps_x100}`, decoded from a `GET_STATUS` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub enabled: bool,
    pub frame_count: u32,
    pub fps_x100: u32,
}

/// `{refresh_hz, break_us, mab_us}`, decoded from a `GET_TIMING` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParams {
    pub refresh_hz: u16,
    pub break_us: u16,
    pub mab_us: u16,
}

/// An open handle to the real-time peer's tty endpoint.
pub struct Client {
    file: File,
    timeout: Duration,
}

impl Client {
    /// Opens `device` and puts it into raw mode (no canonical processing,
    /// no echo, no signal characters; VMIN=1, VTIME=0 so reads block on at
    /// least one byte rather than racing a fixed inter-byte timer).
    pub fn open(device: &str) -> Result<Self, ClientError> {
        let file = OpenOptions::new().read(true).write(true).open(device)?;
        configure_raw_mode(file.as_raw_fd())?;
        Ok(Self { file, timeout: DEFAULT_TIMEOUT })
    }

    pub fn open_default() -> Result<Self, ClientError> {
        Self::open(DEFAULT_DEVICE)
    }

    /// Overrides the default 1 s per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn enable(&mut self) -> Result<(), ClientError> {
        self.call_ok(CommandId::Enable, &[])
    }

    pub fn disable(&mut self) -> Result<(), ClientError> {
        self.call_ok(CommandId::Disable, &[])
    }

    pub fn blackout(&mut self) -> Result<(), ClientError> {
        self.call_ok(CommandId::Blackout, &[])
    }

    /// Commits `values` into slots `[start_slot, start_slot + values.len())`.
    pub fn set_channels(&mut self, start_slot: u16, values: &[u8]) -> Result<(), ClientError> {
        let mut payload = Vec::with_capacity(2 + values.len());
        payload.extend_from_slice(&start_slot.to_le_bytes());
        payload.extend_from_slice(values);
        self.call_ok(CommandId::SetChannels, &payload)
    }

    pub fn status(&mut self) -> Result<EngineStatus, ClientError> {
        let body = self.call(CommandId::GetStatus, &[])?;
        if body.len() < 9 {
            return Err(ClientError::MalformedResponse);
        }
        Ok(EngineStatus {
            enabled: body[0] != 0,
            frame_count: u32::from_le_bytes(body[1..5].try_into().unwrap()),
            fps_x100: u32::from_le_bytes(body[5..9].try_into().unwrap()),
        })
    }

    /// `hz`/`break_us`/`mab_us` of 0 leave that field unchanged.
    pub fn set_timing(&mut self, hz: u16, break_us: u16, mab_us: u16) -> Result<(), ClientError> {
        let mut payload = [0u8; 6];
        payload[0..2].copy_from_slice(&hz.to_le_bytes());
        payload[2..4].copy_from_slice(&break_us.to_le_bytes());
        payload[4..6].copy_from_slice(&mab_us.to_le_bytes());
        self.call_ok(CommandId::SetTiming, &payload)
    }

    pub fn get_timing(&mut self) -> Result<TimingParams, ClientError> {
        let body = self.call(CommandId::GetTiming, &[])?;
        if body.len() < 6 {
            return Err(ClientError::MalformedResponse);
        }
        Ok(TimingParams {
            refresh_hz: u16::from_le_bytes([body[0], body[1]]),
            break_us: u16::from_le_bytes([body[2], body[3]]),
            mab_us: u16::from_le_bytes([body[4], body[5]]),
        })
    }

    fn call_ok(&mut self, cmd: CommandId, payload: &[u8]) -> Result<(), ClientError> {
        self.call(cmd, payload).map(|_| ())
    }

    /// encode -> write-all -> read-exact(header) -> read-exact(payload) ->
    /// read-exact(checksum), each read bounded by `self.timeout` via
    /// `select()`. Returns the response payload on an OK status.
    fn call(&mut self, cmd: CommandId, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut frame = vec![0u8; 5 + payload.len()];
        let n = dmxgw_wire::encode_into(&mut frame, CMD_MAGIC, cmd as u8, payload)
            .expect("client-constructed payloads always fit within MAX_PAYLOAD");
        self.write_all_or_backpressure(&frame[..n])?;

        let deadline = Instant::now() + self.timeout;
        let mut decoder = Decoder::new();
        loop {
            self.wait_readable(deadline)?;
            let mut byte = [0u8; 1];
            let read = self.file.read(&mut byte)?;
            if read == 0 {
                continue;
            }
            if let Some(result) = decoder.feed(byte[0]) {
                let frame = result.map_err(ClientError::Protocol)?;
                return status_to_result(frame.op, frame.payload());
            }
        }
    }

    /// Writes carry `Backpressure` instead of a generic transport fault
    /// when the kernel reports the other end's buffer is full (the tty's
    /// equivalent of the real-time side's ring being full at send time).
    fn write_all_or_backpressure(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        match self.file.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(ClientError::Backpressure),
            Err(e) => Err(ClientError::TransportFault(e)),
        }
    }

    fn wait_readable(&self, deadline: Instant) -> Result<(), ClientError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ClientError::Timeout);
        }
        let fd = self.file.as_raw_fd();
        let mut read_fds: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read_fds);
            libc::FD_SET(fd, &mut read_fds);
        }
        let mut tv = libc::timeval {
            tv_sec: remaining.as_secs() as libc::time_t,
            tv_usec: remaining.subsec_micros() as libc::suseconds_t,
        };
        let ready = unsafe {
            libc::select(fd + 1, &mut read_fds, std::ptr::null_mut(), std::ptr::null_mut(), &mut tv)
        };
        match ready {
            n if n > 0 => Ok(()),
            0 => Err(ClientError::Timeout),
            _ => Err(ClientError::TransportFault(io::Error::last_os_error())),
        }
    }
}

fn status_to_result(op: u8, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
    match Status::from_u8(op) {
        Some(Status::Ok) => Ok(payload.to_vec()),
        Some(other) => Err(ClientError::Remote(other)),
        None => Err(ClientError::MalformedResponse),
    }
}

/// `cfmakeraw`-equivalent: disables canonical mode, echo and signal
/// generation, sets VMIN=1/VTIME=0 so a read blocks for at least one byte
/// instead of racing a fixed inter-byte timer.
fn configure_raw_mode(fd: std::os::unix::io::RawFd) -> Result<(), ClientError> {
    let mut term: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut term) } != 0 {
        return Err(ClientError::TransportFault(io::Error::last_os_error()));
    }
    unsafe { libc::cfmakeraw(&mut term) };
    term.c_cc[libc::VMIN] = 1;
    term.c_cc[libc::VTIME] = 0;
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &term) } != 0 {
        return Err(ClientError::TransportFault(io::Error::last_os_error()));
    }
    Ok(())
}
