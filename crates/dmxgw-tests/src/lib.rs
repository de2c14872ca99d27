//! Shared harness for the scenario tests in `tests/scenarios.rs`: a pty
//! pair plus a fake peer thread that runs the real
//! [`dmxgw_rt::dispatcher::dispatch`] and [`dmxgw_rt::engine::DmxEngine`]
//! against bytes arriving over the pty, exactly as the real-time side
//! does over its tty endpoint — only the transport differs.

use std::io::{Read, Write};
use std::os::unix::io::FromRawFd;
use std::sync::mpsc;
use std::thread;

use dmxgw_rt::{dispatch, DmxEngine, EngineStatus};
use dmxgw_wire::Decoder;

pub fn open_pty_pair() -> (std::fs::File, String) {
    let mut master: libc::c_int = 0;
    let mut slave: libc::c_int = 0;
    let ret = unsafe {
        libc::openpty(&mut master, &mut slave, std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null_mut())
    };
    assert_eq!(ret, 0, "openpty failed: {}", std::io::Error::last_os_error());

    let mut name_buf = [0u8; 64];
    let name_ret = unsafe { libc::ptsname_r(master, name_buf.as_mut_ptr() as *mut i8, name_buf.len()) };
    let slave_path = if name_ret == 0 {
        let end = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
        String::from_utf8_lossy(&name_buf[..end]).into_owned()
    } else {
        format!("/proc/self/fd/{slave}")
    };

    unsafe { libc::close(slave) };
    let master_file = unsafe { std::fs::File::from_raw_fd(master) };
    (master_file, slave_path)
}

/// Commands the test thread can push into the fake peer's real
/// [`DmxEngine`] between frames, to observe state the wire protocol has
/// no command for (the full universe, the error counter).
pub enum Inspect {
    Snapshot(mpsc::Sender<[u8; dmxgw_rt::engine::UNIVERSE_LEN]>),
    Status(mpsc::Sender<EngineStatus>),
    Stop,
}

/// Runs a real command dispatcher against one end of a pty, forwarding
/// every decoded command to a fresh-started [`DmxEngine`] and writing back
/// whatever [`dispatch`] produces — a faithful stand-in for the real-time
/// peer, minus the UART and timing hardware.
pub struct FakePeer {
    pub inspect: mpsc::Sender<Inspect>,
    handle: thread::JoinHandle<()>,
}

impl FakePeer {
    pub fn spawn(mut master: std::fs::File) -> Self {
        let (tx, rx) = mpsc::channel::<Inspect>();
        let handle = thread::spawn(move || {
            let mut engine = DmxEngine::new();
            let mut decoder = Decoder::new();
            master.set_nonblocking(true).unwrap();
            let mut byte = [0u8; 1];
            loop {
                match rx.try_recv() {
                    Ok(Inspect::Snapshot(reply)) => {
                        let _ = reply.send(engine.snapshot());
                        continue;
                    }
                    Ok(Inspect::Status(reply)) => {
                        let _ = reply.send(engine.status());
                        continue;
                    }
                    Ok(Inspect::Stop) => return,
                    Err(mpsc::TryRecvError::Empty) => {}
                    Err(mpsc::TryRecvError::Disconnected) => return,
                }

                match master.read(&mut byte) {
                    Ok(0) => return,
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_micros(200));
                        continue;
                    }
                    Err(_) => return,
                }

                if let Some(result) = decoder.feed(byte[0]) {
                    let resp = match result {
                        Ok(frame) => {
                            let (resp, _action) = dispatch(&mut engine, frame.op, frame.payload());
                            resp
                        }
                        Err(e) => dmxgw_rt::dispatcher::protocol_error_response(e),
                    };
                    if master.write_all(resp.bytes()).is_err() {
                        return;
                    }
                }
            }
        });
        Self { inspect: tx, handle }
    }

    pub fn snapshot(&self) -> [u8; dmxgw_rt::engine::UNIVERSE_LEN] {
        let (tx, rx) = mpsc::channel();
        self.inspect.send(Inspect::Snapshot(tx)).unwrap();
        rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap()
    }

    pub fn status(&self) -> EngineStatus {
        let (tx, rx) = mpsc::channel();
        self.inspect.send(Inspect::Status(tx)).unwrap();
        rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap()
    }

    pub fn stop(self) {
        let _ = self.inspect.send(Inspect::Stop);
        let _ = self.handle.join();
    }
}

pub fn minimal_config(device: &str, throttle_ms: u64) -> dmxgw_core::Config {
    let yaml = format!(
        "dmx_device: {device}\nthrottle_ms: {throttle_ms}\ntimeout_ms: 1000\nlights:\n  stage:\n    par1:\n      - slot: 1\n        color: red\n        name: intensity\n"
    );
    dmxgw_core::Config::parse(&yaml).unwrap()
}
