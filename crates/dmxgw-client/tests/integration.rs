//! Black-box tests against a real pty pair, with a small thread standing
//! in for the real-time peer — no actual hardware or kernel tty driver
//! beyond the pty itself.

use std::io::{Read, Write};
use std::os::unix::io::FromRawFd;
use std::thread;
use std::time::Duration;

use dmxgw_client::{Client, ClientError};
use dmxgw_wire::{Decoder, Status, RESP_MAGIC};

/// Opens a pty pair and hands back the master (for the fake peer) and the
/// slave path (for [`Client::open`]).
fn open_pty_pair() -> (std::fs::File, String) {
    let mut master: libc::c_int = 0;
    let mut slave: libc::c_int = 0;
    let ret = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
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

/// Reads one framed command off `master` and writes back a canned OK
/// response, mirroring C4's "exactly one response per request" contract.
fn serve_one(master: &mut std::fs::File, status: Status, payload: &[u8]) {
    let mut decoder = Decoder::new();
    let mut byte = [0u8; 1];
    loop {
        master.read_exact(&mut byte).unwrap();
        if decoder.feed(byte[0]).is_some() {
            break;
        }
    }
    let mut buf = [0u8; 32];
    let n = dmxgw_wire::encode_into(&mut buf, RESP_MAGIC, status as u8, payload).unwrap();
    master.write_all(&buf[..n]).unwrap();
}

#[test]
fn enable_round_trips_through_a_real_pty() {
    let (mut master, slave_path) = open_pty_pair();
    let server = thread::spawn(move || {
        serve_one(&mut master, Status::Ok, &[]);
        master
    });

    let mut client = Client::open(&slave_path).unwrap().with_timeout(Duration::from_secs(2));
    client.enable().unwrap();
    server.join().unwrap();
}

#[test]
fn status_call_decodes_engine_status_payload() {
    let (mut master, slave_path) = open_pty_pair();
    let mut body = [0u8; 9];
    body[0] = 1; // enabled
    body[1..5].copy_from_slice(&42u32.to_le_bytes());
    body[5..9].copy_from_slice(&4400u32.to_le_bytes());

    let server = thread::spawn(move || {
        serve_one(&mut master, Status::Ok, &body);
    });

    let mut client = Client::open(&slave_path).unwrap().with_timeout(Duration::from_secs(2));
    let status = client.status().unwrap();
    assert!(status.enabled);
    assert_eq!(status.frame_count, 42);
    assert_eq!(status.fps_x100, 4400);
    server.join().unwrap();
}

#[test]
fn remote_error_status_surfaces_as_client_error() {
    let (mut master, slave_path) = open_pty_pair();
    let server = thread::spawn(move || {
        serve_one(&mut master, Status::Error, &[]);
    });

    let mut client = Client::open(&slave_path).unwrap().with_timeout(Duration::from_secs(2));
    let err = client.set_channels(510, &[1, 2, 3, 4, 5]).unwrap_err();
    assert!(matches!(err, ClientError::Remote(Status::Error)));
    server.join().unwrap();
}

#[test]
fn no_response_times_out() {
    let (master, slave_path) = open_pty_pair();
    // Keep the master open (so writes don't SIGPIPE) but never reply.
    let _keep_alive = master;

    let mut client = Client::open(&slave_path).unwrap().with_timeout(Duration::from_millis(200));
    let err = client.status().unwrap_err();
    assert!(matches!(err, ClientError::Timeout));
}
