//! Black-box tests of the coordinator against a real pty pair, with a
//! small thread standing in for the real-time peer.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::io::FromRawFd;
use std::thread;
use std::time::Duration;

use dmxgw_core::{Config, DmxStateCoordinator};
use dmxgw_wire::{Decoder, Status, RESP_MAGIC};

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

/// Serves `n` framed commands off `master`, replying OK with an empty
/// payload to each.
fn serve_n(master: &mut std::fs::File, n: usize) {
    let mut decoder = Decoder::new();
    for _ in 0..n {
        let mut byte = [0u8; 1];
        loop {
            master.read_exact(&mut byte).unwrap();
            if decoder.feed(byte[0]).is_some() {
                break;
            }
        }
        let mut buf = [0u8; 32];
        let written = dmxgw_wire::encode_into(&mut buf, RESP_MAGIC, Status::Ok as u8, &[]).unwrap();
        master.write_all(&buf[..written]).unwrap();
    }
}

fn minimal_config(device: &str) -> Config {
    let yaml = format!(
        "dmx_device: {device}\nthrottle_ms: 1\ntimeout_ms: 1000\nlights:\n  stage:\n    par1:\n      - slot: 1\n        color: red\n        name: intensity\n"
    );
    Config::parse(&yaml).unwrap()
}

#[test]
fn enable_updates_mirror_and_broadcasts_to_subscriber() {
    let (mut master, slave_path) = open_pty_pair();
    let server = thread::spawn(move || {
        serve_n(&mut master, 1);
        master
    });

    let config = minimal_config(&slave_path);
    let coordinator =
        DmxStateCoordinator::new(config.catalogue(), config.dmx_device.clone(), config.timeout_ms, config.throttle_ms);
    let (_id, rx) = coordinator.subscribe();

    coordinator.enable().unwrap();
    coordinator.with_snapshot(|s| assert!(s.enabled));

    let delta = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(delta.contains("\"enabled\":true"));

    server.join().unwrap();
}

#[test]
fn set_light_by_alias_updates_only_the_named_channel() {
    let (mut master, slave_path) = open_pty_pair();
    let server = thread::spawn(move || {
        serve_n(&mut master, 1);
        master
    });

    let config = minimal_config(&slave_path);
    let coordinator =
        DmxStateCoordinator::new(config.catalogue(), config.dmx_device.clone(), config.timeout_ms, config.throttle_ms);

    let mut values = HashMap::new();
    values.insert("intensity".to_string(), 200u8);
    coordinator.set_light("stage", "par1", &values).unwrap();

    coordinator.with_snapshot(|s| assert_eq!(s.channels[0], 200));

    server.join().unwrap();
}

#[test]
fn set_group_with_unknown_alias_is_a_no_op_and_never_touches_the_peer() {
    let config = minimal_config("/dev/null");
    let coordinator = DmxStateCoordinator::new(config.catalogue(), "/dev/null".to_string(), 1000, 1);

    let mut values = HashMap::new();
    values.insert("no-such-alias".to_string(), 10u8);
    assert!(coordinator.set_group("stage", &values).is_ok());
    coordinator.with_snapshot(|s| assert_eq!(s.channels[0], 0));
}

#[test]
fn blackout_zeroes_mirror_after_peer_acknowledges() {
    let (mut master, slave_path) = open_pty_pair();
    let server = thread::spawn(move || {
        serve_n(&mut master, 2);
        master
    });

    let config = minimal_config(&slave_path);
    let coordinator =
        DmxStateCoordinator::new(config.catalogue(), config.dmx_device.clone(), config.timeout_ms, config.throttle_ms);

    let mut values = HashMap::new();
    values.insert("intensity".to_string(), 77u8);
    coordinator.set_light("stage", "par1", &values).unwrap();
    coordinator.blackout().unwrap();

    coordinator.with_snapshot(|s| assert_eq!(s.channels[0], 0));

    server.join().unwrap();
}
