//! Allocator-counter tests for the coordinator's hot-mutation paths.
//!
//! `set_channel`/`set_light`/`set_group` round-trip through a real peer
//! (a [`FakePeer`] over a pty, exactly as in the S4/S5 scenarios), so the
//! client's own wire encode/decode is part of what gets counted here, not
//! just `DmxStateCoordinator`'s internals. Rather than pin an exact
//! allocation count — which would bake in the client layer's own buffer
//! sizes — each test asserts the *marginal* count per call stays constant
//! across two back-to-back batches: steady-state mutation must not grow
//! with call volume, which is what the pre-allocation contract actually
//! promises once a peer connection is already open.

use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use dmxgw_tests::{minimal_config, open_pty_pair, FakePeer};

struct CountingAlloc;

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

const BATCH: u8 = 20;

#[test]
fn set_channel_has_constant_marginal_allocation_per_call() {
    let (master, slave_path) = open_pty_pair();
    let peer = FakePeer::spawn(master);
    let config = minimal_config(&slave_path, 1);
    let coordinator = dmxgw_core::DmxStateCoordinator::new(
        config.catalogue(),
        config.dmx_device.clone(),
        config.timeout_ms,
        config.throttle_ms,
    );

    // Warm-up: the first call opens the peer connection and pays for any
    // one-time lazy setup (termios configuration, decoder state).
    coordinator.set_channel(1, 0).unwrap();

    ALLOCATIONS.store(0, Ordering::Relaxed);
    for v in 0..BATCH {
        coordinator.set_channel(1, v).unwrap();
    }
    let first_batch = ALLOCATIONS.swap(0, Ordering::Relaxed);

    for v in 0..BATCH {
        coordinator.set_channel(1, v).unwrap();
    }
    let second_batch = ALLOCATIONS.load(Ordering::Relaxed);

    assert_eq!(first_batch, second_batch, "set_channel's steady-state allocation must not grow with call volume");
    peer.stop();
}

#[test]
fn set_light_has_constant_marginal_allocation_per_call() {
    let (master, slave_path) = open_pty_pair();
    let peer = FakePeer::spawn(master);
    let config = minimal_config(&slave_path, 1);
    let coordinator = dmxgw_core::DmxStateCoordinator::new(
        config.catalogue(),
        config.dmx_device.clone(),
        config.timeout_ms,
        config.throttle_ms,
    );
    let mut values = HashMap::new();
    values.insert("intensity".to_string(), 0u8);
    coordinator.set_light("stage", "par1", &values).unwrap();

    ALLOCATIONS.store(0, Ordering::Relaxed);
    for v in 0..BATCH {
        values.insert("intensity".to_string(), v);
        coordinator.set_light("stage", "par1", &values).unwrap();
    }
    let first_batch = ALLOCATIONS.swap(0, Ordering::Relaxed);

    for v in 0..BATCH {
        values.insert("intensity".to_string(), v);
        coordinator.set_light("stage", "par1", &values).unwrap();
    }
    let second_batch = ALLOCATIONS.load(Ordering::Relaxed);

    assert_eq!(first_batch, second_batch, "set_light's steady-state allocation must not grow with call volume");
    peer.stop();
}

#[test]
fn set_group_has_constant_marginal_allocation_per_call() {
    let (master, slave_path) = open_pty_pair();
    let peer = FakePeer::spawn(master);
    let config = minimal_config(&slave_path, 1);
    let coordinator = dmxgw_core::DmxStateCoordinator::new(
        config.catalogue(),
        config.dmx_device.clone(),
        config.timeout_ms,
        config.throttle_ms,
    );
    let mut values = HashMap::new();
    values.insert("intensity".to_string(), 0u8);
    coordinator.set_group("stage", &values).unwrap();

    ALLOCATIONS.store(0, Ordering::Relaxed);
    for v in 0..BATCH {
        values.insert("intensity".to_string(), v);
        coordinator.set_group("stage", &values).unwrap();
    }
    let first_batch = ALLOCATIONS.swap(0, Ordering::Relaxed);

    for v in 0..BATCH {
        values.insert("intensity".to_string(), v);
        coordinator.set_group("stage", &values).unwrap();
    }
    let second_batch = ALLOCATIONS.load(Ordering::Relaxed);

    assert_eq!(first_batch, second_batch, "set_group's steady-state allocation must not grow with call volume");
    peer.stop();
}
