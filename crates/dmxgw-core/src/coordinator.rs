//! DMX State Coordinator (C6): the single authoritative mirror of the
//! universe and per-light state, serializing every mutation through the
//! peer (via [`dmxgw_client`]) and fanning already-serialized deltas out
//! to subscribers. The hardest-to-get-right Linux-side component.
//!
//! Locking discipline: mirror mutations take the write half of `mirror`;
//! reads (including the broadcast serialization step) take the read
//! half. The subscriber list has its own lock, taken only long enough to
//! iterate and `try_send`. The peer call happens OUTSIDE the mirror
//! lock — a slow or wedged peer must never stall a concurrent reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dmxgw_client::{Client, ClientError};

use crate::catalogue::{LightCatalogue, MAX_LIGHT_CHANNELS};

pub type SubscriberId = u64;

/// Bounded per-subscriber queue capacity. A subscriber that never drains
/// starts losing deltas (counted, never blocking the mutator) once this
/// many are outstanding.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::SyncSender<Arc<str>>,
}

struct Mirror {
    enabled: bool,
    channels: [u8; 512],
    /// `[group_idx][light_idx][channel_idx]`, parallel to the catalogue.
    light_values: Vec<Vec<Vec<u8>>>,
}

/// Errors the coordinator's public API can return. Everything here
/// wraps a peer-call failure — mirror mutation itself cannot fail (a
/// no-op on an unknown target is not an error).
#[derive(Debug)]
pub enum CoordinatorError {
    Peer(ClientError),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Peer(e) => write!(f, "peer call failed: {e}"),
        }
    }
}

impl std::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Peer(e) => Some(e),
        }
    }
}

impl From<ClientError> for CoordinatorError {
    fn from(e: ClientError) -> Self {
        Self::Peer(e)
    }
}

/// Opens the peer connection lazily and enforces `throttle_ms` between
/// consecutive calls. A failed call drops the cached connection so the
/// next call reopens it — cheap insurance against a stale fd surviving a
/// peer restart.
struct SubprocessInvoker {
    client: Option<Client>,
    device: String,
    timeout: Duration,
    throttle: Duration,
    last_call: Option<Instant>,
}

impl SubprocessInvoker {
    fn new(device: String, timeout_ms: u64, throttle_ms: u64) -> Self {
        Self {
            client: None,
            device,
            timeout: Duration::from_millis(timeout_ms),
            throttle: Duration::from_millis(throttle_ms),
            last_call: None,
        }
    }

    fn call<T>(&mut self, f: impl FnOnce(&mut Client) -> Result<T, ClientError>) -> Result<T, ClientError> {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.throttle {
                std::thread::sleep(self.throttle - elapsed);
            }
        }
        if self.client.is_none() {
            let client = Client::open(&self.device)?.with_timeout(self.timeout);
            self.client = Some(client);
        }
        let result = f(self.client.as_mut().expect("just opened"));
        self.last_call = Some(Instant::now());
        if result.is_err() {
            self.client = None;
        }
        result
    }
}

/// `{enabled, channels}` as read by the coordinator, with a reference to
/// per-light values for UI consumers that index by name. Borrows the
/// mirror's read lock for its whole lifetime, so callers must not hold
/// one across another coordinator call.
pub struct Snapshot<'a> {
    pub enabled: bool,
    pub channels: &'a [u8; 512],
    pub light_values: &'a [Vec<Vec<u8>>],
}

/// Upper bound on a serialized `StateDelta`'s size: 512 channels at up to
/// 4 bytes each (`"255,"`) plus fixed JSON overhead, rounded up. Reserved
/// once at startup so `broadcast()` never grows the scratch buffer.
const BROADCAST_SCRATCH_CAPACITY: usize = 2304;

pub struct DmxStateCoordinator {
    catalogue: LightCatalogue,
    mirror: RwLock<Mirror>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    broadcast_drops: AtomicU64,
    invoker: Mutex<SubprocessInvoker>,
    /// Reused across every `broadcast()` call so serializing the delta
    /// never grows a fresh buffer in steady state.
    broadcast_scratch: Mutex<Vec<u8>>,
}

impl DmxStateCoordinator {
    pub fn new(catalogue: LightCatalogue, device: String, timeout_ms: u64, throttle_ms: u64) -> Self {
        let light_values = catalogue
            .groups
            .iter()
            .map(|g| g.lights.iter().map(|l| vec![0u8; l.channels.len()]).collect())
            .collect();

        Self {
            mirror: RwLock::new(Mirror { enabled: false, channels: [0u8; 512], light_values }),
            subscribers: RwLock::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            broadcast_drops: AtomicU64::new(0),
            invoker: Mutex::new(SubprocessInvoker::new(device, timeout_ms, throttle_ms)),
            broadcast_scratch: Mutex::new(Vec::with_capacity(BROADCAST_SCRATCH_CAPACITY)),
            catalogue,
        }
    }

    pub fn catalogue(&self) -> &LightCatalogue {
        &self.catalogue
    }

    pub fn enable(&self) -> Result<(), CoordinatorError> {
        self.invoker.lock().unwrap().call(|c| c.enable())?;
        self.mirror.write().unwrap().enabled = true;
        self.broadcast();
        Ok(())
    }

    pub fn disable(&self) -> Result<(), CoordinatorError> {
        self.invoker.lock().unwrap().call(|c| c.disable())?;
        self.mirror.write().unwrap().enabled = false;
        self.broadcast();
        Ok(())
    }

    pub fn blackout(&self) -> Result<(), CoordinatorError> {
        self.invoker.lock().unwrap().call(|c| c.blackout())?;
        {
            let mut mirror = self.mirror.write().unwrap();
            mirror.channels = [0u8; 512];
            for group in &mut mirror.light_values {
                for light in group {
                    light.iter_mut().for_each(|v| *v = 0);
                }
            }
        }
        self.broadcast();
        Ok(())
    }

    /// Out-of-range slots are a no-op, not an error.
    pub fn set_channel(&self, slot: u16, value: u8) -> Result<(), CoordinatorError> {
        if !(1..=512).contains(&slot) {
            return Ok(());
        }
        self.invoker.lock().unwrap().call(|c| c.set_channels(slot - 1, &[value]))?;
        self.mirror.write().unwrap().channels[(slot - 1) as usize] = value;
        self.broadcast();
        Ok(())
    }

    /// Updates only the channels named in `values` (by alias); an
    /// unknown light is a no-op. The per-call change set lives on the
    /// stack (bounded by `MAX_LIGHT_CHANNELS`, enforced when the
    /// catalogue is built), so this never touches the allocator.
    pub fn set_light(
        &self,
        group: &str,
        light: &str,
        values: &HashMap<String, u8>,
    ) -> Result<(), CoordinatorError> {
        let Some((gi, li, found)) = self.catalogue.find(group, light) else {
            return Ok(());
        };

        let mut changes = [(0usize, 0u16, 0u8); MAX_LIGHT_CHANNELS];
        let mut count = 0;
        for (alias, value) in values {
            if count == MAX_LIGHT_CHANNELS {
                break;
            }
            if let Some(ci) = found.channel_index_for_alias(alias) {
                changes[count] = (ci, found.channels[ci].dmx_slot, *value);
                count += 1;
            }
        }
        if count == 0 {
            return Ok(());
        }

        for &(_, slot, value) in &changes[..count] {
            self.invoker.lock().unwrap().call(|c| c.set_channels(slot - 1, &[value]))?;
        }

        {
            let mut mirror = self.mirror.write().unwrap();
            for &(ci, slot, value) in &changes[..count] {
                mirror.light_values[gi][li][ci] = value;
                mirror.channels[(slot - 1) as usize] = value;
            }
        }
        self.broadcast();
        Ok(())
    }

    /// Iterates every light in `group`; per-light failures are logged,
    /// never fatal to the group call as a whole. Borrows catalogue-owned
    /// light names directly rather than collecting a copy of them.
    pub fn set_group(&self, group: &str, values: &HashMap<String, u8>) -> Result<(), CoordinatorError> {
        let Some(g) = self.catalogue.group(group) else {
            return Ok(());
        };

        for light in &g.lights {
            if let Err(e) = self.set_light(group, &light.name, values) {
                log::warn!("set_group({group}): light {} failed: {e}", light.name);
            }
        }
        Ok(())
    }

    /// Registers a new subscriber and returns its receiving end. Deltas
    /// arrive as already-serialized JSON strings.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Arc<str>>) {
        let (sender, receiver) = mpsc::sync_channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().unwrap().push(Subscriber { id, sender });
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().unwrap().retain(|s| s.id != id);
    }

    /// Total number of non-blocking sends skipped because a subscriber's
    /// queue was full.
    pub fn broadcast_drops(&self) -> u64 {
        self.broadcast_drops.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    pub fn with_snapshot<R>(&self, f: impl FnOnce(Snapshot<'_>) -> R) -> R {
        let mirror = self.mirror.read().unwrap();
        f(Snapshot {
            enabled: mirror.enabled,
            channels: &mirror.channels,
            light_values: &mirror.light_values,
        })
    }

    /// Passes an engine status query straight through to the peer. Used
    /// by metrics exposition, which needs live `frame_count`/`fps_x100`
    /// rather than anything the mirror tracks.
    pub fn remote_status(&self) -> Result<dmxgw_client::EngineStatus, CoordinatorError> {
        Ok(self.invoker.lock().unwrap().call(|c| c.status())?)
    }

    /// Periodic refresh: always re-broadcasts to subscribers; additionally
    /// re-pushes every channel to the peer when enabled, to recover a
    /// peer that restarted without telling anyone.
    pub fn refresh_tick(&self) -> Result<(), CoordinatorError> {
        let (enabled, channels) = {
            let mirror = self.mirror.read().unwrap();
            (mirror.enabled, mirror.channels)
        };
        if enabled {
            self.invoker.lock().unwrap().call(|c| c.set_channels(0, &channels))?;
        }
        self.broadcast();
        Ok(())
    }

    /// Drops the cached peer connection, closing the underlying tty
    /// endpoint. The invoker reopens it lazily on the next call, so this
    /// is safe to use as the final step of an orderly shutdown rather
    /// than only as failure recovery.
    pub fn close_ipc(&self) {
        self.invoker.lock().unwrap().client = None;
    }

    /// Serializes the current state into the reused scratch buffer (no
    /// allocation in steady state, since its capacity was reserved once
    /// at startup for the worst-case payload size), then copies it into
    /// one freshly allocated `Arc<str>`. That copy is the one allocation
    /// this path cannot avoid: each subscriber's queue must keep the
    /// exact delta that corresponds to this mutation (testable property
    /// 5), so the payload cannot be mutated in place after subscribers
    /// have been handed a reference to it.
    fn broadcast(&self) {
        let payload: Arc<str> = {
            let mirror = self.mirror.read().unwrap();
            let delta = StateDelta { r#type: "status", enabled: mirror.enabled, channels: &mirror.channels };
            let mut scratch = self.broadcast_scratch.lock().unwrap();
            scratch.clear();
            if serde_json::to_writer(&mut *scratch, &delta).is_err() {
                scratch.clear();
            }
            Arc::from(std::str::from_utf8(&scratch).unwrap_or(""))
        };
        let subscribers = self.subscribers.read().unwrap();
        for subscriber in subscribers.iter() {
            if subscriber.sender.try_send(payload.clone()).is_err() {
                self.broadcast_drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[derive(serde::Serialize)]
struct StateDelta<'a> {
    r#type: &'static str,
    enabled: bool,
    channels: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawChannelBinding;
    use std::collections::HashMap as Map;

    fn catalogue_with_one_light() -> LightCatalogue {
        let mut lights: Map<String, Map<String, Vec<RawChannelBinding>>> = Map::new();
        lights.entry("stage".into()).or_default().insert(
            "par1".into(),
            vec![RawChannelBinding { slot: 1, color: Some("red".into()), name: Some("intensity".into()) }],
        );
        LightCatalogue::build(&lights).unwrap()
    }

    #[test]
    fn set_channel_out_of_range_is_a_no_op_not_an_error() {
        let coord = DmxStateCoordinator::new(catalogue_with_one_light(), "/dev/null".into(), 1000, 1);
        assert!(coord.set_channel(0, 5).is_ok());
        assert!(coord.set_channel(513, 5).is_ok());
    }

    #[test]
    fn subscribe_then_unsubscribe_removes_from_count() {
        let coord = DmxStateCoordinator::new(catalogue_with_one_light(), "/dev/null".into(), 1000, 1);
        let (id, _rx) = coord.subscribe();
        assert_eq!(coord.subscriber_count(), 1);
        coord.unsubscribe(id);
        assert_eq!(coord.subscriber_count(), 0);
    }

    #[test]
    fn set_group_on_unknown_group_is_a_no_op() {
        let coord = DmxStateCoordinator::new(catalogue_with_one_light(), "/dev/null".into(), 1000, 1);
        let values = Map::from([("intensity".to_string(), 200u8)]);
        assert!(coord.set_group("no-such-group", &values).is_ok());
    }
}
