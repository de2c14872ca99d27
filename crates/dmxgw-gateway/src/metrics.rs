//! Prometheus `/metrics` exposition, hand-rolled in the plain text
//! format rather than pulling in a metrics crate — a few lines of
//! formatting don't justify the dependency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dmxgw_core::DmxStateCoordinator;

pub struct Metrics {
    command_errors: Mutex<HashMap<String, u64>>,
    frame_errors_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self { command_errors: Mutex::new(HashMap::new()), frame_errors_total: AtomicU64::new(0) }
    }

    pub fn record_command_error(&self, cmd: &str) {
        let mut errors = self.command_errors.lock().unwrap();
        *errors.entry(cmd.to_string()).or_insert(0) += 1;
    }

    /// Renders the current snapshot, polling the peer once for live
    /// `frame_count`/`fps_x100` — a scrape is the one place the gateway
    /// pays for a status round trip it didn't otherwise need.
    pub fn render(&self, coordinator: &DmxStateCoordinator) -> String {
        let remote = coordinator.remote_status();
        if remote.is_err() {
            self.frame_errors_total.fetch_add(1, Ordering::Relaxed);
        }
        let (frames_total, fps_x100) = remote.map(|s| (s.frame_count as u64, s.fps_x100 as u64)).unwrap_or((0, 0));
        let enabled = coordinator.with_snapshot(|s| s.enabled);

        let mut out = String::new();
        out.push_str("# HELP dmxgw_frames_total Frames transmitted by the real-time engine.\n");
        out.push_str("# TYPE dmxgw_frames_total counter\n");
        out.push_str(&format!("dmxgw_frames_total {frames_total}\n"));

        out.push_str("# HELP dmxgw_frame_errors_total Failed polls of the engine's remote status.\n");
        out.push_str("# TYPE dmxgw_frame_errors_total counter\n");
        out.push_str(&format!("dmxgw_frame_errors_total {}\n", self.frame_errors_total.load(Ordering::Relaxed)));

        out.push_str("# HELP dmxgw_command_errors_total Gateway command errors by command name.\n");
        out.push_str("# TYPE dmxgw_command_errors_total counter\n");
        for (cmd, count) in self.command_errors.lock().unwrap().iter() {
            out.push_str(&format!("dmxgw_command_errors_total{{cmd=\"{cmd}\"}} {count}\n"));
        }

        out.push_str("# HELP dmxgw_subscribers Currently registered state-delta subscribers.\n");
        out.push_str("# TYPE dmxgw_subscribers gauge\n");
        out.push_str(&format!("dmxgw_subscribers {}\n", coordinator.subscriber_count()));

        out.push_str("# HELP dmxgw_broadcast_drops_total Non-blocking sends skipped because a subscriber queue was full.\n");
        out.push_str("# TYPE dmxgw_broadcast_drops_total counter\n");
        out.push_str(&format!("dmxgw_broadcast_drops_total {}\n", coordinator.broadcast_drops()));

        out.push_str("# HELP dmxgw_engine_enabled Whether the DMX engine is currently enabled.\n");
        out.push_str("# TYPE dmxgw_engine_enabled gauge\n");
        out.push_str(&format!("dmxgw_engine_enabled {}\n", if enabled { 1 } else { 0 }));

        out.push_str("# HELP dmxgw_fps_x100 Engine frame rate times 100.\n");
        out.push_str("# TYPE dmxgw_fps_x100 gauge\n");
        out.push_str(&format!("dmxgw_fps_x100 {fps_x100}\n"));

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_command_error_accumulates_per_command() {
        let metrics = Metrics::new();
        metrics.record_command_error("set");
        metrics.record_command_error("set");
        metrics.record_command_error("status");
        let errors = metrics.command_errors.lock().unwrap();
        assert_eq!(errors["set"], 2);
        assert_eq!(errors["status"], 1);
    }
}
