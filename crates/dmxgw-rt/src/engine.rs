//! DMX Frame Engine (C2): owns the universe buffer and timing parameters,
//! and the hardware-agnostic half of the engine's public contract.
//! The timing-critical frame algorithm itself lives in [`crate::frame`].

/// Number of DMX slots (channels 1..=512).
pub const SLOT_COUNT: usize = 512;
/// Start code + 512 slots.
pub const UNIVERSE_LEN: usize = SLOT_COUNT + 1;

/// Out-of-range slot count, or a timing value outside its allowed range.
/// The engine keeps running on its last good state; no partial commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    SlotRange,
    TimingRange,
}

impl core::fmt::Display for RangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SlotRange => write!(f, "start_slot + count exceeds 512"),
            Self::TimingRange => write!(f, "timing value outside allowed range"),
        }
    }
}

/// Timing triple, §3. Zero means "leave unchanged" in `set_timing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParams {
    pub refresh_hz: u16,
    pub break_us: u16,
    pub mab_us: u16,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            refresh_hz: 44,
            break_us: 150,
            mab_us: 12,
        }
    }
}

impl TimingParams {
    const HZ_RANGE: (u16, u16) = (1, 44);
    const BREAK_RANGE: (u16, u16) = (88, 1000);
    const MAB_RANGE: (u16, u16) = (8, 100);

    fn in_range(v: u16, range: (u16, u16)) -> bool {
        v >= range.0 && v <= range.1
    }

    /// Applies a (possibly partial — zero fields mean "unchanged") update,
    /// validating only the fields actually being changed.
    pub fn apply(&mut self, hz: u16, break_us: u16, mab_us: u16) -> Result<(), RangeError> {
        if hz != 0 && !Self::in_range(hz, Self::HZ_RANGE) {
            return Err(RangeError::TimingRange);
        }
        if break_us != 0 && !Self::in_range(break_us, Self::BREAK_RANGE) {
            return Err(RangeError::TimingRange);
        }
        if mab_us != 0 && !Self::in_range(mab_us, Self::MAB_RANGE) {
            return Err(RangeError::TimingRange);
        }
        if hz != 0 {
            self.refresh_hz = hz;
        }
        if break_us != 0 {
            self.break_us = break_us;
        }
        if mab_us != 0 {
            self.mab_us = mab_us;
        }
        Ok(())
    }

    pub fn frame_period_us(&self) -> u32 {
        1_000_000 / self.refresh_hz.max(1) as u32
    }
}

/// `{enabled, frame_count, fps_x100}` — the status() contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub enabled: bool,
    pub frame_count: u32,
    pub fps_x100: u32,
}

/// Owns the universe and engine-wide counters. Hardware-agnostic: no UART,
/// no timer, no interrupts here — see [`crate::frame::run_cycle`] for the
/// part of the algorithm that touches registers.
pub struct DmxEngine {
    universe: [u8; UNIVERSE_LEN],
    timing: TimingParams,
    enabled: bool,
    pub(crate) frame_count: u32,
    pub(crate) error_count: u32,
    fps_x100: u32,
    frames_since_sample: u32,
    last_sample_ticks: u32,
}

impl Default for DmxEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxEngine {
    pub const fn new() -> Self {
        Self {
            universe: [0u8; UNIVERSE_LEN],
            timing: TimingParams {
                refresh_hz: 44,
                break_us: 150,
                mab_us: 12,
            },
            enabled: false,
            frame_count: 0,
            error_count: 0,
            fps_x100: 0,
            frames_since_sample: 0,
            last_sample_ticks: 0,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Commits `values` into slots `[start_slot, start_slot + values.len())`.
    /// Fails with [`RangeError::SlotRange`] when that range overruns 512;
    /// the universe is left unmodified on failure.
    pub fn set_channels(&mut self, start_slot: u16, values: &[u8]) -> Result<(), RangeError> {
        let start = start_slot as usize;
        let count = values.len();
        if start + count > SLOT_COUNT {
            return Err(RangeError::SlotRange);
        }
        // Slot 1 lives at universe[1] (universe[0] is the start code).
        self.universe[1 + start..1 + start + count].copy_from_slice(values);
        Ok(())
    }

    pub fn blackout(&mut self) {
        for b in &mut self.universe[1..] {
            *b = 0;
        }
    }

    pub fn set_timing(&mut self, hz: u16, break_us: u16, mab_us: u16) -> Result<(), RangeError> {
        self.timing.apply(hz, break_us, mab_us)
    }

    pub fn timing(&self) -> TimingParams {
        self.timing
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            enabled: self.enabled,
            frame_count: self.frame_count,
            fps_x100: self.fps_x100,
        }
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Snapshot the universe for transmission. Channel writes made after
    /// this snapshot is taken are not reflected until the next cycle —
    /// this is the engine's only double-buffering.
    pub fn snapshot(&self) -> [u8; UNIVERSE_LEN] {
        self.universe
    }

    pub fn channel(&self, slot: u16) -> Option<u8> {
        self.universe.get(1 + slot as usize).copied()
    }

    /// Called once per completed (or timed-out) transmission cycle.
    pub(crate) fn record_frame(&mut self, now_ticks: u32, ticks_per_us: u32) {
        self.frame_count = self.frame_count.wrapping_add(1);
        self.frames_since_sample += 1;
        let elapsed_ticks = now_ticks.wrapping_sub(self.last_sample_ticks);
        let elapsed_ms = elapsed_ticks / ticks_per_us.max(1) / 1000;
        if elapsed_ms >= 1000 {
            self.fps_x100 = (self.frames_since_sample * 100_000) / elapsed_ms.max(1);
            self.frames_since_sample = 0;
            self.last_sample_ticks = now_ticks;
        }
    }

    pub(crate) fn record_error(&mut self) {
        self.error_count = self.error_count.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_channels_rejects_overrun() {
        let mut e = DmxEngine::new();
        let values = [1u8; 10];
        assert_eq!(
            e.set_channels(510, &values),
            Err(RangeError::SlotRange)
        );
    }

    #[test]
    fn set_channels_commits_in_place() {
        let mut e = DmxEngine::new();
        e.set_channels(0, &[0xFF]).unwrap();
        assert_eq!(e.channel(0), Some(0xFF));
        assert_eq!(e.channel(1), Some(0x00));
    }

    #[test]
    fn blackout_zeroes_all_slots_keeps_start_code() {
        let mut e = DmxEngine::new();
        e.set_channels(0, &[1, 2, 3]).unwrap();
        e.blackout();
        assert_eq!(e.snapshot()[0], 0x00);
        assert!(e.snapshot()[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn set_timing_zero_fields_preserve_previous() {
        let mut e = DmxEngine::new();
        e.set_timing(0, 200, 0).unwrap();
        assert_eq!(
            e.timing(),
            TimingParams {
                refresh_hz: 44,
                break_us: 200,
                mab_us: 12
            }
        );
    }

    #[test]
    fn set_timing_out_of_range_is_rejected_and_state_unchanged() {
        let mut e = DmxEngine::new();
        let before = e.timing();
        assert_eq!(e.set_timing(45, 0, 0), Err(RangeError::TimingRange));
        assert_eq!(e.timing(), before);
    }

    #[test]
    fn universe_round_trip_all_slots() {
        let mut e = DmxEngine::new();
        let values: heapless::Vec<u8, 512> =
            (0..512u16).map(|i| (i % 256) as u8).collect();
        e.set_channels(0, &values).unwrap();
        for i in 0..512u16 {
            assert_eq!(e.channel(i), Some((i % 256) as u8));
        }
    }
}
