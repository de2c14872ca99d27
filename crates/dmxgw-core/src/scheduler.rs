//! Scheduler (C7): fires config-declared `HH:MM[:SS]` events against the
//! state coordinator at 1 s resolution. Decoupled from any
//! real wall-clock source — callers supply `now` on every tick — so it
//! is testable without sleeping and without a `chrono`-style dependency
//! the rest of the stack doesn't otherwise need.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::catalogue::split_target;
use crate::config::{RawScheduleAction, RawScheduleEvent};
use crate::coordinator::DmxStateCoordinator;

/// A wall-clock time of day at one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeOfDay {
    pub fn from_hms(hour: u8, minute: u8, second: u8) -> Option<Self> {
        if hour < 24 && minute < 60 && second < 60 {
            Some(Self { hour, minute, second })
        } else {
            None
        }
    }

    /// Parses `HH:MM` or `HH:MM:SS`.
    fn parse(raw: &str) -> Result<Self, SchedulerError> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(SchedulerError::BadTimeFormat(raw.to_string()));
        }
        let mut fields = [0u8; 3];
        for (i, part) in parts.iter().enumerate() {
            fields[i] = part.parse::<u8>().map_err(|_| SchedulerError::BadTimeFormat(raw.to_string()))?;
        }
        Self::from_hms(fields[0], fields[1], fields[2]).ok_or_else(|| SchedulerError::BadTimeFormat(raw.to_string()))
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

#[derive(Debug, Clone)]
pub enum ScheduledAction {
    Blackout,
    /// One `values` map per target, each a `"group"` or `"group/light"`
    /// string resolved via [`split_target`].
    SetPerTarget { targets: HashMap<String, HashMap<String, u8>> },
}

#[derive(Debug, Clone)]
pub struct ScheduleEvent {
    pub label: String,
    pub time: TimeOfDay,
    pub action: ScheduledAction,
}

#[derive(Debug)]
pub enum SchedulerError {
    BadTimeFormat(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadTimeFormat(raw) => write!(f, "bad schedule time {raw:?}, expected HH:MM or HH:MM:SS"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Events sorted by time of day. Ticking twice within the same second
/// for the same event does not re-fire it — `last_executed` tracks the
/// most recently fired label.
pub struct Scheduler {
    events: Vec<ScheduleEvent>,
    last_executed: Mutex<Option<String>>,
}

impl Scheduler {
    pub fn build(raw: &[RawScheduleEvent]) -> Result<Self, SchedulerError> {
        let mut events = Vec::with_capacity(raw.len());
        for (i, entry) in raw.iter().enumerate() {
            let time = TimeOfDay::parse(&entry.time)?;
            let action = match &entry.action {
                RawScheduleAction::Blackout => ScheduledAction::Blackout,
                RawScheduleAction::SetPerTarget { targets } => {
                    ScheduledAction::SetPerTarget { targets: targets.clone() }
                }
            };
            events.push(ScheduleEvent { label: format!("{i}@{time}"), time, action });
        }
        events.sort_by_key(|e| e.time);
        Ok(Self { events, last_executed: Mutex::new(None) })
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Call once per second with the current wall-clock time. Fires at
    /// most one event per call (the one matching `now`, if any); any
    /// failure while applying it is logged, never propagated, so a
    /// dead peer doesn't stall the ticker.
    pub fn tick(&self, now: TimeOfDay, coordinator: &DmxStateCoordinator) {
        let Some(event) = self.events.iter().find(|e| e.time == now) else {
            return;
        };

        let mut last = self.last_executed.lock().unwrap();
        if last.as_deref() == Some(event.label.as_str()) {
            return;
        }

        match &event.action {
            ScheduledAction::Blackout => {
                if let Err(e) = coordinator.blackout() {
                    log::warn!("scheduled event {} failed: {e}", event.label);
                }
            }
            ScheduledAction::SetPerTarget { targets } => {
                for (target, values) in targets {
                    let result = match split_target(target) {
                        Some((group, light)) => coordinator.set_light(group, light, values),
                        None => coordinator.set_group(target, values),
                    };
                    if let Err(e) = result {
                        log::warn!("scheduled event {} target {target:?} failed: {e}", event.label);
                    }
                }
            }
        }
        *last = Some(event.label.clone());
    }

    /// The next event at or after `now`, wrapping to the first event of
    /// the following day if none remain today.
    pub fn next_event(&self, now: TimeOfDay) -> Option<&ScheduleEvent> {
        self.events.iter().find(|e| e.time >= now).or_else(|| self.events.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::LightCatalogue;
    use crate::config::RawChannelBinding;
    use std::collections::HashMap as Map;

    fn raw_event(time: &str, action: RawScheduleAction) -> RawScheduleEvent {
        RawScheduleEvent { time: time.to_string(), action }
    }

    #[test]
    fn parses_hh_mm_and_hh_mm_ss() {
        assert_eq!(TimeOfDay::parse("09:30").unwrap(), TimeOfDay::from_hms(9, 30, 0).unwrap());
        assert_eq!(TimeOfDay::parse("09:30:15").unwrap(), TimeOfDay::from_hms(9, 30, 15).unwrap());
    }

    #[test]
    fn rejects_malformed_time() {
        assert!(matches!(TimeOfDay::parse("25:00"), Err(SchedulerError::BadTimeFormat(_))));
        assert!(matches!(TimeOfDay::parse("not-a-time"), Err(SchedulerError::BadTimeFormat(_))));
    }

    #[test]
    fn build_sorts_events_by_time() {
        let raw = vec![
            raw_event("18:00", RawScheduleAction::Blackout),
            raw_event("06:00", RawScheduleAction::Blackout),
        ];
        let scheduler = Scheduler::build(&raw).unwrap();
        assert_eq!(scheduler.events[0].time, TimeOfDay::from_hms(6, 0, 0).unwrap());
    }

    #[test]
    fn next_event_wraps_to_first_event_of_next_day() {
        let raw = vec![raw_event("06:00", RawScheduleAction::Blackout)];
        let scheduler = Scheduler::build(&raw).unwrap();
        let next = scheduler.next_event(TimeOfDay::from_hms(23, 0, 0).unwrap()).unwrap();
        assert_eq!(next.time, TimeOfDay::from_hms(6, 0, 0).unwrap());
    }

    #[test]
    fn tick_fires_blackout_once_per_matching_second() {
        let mut lights: Map<String, Map<String, Vec<RawChannelBinding>>> = Map::new();
        lights.entry("stage".into()).or_default().insert(
            "par1".into(),
            vec![RawChannelBinding { slot: 1, color: Some("red".into()), name: None }],
        );
        let catalogue = LightCatalogue::build(&lights).unwrap();
        let coordinator = DmxStateCoordinator::new(catalogue, "/dev/null".into(), 1000, 1);

        let raw = vec![raw_event("12:00:00", RawScheduleAction::Blackout)];
        let scheduler = Scheduler::build(&raw).unwrap();
        let noon = TimeOfDay::from_hms(12, 0, 0).unwrap();

        scheduler.tick(noon, &coordinator);
        scheduler.tick(noon, &coordinator);
        assert_eq!(*scheduler.last_executed.lock().unwrap(), Some("0@12:00:00".to_string()));
    }

    #[test]
    fn tick_fires_set_per_target_across_group_and_light_targets() {
        let mut lights: Map<String, Map<String, Vec<RawChannelBinding>>> = Map::new();
        lights.entry("stage".into()).or_default().insert(
            "par1".into(),
            vec![RawChannelBinding { slot: 1, color: Some("red".into()), name: Some("intensity".into()) }],
        );
        lights.entry("house".into()).or_default().insert(
            "wash1".into(),
            vec![RawChannelBinding { slot: 2, color: Some("blue".into()), name: Some("intensity".into()) }],
        );
        let catalogue = LightCatalogue::build(&lights).unwrap();
        let coordinator = DmxStateCoordinator::new(catalogue, "/dev/null".into(), 1000, 1);

        let mut targets: Map<String, Map<String, u8>> = Map::new();
        targets.insert("stage/par1".into(), Map::from([("intensity".to_string(), 200u8)]));
        targets.insert("house".into(), Map::from([("intensity".to_string(), 100u8)]));

        let raw = vec![raw_event("09:00:00", RawScheduleAction::SetPerTarget { targets })];
        let scheduler = Scheduler::build(&raw).unwrap();
        scheduler.tick(TimeOfDay::from_hms(9, 0, 0).unwrap(), &coordinator);

        coordinator.with_snapshot(|snap| {
            assert_eq!(snap.channels[0], 200);
            assert_eq!(snap.channels[1], 100);
        });
    }
}
