//! Light catalogue: the resolved, validated `group -> light -> ordered
//! channel bindings` map built once from configuration. Every
//! `dmx_slot` appears in at most one (group, light, channel) triple —
//! enforced at build time, not at use time.

use std::collections::HashMap;

use crate::config::RawChannelBinding;

/// A light is bounded to this many channels so that the coordinator's
/// hot mutation paths can use a fixed-size stack buffer instead of a
/// heap-allocated one; enforced at catalogue build time.
pub const MAX_LIGHT_CHANNELS: usize = 32;

/// One DMX slot within a light, with its color tag and an optional
/// human-facing alias used by `set_light`/`set_group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub dmx_slot: u16,
    pub color: String,
    pub alias: Option<String>,
    /// `alias`, or `"ch{index}"` if unaliased — resolved once here so API
    /// responses never format this string on every request.
    pub display_name: String,
}

/// A single fixture: an ordered channel list plus an alias -> index map
/// for O(1) named lookups on the `set_light` hot path.
#[derive(Debug, Clone)]
pub struct Light {
    pub name: String,
    pub channels: Vec<ChannelBinding>,
    alias_index: HashMap<String, usize>,
}

impl Light {
    pub fn channel_index_for_alias(&self, alias: &str) -> Option<usize> {
        self.alias_index.get(alias).copied()
    }
}

/// A named collection of lights, e.g. "stage-left".
#[derive(Debug, Clone)]
pub struct LightGroup {
    pub name: String,
    pub lights: Vec<Light>,
    light_index: HashMap<String, usize>,
}

impl LightGroup {
    pub fn light(&self, name: &str) -> Option<&Light> {
        self.light_index.get(name).map(|&i| &self.lights[i])
    }

    pub fn light_index(&self, name: &str) -> Option<usize> {
        self.light_index.get(name).copied()
    }
}

/// The full catalogue, built once at startup and never mutated again.
#[derive(Debug, Clone)]
pub struct LightCatalogue {
    pub groups: Vec<LightGroup>,
    group_index: HashMap<String, usize>,
}

/// Raised when building the catalogue from raw configuration data finds a
/// structural problem this catalogue treats as invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogueError {
    EmptyLights,
    SlotOutOfRange { group: String, light: String, slot: u16 },
    DuplicateSlot { slot: u16, first: (String, String), second: (String, String) },
    TooManyChannels { group: String, light: String, count: usize },
}

impl std::fmt::Display for CatalogueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyLights => write!(f, "configuration declares no lights"),
            Self::SlotOutOfRange { group, light, slot } => {
                write!(f, "{group}/{light}: slot {slot} outside [1, 512]")
            }
            Self::DuplicateSlot { slot, first, second } => write!(
                f,
                "slot {slot} used by both {}/{} and {}/{}",
                first.0, first.1, second.0, second.1
            ),
            Self::TooManyChannels { group, light, count } => write!(
                f,
                "{group}/{light}: {count} channels exceeds the {MAX_LIGHT_CHANNELS}-channel-per-light limit"
            ),
        }
    }
}

impl std::error::Error for CatalogueError {}

/// Known color tags, resolved to a canonical hex string. Anything else
/// (including a malformed hex literal) falls back to `#FFFFFF` with a
/// logged warning rather than failing config validation outright — a
/// wrong color is a cosmetic problem, not a correctness one.
const NAMED_COLORS: &[(&str, &str)] = &[
    ("red", "#FF0000"),
    ("green", "#00FF00"),
    ("blue", "#0000FF"),
    ("white", "#FFFFFF"),
    ("warm_white", "#FFDAB4"),
    ("amber", "#FFBF00"),
    ("cyan", "#00FFFF"),
    ("magenta", "#FF00FF"),
    ("yellow", "#FFFF00"),
];

fn resolve_color(raw: &str) -> String {
    if raw.len() == 7 && raw.starts_with('#') && raw[1..].chars().all(|c| c.is_ascii_hexdigit()) {
        return raw.to_ascii_uppercase();
    }
    for (name, hex) in NAMED_COLORS {
        if raw.eq_ignore_ascii_case(name) {
            return (*hex).to_string();
        }
    }
    log::warn!("unknown color tag {raw:?}, defaulting to #FFFFFF");
    "#FFFFFF".to_string()
}

/// Splits a `"group"` or `"group/light"` target string. `None` means the
/// whole group is the target. Shared by the gateway API dispatcher and the
/// scheduler so both resolve targets identically.
pub fn split_target(target: &str) -> Option<(&str, &str)> {
    target.split_once('/')
}

impl LightCatalogue {
    /// Builds the catalogue from the raw `group -> light -> channels` map
    /// parsed out of configuration, validating as it goes.
    pub fn build(
        raw: &HashMap<String, HashMap<String, Vec<RawChannelBinding>>>,
    ) -> Result<Self, CatalogueError> {
        if raw.is_empty() || raw.values().all(|lights| lights.is_empty()) {
            return Err(CatalogueError::EmptyLights);
        }

        let mut slot_owners: HashMap<u16, (String, String)> = HashMap::new();
        let mut groups = Vec::with_capacity(raw.len());
        let mut group_index = HashMap::new();

        let mut group_names: Vec<&String> = raw.keys().collect();
        group_names.sort();

        for group_name in group_names {
            let raw_lights = &raw[group_name];
            let mut light_names: Vec<&String> = raw_lights.keys().collect();
            light_names.sort();

            let mut lights = Vec::with_capacity(raw_lights.len());
            let mut light_index = HashMap::new();

            for light_name in light_names {
                let raw_channels = &raw_lights[light_name];
                if raw_channels.len() > MAX_LIGHT_CHANNELS {
                    return Err(CatalogueError::TooManyChannels {
                        group: group_name.clone(),
                        light: light_name.clone(),
                        count: raw_channels.len(),
                    });
                }
                let mut channels = Vec::with_capacity(raw_channels.len());
                let mut alias_index = HashMap::new();

                for raw_ch in raw_channels {
                    if raw_ch.slot < 1 || raw_ch.slot > 512 {
                        return Err(CatalogueError::SlotOutOfRange {
                            group: group_name.clone(),
                            light: light_name.clone(),
                            slot: raw_ch.slot,
                        });
                    }
                    if let Some(owner) = slot_owners.get(&raw_ch.slot) {
                        return Err(CatalogueError::DuplicateSlot {
                            slot: raw_ch.slot,
                            first: owner.clone(),
                            second: (group_name.clone(), light_name.clone()),
                        });
                    }
                    slot_owners.insert(raw_ch.slot, (group_name.clone(), light_name.clone()));

                    let color = resolve_color(raw_ch.color.as_deref().unwrap_or("white"));
                    let display_name = raw_ch.name.clone().unwrap_or_else(|| format!("ch{}", channels.len()));
                    if let Some(alias) = &raw_ch.name {
                        alias_index.insert(alias.clone(), channels.len());
                    }
                    channels.push(ChannelBinding {
                        dmx_slot: raw_ch.slot,
                        color,
                        alias: raw_ch.name.clone(),
                        display_name,
                    });
                }

                light_index.insert(light_name.clone(), lights.len());
                lights.push(Light { name: light_name.clone(), channels, alias_index });
            }

            group_index.insert(group_name.clone(), groups.len());
            groups.push(LightGroup { name: group_name.clone(), lights, light_index });
        }

        Ok(Self { groups, group_index })
    }

    pub fn group(&self, name: &str) -> Option<&LightGroup> {
        self.group_index.get(name).map(|&i| &self.groups[i])
    }

    pub fn find(&self, group: &str, light: &str) -> Option<(usize, usize, &Light)> {
        let gi = *self.group_index.get(group)?;
        let li = self.groups[gi].light_index(light)?;
        Some((gi, li, &self.groups[gi].lights[li]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ch: Vec<(&str, &str, u16, &str, Option<&str>)>) -> HashMap<String, HashMap<String, Vec<RawChannelBinding>>> {
        let mut out: HashMap<String, HashMap<String, Vec<RawChannelBinding>>> = HashMap::new();
        for (group, light, slot, color, name) in ch {
            out.entry(group.to_string())
                .or_default()
                .entry(light.to_string())
                .or_default()
                .push(RawChannelBinding {
                    slot,
                    color: Some(color.to_string()),
                    name: name.map(String::from),
                });
        }
        out
    }

    #[test]
    fn builds_catalogue_with_resolved_colors() {
        let raw = raw(vec![("stage", "par1", 1, "red", Some("intensity"))]);
        let cat = LightCatalogue::build(&raw).unwrap();
        let (_, _, light) = cat.find("stage", "par1").unwrap();
        assert_eq!(light.channels[0].color, "#FF0000");
        assert_eq!(light.channel_index_for_alias("intensity"), Some(0));
    }

    #[test]
    fn unknown_color_falls_back_to_white_hex() {
        let raw = raw(vec![("stage", "par1", 1, "paisley", None)]);
        let cat = LightCatalogue::build(&raw).unwrap();
        let (_, _, light) = cat.find("stage", "par1").unwrap();
        assert_eq!(light.channels[0].color, "#FFFFFF");
    }

    #[test]
    fn rejects_out_of_range_slot() {
        let raw = raw(vec![("stage", "par1", 0, "red", None)]);
        assert_eq!(
            LightCatalogue::build(&raw).unwrap_err(),
            CatalogueError::SlotOutOfRange { group: "stage".into(), light: "par1".into(), slot: 0 }
        );
    }

    #[test]
    fn rejects_duplicate_slot_across_lights() {
        let raw = raw(vec![
            ("stage", "par1", 5, "red", None),
            ("stage", "par2", 5, "blue", None),
        ]);
        assert!(matches!(
            LightCatalogue::build(&raw).unwrap_err(),
            CatalogueError::DuplicateSlot { slot: 5, .. }
        ));
    }

    #[test]
    fn rejects_empty_lights() {
        let raw = HashMap::new();
        assert_eq!(LightCatalogue::build(&raw).unwrap_err(), CatalogueError::EmptyLights);
    }
}
