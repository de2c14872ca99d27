//! Gateway configuration: one YAML file declaring server
//! endpoints, the subprocess client's device path, throttling, and the
//! light catalogue. Parsed with `serde` + `serde_yaml` (added to the
//! workspace stack for this — see DESIGN.md).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::catalogue::{CatalogueError, LightCatalogue};

/// One channel binding as it appears in YAML, before color resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChannelBinding {
    pub slot: u16,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModbusConfig {
    #[serde(default = "default_modbus_bind")]
    pub bind: String,
}

fn default_modbus_bind() -> String {
    "0.0.0.0:502".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_prefix")]
    pub prefix: String,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_prefix() -> String {
    "dmxgw".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// One `HH:MM[:SS]` scheduled action, as it appears in YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScheduleEvent {
    pub time: String,
    pub action: RawScheduleAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawScheduleAction {
    Blackout,
    /// Fires one `values` map per target, each target a `"group"` or
    /// `"group/light"` string resolved the same way the gateway API's
    /// `set` command resolves them.
    SetPerTarget { targets: HashMap<String, HashMap<String, u8>> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub dmx_device: String,
    #[serde(default = "default_subprocess_path")]
    pub subprocess_path: String,
    pub throttle_ms: u64,
    pub timeout_ms: u64,
    #[serde(default)]
    pub refresh_ms: Option<u64>,
    #[serde(default)]
    pub auto_enable: bool,
    pub lights: HashMap<String, HashMap<String, Vec<RawChannelBinding>>>,
    #[serde(default)]
    pub modbus: Option<ModbusConfig>,
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
    #[serde(default)]
    pub schedule: Vec<RawScheduleEvent>,
}

fn default_subprocess_path() -> String {
    "/dev/ttyRPMSG0".to_string()
}

/// Everything that can go wrong loading and validating the gateway's
/// configuration file. Only ever surfaced at startup — never in steady state.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Catalogue(CatalogueError),
    ZeroThrottle,
    ZeroTimeout,
    ZeroRefresh,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "reading config file: {e}"),
            Self::Yaml(e) => write!(f, "parsing config YAML: {e}"),
            Self::Catalogue(e) => write!(f, "light catalogue: {e}"),
            Self::ZeroThrottle => write!(f, "throttle_ms must be nonzero"),
            Self::ZeroTimeout => write!(f, "timeout_ms must be nonzero"),
            Self::ZeroRefresh => write!(f, "refresh_ms, if present, must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Yaml(e) => Some(e),
            Self::Catalogue(e) => Some(e),
            _ => None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text).map_err(ConfigError::Yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.throttle_ms == 0 {
            return Err(ConfigError::ZeroThrottle);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if matches!(self.refresh_ms, Some(0)) {
            return Err(ConfigError::ZeroRefresh);
        }
        LightCatalogue::build(&self.lights).map_err(ConfigError::Catalogue)?;
        Ok(())
    }

    /// Builds the validated light catalogue. Infallible once `load`/`parse`
    /// has already succeeded, since validation already ran the same build.
    pub fn catalogue(&self) -> LightCatalogue {
        LightCatalogue::build(&self.lights).expect("validated during Config::parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
dmx_device: /dev/ttyRPMSG0
throttle_ms: 25
timeout_ms: 1000
lights:
  stage:
    par1:
      - slot: 1
        color: red
        name: intensity
"#
    }

    #[test]
    fn parses_minimal_config() {
        let config = Config::parse(minimal_yaml()).unwrap();
        assert_eq!(config.dmx_device, "/dev/ttyRPMSG0");
        assert_eq!(config.throttle_ms, 25);
        assert!(!config.auto_enable);
    }

    #[test]
    fn rejects_zero_throttle() {
        let yaml = minimal_yaml().replace("throttle_ms: 25", "throttle_ms: 0");
        assert!(matches!(Config::parse(&yaml), Err(ConfigError::ZeroThrottle)));
    }

    #[test]
    fn rejects_empty_lights() {
        let yaml = r#"
dmx_device: /dev/ttyRPMSG0
throttle_ms: 25
timeout_ms: 1000
lights: {}
"#;
        assert!(matches!(Config::parse(yaml), Err(ConfigError::Catalogue(CatalogueError::EmptyLights))));
    }

    #[test]
    fn rejects_duplicate_slot_through_full_load_path() {
        let yaml = r#"
dmx_device: /dev/ttyRPMSG0
throttle_ms: 25
timeout_ms: 1000
lights:
  stage:
    par1:
      - slot: 1
        color: red
    par2:
      - slot: 1
        color: blue
"#;
        assert!(matches!(
            Config::parse(yaml),
            Err(ConfigError::Catalogue(CatalogueError::DuplicateSlot { slot: 1, .. }))
        ));
    }
}
