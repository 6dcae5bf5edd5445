//! `bindings.toml`: poll timing, toggled features and analog rules
//!
//! Lives in `<config dir>/flightsync/`. A default file is written on first
//! run so there is always something on disk to edit.

use crate::device::{InputId, OutputAxis, OutputButton};
use crate::shaping::{CurveError, STEERING_CURVE};
use crate::status::StatusFlags;
use crate::sync::AnalogSource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONFIG_DIR: &str = "flightsync";
pub const CONFIG_FILE: &str = "bindings.toml";

const PEDALS: &str = "CH PRO PEDALS USB";
const JOYSTICK: &str = "WINWING JOYSTICK BASE2 + F18 GRIP";
const THROTTLE: &str = "WINWING THROTTLE BASE2 + F18 HANDLE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory on this system")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{owner}: unknown status flag '{flag}'")]
    UnknownFlag { owner: String, flag: String },

    #[error("{name}: invalid curve: {source}")]
    Curve { name: String, source: CurveError },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub poll_interval_ms: u64,
    pub default_cooldown_ms: u64,
    pub pulse_ms: u64,
    pub status_file: PathBuf,
    /// Axis changes smaller than this are not forwarded by the input collector
    pub axis_epsilon: f32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            default_cooldown_ms: 1100,
            pulse_ms: 200,
            status_file: default_status_file(),
            axis_epsilon: 0.002,
        }
    }
}

impl GeneralConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_cooldown(&self) -> Duration {
        Duration::from_millis(self.default_cooldown_ms)
    }

    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }
}

/// One toggled ship feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub name: String,
    /// Status flag name, e.g. `"landing_gear_down"`
    pub flag: String,
    /// Latching switch giving the desired state
    pub switch: InputId,
    /// Virtual button the game has bound to the toggle
    pub output: OutputButton,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ms: Option<u64>,
    /// Switch reads pressed when the feature should be off
    #[serde(default)]
    pub invert: bool,
}

impl FeatureConfig {
    pub fn cooldown(&self, general: &GeneralConfig) -> Duration {
        self.cooldown_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| general.default_cooldown())
    }

    pub fn status_flag(&self) -> Result<StatusFlags, ConfigError> {
        parse_flag(&self.name, &self.flag)
    }
}

/// One virtual axis driven from physical inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogConfig {
    pub name: String,
    pub output: OutputAxis,
    /// Only drive the axis while this flag is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Only drive the axis while this flag is clear
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<String>,
    pub source: AnalogSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub features: Vec<FeatureConfig>,
    #[serde(default)]
    pub analog: Vec<AnalogConfig>,
}

impl Default for FlightConfig {
    fn default() -> Self {
        let switch = |code| InputId::for_device(THROTTLE, code);
        let feature = |name: &str, flag: &str, code, output| FeatureConfig {
            name: name.to_string(),
            flag: flag.to_string(),
            switch: switch(code),
            output: OutputButton(output),
            cooldown_ms: None,
            invert: false,
        };

        let mut cargo_scoop = feature("cargo_scoop", "cargo_scoop_deployed", 13, 4);
        // The scoop animation alone takes several seconds.
        cargo_scoop.cooldown_ms = Some(5000);

        Self {
            general: GeneralConfig::default(),
            features: vec![
                feature("lights", "lights_on", 10, 1),
                feature("night_vision", "night_vision", 11, 2),
                feature("landing_gear", "landing_gear_down", 12, 3),
                cargo_scoop,
                feature("hardpoints", "hardpoints_deployed", 14, 5),
            ],
            analog: vec![
                AnalogConfig {
                    name: "pedals".to_string(),
                    output: OutputAxis::RX,
                    when: None,
                    unless: None,
                    source: AnalogSource::DualPedal {
                        back: InputId::for_device(PEDALS, 1),
                        forward: InputId::for_device(PEDALS, 2),
                    },
                },
                AnalogConfig {
                    name: "throttle".to_string(),
                    output: OutputAxis::Z,
                    when: None,
                    unless: None,
                    source: AnalogSource::Throttle {
                        forward: InputId::for_device(THROTTLE, 0),
                        backward: InputId::for_device(THROTTLE, 1),
                    },
                },
                AnalogConfig {
                    name: "roll".to_string(),
                    output: OutputAxis::X,
                    when: None,
                    unless: Some("in_srv".to_string()),
                    source: AnalogSource::Deadzone {
                        input: InputId::for_device(JOYSTICK, 0),
                        low_in: -0.05,
                        low_out: 0.0,
                        high_in: 0.05,
                        high_out: 0.0,
                    },
                },
                AnalogConfig {
                    name: "srv_steering".to_string(),
                    output: OutputAxis::X,
                    when: Some("in_srv".to_string()),
                    unless: None,
                    source: AnalogSource::Curve {
                        input: InputId::for_device(JOYSTICK, 0),
                        curve: STEERING_CURVE.to_vec(),
                    },
                },
            ],
        }
    }
}

impl FlightConfig {
    /// Checks everything that would otherwise fail while building the engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        let general = &self.general;
        if general.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if general.pulse_ms == 0 {
            return Err(ConfigError::Invalid("pulse_ms must be positive".to_string()));
        }

        for feature in &self.features {
            feature.status_flag()?;
            let cooldown = feature.cooldown(general);
            if cooldown < general.poll_interval() * 2 {
                warn!(
                    "{}: cooldown {}ms is under twice the poll interval ({}ms), expect redundant presses",
                    feature.name,
                    cooldown.as_millis(),
                    general.poll_interval_ms
                );
            }
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "feature '{}' is defined twice",
                    feature.name
                )));
            }
        }

        for rule in &self.analog {
            if let Some(flag) = &rule.when {
                parse_flag(&rule.name, flag)?;
            }
            if let Some(flag) = &rule.unless {
                parse_flag(&rule.name, flag)?;
            }
            if rule.when.is_some() && rule.unless.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "{}: set either 'when' or 'unless', not both",
                    rule.name
                )));
            }
            rule.source.check().map_err(|source| ConfigError::Curve {
                name: rule.name.clone(),
                source,
            })?;
            check_deadzone(rule)?;
        }

        debug!(
            "Configuration valid: {} features, {} analog rules",
            self.features.len(),
            self.analog.len()
        );
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FlightConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Loads the default location, writing the defaults there first if needed
    pub async fn load_or_create() -> Result<Self, ConfigError> {
        let path = ensure_default_config().await?;
        Self::load(&path).await
    }
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}

/// Writes the default configuration if the file does not exist yet
pub async fn ensure_default_config() -> Result<PathBuf, ConfigError> {
    let path = config_path()?;
    let exists = tokio::fs::try_exists(&path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

    if !exists {
        info!("Creating default configuration at {}", path.display());
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| ConfigError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        FlightConfig::default().save(&path).await?;
    }

    Ok(path)
}

fn default_status_file() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_default();
    path.push("Saved Games");
    path.push("Frontier Developments");
    path.push("Elite Dangerous");
    path.push("Status.json");
    path
}

/// Deadzone breakpoints must sit inside the axis range, low before high
fn check_deadzone(rule: &AnalogConfig) -> Result<(), ConfigError> {
    let AnalogSource::Deadzone {
        low_in,
        low_out,
        high_in,
        high_out,
        ..
    } = &rule.source
    else {
        return Ok(());
    };

    for (field, value) in [
        ("low_in", low_in),
        ("low_out", low_out),
        ("high_in", high_in),
        ("high_out", high_out),
    ] {
        if !value.is_finite() || !(-1.0..=1.0).contains(value) {
            return Err(ConfigError::Invalid(format!(
                "{}: deadzone {} must be within [-1, 1], got {}",
                rule.name, field, value
            )));
        }
    }
    if low_in > high_in {
        return Err(ConfigError::Invalid(format!(
            "{}: deadzone low_in {} is above high_in {}",
            rule.name, low_in, high_in
        )));
    }
    Ok(())
}

pub(crate) fn parse_flag(owner: &str, flag: &str) -> Result<StatusFlags, ConfigError> {
    StatusFlags::parse_name(flag).ok_or_else(|| ConfigError::UnknownFlag {
        owner: owner.to_string(),
        flag: flag.to_string(),
    })
}
