use anyhow::{Context, Result};
use plantgraph::nats::NatsConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Environment variable naming the fleet's config file
pub const CONFIG_ENV: &str = "FLEET_CONFIG";

/// Config file read when `FLEET_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "fleet.toml";

/// Complete fleet configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub nats: NatsConfig,
    /// `zone -> variable -> [mu, sigma]`
    #[serde(default)]
    pub zones: BTreeMap<String, BTreeMap<String, [f64; 2]>>,
    /// `task -> role -> parameters`, either `[offset, amplitude, period, phase]`
    /// or `[mean, sigma]`
    #[serde(default)]
    pub tasks: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub scenario: Vec<ScenarioStep>,
}

/// One emulated device
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DeviceSpec {
    pub class: String,
    /// Empty generates a fresh v4 uuid
    #[serde(default)]
    pub uuid: String,
    /// Defaults to the class root
    #[serde(default)]
    pub topic: Option<String>,
    /// Seconds between emissions, defaults to the class cadence
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub modifier: f64,
    #[serde(default)]
    pub print_logs: bool,
    /// Ambient zone, for ambient-coupled classes
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// FaultNotifier: `configuration` | `quality`;
    /// PieceDetector: `parts` | `underpans`
    #[serde(default)]
    pub focus: Option<String>,
}

/// Scheduled fleet change
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScenarioStep {
    /// Seconds after fleet start
    pub after_secs: u64,
    pub action: ScenarioAction,
    /// Target uuid for activate / deactivate / stop
    #[serde(default)]
    pub device: Option<String>,
    /// Device to launch for start
    #[serde(default)]
    pub spec: Option<DeviceSpec>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioAction {
    /// Park the device; it keeps its bus connection
    Deactivate,
    Activate,
    /// Start a new device
    Start,
    /// Stop the device, announcing DISCONNECTED
    Stop,
}

impl fmt::Display for ScenarioAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioAction::Deactivate => write!(f, "deactivate"),
            ScenarioAction::Activate => write!(f, "activate"),
            ScenarioAction::Start => write!(f, "start"),
            ScenarioAction::Stop => write!(f, "stop"),
        }
    }
}

/// Fleet configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    UnknownClass(String),
    MissingZone(String),
    UnknownZone(String),
    MissingZoneVariable { zone: String, variable: String },
    UnknownTask(String),
    UnknownRole { task: String, role: String },
    InvalidParams { task: String, role: String, expected: usize },
    InvalidFocus { class: String, focus: String },
    InvalidInterval(String),
    MissingTarget(ScenarioAction),
    UnknownDevice(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownClass(class) => write!(f, "unknown device class '{}'", class),
            ConfigError::MissingZone(class) => {
                write!(f, "class '{}' reads ambient values and needs a zone", class)
            }
            ConfigError::UnknownZone(zone) => write!(f, "unknown zone '{}'", zone),
            ConfigError::MissingZoneVariable { zone, variable } => {
                write!(f, "zone '{}' has no variable '{}'", zone, variable)
            }
            ConfigError::UnknownTask(task) => write!(f, "unknown task '{}'", task),
            ConfigError::UnknownRole { task, role } => {
                write!(f, "task '{}' has no role '{}'", task, role)
            }
            ConfigError::InvalidParams {
                task,
                role,
                expected,
            } => write!(f, "{}.{} must have {} parameters", task, role, expected),
            ConfigError::InvalidFocus { class, focus } => {
                write!(f, "invalid focus '{}' for {}", focus, class)
            }
            ConfigError::InvalidInterval(uuid) => {
                write!(f, "device '{}' needs a positive interval", uuid)
            }
            ConfigError::MissingTarget(action) => {
                write!(f, "scenario action '{}' is missing its target", action)
            }
            ConfigError::UnknownDevice(uuid) => write!(f, "no running device '{}'", uuid),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<FleetConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .context(format!("Failed to read config file '{}'", path.display()))?;
    let config: FleetConfig = toml::from_str(&contents)
        .context(format!("Failed to parse config file '{}'", path.display()))?;
    Ok(config)
}

/// Config file path from `FLEET_CONFIG`, or the default
pub fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}
