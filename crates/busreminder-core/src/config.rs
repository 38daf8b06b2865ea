use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEAD_TIME_MINUTES: u32 = 5;
pub const DEFAULT_INEXACT_TOLERANCE_SECS: u32 = 60;
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 900; // full re-reconcile every 15 min

/// Top-level config (busreminder.toml + BUSREMINDER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Scheduling knobs for the timer lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long before the departure the reminder fires.
    #[serde(default = "default_lead_time_minutes")]
    pub lead_time_minutes: u32,
    /// Half-width of the window used for inexact registrations.
    #[serde(default = "default_inexact_tolerance_secs")]
    pub inexact_tolerance_secs: u32,
    /// Report no exact-alarm capability from the local timer service, as a
    /// restricted platform would.
    #[serde(default)]
    pub force_inexact: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lead_time_minutes: DEFAULT_LEAD_TIME_MINUTES,
            inexact_tolerance_secs: DEFAULT_INEXACT_TOLERANCE_SECS,
            force_inexact: false,
        }
    }
}

impl EngineConfig {
    pub fn lead_time(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.lead_time_minutes))
    }

    pub fn inexact_tolerance(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.inexact_tolerance_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Periodic full reconcile, which also picks up changes written by other
    /// processes. 0 disables it.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
        }
    }
}

fn default_lead_time_minutes() -> u32 {
    DEFAULT_LEAD_TIME_MINUTES
}
fn default_inexact_tolerance_secs() -> u32 {
    DEFAULT_INEXACT_TOLERANCE_SECS
}
fn default_resync_interval_secs() -> u64 {
    DEFAULT_RESYNC_INTERVAL_SECS
}
fn default_db_path() -> String {
    format!("{}/busreminder.db", data_dir())
}

/// `~/.busreminder`, or `./.busreminder` when HOME is unset.
pub fn data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.busreminder", home)
}

impl ReminderConfig {
    /// Load config from a TOML file with BUSREMINDER_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `BUSREMINDER_ENGINE__LEAD_TIME_MINUTES=10`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ReminderConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BUSREMINDER_").split("__"))
            .extract()
            .map_err(|e| crate::error::ReminderError::Config(e.to_string()))?;

        if config.engine.lead_time_minutes == 0 {
            tracing::warn!("engine.lead_time_minutes is 0; reminders will fire at departure time");
        }

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/busreminder.toml", data_dir())
}
