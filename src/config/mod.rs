//! Application configuration
//!
//! Loaded from a TOML file; a missing file is created with defaults so a
//! first run leaves a commented-out starting point on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{AppError, StoreError};
use crate::models::WindowDefaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Protocols fetched when a schedule does not name its own set
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub window: WindowDefaults,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_protocols() -> Vec<String> {
    vec![
        "ethereum".to_string(),
        "tron".to_string(),
        "bitcoin".to_string(),
        "binance_smart_chain".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            protocols: default_protocols(),
            scheduler: SchedulerConfig::default(),
            window: WindowDefaults::default(),
            refresh: RefreshConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Evaluation tick period in seconds
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Optional built-in schedule materialized under the fixed id "default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schedule: Option<DefaultScheduleConfig>,
}

fn default_tick_interval_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            default_schedule: None,
        }
    }
}

/// Trigger definition for the config-owned default schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultScheduleConfig {
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
}

fn default_schedule_enabled() -> bool {
    false
}

fn default_interval_minutes() -> u32 {
    60
}

/// External refresh command invoked to update the proposal datasets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_refresh_command() -> String {
    "proposal-refresh".to_string()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            command: default_refresh_command(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub desktop: DesktopConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    /// Payload shape: "discord", "slack" or "generic"
    #[serde(default = "default_webhook_kind")]
    pub kind: String,
}

fn default_webhook_kind() -> String {
    "generic".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesktopConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Load configuration from `path`, writing defaults if the file is absent
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Config::default();
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| AppError::internal(format!("failed to render default config: {e}")))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
            }
            std::fs::write(path, rendered).map_err(StoreError::Io)?;
            info!("Created default configuration at {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).map_err(StoreError::Io)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AppError::internal(format!("invalid configuration: {e}")))?;
        Ok(config)
    }
}
