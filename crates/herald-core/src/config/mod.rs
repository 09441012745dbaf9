mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::HeraldError;
use crate::job::Pacing;
use defaults::*;

/// Top-level Herald configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub herald: HeraldConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// WhatsApp transport config.
///
/// Session data is stored at `{data_dir}/whatsapp_session/`.
/// Pairing is done by scanning a QR code (like WhatsApp Web).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Label shown under "Linked devices" on the phone.
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
        }
    }
}

/// Phone normalization rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Leading digit(s) of a national number, replaced by `country_code`.
    #[serde(default = "default_trunk_prefix")]
    pub trunk_prefix: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    /// Appended to the digits to form a transport address.
    #[serde(default = "default_address_suffix")]
    pub address_suffix: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            trunk_prefix: default_trunk_prefix(),
            country_code: default_country_code(),
            address_suffix: default_address_suffix(),
        }
    }
}

/// What a running job does when the session leaves Ready.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionLossPolicy {
    /// Pause the job; the caller resumes it after reconnecting (default).
    #[default]
    Pause,
    /// Keep iterating; every remaining send fails and is counted as failed.
    Continue,
}

/// Campaign defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub on_session_loss: SessionLossPolicy,
    /// Capacity of the event channel between the core and its observer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            on_session_loss: SessionLossPolicy::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl CampaignConfig {
    /// Pacing applied to jobs that do not bring their own.
    pub fn default_pacing(&self) -> Pacing {
        Pacing {
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, HeraldError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| HeraldError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    parse(&content)
}

/// Parse and validate configuration text.
pub fn parse(content: &str) -> Result<Config, HeraldError> {
    let config: Config = toml::from_str(content)
        .map_err(|e| HeraldError::Config(format!("failed to parse config: {}", e)))?;

    if config.campaign.min_delay_ms > config.campaign.max_delay_ms {
        return Err(HeraldError::Config(format!(
            "campaign.min_delay_ms ({}) must not exceed campaign.max_delay_ms ({})",
            config.campaign.min_delay_ms, config.campaign.max_delay_ms
        )));
    }
    if config.campaign.event_buffer == 0 {
        return Err(HeraldError::Config(
            "campaign.event_buffer must be at least 1".into(),
        ));
    }

    Ok(config)
}
