//! Driver configuration management

use crate::serial::{DiscoverySettings, ErgometerSettings};
use crate::wireless::WirelessSettings;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub ergometer: ErgometerConfig,
    #[serde(default)]
    pub wireless: WirelessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
    /// Seconds between metric log lines (0 = disabled)
    #[serde(default = "GeneralSettings::default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            metrics_interval_secs: Self::default_metrics_interval(),
        }
    }
}

impl GeneralSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_metrics_interval() -> u64 {
        30
    }
}

/// Ergometer settings
///
/// # Example Configuration
/// ```toml
/// [ergometer]
/// port = "/dev/ttyUSB0"
/// excluded_ports = ["/dev/ttyAMA0"]  # Raspberry Pi console
/// poll_interval_ms = 500
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErgometerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Port tried first by discovery
    #[serde(default)]
    pub port: Option<String>,
    /// Ports discovery never probes
    #[serde(default)]
    pub excluded_ports: Vec<String>,
    #[serde(default = "ErgometerConfig::default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "ErgometerConfig::default_startup_delay")]
    pub startup_delay_ms: u64,
    #[serde(default = "ErgometerConfig::default_sweep_delay")]
    pub sweep_delay_ms: u64,
    #[serde(default = "ErgometerConfig::default_exchange_timeout")]
    pub write_timeout_ms: u64,
    #[serde(default = "ErgometerConfig::default_exchange_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "ErgometerConfig::default_probe_write_timeout")]
    pub probe_write_timeout_ms: u64,
    #[serde(default = "ErgometerConfig::default_probe_read_timeout")]
    pub probe_read_timeout_ms: u64,
    /// Load queued when a bike with load control connects
    #[serde(default = "ErgometerConfig::default_load")]
    pub default_load: u32,
}

impl Default for ErgometerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            excluded_ports: Vec::new(),
            poll_interval_ms: Self::default_poll_interval(),
            startup_delay_ms: Self::default_startup_delay(),
            sweep_delay_ms: Self::default_sweep_delay(),
            write_timeout_ms: Self::default_exchange_timeout(),
            read_timeout_ms: Self::default_exchange_timeout(),
            probe_write_timeout_ms: Self::default_probe_write_timeout(),
            probe_read_timeout_ms: Self::default_probe_read_timeout(),
            default_load: Self::default_load(),
        }
    }
}

impl ErgometerConfig {
    fn default_poll_interval() -> u64 {
        common::session::DEFAULT_POLL_INTERVAL_MS
    }

    fn default_startup_delay() -> u64 {
        200
    }

    fn default_sweep_delay() -> u64 {
        500
    }

    fn default_exchange_timeout() -> u64 {
        500
    }

    fn default_probe_write_timeout() -> u64 {
        2000
    }

    fn default_probe_read_timeout() -> u64 {
        1000
    }

    fn default_load() -> u32 {
        100
    }

    /// Worker settings; the preferred port travels through the session
    pub fn settings(&self) -> ErgometerSettings {
        ErgometerSettings {
            startup_delay: Duration::from_millis(self.startup_delay_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            default_load: self.default_load,
            discovery: DiscoverySettings {
                preferred: None,
                excluded: self.excluded_ports.clone(),
                probe_write_timeout: Duration::from_millis(self.probe_write_timeout_ms),
                probe_read_timeout: Duration::from_millis(self.probe_read_timeout_ms),
                sweep_delay: Duration::from_millis(self.sweep_delay_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirelessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Stick ids as VID:PID (e.g. "0x0fcf:0x1008")
    #[serde(default = "WirelessConfig::default_usb_ids")]
    pub usb_ids: Vec<String>,
    #[serde(default)]
    pub network: u8,
    /// Channel the power meter transmits on
    #[serde(default = "WirelessConfig::default_channel")]
    pub power_meter_channel: u8,
    #[serde(default = "WirelessConfig::default_device_number")]
    pub device_number: u16,
    #[serde(default = "WirelessConfig::default_idle_sleep")]
    pub idle_sleep_ms: u64,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            usb_ids: Self::default_usb_ids(),
            network: 0,
            power_meter_channel: Self::default_channel(),
            device_number: Self::default_device_number(),
            idle_sleep_ms: Self::default_idle_sleep(),
        }
    }
}

impl WirelessConfig {
    fn default_usb_ids() -> Vec<String> {
        crate::wireless::DEFAULT_USB_IDS
            .iter()
            .map(|(vid, pid)| format!("0x{:04x}:0x{:04x}", vid, pid))
            .collect()
    }

    fn default_channel() -> u8 {
        1
    }

    fn default_device_number() -> u16 {
        1
    }

    fn default_idle_sleep() -> u64 {
        5
    }

    /// Parsed stick ids; entries that fail to parse are skipped
    pub fn parsed_usb_ids(&self) -> Vec<(u16, u16)> {
        self.usb_ids
            .iter()
            .filter_map(|id| parse_usb_id(id).ok())
            .collect()
    }

    pub fn settings(&self) -> WirelessSettings {
        WirelessSettings {
            network: self.network,
            idle_sleep: Duration::from_millis(self.idle_sleep_ms),
            ..WirelessSettings::default()
        }
    }
}

fn default_true() -> bool {
    true
}

/// Parse "0xVVVV:0xPPPP"
pub fn parse_usb_id(id: &str) -> Result<(u16, u16)> {
    let (vid, pid) = id
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid USB id '{}', expected VID:PID (e.g. '0x0fcf:0x1008')", id))?;
    Ok((parse_hex_id(vid, "VID")?, parse_hex_id(pid, "PID")?))
}

fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("Invalid {} '{}', must start with '0x' (e.g., '0x0fcf')", name, id))?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

impl DriverConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/trainer-driver/driver.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: DriverConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("trainer-driver").join("driver.toml")
        } else {
            PathBuf::from(".config/trainer-driver/driver.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.ergometer.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }

        for id in &self.wireless.usb_ids {
            parse_usb_id(id)?;
        }

        if protocol::Channel::new(self.wireless.power_meter_channel).is_none() {
            return Err(anyhow!(
                "Invalid power_meter_channel {}, must be 0-{}",
                self.wireless.power_meter_channel,
                protocol::CHANNEL_COUNT - 1
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.ergometer.poll_interval_ms, 1000);
        assert_eq!(config.ergometer.default_load, 100);
        assert!(config.wireless.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("0x0fcf:0x1008").unwrap(), (0x0fcf, 0x1008));
        assert_eq!(parse_usb_id("0X0FCF:0x1009").unwrap(), (0x0fcf, 0x1009));
        assert!(parse_usb_id("0fcf:1008").is_err());
        assert!(parse_usb_id("0x0fcf").is_err());
        assert!(parse_usb_id("0x12345:0x1008").is_err());
        assert!(parse_usb_id("0xGHIJ:0x1008").is_err());
    }

    #[test]
    fn test_default_usb_ids_roundtrip() {
        let config = WirelessConfig::default();
        assert_eq!(
            config.parsed_usb_ids(),
            crate::wireless::DEFAULT_USB_IDS.to_vec()
        );
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = DriverConfig::default();
        config.ergometer.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_channel() {
        let mut config = DriverConfig::default();
        config.wireless.power_meter_channel = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_conversion() {
        let mut config = ErgometerConfig::default();
        config.excluded_ports = vec!["/dev/ttyAMA0".to_string()];
        config.sweep_delay_ms = 10;

        let settings = config.settings();
        assert_eq!(settings.discovery.excluded, config.excluded_ports);
        assert_eq!(settings.discovery.sweep_delay, Duration::from_millis(10));
        assert_eq!(settings.default_load, 100);
    }
}
