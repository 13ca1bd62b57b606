use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub switching: SwitchingConfig,
    #[serde(default)]
    pub confirm: ConfirmConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub kodi: KodiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the service finds its data files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding cc_to_profile.json, state.json and an optional pruned_tv.m3u
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Explicitly configured channel-country map (highest priority source)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_map_path: Option<PathBuf>,
    /// Channel-country maps tried after the data directory playlist
    #[serde(default = "default_fallback_channel_maps")]
    pub fallback_channel_maps: Vec<PathBuf>,
    /// The VPN manager add-on's own service log, tailed for connection confirmation
    #[serde(default = "default_vpn_manager_log")]
    pub vpn_manager_log: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Delay after playback starts before info labels are queried
    #[serde(default = "default_settle_delay", with = "duration")]
    pub settle_delay: Duration,
    #[serde(default = "default_identity_max_wait", with = "duration")]
    pub max_wait: Duration,
    #[serde(default = "default_identity_poll_interval", with = "duration")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchingConfig {
    /// Minimum time between two switches to the same profile
    #[serde(default = "default_cooldown", with = "duration")]
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    #[serde(default = "default_confirm_timeout", with = "duration")]
    pub timeout: Duration,
    #[serde(default = "default_confirm_poll_interval", with = "duration")]
    pub poll_interval: Duration,
    /// Number of trailing VPN manager log lines scanned per poll
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
    /// Received bytes a tunnel interface must gain before it counts as connected
    #[serde(default = "default_rx_growth_threshold")]
    pub rx_growth_threshold: u64,
    #[serde(default = "default_interface_prefixes")]
    pub interface_prefixes: Vec<String>,
    #[serde(default = "default_sys_class_net")]
    pub sys_class_net: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default = "default_addon_id")]
    pub addon_id: String,
    #[serde(default = "default_switch_action")]
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KodiConfig {
    #[serde(default = "default_kodi_host")]
    pub host: String,
    #[serde(default = "default_kodi_port")]
    pub port: u16,
    #[serde(default = "default_kodi_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_kodi_reconnect_delay", with = "duration")]
    pub reconnect_delay: Duration,
    #[serde(default = "default_kodi_reconnect_max_delay", with = "duration")]
    pub reconnect_max_delay: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Optional file that receives a copy of the service log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Path defaults
fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_fallback_channel_maps() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_FALLBACK_CHANNEL_MAP)]
}

fn default_vpn_manager_log() -> PathBuf {
    PathBuf::from(DEFAULT_VPN_MANAGER_LOG)
}

// Identity defaults
fn default_settle_delay() -> Duration {
    Duration::from_millis(DEFAULT_SETTLE_DELAY_MS)
}

fn default_identity_max_wait() -> Duration {
    Duration::from_millis(DEFAULT_IDENTITY_MAX_WAIT_MS)
}

fn default_identity_poll_interval() -> Duration {
    Duration::from_millis(DEFAULT_IDENTITY_POLL_INTERVAL_MS)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(DEFAULT_COOLDOWN_SECONDS)
}

// Confirmation defaults
fn default_confirm_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECONDS)
}

fn default_confirm_poll_interval() -> Duration {
    Duration::from_millis(DEFAULT_CONFIRM_POLL_INTERVAL_MS)
}

fn default_log_tail_lines() -> usize {
    DEFAULT_LOG_TAIL_LINES
}

fn default_rx_growth_threshold() -> u64 {
    DEFAULT_RX_GROWTH_THRESHOLD
}

fn default_interface_prefixes() -> Vec<String> {
    DEFAULT_INTERFACE_PREFIXES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_sys_class_net() -> PathBuf {
    PathBuf::from(DEFAULT_SYS_CLASS_NET)
}

fn default_addon_id() -> String {
    DEFAULT_VPN_MANAGER_ADDON_ID.to_string()
}

fn default_switch_action() -> String {
    DEFAULT_SWITCH_ACTION.to_string()
}

// Kodi defaults
fn default_kodi_host() -> String {
    DEFAULT_KODI_HOST.to_string()
}

fn default_kodi_port() -> u16 {
    DEFAULT_KODI_PORT
}

fn default_kodi_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_KODI_REQUEST_TIMEOUT_SECONDS)
}

fn default_kodi_reconnect_delay() -> Duration {
    Duration::from_secs(DEFAULT_KODI_RECONNECT_DELAY_SECONDS)
}

fn default_kodi_reconnect_max_delay() -> Duration {
    Duration::from_secs(DEFAULT_KODI_RECONNECT_MAX_DELAY_SECONDS)
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            channel_map_path: None,
            fallback_channel_maps: default_fallback_channel_maps(),
            vpn_manager_log: default_vpn_manager_log(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            max_wait: default_identity_max_wait(),
            poll_interval: default_identity_poll_interval(),
        }
    }
}

impl Default for SwitchingConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
        }
    }
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            timeout: default_confirm_timeout(),
            poll_interval: default_confirm_poll_interval(),
            log_tail_lines: default_log_tail_lines(),
            rx_growth_threshold: default_rx_growth_threshold(),
            interface_prefixes: default_interface_prefixes(),
            sys_class_net: default_sys_class_net(),
        }
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            addon_id: default_addon_id(),
            action: default_switch_action(),
        }
    }
}

impl Default for KodiConfig {
    fn default() -> Self {
        Self {
            host: default_kodi_host(),
            port: default_kodi_port(),
            request_timeout: default_kodi_request_timeout(),
            reconnect_delay: default_kodi_reconnect_delay(),
            reconnect_max_delay: default_kodi_reconnect_max_delay(),
        }
    }
}

impl PathsConfig {
    pub fn profile_config_file(&self) -> PathBuf {
        self.data_dir.join(PROFILE_CONFIG_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    pub fn data_dir_playlist(&self) -> PathBuf {
        self.data_dir.join(DATA_DIR_PLAYLIST)
    }
}

impl Config {
    /// Layer defaults, the TOML file and `CHANNEL_VPN_*` environment variables.
    ///
    /// A missing file is created with the default configuration first.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let path = Path::new(config_file);
        if !path.exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the polling loops spin or never run
    pub fn validate(&self) -> AppResult<()> {
        let intervals = [
            ("identity.poll_interval", self.identity.poll_interval),
            ("confirm.poll_interval", self.confirm.poll_interval),
            ("kodi.reconnect_delay", self.kodi.reconnect_delay),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(AppError::configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.kodi.reconnect_max_delay < self.kodi.reconnect_delay {
            return Err(AppError::configuration(
                "kodi.reconnect_max_delay must not be shorter than kodi.reconnect_delay",
            ));
        }
        if self.kodi.host.trim().is_empty() {
            return Err(AppError::configuration("kodi.host must not be empty"));
        }
        Ok(())
    }

    /// Apply command-line endpoint overrides and re-check the result
    pub fn apply_kodi_overrides(
        &mut self,
        host: Option<String>,
        port: Option<u16>,
    ) -> AppResult<()> {
        if let Some(host) = host {
            self.kodi.host = host;
        }
        if let Some(port) = port {
            self.kodi.port = port;
        }
        self.validate()
    }
}
