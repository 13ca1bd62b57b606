/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Path defaults
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_FALLBACK_CHANNEL_MAP: &str = "/storage/downloads/pruned_tv.m3u";
pub const DEFAULT_VPN_MANAGER_LOG: &str =
    "/storage/.kodi/userdata/addon_data/service.vpn.manager/service.log";
pub const PROFILE_CONFIG_FILE: &str = "cc_to_profile.json";
pub const STATE_FILE: &str = "state.json";
pub const DATA_DIR_PLAYLIST: &str = "pruned_tv.m3u";

// Identity resolution defaults
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 700;
pub const DEFAULT_IDENTITY_MAX_WAIT_MS: u64 = 5000;
pub const DEFAULT_IDENTITY_POLL_INTERVAL_MS: u64 = 200;

// Switching defaults
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 20;

// Confirmation defaults
pub const DEFAULT_CONFIRM_TIMEOUT_SECONDS: u64 = 20;
pub const DEFAULT_CONFIRM_POLL_INTERVAL_MS: u64 = 800;
pub const DEFAULT_LOG_TAIL_LINES: usize = 80;
pub const DEFAULT_RX_GROWTH_THRESHOLD: u64 = 4096;
pub const DEFAULT_INTERFACE_PREFIXES: &[&str] = &["tun", "wg"];
pub const DEFAULT_SYS_CLASS_NET: &str = "/sys/class/net";

// Actuator defaults
pub const DEFAULT_VPN_MANAGER_ADDON_ID: &str = "service.vpn.manager";
pub const DEFAULT_SWITCH_ACTION: &str = "SwitchVPN";

// Kodi JSON-RPC defaults
pub const DEFAULT_KODI_HOST: &str = "127.0.0.1";
pub const DEFAULT_KODI_PORT: u16 = 9090;
pub const DEFAULT_KODI_REQUEST_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_KODI_RECONNECT_DELAY_SECONDS: u64 = 2;
pub const DEFAULT_KODI_RECONNECT_MAX_DELAY_SECONDS: u64 = 60;

// Environment
pub const ENV_PREFIX: &str = "CHANNEL_VPN_";
pub const CHANNEL_MAP_ENV_OVERRIDE: &str = "CHANNEL_CC_MAP";
