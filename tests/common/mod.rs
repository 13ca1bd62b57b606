#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use channel_vpn_switch::config::Config;
use channel_vpn_switch::errors::{AppError, AppResult};
use channel_vpn_switch::host::{EventSource, PlayerHost};
use channel_vpn_switch::models::{NowPlayingItem, PlayerEvent};

pub const PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="bbcone.uk" tvg-name="BBC One HD" tvg-country="GB" group-title="UK",BBC One HD
http://example.invalid/bbc1
#EXTINF:-1 tvg-id="npo1.nl" group-title="NL",NPO 1
http://example.invalid/npo1
#EXTINF:-1 tvg-id="mystery" group-title="Misc",Mystery TV
http://example.invalid/mystery
"#;

type PluginHook = Box<dyn Fn(&str) + Send + Sync>;

/// In-memory stand-in for the media player
pub struct FakeKodi {
    pub live: bool,
    pub channel_label: String,
    pub now_playing: NowPlayingItem,
    pub fail_plugin: bool,
    pub panic_on_live_check: bool,
    pub on_plugin: Option<PluginHook>,
    pub plugin_urls: Mutex<Vec<String>>,
    pub live_checks: AtomicUsize,
}

impl FakeKodi {
    pub fn live(channel: &str) -> Self {
        Self {
            live: true,
            channel_label: channel.to_string(),
            now_playing: NowPlayingItem::default(),
            fail_plugin: false,
            panic_on_live_check: false,
            on_plugin: None,
            plugin_urls: Mutex::new(Vec::new()),
            live_checks: AtomicUsize::new(0),
        }
    }

    pub fn not_live() -> Self {
        Self {
            live: false,
            ..Self::live("")
        }
    }

    pub fn on_plugin<F: Fn(&str) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_plugin = Some(Box::new(hook));
        self
    }

    pub fn plugin_urls(&self) -> Vec<String> {
        self.plugin_urls.lock().unwrap().clone()
    }

    pub fn live_checks(&self) -> usize {
        self.live_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlayerHost for FakeKodi {
    async fn info_labels(&self, labels: &[&str]) -> AppResult<Vec<String>> {
        Ok(labels
            .iter()
            .map(|label| {
                if *label == "PVR.ChannelName" {
                    self.channel_label.clone()
                } else {
                    String::new()
                }
            })
            .collect())
    }

    async fn is_live_tv(&self) -> AppResult<bool> {
        self.live_checks.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_live_check {
            panic!("player host exploded");
        }
        Ok(self.live)
    }

    async fn now_playing(&self) -> AppResult<NowPlayingItem> {
        Ok(self.now_playing.clone())
    }

    async fn run_plugin(&self, plugin_url: &str) -> AppResult<()> {
        if self.fail_plugin {
            return Err(AppError::host_rpc("Addons.ExecuteAddon", "addon not installed"));
        }
        self.plugin_urls.lock().unwrap().push(plugin_url.to_string());
        if let Some(hook) = &self.on_plugin {
            hook(plugin_url);
        }
        Ok(())
    }
}

/// Events replayed in order; the stream ends when they run out
pub struct ScriptedEvents(pub VecDeque<PlayerEvent>);

impl ScriptedEvents {
    pub fn new<I: IntoIterator<Item = PlayerEvent>>(events: I) -> Self {
        Self(events.into_iter().collect())
    }
}

#[async_trait]
impl EventSource for ScriptedEvents {
    async fn next_event(&mut self) -> Option<PlayerEvent> {
        self.0.pop_front()
    }
}

/// Config rooted in a scratch directory with the playlist in place
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = root.join("data");
    config.paths.channel_map_path = None;
    config.paths.fallback_channel_maps = Vec::new();
    config.paths.vpn_manager_log = root.join("service.log");
    config.confirm.sys_class_net = root.join("sys").join("class").join("net");

    std::fs::create_dir_all(&config.paths.data_dir).unwrap();
    std::fs::create_dir_all(&config.confirm.sys_class_net).unwrap();
    std::fs::write(config.paths.data_dir_playlist(), PLAYLIST).unwrap();
    config
}

pub fn write_profiles(config: &Config, json: &str) {
    std::fs::write(config.paths.profile_config_file(), json).unwrap();
}

pub fn set_rx(sys_class_net: &Path, iface: &str, rx: u64) {
    let stats = sys_class_net.join(iface).join("statistics");
    std::fs::create_dir_all(&stats).unwrap();
    std::fs::write(stats.join("rx_bytes"), format!("{rx}\n")).unwrap();
}

pub fn append_line(path: &Path, line: &str) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    writeln!(file, "{line}").unwrap();
}
