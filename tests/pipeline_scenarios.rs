mod common;

use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;

use channel_vpn_switch::actuator::PluginActuator;
use channel_vpn_switch::config::Config;
use channel_vpn_switch::models::{NowPlayingItem, SwitchState};
use channel_vpn_switch::pipeline::{EngineContext, PipelineOutcome, SwitchEngine};
use common::{FakeKodi, append_line, set_rx, test_config, write_profiles};

const UK_PROFILES: &str = r#"{"GB": "uk_profile", "NL": "nl_profile"}"#;

fn engine(config: &Config, host: Arc<FakeKodi>) -> SwitchEngine {
    let context = EngineContext::load(config, None);
    let actuator = Arc::new(PluginActuator::new(host.clone(), &config.actuator));
    SwitchEngine::new(context, host, actuator, config)
}

fn read_state(config: &Config) -> Option<SwitchState> {
    let content = std::fs::read_to_string(config.paths.state_file()).ok()?;
    Some(serde_json::from_str(&content).unwrap())
}

fn connected_when_switched(config: &Config, host: FakeKodi) -> FakeKodi {
    let log = config.paths.vpn_manager_log.clone();
    host.on_plugin(move |url| {
        let profile = if url.ends_with("uk_profile") { "uk_profile" } else { "other" };
        append_line(&log, &format!("VPN Manager: Connected to {profile}"));
    })
}

#[tokio::test(start_paused = true)]
async fn test_live_channel_switches_and_persists() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);
    append_line(&config.paths.vpn_manager_log, "VPN Manager: Connected to nl_profile");

    let host = Arc::new(connected_when_switched(&config, FakeKodi::live("BBC One HD")));
    let mut engine = engine(&config, host.clone());

    let before = Utc::now().timestamp();
    let outcome = engine.handle_playback_started().await;
    let after = Utc::now().timestamp();

    match outcome {
        PipelineOutcome::Switched {
            channel,
            display_code,
            profile,
            confirmation,
        } => {
            assert_eq!(channel, "BBC One HD");
            assert_eq!(display_code, "GB");
            assert_eq!(profile, "uk_profile");
            assert!(confirmation.success);
            assert_eq!(confirmation.reason, "VPN Manager reports Connected");
        }
        other => panic!("expected a switch, got {other:?}"),
    }

    assert_eq!(
        host.plugin_urls(),
        ["plugin://service.vpn.manager/?action=SwitchVPN&name=uk_profile"]
    );
    let state = read_state(&config).unwrap();
    assert_eq!(state.last_profile, "uk_profile");
    assert!(state.timestamp >= before && state.timestamp <= after);
}

#[tokio::test(start_paused = true)]
async fn test_recent_same_profile_is_suppressed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);

    let ts = Utc::now().timestamp() - 5;
    let persisted = format!(r#"{{"last_profile": "uk_profile", "ts": {ts}}}"#);
    std::fs::write(config.paths.state_file(), &persisted).unwrap();

    let host = Arc::new(FakeKodi::live("BBC One HD"));
    let outcome = engine(&config, host.clone()).handle_playback_started().await;

    match outcome {
        PipelineOutcome::Suppressed { profile, age_secs } => {
            assert_eq!(profile, "uk_profile");
            assert!((5..=7).contains(&age_secs));
        }
        other => panic!("expected suppression, got {other:?}"),
    }
    assert!(host.plugin_urls().is_empty());
    assert_eq!(
        std::fs::read_to_string(config.paths.state_file()).unwrap(),
        persisted
    );
}

#[tokio::test(start_paused = true)]
async fn test_same_profile_after_cooldown_switches_again() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);

    let ts = Utc::now().timestamp() - 60;
    std::fs::write(
        config.paths.state_file(),
        format!(r#"{{"last_profile": "uk_profile", "ts": {ts}}}"#),
    )
    .unwrap();

    let host = Arc::new(connected_when_switched(&config, FakeKodi::live("BBC One HD")));
    let outcome = engine(&config, host.clone()).handle_playback_started().await;

    assert!(matches!(outcome, PipelineOutcome::Switched { .. }));
    assert_eq!(host.plugin_urls().len(), 1);
    assert!(read_state(&config).unwrap().timestamp > ts);
}

#[tokio::test(start_paused = true)]
async fn test_non_live_playback_is_ignored() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);

    let host = Arc::new(FakeKodi::not_live());
    let outcome = engine(&config, host.clone()).handle_playback_started().await;

    assert_eq!(outcome, PipelineOutcome::NotLiveTv);
    assert!(host.plugin_urls().is_empty());
    assert!(read_state(&config).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_channel_gives_up_after_max_wait() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);

    let host = Arc::new(FakeKodi::live("Unknown Title"));
    let started = tokio::time::Instant::now();
    let outcome = engine(&config, host.clone()).handle_playback_started().await;

    assert_eq!(outcome, PipelineOutcome::NoChannel);
    assert!(started.elapsed() >= config.identity.settle_delay + config.identity.max_wait);
    assert!(host.plugin_urls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_channel_from_now_playing_fallback() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);

    let mut fake = FakeKodi::live("PVR.ChannelName");
    fake.now_playing = NowPlayingItem {
        channel: Some("NPO 1".to_string()),
        ..NowPlayingItem::default()
    };
    let host = Arc::new(fake);
    let outcome = engine(&config, host.clone()).handle_playback_started().await;

    match outcome {
        PipelineOutcome::Switched {
            display_code,
            profile,
            confirmation,
            ..
        } => {
            assert_eq!(display_code, "NL");
            assert_eq!(profile, "nl_profile");
            assert!(!confirmation.success);
        }
        other => panic!("expected a switch, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unknown_country_leaves_vpn_alone() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);

    let host = Arc::new(FakeKodi::live("Mystery TV"));
    let outcome = engine(&config, host.clone()).handle_playback_started().await;

    assert_eq!(
        outcome,
        PipelineOutcome::NoTarget {
            channel: "Mystery TV".to_string(),
            display_code: "UNKNOWN".to_string(),
        }
    );
    assert!(host.plugin_urls().is_empty());
    assert!(read_state(&config).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_country_uses_default_profile_and_times_out() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(
        &config,
        r#"{
            "profiles": {"home": {"label": "Home VPN"}},
            "default_profile": "home",
            "default_when_unknown": "Default"
        }"#,
    );
    append_line(&config.paths.vpn_manager_log, "Connecting to Home VPN...");

    let host = Arc::new(FakeKodi::live("Mystery TV"));
    let started = tokio::time::Instant::now();
    let outcome = engine(&config, host.clone()).handle_playback_started().await;

    match outcome {
        PipelineOutcome::Switched {
            display_code,
            profile,
            confirmation,
            ..
        } => {
            assert_eq!(display_code, "DEFAULT");
            assert_eq!(profile, "Home VPN");
            assert!(!confirmation.success);
            assert!(confirmation.reason.starts_with("Timeout waiting for VPN connect"));
            assert!(confirmation.reason.contains("Connecting to Home VPN..."));
        }
        other => panic!("expected a switch, got {other:?}"),
    }
    assert!(started.elapsed() >= config.confirm.timeout);
    assert_eq!(
        host.plugin_urls(),
        ["plugin://service.vpn.manager/?action=SwitchVPN&name=Home+VPN"]
    );
    // Committed even though the connection never confirmed
    assert_eq!(read_state(&config).unwrap().last_profile, "Home VPN");
}

#[tokio::test(start_paused = true)]
async fn test_tunnel_traffic_confirms_switch() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);
    let net = config.confirm.sys_class_net.clone();
    set_rx(&net, "eth0", 10);
    set_rx(&net, "tun0", 1_000);

    let host = Arc::new(FakeKodi::live("BBC One HD").on_plugin(move |_| {
        set_rx(&net, "tun0", 100_000);
    }));
    let outcome = engine(&config, host).handle_playback_started().await;

    match outcome {
        PipelineOutcome::Switched { confirmation, .. } => {
            assert!(confirmation.success);
            assert_eq!(confirmation.reason, "Tunnel tun0 active (rx_bytes grew)");
        }
        other => panic!("expected a switch, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_dispatch_is_not_committed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_profiles(&config, UK_PROFILES);

    let mut fake = FakeKodi::live("BBC One HD");
    fake.fail_plugin = true;
    let outcome = engine(&config, Arc::new(fake)).handle_playback_started().await;

    assert_eq!(
        outcome,
        PipelineOutcome::DispatchFailed {
            profile: "uk_profile".to_string()
        }
    );
    assert!(read_state(&config).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_channel_map_keeps_engine_dormant() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    std::fs::remove_file(config.paths.data_dir_playlist()).unwrap();
    write_profiles(&config, UK_PROFILES);

    let host = Arc::new(FakeKodi::live("BBC One HD"));
    let mut engine = engine(&config, host.clone());
    assert!(engine.context().channel_map.is_empty());

    let outcome = engine.handle_playback_started().await;
    assert!(matches!(outcome, PipelineOutcome::NoTarget { .. }));
    assert!(host.plugin_urls().is_empty());
}
