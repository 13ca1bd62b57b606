use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use channel_vpn_switch::{
    actuator::PluginActuator,
    config::{Config, defaults::CHANNEL_MAP_ENV_OVERRIDE},
    host::{KodiHost, PlayerHost},
    pipeline::{EngineContext, SwitchEngine},
    service::{RunExit, SwitchService},
};

#[derive(Parser)]
#[command(name = "channel-vpn-switch")]
#[command(version)]
#[command(about = "Switches the VPN profile to match the country of the live TV channel being watched")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Kodi JSON-RPC host (overrides config file)
    #[arg(short = 'H', long, value_name = "HOST")]
    kodi_host: Option<String>,

    /// Kodi JSON-RPC TCP port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    kodi_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch Kodi playback and switch VPN profiles (default)
    Run,
    /// Show which country and profile a channel name maps to, without switching
    Resolve {
        /// Channel name as reported by the player
        channel: String,
    },
}

fn init_logging(log_level: &str, log_file: Option<&std::path::Path>) {
    let log_filter = format!("channel_vpn_switch={log_level}");
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| log_filter.clone().into())
    };

    let opened = log_file.map(|path| {
        let file = OpenOptions::new().create(true).append(true).open(path);
        (path, file)
    });
    let file_layer = match opened {
        Some((_, Ok(file))) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter()),
        ),
        Some((path, Err(e))) => {
            eprintln!(
                "Warning: cannot open log file {}: {}; logging to console only",
                path.display(),
                e
            );
            None
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down"),
                }
            }
            _ => {
                error!("Cannot install signal handlers; waiting for Ctrl+C only");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)?;
    init_logging(&cli.log_level, config.logging.file.as_deref());

    info!("Starting channel VPN switcher v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", cli.config);

    config.apply_kodi_overrides(cli.kodi_host, cli.kodi_port)?;

    let channel_map_override = std::env::var(CHANNEL_MAP_ENV_OVERRIDE).ok();
    let context = EngineContext::load(&config, channel_map_override.as_deref());
    info!(
        "Channel map: {} entries{}; profiles: {} mappings; cooldown {}s",
        context.channel_map.len(),
        context
            .channel_map
            .source()
            .map(|p| format!(" from {}", p.display()))
            .unwrap_or_default(),
        context.profiles.len(),
        context.gatekeeper.cooldown().as_secs()
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Resolve { channel } => {
            let plan = context.plan(&channel);
            println!(
                "channel='{}' country={} display={} profile={}",
                plan.channel,
                plan.country
                    .as_ref()
                    .map_or("-".to_string(), ToString::to_string),
                plan.target.display_code,
                plan.target.profile.as_deref().unwrap_or("(no switch)")
            );
            Ok(())
        }
        Command::Run => {
            let kodi = Arc::new(KodiHost::new());
            let host: Arc<dyn PlayerHost> = kodi.clone();
            let actuator = Arc::new(PluginActuator::new(host.clone(), &config.actuator));
            let engine = SwitchEngine::new(context, host, actuator, &config);
            let mut service = SwitchService::new(engine);

            info!(
                "Watching Kodi at {}:{} for live TV playback",
                config.kodi.host, config.kodi.port
            );
            let exit = service
                .run_with_kodi(&kodi, &config.kodi, shutdown_signal())
                .await;
            match exit {
                RunExit::HostQuit | RunExit::Aborted => info!("Service stopped ({:?})", exit),
                RunExit::Disconnected => error!("Service stopped unexpectedly"),
            }
            Ok(())
        }
    }
}
