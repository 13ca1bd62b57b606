//! Playback-start switching pipeline
//!
//! settle → live TV check → channel identity → country → profile → dedup →
//! actuate → confirm. Every stage that comes up empty ends the run with a
//! logged [`PipelineOutcome`]; none of them is an error.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::actuator::Actuator;
use crate::config::Config;
use crate::confirm::ConnectionConfirmer;
use crate::host::PlayerHost;
use crate::identity::IdentityResolver;
use crate::models::{ConfirmationResult, CountryCode};
use crate::profiles::{ProfileConfig, ProfileTarget};
use crate::sources::{ChannelCountryMap, channel_map_candidates};
use crate::switching::{StateStore, SwitchDecision, SwitchGatekeeper};

/// How a single playback-start event was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Not PVR playback; left to the VPN manager's own rules
    NotLiveTv,
    /// Live TV, but no channel name could be resolved
    NoChannel,
    /// No profile applies to this channel's country
    NoTarget { channel: String, display_code: String },
    /// Same profile was requested within the cooldown
    Suppressed { profile: String, age_secs: i64 },
    /// The switch request could not be handed to the VPN manager
    DispatchFailed { profile: String },
    Switched {
        channel: String,
        display_code: String,
        profile: String,
        confirmation: ConfirmationResult,
    },
}

/// What a channel name maps to, without side effects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPlan {
    pub channel: String,
    pub country: Option<CountryCode>,
    pub target: ProfileTarget,
}

/// Lookup tables and switch state loaded once at startup
pub struct EngineContext {
    pub channel_map: ChannelCountryMap,
    pub profiles: ProfileConfig,
    pub gatekeeper: SwitchGatekeeper,
}

impl EngineContext {
    /// Load everything from the configured locations. Missing data degrades to
    /// empty tables; it never fails startup.
    pub fn load(config: &Config, channel_map_override: Option<&str>) -> Self {
        let channel_map =
            ChannelCountryMap::load(&channel_map_candidates(&config.paths, channel_map_override));
        let profiles = ProfileConfig::load(&config.paths.profile_config_file());
        let gatekeeper = SwitchGatekeeper::load(
            StateStore::new(config.paths.state_file()),
            config.switching.cooldown,
        );
        Self {
            channel_map,
            profiles,
            gatekeeper,
        }
    }

    pub fn plan(&self, channel: &str) -> SwitchPlan {
        let country = self.channel_map.lookup(channel).cloned();
        let target = self.profiles.resolve(country.as_ref());
        SwitchPlan {
            channel: channel.to_string(),
            country,
            target,
        }
    }
}

pub struct SwitchEngine {
    context: EngineContext,
    host: Arc<dyn PlayerHost>,
    actuator: Arc<dyn Actuator>,
    identity: IdentityResolver,
    confirmer: ConnectionConfirmer,
    settle_delay: Duration,
}

impl SwitchEngine {
    pub fn new(
        context: EngineContext,
        host: Arc<dyn PlayerHost>,
        actuator: Arc<dyn Actuator>,
        config: &Config,
    ) -> Self {
        Self {
            context,
            host,
            actuator,
            identity: IdentityResolver::new(&config.identity),
            confirmer: ConnectionConfirmer::new(&config.confirm, &config.paths.vpn_manager_log),
            settle_delay: config.identity.settle_delay,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Run the full pipeline for one playback start
    pub async fn handle_playback_started(&mut self) -> PipelineOutcome {
        sleep(self.settle_delay).await;

        match self.host.is_live_tv().await {
            Ok(true) => {}
            Ok(false) => {
                info!("Playback detected but not PVR; leaving to VPN Manager add-on rules.");
                return PipelineOutcome::NotLiveTv;
            }
            Err(e) => {
                warn!("Cannot determine playback type ({}); no action.", e);
                return PipelineOutcome::NotLiveTv;
            }
        }

        let Some(channel) = self.identity.resolve(self.host.as_ref()).await else {
            info!("PVR playback but channel name is empty; no action.");
            return PipelineOutcome::NoChannel;
        };

        let plan = self.context.plan(&channel);
        let ProfileTarget {
            profile,
            display_code,
        } = plan.target;

        let profile = match profile.filter(|p| !p.trim().is_empty()) {
            Some(profile) => profile,
            None => {
                match &plan.country {
                    Some(cc) => info!(
                        "No profile mapped for country '{}' (channel '{}'); leaving VPN as-is.",
                        cc, channel
                    ),
                    None => info!(
                        "Channel '{}' has no country; leaving VPN as-is.",
                        channel
                    ),
                }
                return PipelineOutcome::NoTarget {
                    channel,
                    display_code,
                };
            }
        };

        let now = Utc::now().timestamp();
        if let SwitchDecision::Suppress { age_secs } = self.context.gatekeeper.decide(&profile, now) {
            info!(
                "Skip switch: already on '{}' ({}s ago, cooldown {}s).",
                profile,
                age_secs,
                self.context.gatekeeper.cooldown().as_secs()
            );
            return PipelineOutcome::Suppressed { profile, age_secs };
        }

        let before = self.confirmer.probe().snapshot();
        let (iface_before, rx_before) = match &before {
            Some(snapshot) => (
                snapshot.name.as_str(),
                snapshot
                    .rx_bytes
                    .map_or_else(|| "?".to_string(), |rx| rx.to_string()),
            ),
            None => ("none", "?".to_string()),
        };
        info!(
            "PVR start: channel='{}' -> CC={} -> profile='{}' (iface_before={}, rx_before={})",
            channel, display_code, profile, iface_before, rx_before
        );

        if let Err(e) = self.actuator.switch(&profile).await {
            warn!("Switch request for '{}' failed: {}", profile, e);
            return PipelineOutcome::DispatchFailed { profile };
        }
        self.context.gatekeeper.commit(&profile, now);

        let confirmation = self.confirmer.confirm(&profile, before.as_ref()).await;
        if confirmation.success {
            info!("VPN switch result: success=true ({})", confirmation.reason);
        } else {
            warn!("VPN switch result: success=false ({})", confirmation.reason);
        }

        PipelineOutcome::Switched {
            channel,
            display_code,
            profile,
            confirmation,
        }
    }
}
