//! Channel identity resolution
//!
//! Right after playback starts the player's info labels are often still empty
//! or hold placeholder text. The resolver polls a ranked list of labels until one
//! carries a real channel name, then falls back to the structured now-playing
//! query.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::IdentityConfig;
use crate::host::PlayerHost;

/// Info labels polled for a channel name, most specific first
pub const CHANNEL_LABELS: &[&str] = &[
    "PVR.ChannelName",
    "VideoPlayer.ChannelName",
    "ListItem.ChannelName",
    "ListItem.Label",
    "ListItem.Title",
    "VideoPlayer.Title",
    "VideoPlayer.TVShowTitle",
    "VideoPlayer.OriginalTitle",
    "Player.Title",
];

/// Values the player reports while it has no real metadata yet
const UNKNOWN_SENTINELS: &[&str] = &[
    "UNKNOWN",
    "Unknown",
    "Unknown Title",
    "Unknown Title (Unmatched)",
    "Live TV",
];

/// True when `value` carries no usable channel name.
///
/// A label echoing its own name (e.g. `PVR.ChannelName`) means the player has
/// not populated it yet and counts the same as an unknown sentinel.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || UNKNOWN_SENTINELS.contains(&value) || CHANNEL_LABELS.contains(&value)
}

pub struct IdentityResolver {
    max_wait: Duration,
    poll_interval: Duration,
}

impl IdentityResolver {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            max_wait: config.max_wait,
            poll_interval: config.poll_interval,
        }
    }

    /// Resolve the channel being watched.
    ///
    /// Returns `None` when neither the label poll nor the now-playing query
    /// produced a name. That is a normal outcome and is only logged.
    pub async fn resolve<H>(&self, host: &H) -> Option<String>
    where
        H: PlayerHost + ?Sized,
    {
        let deadline = Instant::now() + self.max_wait;
        let mut last_seen: BTreeMap<&str, String> = BTreeMap::new();

        loop {
            match host.info_labels(CHANNEL_LABELS).await {
                Ok(values) => {
                    for (label, value) in CHANNEL_LABELS.iter().zip(values) {
                        let value = value.trim();
                        if value.is_empty() {
                            continue;
                        }
                        last_seen.insert(*label, value.to_string());
                        if !is_placeholder(value) {
                            debug!("Channel resolved from {}: '{}'", label, value);
                            return Some(value.to_string());
                        }
                    }
                }
                Err(e) => warn!("Info label query failed: {}", e),
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep(self.poll_interval).await;
        }

        if let Some(channel) = self.resolve_from_now_playing(host).await {
            return Some(channel);
        }

        if !last_seen.is_empty() {
            let pairs: Vec<String> = last_seen
                .iter()
                .map(|(label, value)| format!("{label}='{value}'"))
                .collect();
            info!("Channel labels unresolved; last seen: {}", pairs.join("; "));
        }
        None
    }

    async fn resolve_from_now_playing<H>(&self, host: &H) -> Option<String>
    where
        H: PlayerHost + ?Sized,
    {
        let item = match host.now_playing().await {
            Ok(item) => item,
            Err(e) => {
                warn!("Now-playing channel lookup failed: {}", e);
                return None;
            }
        };

        [&item.channel, &item.label, &item.title, &item.showtitle]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !is_placeholder(value))
            .map(|value| {
                debug!("Channel resolved from now-playing item: '{}'", value);
                value.to_string()
            })
    }
}
