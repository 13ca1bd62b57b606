//! Shared data model for the switching engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Short alphabetic code for a channel's country of broadcast origin.
///
/// Always stored upper-cased. Construction rejects anything that is not
/// 2 or 3 ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let valid_len = (2..=3).contains(&trimmed.len());
        if valid_len && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(trimmed.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid country code '{value}'"))
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

/// Persisted record of the last switch request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    #[serde(default)]
    pub last_profile: String,
    /// Epoch seconds of the last applied switch
    #[serde(default, rename = "ts")]
    pub timestamp: i64,
}

/// Outcome of waiting for a switch to take effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationResult {
    pub success: bool,
    pub reason: String,
}

impl ConfirmationResult {
    pub fn success<S: Into<String>>(reason: S) -> Self {
        Self {
            success: true,
            reason: reason.into(),
        }
    }

    pub fn failure<S: Into<String>>(reason: S) -> Self {
        Self {
            success: false,
            reason: reason.into(),
        }
    }
}

/// Subset of the player's now-playing item used for channel identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NowPlayingItem {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channeltype: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub showtitle: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Notifications delivered by the media player host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    PlaybackStarted,
    PlaybackStopped,
    /// The host is shutting down; the service should exit
    HostQuit,
}
