//! Media player host abstractions
//!
//! The engine never talks to the player directly. It goes through
//! [`PlayerHost`] for queries and plugin execution and through [`EventSource`]
//! for playback notifications, so the whole pipeline can be driven by
//! in-memory fakes in tests.

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::{NowPlayingItem, PlayerEvent};

pub mod kodi;

pub use kodi::{KodiEvents, KodiHost, KodiRpcClient};

/// Queries and commands the engine needs from the media player
#[async_trait]
pub trait PlayerHost: Send + Sync {
    /// Fetch info label values in the same order as `labels`.
    ///
    /// Unknown labels come back as empty strings.
    async fn info_labels(&self, labels: &[&str]) -> AppResult<Vec<String>>;

    /// Whether the current playback is a live TV / radio broadcast
    async fn is_live_tv(&self) -> AppResult<bool>;

    /// Structured "now playing" item from the active video player
    async fn now_playing(&self) -> AppResult<NowPlayingItem>;

    /// Run a `plugin://` URL in the host
    async fn run_plugin(&self, plugin_url: &str) -> AppResult<()>;
}

/// Stream of player notifications
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the host connection is gone
    async fn next_event(&mut self) -> Option<PlayerEvent>;
}
