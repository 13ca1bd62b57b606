//! Channel → country data sources and lookup
//!
//! The channel-country table is loaded once at startup from the first usable
//! source in a priority-ordered candidate list and is read-only afterwards.
//! Sources are either M3U playlists (see [`m3u`]) or flat JSON objects mapping
//! channel names to country codes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::PathsConfig;
use crate::errors::{AppError, AppResult};
use crate::identity::is_placeholder;
use crate::models::CountryCode;

pub mod m3u;

/// Immutable channel name → country table
#[derive(Debug, Clone, Default)]
pub struct ChannelCountryMap {
    entries: HashMap<String, CountryCode>,
    source: Option<PathBuf>,
}

impl ChannelCountryMap {
    /// Build a map from parsed entries, dropping placeholder channel names
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, CountryCode)>,
    {
        let entries = entries
            .into_iter()
            .filter(|(channel, _)| !is_placeholder(channel))
            .collect();
        Self {
            entries,
            source: None,
        }
    }

    fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File the table was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Country for a channel identity.
    ///
    /// Exact match first; otherwise retries with a trailing `" HD"` removed so
    /// HD and SD siblings share a country. No further fuzzing is attempted.
    pub fn lookup(&self, identity: &str) -> Option<&CountryCode> {
        if let Some(country) = self.entries.get(identity) {
            return Some(country);
        }

        let trimmed = identity.trim();
        let base = trimmed.strip_suffix(" HD").unwrap_or(trimmed).trim();
        if base != identity {
            return self.entries.get(base);
        }
        None
    }

    /// Load from the first candidate that yields a non-empty table.
    ///
    /// Missing, unreadable and empty candidates are skipped; if none works the
    /// result is an empty map and switching stays dormant.
    pub fn load(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.is_file() {
                debug!("Channel map candidate not found: {}", path.display());
                continue;
            }
            match load_source(path) {
                Ok(map) if !map.is_empty() => {
                    info!(
                        "Loaded {} channel country mappings from {}",
                        map.len(),
                        path.display()
                    );
                    return map.with_source(path.clone());
                }
                Ok(_) => info!("Channel map {} has no usable entries", path.display()),
                Err(e) => warn!("Cannot load channel map {}: {}", path.display(), e),
            }
        }

        info!("No channel country map found; VPN switching disabled until data is available.");
        Self::default()
    }
}

/// Priority-ordered channel map candidates.
///
/// Explicit configuration first, then the environment override, then the
/// playlist in the data directory, then the configured fallbacks.
pub fn channel_map_candidates(paths: &PathsConfig, env_override: Option<&str>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(configured) = paths
        .channel_map_path
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
    {
        candidates.push(configured.clone());
    }

    if let Some(env_path) = env_override.map(str::trim).filter(|p| !p.is_empty()) {
        candidates.push(PathBuf::from(env_path));
    }

    candidates.push(paths.data_dir_playlist());
    candidates.extend(
        paths
            .fallback_channel_maps
            .iter()
            .filter(|p| !p.as_os_str().is_empty())
            .cloned(),
    );
    candidates
}

fn load_source(path: &Path) -> AppResult<ChannelCountryMap> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || content.trim_start().starts_with('{');

    if is_json {
        parse_json_map(&content)
    } else {
        Ok(ChannelCountryMap::from_entries(m3u::parse_channel_countries(
            &content,
        )))
    }
}

/// Parse a flat `{"channel": "CC"}` JSON object; invalid values are skipped
fn parse_json_map(content: &str) -> AppResult<ChannelCountryMap> {
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(content)
        .map_err(|e| AppError::parse("channel map json", e.to_string()))?;

    let total = raw.len();
    let entries: Vec<(String, CountryCode)> = raw
        .into_iter()
        .filter_map(|(channel, value)| {
            let country = value.as_str().and_then(CountryCode::parse)?;
            Some((channel.trim().to_string(), country))
        })
        .collect();

    if entries.len() < total {
        debug!(
            "Ignored {} channel map entries without a valid country code",
            total - entries.len()
        );
    }
    Ok(ChannelCountryMap::from_entries(entries))
}
