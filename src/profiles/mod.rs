//! Country → VPN profile resolution
//!
//! `cc_to_profile.json` layers three things:
//!
//! ```json
//! {
//!   "profiles": { "uk": { "label": "UK_Docklands (UDP)" } },
//!   "mappings": { "by_country_code": { "GB": "uk", "IE": "uk" } },
//!   "default_profile": "uk",
//!   "default_when_unknown": "default"
//! }
//! ```
//!
//! Profile keys are indirected through `profiles` to their display label, which
//! is the name the VPN manager knows. Older files map countries straight to
//! profile names at the top level (`{"GB": "UK_Docklands (UDP)"}`); those entries
//! are still honoured but never override `mappings.by_country_code`.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::models::CountryCode;

/// Display code reported when the default profile was chosen
pub const DISPLAY_DEFAULT: &str = "DEFAULT";
/// Display code reported when the channel's country is unknown
pub const DISPLAY_UNKNOWN: &str = "UNKNOWN";

/// What to do when no profile is mapped for a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DefaultWhenUnknown {
    /// Leave the current VPN connection untouched
    #[default]
    Leave,
    /// Switch to the configured default profile
    Default,
}

impl DefaultWhenUnknown {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "leave" => Some(Self::Leave),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

impl fmt::Display for DefaultWhenUnknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leave => f.write_str("leave"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Result of resolving a country to a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTarget {
    /// Profile to switch to; `None` means no switch
    pub profile: Option<String>,
    /// Country code, `DEFAULT` or `UNKNOWN`, for logging
    pub display_code: String,
}

impl ProfileTarget {
    fn switch_to<P: Into<String>, D: Into<String>>(profile: P, display_code: D) -> Self {
        Self {
            profile: Some(profile.into()),
            display_code: display_code.into(),
        }
    }

    fn no_switch<D: Into<String>>(display_code: D) -> Self {
        Self {
            profile: None,
            display_code: display_code.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    /// Upper-case country code → profile name
    map: HashMap<String, String>,
    default_profile: Option<String>,
    default_when_unknown: DefaultWhenUnknown,
}

impl ProfileConfig {
    /// Load `cc_to_profile.json`. Missing or malformed files give an empty config.
    pub fn load(path: &Path) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(value) => Self::from_value(&value),
                Err(e) => {
                    warn!("Cannot parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                Self::default()
            }
        };

        if config.map.is_empty() {
            info!(
                "{} is missing or has no mappings; only the default profile can be used.",
                path.display()
            );
        } else {
            info!(
                "Loaded {} country-to-profile mappings from {}",
                config.map.len(),
                path.display()
            );
        }
        info!(
            "Fallback behaviour='{}', default_profile='{}'",
            config.default_when_unknown,
            config.default_profile.as_deref().unwrap_or("")
        );
        config
    }

    /// Build from parsed JSON, ignoring entries of the wrong shape
    pub fn from_value(value: &Value) -> Self {
        let empty = Map::new();
        let data = value.as_object().unwrap_or(&empty);
        let profiles = data
            .get("profiles")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let default_profile = data
            .get("default_profile")
            .and_then(scalar_to_string)
            .and_then(|key| resolve_profile_name(profiles, &key));

        let default_when_unknown = match data.get("default_when_unknown") {
            None | Some(Value::Null) => DefaultWhenUnknown::Leave,
            Some(raw) => {
                let raw = scalar_to_string(raw).unwrap_or_default();
                DefaultWhenUnknown::parse(&raw).unwrap_or_else(|| {
                    warn!("Unknown default_when_unknown '{}'; using 'leave'", raw);
                    DefaultWhenUnknown::Leave
                })
            }
        };

        let mut map = HashMap::new();
        if let Some(by_country) = data
            .get("mappings")
            .and_then(|m| m.get("by_country_code"))
            .and_then(Value::as_object)
        {
            for (cc, profile_key) in by_country {
                let Some(profile_key) = profile_key.as_str() else {
                    continue;
                };
                let cc = cc.trim();
                if cc.is_empty() {
                    continue;
                }
                if let Some(profile) = resolve_profile_name(profiles, profile_key) {
                    map.insert(cc.to_ascii_uppercase(), profile);
                }
            }
        }

        // Legacy flat layout: {"GB": "UK_Docklands (UDP)"}
        for (key, profile) in data {
            let Some(profile) = profile.as_str().map(str::trim) else {
                continue;
            };
            if profile.is_empty() {
                continue;
            }
            if let Some(cc) = CountryCode::parse(key) {
                map.entry(cc.as_str().to_string())
                    .or_insert_with(|| profile.to_string());
            }
        }

        Self {
            map,
            default_profile,
            default_when_unknown,
        }
    }

    pub fn with_mapping<C: AsRef<str>, P: Into<String>>(mut self, cc: C, profile: P) -> Self {
        self.map
            .insert(cc.as_ref().trim().to_ascii_uppercase(), profile.into());
        self
    }

    pub fn with_default(mut self, profile: Option<String>, policy: DefaultWhenUnknown) -> Self {
        self.default_profile = profile.filter(|p| !p.trim().is_empty());
        self.default_when_unknown = policy;
        self
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn default_profile(&self) -> Option<&str> {
        self.default_profile.as_deref()
    }

    pub fn default_when_unknown(&self) -> DefaultWhenUnknown {
        self.default_when_unknown
    }

    pub fn profile_for(&self, cc: &CountryCode) -> Option<&str> {
        self.map.get(cc.as_str()).map(String::as_str)
    }

    /// Pick the profile for a channel's country.
    ///
    /// An unknown country and a known-but-unmapped country both fall back to
    /// the default profile only under [`DefaultWhenUnknown::Default`].
    pub fn resolve(&self, country: Option<&CountryCode>) -> ProfileTarget {
        match country {
            None => self
                .fallback()
                .unwrap_or_else(|| ProfileTarget::no_switch(DISPLAY_UNKNOWN)),
            Some(cc) => match self.profile_for(cc) {
                Some(profile) => ProfileTarget::switch_to(profile, cc.as_str()),
                None => self
                    .fallback()
                    .unwrap_or_else(|| ProfileTarget::no_switch(cc.as_str())),
            },
        }
    }

    fn fallback(&self) -> Option<ProfileTarget> {
        match (self.default_when_unknown, &self.default_profile) {
            (DefaultWhenUnknown::Default, Some(profile)) => {
                Some(ProfileTarget::switch_to(profile.as_str(), DISPLAY_DEFAULT))
            }
            _ => None,
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Profile key → name the VPN manager knows (its label, else the key itself)
fn resolve_profile_name(profiles: &Map<String, Value>, profile_key: &str) -> Option<String> {
    let key = profile_key.trim();
    if key.is_empty() {
        return None;
    }
    let label = profiles
        .get(key)
        .and_then(|p| p.get("label"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|label| !label.is_empty());
    Some(label.unwrap_or(key).to_string())
}
