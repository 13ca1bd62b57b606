//! M3U playlist parsing for channel-country data
//!
//! Only `#EXTINF` metadata lines matter here. Each one carries the channel
//! title after the first unquoted comma and `key="value"` attributes before it.
//! The broadcast country comes from `tvg-country`, or failing that from the
//! two-letter suffix of a `tvg-id` such as `BBCOne.uk` or `RTE1.ie@HD`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::identity::is_placeholder;
use crate::models::CountryCode;

/// A parsed `#EXTINF` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtinfEntry {
    pub title: String,
    /// Attribute names are lower-cased
    pub attributes: HashMap<String, String>,
}

impl ExtinfEntry {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Country declared by `tvg-country`, else inferred from `tvg-id`
    pub fn country(&self) -> Option<CountryCode> {
        self.attribute("tvg-country")
            .and_then(first_listed_country)
            .or_else(|| self.attribute("tvg-id").and_then(country_from_tvg_id))
    }
}

fn tvg_id_country_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\.([A-Za-z]{2})(?:[^A-Za-z]|$)").expect("tvg-id country pattern is valid")
    })
}

/// `tvg-country` may list several countries (`"GB;IE"`); the first one counts
fn first_listed_country(value: &str) -> Option<CountryCode> {
    value
        .split([';', ','])
        .map(str::trim)
        .find(|part| !part.is_empty())
        .and_then(CountryCode::parse)
}

/// Infer a country from a dotted channel id, e.g. `BBCOne.uk` or `TV3.es@SD`
pub fn country_from_tvg_id(tvg_id: &str) -> Option<CountryCode> {
    tvg_id_country_pattern()
        .captures(tvg_id)
        .and_then(|caps| caps.get(1))
        .and_then(|m| CountryCode::parse(m.as_str()))
}

/// Parse a single `#EXTINF` line.
///
/// Returns `None` for other lines, lines without a title separator and
/// entries with an empty title.
pub fn parse_extinf_line(line: &str) -> Option<ExtinfEntry> {
    let content = line.trim().strip_prefix("#EXTINF")?;
    let content = content.strip_prefix(':').unwrap_or(content);

    let comma_pos = find_unquoted_comma(content)?;
    let (attrs_part, title) = content.split_at(comma_pos);
    let title = title[1..].trim();
    if title.is_empty() {
        return None;
    }

    Some(ExtinfEntry {
        title: title.to_string(),
        attributes: parse_extinf_attributes(attrs_part),
    })
}

fn find_unquoted_comma(content: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, ch) in content.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Parse `key="value"` pairs from the part of an EXTINF line before the title
fn parse_extinf_attributes(attrs_part: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();

    let mut chars = attrs_part.chars().peekable();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_key = true;
    let mut in_value = false;

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' if !in_quotes => {
                if in_value && !current_key.is_empty() && !current_value.is_empty() {
                    attributes.insert(current_key.to_ascii_lowercase(), current_value.clone());
                }
                // Bare tokens such as the leading duration are discarded
                current_key.clear();
                current_value.clear();
                in_key = true;
                in_value = false;
            }
            '=' if !in_quotes && in_key => {
                in_key = false;
                in_value = true;
                if chars.peek() == Some(&'"') {
                    chars.next();
                    in_quotes = true;
                }
            }
            '"' if in_value => {
                in_quotes = false;
                if !current_key.is_empty() {
                    attributes.insert(current_key.to_ascii_lowercase(), current_value.clone());
                }
                current_key.clear();
                current_value.clear();
                in_value = false;
            }
            _ => {
                if in_key {
                    current_key.push(ch);
                } else if in_value {
                    current_value.push(ch);
                }
            }
        }
    }

    if in_value && !current_key.is_empty() && !current_value.is_empty() {
        attributes.insert(current_key.to_ascii_lowercase(), current_value);
    }

    attributes
}

/// Build a channel title → country table from playlist content.
///
/// Entries without a derivable country or with a placeholder title are
/// skipped. A title listed twice keeps its last country.
pub fn parse_channel_countries(content: &str) -> HashMap<String, CountryCode> {
    let mut mapping = HashMap::new();
    let mut skipped = 0usize;

    for line in content.lines() {
        let Some(entry) = parse_extinf_line(line) else {
            continue;
        };
        if is_placeholder(&entry.title) {
            skipped += 1;
            continue;
        }
        match entry.country() {
            Some(country) => {
                mapping.insert(entry.title, country);
            }
            None => skipped += 1,
        }
    }

    debug!(
        "Parsed {} channel countries from playlist ({} entries without a country)",
        mapping.len(),
        skipped
    );
    mapping
}
