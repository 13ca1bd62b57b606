//! Switch dedup and cooldown
//!
//! The gatekeeper owns the persisted [`SwitchState`]. It suppresses a switch
//! to the profile that was last requested if that request is younger than the
//! cooldown. State records the last *requested* profile: it is committed as soon
//! as a switch is issued, whether or not the connection is later confirmed, so a
//! failed connection is not retried until the cooldown lapses.

use std::time::Duration;
use tracing::{info, warn};

use crate::models::SwitchState;

pub mod state_store;

pub use state_store::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    Apply,
    /// Same profile requested `age_secs` ago, inside the cooldown
    Suppress { age_secs: i64 },
}

impl SwitchDecision {
    pub fn should_apply(&self) -> bool {
        matches!(self, Self::Apply)
    }
}

/// Whether switching to `target` is warranted given the last request
pub fn decide(target: &str, state: &SwitchState, now: i64, cooldown: Duration) -> SwitchDecision {
    let cooldown_secs = i64::try_from(cooldown.as_secs()).unwrap_or(i64::MAX);
    let age_secs = now.saturating_sub(state.timestamp);
    if state.last_profile == target && age_secs < cooldown_secs {
        SwitchDecision::Suppress { age_secs }
    } else {
        SwitchDecision::Apply
    }
}

pub struct SwitchGatekeeper {
    cooldown: Duration,
    state: SwitchState,
    store: StateStore,
}

impl SwitchGatekeeper {
    /// Create a gatekeeper seeded from the persisted state
    pub fn load(store: StateStore, cooldown: Duration) -> Self {
        let state = store.load();
        if !state.last_profile.is_empty() {
            info!(
                "Last requested profile '{}' at {}",
                state.last_profile, state.timestamp
            );
        }
        Self {
            cooldown,
            state,
            store,
        }
    }

    pub fn state(&self) -> &SwitchState {
        &self.state
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn decide(&self, target: &str, now: i64) -> SwitchDecision {
        decide(target, &self.state, now, self.cooldown)
    }

    /// Record that a switch to `target` was issued at `now` and persist it.
    ///
    /// Timestamps never move backwards within a run. A failed write is logged;
    /// the in-memory state is still advanced.
    pub fn commit(&mut self, target: &str, now: i64) -> &SwitchState {
        self.state = SwitchState {
            last_profile: target.to_string(),
            timestamp: now.max(self.state.timestamp),
        };
        if let Err(e) = self.store.save(&self.state) {
            warn!("Cannot write {}: {}", self.store.path().display(), e);
        }
        &self.state
    }
}
