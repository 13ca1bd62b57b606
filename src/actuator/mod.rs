//! Bridge to the external VPN manager
//!
//! Switching is a fire-and-forget plugin call. Whether the VPN actually came
//! up is decided separately by [`crate::confirm`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use url::form_urlencoded;

use crate::config::ActuatorConfig;
use crate::errors::AppResult;
use crate::host::PlayerHost;

#[async_trait]
pub trait Actuator: Send + Sync {
    /// Ask the VPN manager to connect `profile`.
    ///
    /// `Ok` only means the request was handed over.
    async fn switch(&self, profile: &str) -> AppResult<()>;
}

/// Plugin URL that asks the VPN manager to switch, with the profile name
/// form-encoded (spaces become `+`)
pub fn switch_plugin_url(addon_id: &str, action: &str, profile: &str) -> String {
    let name: String = form_urlencoded::byte_serialize(profile.as_bytes()).collect();
    format!("plugin://{addon_id}/?action={action}&name={name}")
}

/// Sends switch requests through the player host's plugin runner
pub struct PluginActuator {
    host: Arc<dyn PlayerHost>,
    addon_id: String,
    action: String,
}

impl PluginActuator {
    pub fn new(host: Arc<dyn PlayerHost>, config: &ActuatorConfig) -> Self {
        Self {
            host,
            addon_id: config.addon_id.clone(),
            action: config.action.clone(),
        }
    }
}

#[async_trait]
impl Actuator for PluginActuator {
    async fn switch(&self, profile: &str) -> AppResult<()> {
        let url = switch_plugin_url(&self.addon_id, &self.action, profile);
        info!("RunPlugin({})", url);
        self.host.run_plugin(&url).await
    }
}
