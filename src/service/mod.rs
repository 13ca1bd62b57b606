//! Long-running event loop
//!
//! Playback-start events are handled one at a time, each in its own task so a
//! panic inside the pipeline is caught at the join point. After such a fault
//! the service stays up but inert: it keeps draining events and never switches
//! again until restarted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::KodiConfig;
use crate::errors::AppError;
use crate::host::{EventSource, KodiHost, KodiRpcClient};
use crate::models::PlayerEvent;
use crate::pipeline::{PipelineOutcome, SwitchEngine};

/// Why [`SwitchService::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The host announced it is shutting down
    HostQuit,
    /// The event stream ended without a quit notification
    Disconnected,
    /// Local shutdown signal
    Aborted,
}

pub struct SwitchService {
    engine: Arc<Mutex<SwitchEngine>>,
    inert: bool,
}

impl SwitchService {
    pub fn new(engine: SwitchEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            inert: false,
        }
    }

    pub fn is_inert(&self) -> bool {
        self.inert
    }

    /// Handle one event. Returns the pipeline outcome for playback starts that
    /// ran to completion.
    pub async fn handle_event(&mut self, event: PlayerEvent) -> Option<PipelineOutcome> {
        match event {
            PlayerEvent::PlaybackStarted => {
                if self.inert {
                    debug!("Service is inert after a fatal error; ignoring playback start");
                    return None;
                }

                let engine = self.engine.clone();
                let task = tokio::spawn(async move {
                    engine.lock().await.handle_playback_started().await
                });
                match task.await {
                    Ok(outcome) => {
                        debug!("Playback start handled: {:?}", outcome);
                        Some(outcome)
                    }
                    Err(e) => {
                        let err = AppError::internal(format!("playback pipeline aborted: {e}"));
                        error!(
                            "FATAL service error: {}. VPN switching disabled until restart.",
                            err
                        );
                        self.inert = true;
                        None
                    }
                }
            }
            PlayerEvent::PlaybackStopped => {
                debug!("Playback stopped");
                None
            }
            PlayerEvent::HostQuit => None,
        }
    }

    /// Consume events until the host quits, the stream ends or `shutdown`
    /// resolves.
    pub async fn run<E, F>(&mut self, events: &mut E, shutdown: F) -> RunExit
    where
        E: EventSource + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return RunExit::Aborted;
                }
                event = events.next_event() => match event {
                    None => return RunExit::Disconnected,
                    Some(PlayerEvent::HostQuit) => {
                        info!("Kodi is shutting down");
                        return RunExit::HostQuit;
                    }
                    Some(event) => {
                        self.handle_event(event).await;
                    }
                },
            }
        }
    }

    /// Keep a Kodi connection attached to `host` and serve its events,
    /// reconnecting with exponential backoff whenever it drops.
    pub async fn run_with_kodi<F>(
        &mut self,
        host: &KodiHost,
        config: &KodiConfig,
        shutdown: F,
    ) -> RunExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut delay = config.reconnect_delay;

        loop {
            let connected = tokio::select! {
                _ = &mut shutdown => return RunExit::Aborted,
                connected = KodiRpcClient::connect(config) => connected,
            };

            match connected {
                Ok((client, mut events)) => {
                    delay = config.reconnect_delay;
                    host.attach(client).await;
                    let exit = self.run(&mut events, shutdown.as_mut()).await;
                    host.detach().await;
                    if exit != RunExit::Disconnected {
                        return exit;
                    }
                    warn!("Lost Kodi connection; reconnecting in {:?}", delay);
                }
                Err(e) => {
                    warn!("Cannot connect to Kodi: {}. Retrying in {:?}", e, delay);
                }
            }

            tokio::select! {
                _ = &mut shutdown => return RunExit::Aborted,
                _ = sleep(delay) => {}
            }
            delay = next_backoff(delay, config.reconnect_max_delay);
        }
    }
}

/// Double `delay`, capped at `max`
pub fn next_backoff(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let max = Duration::from_secs(60);
        assert_eq!(next_backoff(Duration::from_secs(2), max), Duration::from_secs(4));
        assert_eq!(next_backoff(Duration::from_secs(40), max), max);
        assert_eq!(next_backoff(max, max), max);
    }
}
