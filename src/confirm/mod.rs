//! Connection confirmation
//!
//! After a switch request the confirmer polls a small ordered list of
//! independent [`ConnectionSignal`]s on a fixed tick. The first signal to
//! report success ends the wait; if none does before the timeout the result is
//! a failure carrying the latest diagnostic hint.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::config::ConfirmConfig;
use crate::models::ConfirmationResult;

pub mod log_tail;
pub mod traffic;

pub use log_tail::LogTailSignal;
pub use traffic::{InterfaceProbe, InterfaceSnapshot, InterfaceTrafficSignal};

/// One independent way of observing that the VPN came up
pub trait ConnectionSignal: Send {
    fn name(&self) -> &'static str;

    /// `Some(reason)` once the signal has seen the connection succeed.
    ///
    /// Unavailable data (missing files, vanished interfaces) is "not yet".
    fn check(&mut self, target_profile: &str) -> Option<String>;

    /// Diagnostic text for a timeout report
    fn hint(&self) -> Option<String> {
        None
    }
}

pub struct ConnectionConfirmer {
    timeout: Duration,
    poll_interval: Duration,
    log_path: PathBuf,
    log_tail_lines: usize,
    rx_growth_threshold: u64,
    probe: InterfaceProbe,
}

impl ConnectionConfirmer {
    pub fn new<P: Into<PathBuf>>(config: &ConfirmConfig, vpn_manager_log: P) -> Self {
        Self {
            timeout: config.timeout,
            poll_interval: config.poll_interval,
            log_path: vpn_manager_log.into(),
            log_tail_lines: config.log_tail_lines,
            rx_growth_threshold: config.rx_growth_threshold,
            probe: InterfaceProbe::new(
                config.sys_class_net.clone(),
                config.interface_prefixes.clone(),
            ),
        }
    }

    pub fn probe(&self) -> &InterfaceProbe {
        &self.probe
    }

    /// Wait for `target_profile` to connect, watching the VPN manager log and
    /// tunnel traffic. `iface_before` is the tunnel snapshot taken before the
    /// switch was issued.
    pub async fn confirm(
        &self,
        target_profile: &str,
        iface_before: Option<&InterfaceSnapshot>,
    ) -> ConfirmationResult {
        let mut signals: Vec<Box<dyn ConnectionSignal>> = vec![
            Box::new(LogTailSignal::new(
                self.log_path.clone(),
                self.log_tail_lines,
            )),
            Box::new(InterfaceTrafficSignal::new(
                self.probe.clone(),
                self.rx_growth_threshold,
                iface_before,
            )),
        ];
        self.confirm_with(target_profile, &mut signals).await
    }

    /// Poll `signals` in order every tick until one succeeds or time runs out
    pub async fn confirm_with(
        &self,
        target_profile: &str,
        signals: &mut [Box<dyn ConnectionSignal>],
    ) -> ConfirmationResult {
        let started = Instant::now();

        loop {
            for signal in signals.iter_mut() {
                if let Some(reason) = signal.check(target_profile) {
                    debug!(
                        "Signal '{}' confirmed '{}' after {:?}",
                        signal.name(),
                        target_profile,
                        started.elapsed()
                    );
                    return ConfirmationResult::success(reason);
                }
            }

            if started.elapsed() >= self.timeout {
                break;
            }
            sleep(self.poll_interval).await;
        }

        let hint = signals
            .iter()
            .find_map(|signal| signal.hint())
            .unwrap_or_default();
        ConfirmationResult::failure(format!(
            "Timeout waiting for VPN connect. Last hint: {hint}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Succeeds on the given tick (0-based), never if `None`
    struct TickSignal {
        fires_on: Option<usize>,
        ticks: usize,
    }

    impl ConnectionSignal for TickSignal {
        fn name(&self) -> &'static str {
            "tick"
        }

        fn check(&mut self, _target_profile: &str) -> Option<String> {
            let tick = self.ticks;
            self.ticks += 1;
            (Some(tick) == self.fires_on).then(|| format!("fired on tick {tick}"))
        }

        fn hint(&self) -> Option<String> {
            Some(format!("checked {} times", self.ticks))
        }
    }

    fn confirmer() -> ConnectionConfirmer {
        ConnectionConfirmer::new(&ConfirmConfig::default(), "/nonexistent/service.log")
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_signal_to_fire_wins() {
        let mut signals: Vec<Box<dyn ConnectionSignal>> = vec![
            Box::new(TickSignal { fires_on: None, ticks: 0 }),
            Box::new(TickSignal { fires_on: Some(3), ticks: 0 }),
        ];
        let started = Instant::now();

        let result = confirmer().confirm_with("uk", &mut signals).await;

        assert_eq!(result, ConfirmationResult::success("fired on tick 3"));
        assert!(started.elapsed() >= Duration::from_millis(2_400));
        assert!(started.elapsed() < Duration::from_millis(3_200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_hint() {
        let mut signals: Vec<Box<dyn ConnectionSignal>> =
            vec![Box::new(TickSignal { fires_on: None, ticks: 0 })];
        let started = Instant::now();

        let result = confirmer().confirm_with("uk", &mut signals).await;

        assert!(!result.success);
        assert!(result.reason.starts_with("Timeout waiting for VPN connect"));
        assert!(result.reason.contains("checked"));
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(21));
    }
}
