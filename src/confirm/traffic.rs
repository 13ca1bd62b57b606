//! Tunnel interface traffic signal
//!
//! Reads the kernel's per-interface counters under `/sys/class/net`. A tunnel
//! interface is any entry whose name starts with one of the configured
//! prefixes (`tun`, `wg`).

use std::path::PathBuf;
use tracing::debug;

use super::ConnectionSignal;

/// Tunnel interface name and its received-byte counter at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub rx_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct InterfaceProbe {
    sys_class_net: PathBuf,
    prefixes: Vec<String>,
}

impl InterfaceProbe {
    pub fn new<P: Into<PathBuf>>(sys_class_net: P, prefixes: Vec<String>) -> Self {
        Self {
            sys_class_net: sys_class_net.into(),
            prefixes,
        }
    }

    /// First tunnel interface by name, if any
    pub fn tunnel_interface(&self) -> Option<String> {
        let entries = match std::fs::read_dir(&self.sys_class_net) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {}", self.sys_class_net.display(), e);
                return None;
            }
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| self.prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .collect();
        names.sort();
        names.into_iter().next()
    }

    pub fn rx_bytes(&self, iface: &str) -> Option<u64> {
        let path = self
            .sys_class_net
            .join(iface)
            .join("statistics")
            .join("rx_bytes");
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    pub fn snapshot(&self) -> Option<InterfaceSnapshot> {
        let name = self.tunnel_interface()?;
        let rx_bytes = self.rx_bytes(&name);
        Some(InterfaceSnapshot { name, rx_bytes })
    }
}

/// Succeeds once a tunnel interface has received more than `threshold` bytes
/// beyond its baseline
pub struct InterfaceTrafficSignal {
    probe: InterfaceProbe,
    threshold: u64,
    baseline: Option<(String, u64)>,
}

impl InterfaceTrafficSignal {
    /// Take the baseline from `before`, the tunnel as it was before the switch
    /// was issued. The counter is only read now when `before` lacks one; with
    /// no prior tunnel, whatever tunnel exists now is used.
    pub fn new(probe: InterfaceProbe, threshold: u64, before: Option<&InterfaceSnapshot>) -> Self {
        let baseline = match before {
            Some(InterfaceSnapshot {
                name,
                rx_bytes: Some(rx),
            }) => Some((name.clone(), *rx)),
            Some(InterfaceSnapshot {
                name,
                rx_bytes: None,
            }) => probe.rx_bytes(name).map(|rx| (name.clone(), rx)),
            None => probe
                .tunnel_interface()
                .and_then(|name| probe.rx_bytes(&name).map(|rx| (name, rx))),
        };
        Self {
            probe,
            threshold,
            baseline,
        }
    }

    pub fn baseline(&self) -> Option<(&str, u64)> {
        self.baseline.as_ref().map(|(name, rx)| (name.as_str(), *rx))
    }
}

impl ConnectionSignal for InterfaceTrafficSignal {
    fn name(&self) -> &'static str {
        "interface-traffic"
    }

    fn check(&mut self, _target_profile: &str) -> Option<String> {
        let iface = self.probe.tunnel_interface()?;
        let rx_now = self.probe.rx_bytes(&iface)?;

        if let Some((name, rx0)) = &self.baseline {
            if *name == iface {
                return (rx_now > rx0.saturating_add(self.threshold))
                    .then(|| format!("Tunnel {iface} active (rx_bytes grew)"));
            }
        }

        // First sighting, or the tunnel was replaced by a new interface
        debug!("Traffic baseline for {}: {} bytes", iface, rx_now);
        self.baseline = Some((iface, rx_now));
        None
    }
}
