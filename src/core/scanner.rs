use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use pnet::packet::arp::ArpOperations;

use crate::config::EngineConfig;
use crate::core::device::{Device, DeviceTable};
use crate::core::dns::HostnameResolver;
use crate::core::events::EventLog;
use crate::core::timing::{CancelToken, WaitOutcome};
use crate::net::arp;
use crate::net::channel::FrameSink;
use crate::net::interface::InterfaceBinding;

/// Subnet discovery: drives the sweep and correlates captured ARP traffic
/// into the device table.
pub struct Scanner {
    binding: InterfaceBinding,
    sink: Arc<dyn FrameSink>,
    table: DeviceTable,
    events: EventLog,
    sweep_gap: Duration,
    sweep_grace: Duration,
}

impl Scanner {
    pub fn new(
        binding: InterfaceBinding,
        sink: Arc<dyn FrameSink>,
        table: DeviceTable,
        events: EventLog,
        config: &EngineConfig,
    ) -> Self {
        Self {
            binding,
            sink,
            table,
            events,
            sweep_gap: config.sweep_gap,
            sweep_grace: config.sweep_grace,
        }
    }

    /// Sweep the subnet: one ARP request per host address (excluding our
    /// own), paced by the inter-packet gap, then a grace period for late
    /// replies. `progress` receives monotonically non-decreasing percentages
    /// in [0, 100]. Replies are folded in by the capture thread via
    /// [`Scanner::ingest`], including during the grace window.
    pub fn scan(&self, mut progress: impl FnMut(u8), cancel: &CancelToken) {
        let own_ip = self.binding.own_ip;
        let targets: Vec<Ipv4Addr> = self
            .binding
            .host_addresses()
            .filter(|ip| *ip != own_ip)
            .collect();
        let total = targets.len();

        self.events.emit(format!(
            "[*] Sweeping {} ({} addresses)...",
            self.binding.network, total
        ));

        let mut buffer = [0u8; arp::FRAME_SIZE];
        for (i, ip) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                self.events.emit("[*] Sweep cancelled.");
                return;
            }

            arp::build_request(&mut buffer, self.binding.own_mac, own_ip, ip);
            if let Err(e) = self.sink.inject(&buffer) {
                self.events.emit(format!("[!] Failed to probe {ip}: {e}"));
            }
            progress(((i + 1) * 100 / total) as u8);

            if cancel.wait(self.sweep_gap) == WaitOutcome::Cancelled {
                self.events.emit("[*] Sweep cancelled.");
                return;
            }
        }
        if total == 0 {
            progress(100);
        }

        // Stragglers that answer during the grace window are still recorded.
        if cancel.wait(self.sweep_grace) == WaitOutcome::Cancelled {
            self.events.emit("[*] Sweep cancelled.");
            return;
        }

        self.events
            .emit(format!("[*] Sweep complete: {} device(s) known.", self.table.len()));
    }

    /// Fold one captured frame into the device table.
    ///
    /// Both replies and requests are learned from — a gratuitous request
    /// advertises its sender just as well as a reply does. Our own traffic
    /// and ARP probes (unspecified sender IP) are ignored.
    pub fn ingest(&self, frame: &[u8]) {
        let Some(decoded) = arp::parse(frame) else {
            return;
        };
        if decoded.op != ArpOperations::Reply && decoded.op != ArpOperations::Request {
            return;
        }
        if decoded.sender_mac == self.binding.own_mac || decoded.sender_ip == self.binding.own_ip {
            return;
        }
        if decoded.sender_ip.is_unspecified() {
            return;
        }

        let is_new = self
            .table
            .upsert(decoded.sender_ip, decoded.sender_mac, self.binding.gateway_ip);
        if is_new {
            self.events.emit(format!(
                "[*] Discovered {} at {}",
                decoded.sender_ip, decoded.sender_mac
            ));
        }
    }

    /// Targeted single-host probe.
    pub fn request(&self, ip: Ipv4Addr) {
        let mut buffer = [0u8; arp::FRAME_SIZE];
        arp::build_request(&mut buffer, self.binding.own_mac, self.binding.own_ip, ip);
        if let Err(e) = self.sink.inject(&buffer) {
            self.events.emit(format!("[!] Failed to probe {ip}: {e}"));
        }
    }

    /// Display snapshot of the device table.
    pub fn devices(&self) -> Vec<Device> {
        self.table.snapshot()
    }

    /// Reverse-resolve hostnames for devices that don't have one yet.
    /// Best-effort; every failure is silent.
    pub fn resolve_hostnames(&self, cancel: &CancelToken) {
        let Some(resolver) = HostnameResolver::new() else {
            return;
        };
        for device in self.table.snapshot() {
            if cancel.is_cancelled() {
                return;
            }
            if device.hostname.is_none() {
                if let Some(name) = resolver.lookup(device.ip) {
                    self.table.set_hostname(device.mac, name);
                }
            }
        }
    }
}
