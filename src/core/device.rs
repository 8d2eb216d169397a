use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use pnet::datalink::MacAddr;

/// A host discovered on the local network.
///
/// Identity is the MAC address; the IP may change across rescans, the MAC
/// never does.
#[derive(Debug, Clone)]
pub struct Device {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub hostname: Option<String>,
    pub is_gateway: bool,
    pub is_blocked: bool,
    pub discovered_at: Instant,
    pub last_seen: Instant,
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.mac == other.mac
    }
}

impl Eq for Device {}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<16} {}", self.ip, self.mac)?;
        if self.is_gateway {
            write!(f, "  [gateway]")?;
        }
        if self.is_blocked {
            write!(f, "  [blocked]")?;
        }
        if let Some(name) = &self.hostname {
            write!(f, "  {name}")?;
        }
        Ok(())
    }
}

/// Concurrently readable and writable table of discovered devices, keyed by
/// MAC. Devices are never removed mid-run; rescans refresh `last_seen`.
#[derive(Clone, Default)]
pub struct DeviceTable {
    inner: Arc<RwLock<HashMap<MacAddr, Device>>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a device sighting. Returns `true` if the MAC was
    /// previously unknown.
    ///
    /// At most one entry carries `is_gateway`: a later claimant of the
    /// gateway IP demotes any earlier one.
    pub fn upsert(&self, ip: Ipv4Addr, mac: MacAddr, gateway_ip: Ipv4Addr) -> bool {
        let now = Instant::now();
        let mut map = self.inner.write();

        if ip == gateway_ip {
            for device in map.values_mut() {
                if device.mac != mac {
                    device.is_gateway = false;
                }
            }
        }

        match map.entry(mac) {
            Entry::Occupied(mut entry) => {
                let device = entry.get_mut();
                device.ip = ip;
                device.is_gateway = ip == gateway_ip;
                device.last_seen = now;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Device {
                    ip,
                    mac,
                    hostname: None,
                    is_gateway: ip == gateway_ip,
                    is_blocked: false,
                    discovered_at: now,
                    last_seen: now,
                });
                true
            }
        }
    }

    pub fn get(&self, mac: MacAddr) -> Option<Device> {
        self.inner.read().get(&mac).cloned()
    }

    pub fn find_by_ip(&self, ip: Ipv4Addr) -> Option<Device> {
        self.inner.read().values().find(|d| d.ip == ip).cloned()
    }

    pub fn gateway(&self) -> Option<Device> {
        self.inner.read().values().find(|d| d.is_gateway).cloned()
    }

    pub fn set_blocked(&self, mac: MacAddr, blocked: bool) {
        if let Some(device) = self.inner.write().get_mut(&mac) {
            device.is_blocked = blocked;
        }
    }

    pub fn set_hostname(&self, mac: MacAddr, hostname: String) {
        if let Some(device) = self.inner.write().get_mut(&mac) {
            device.hostname = Some(hostname);
        }
    }

    /// Display snapshot, ordered by the last octet of the IP.
    pub fn snapshot(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.inner.read().values().cloned().collect();
        devices.sort_by_key(|d| (d.ip.octets()[3], u32::from(d.ip)));
        devices
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
