use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use pnet::datalink::{self, MacAddr, NetworkInterface};
use pnet::ipnetwork::IpNetwork;

use crate::error::{Result, WardenError};

/// Interfaces that could plausibly host a run: up, not loopback, and
/// carrying at least one IPv4 network.
pub fn candidates() -> Vec<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .filter(|iface| iface.ips.iter().any(|net| net.is_ipv4()))
        .collect()
}

/// Everything the engines need to know about the chosen interface.
///
/// Built once after interface selection and immutable for the run.
#[derive(Debug, Clone)]
pub struct InterfaceBinding {
    pub interface: NetworkInterface,
    pub own_ip: Ipv4Addr,
    pub own_mac: MacAddr,
    pub network: Ipv4Network,
    pub gateway_ip: Ipv4Addr,
}

impl InterfaceBinding {
    /// Resolve `name` against the host's interfaces and bind to it.
    pub fn bind(name: &str, gateway_ip: Ipv4Addr) -> Result<Self> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| WardenError::InterfaceNotFound(name.into()))?;
        Self::new(interface, gateway_ip)
    }

    /// Bind to an already-resolved interface.
    ///
    /// Fails when the interface cannot speak ARP (no usable MAC, no IPv4
    /// network) or when the gateway is not inside the interface's subnet —
    /// an off-subnet gateway can never be poisoned from here.
    pub fn new(interface: NetworkInterface, gateway_ip: Ipv4Addr) -> Result<Self> {
        let own_mac = match interface.mac {
            Some(mac) if mac != MacAddr::zero() => mac,
            _ => return Err(WardenError::NoMacAddress(interface.name.clone())),
        };
        let network = interface
            .ips
            .iter()
            .find_map(|net| match net {
                IpNetwork::V4(v4) => Some(*v4),
                IpNetwork::V6(_) => None,
            })
            .ok_or_else(|| WardenError::NoIpv4Address(interface.name.clone()))?;
        if !network.contains(gateway_ip) {
            return Err(WardenError::GatewayOffSubnet(gateway_ip));
        }
        Ok(Self {
            own_ip: network.ip(),
            own_mac,
            network,
            gateway_ip,
            interface,
        })
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.network.mask()
    }

    pub fn network_addr(&self) -> Ipv4Addr {
        self.network.network()
    }

    pub fn broadcast_addr(&self) -> Ipv4Addr {
        self.network.broadcast()
    }

    pub fn prefix_len(&self) -> u8 {
        self.network.prefix()
    }

    /// Every address strictly between network and broadcast, in numerical
    /// order. Empty for /31 and /32.
    pub fn host_addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        let network = self.network_addr();
        let broadcast = self.broadcast_addr();
        self.network
            .iter()
            .filter(move |ip| *ip != network && *ip != broadcast)
    }
}

/// Default gateway from the kernel routing table.
///
/// `/proc/net/route` prints addresses as native-endian hex words, so the
/// parsed word needs a `to_be` before it reads as an IPv4 address.
#[cfg(target_os = "linux")]
pub fn default_gateway() -> Result<Ipv4Addr> {
    let table = std::fs::read_to_string("/proc/net/route")
        .map_err(|e| WardenError::Network(format!("cannot read /proc/net/route: {e}")))?;

    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _iface = cols.next()?;
            let destination = cols.next()?;
            let gateway = cols.next()?;
            (destination == "00000000").then_some(gateway)
        })
        .find_map(|hex| u32::from_str_radix(hex, 16).ok())
        .map(|word| Ipv4Addr::from(word.to_be()))
        .ok_or_else(|| WardenError::Network("no default route in /proc/net/route".into()))
}

#[cfg(not(target_os = "linux"))]
pub fn default_gateway() -> Result<Ipv4Addr> {
    Err(WardenError::Network(
        "gateway detection unsupported on this platform — pass --gateway".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    use ipnetwork::Ipv6Network;

    const MAC: MacAddr = MacAddr(0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc);

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn iface(mac: Option<MacAddr>, ips: Vec<IpNetwork>) -> NetworkInterface {
        NetworkInterface {
            name: "test0".into(),
            description: String::new(),
            index: 1,
            mac,
            ips,
            flags: 0,
        }
    }

    fn v4(addr: &str, prefix: u8) -> IpNetwork {
        IpNetwork::V4(Ipv4Network::new(ip(addr), prefix).unwrap())
    }

    fn binding(own_ip: &str, prefix: u8, gateway: &str) -> InterfaceBinding {
        let own_ip: Ipv4Addr = own_ip.parse().unwrap();
        InterfaceBinding {
            interface: iface(Some(MAC), Vec::new()),
            own_ip,
            own_mac: MAC,
            network: Ipv4Network::new(own_ip, prefix).unwrap(),
            gateway_ip: gateway.parse().unwrap(),
        }
    }

    #[test]
    fn new_binds_first_ipv4_network() {
        let v6 = IpNetwork::V6(Ipv6Network::new(Ipv6Addr::LOCALHOST, 128).unwrap());
        let nic = iface(Some(MAC), vec![v6, v4("192.168.1.17", 24)]);

        let binding = InterfaceBinding::new(nic, ip("192.168.1.1")).unwrap();
        assert_eq!(binding.own_ip, ip("192.168.1.17"));
        assert_eq!(binding.own_mac, MAC);
        assert_eq!(binding.prefix_len(), 24);
    }

    #[test]
    fn new_rejects_missing_or_zero_mac() {
        let nic = iface(None, vec![v4("192.168.1.17", 24)]);
        assert!(matches!(
            InterfaceBinding::new(nic, ip("192.168.1.1")),
            Err(WardenError::NoMacAddress(_))
        ));

        let nic = iface(Some(MacAddr::zero()), vec![v4("192.168.1.17", 24)]);
        assert!(matches!(
            InterfaceBinding::new(nic, ip("192.168.1.1")),
            Err(WardenError::NoMacAddress(_))
        ));
    }

    #[test]
    fn new_rejects_interface_without_ipv4() {
        let v6 = IpNetwork::V6(Ipv6Network::new(Ipv6Addr::LOCALHOST, 128).unwrap());
        let nic = iface(Some(MAC), vec![v6]);
        assert!(matches!(
            InterfaceBinding::new(nic, ip("192.168.1.1")),
            Err(WardenError::NoIpv4Address(_))
        ));
    }

    #[test]
    fn new_rejects_off_subnet_gateway() {
        let nic = iface(Some(MAC), vec![v4("192.168.1.17", 24)]);
        assert!(matches!(
            InterfaceBinding::new(nic, ip("10.0.0.1")),
            Err(WardenError::GatewayOffSubnet(_))
        ));
    }

    #[test]
    fn derived_addresses_for_slash_24() {
        let b = binding("192.168.1.17", 24, "192.168.1.1");
        assert_eq!(b.netmask(), "255.255.255.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(b.network_addr(), "192.168.1.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(b.broadcast_addr(), "192.168.1.255".parse::<Ipv4Addr>().unwrap());
        assert_eq!(b.prefix_len(), 24);
    }

    #[test]
    fn host_addresses_slash_30() {
        let b = binding("10.0.0.1", 30, "10.0.0.2");
        let hosts: Vec<Ipv4Addr> = b.host_addresses().collect();
        assert_eq!(
            hosts,
            vec![
                "10.0.0.1".parse::<Ipv4Addr>().unwrap(),
                "10.0.0.2".parse::<Ipv4Addr>().unwrap(),
            ]
        );
    }

    #[test]
    fn host_addresses_slash_24_excludes_network_and_broadcast() {
        let b = binding("192.168.1.17", 24, "192.168.1.1");
        let hosts: Vec<Ipv4Addr> = b.host_addresses().collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], "192.168.1.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(hosts[253], "192.168.1.254".parse::<Ipv4Addr>().unwrap());
        assert!(!hosts.contains(&b.network_addr()));
        assert!(!hosts.contains(&b.broadcast_addr()));
    }

    #[test]
    fn host_addresses_in_numerical_order() {
        let b = binding("172.16.0.1", 28, "172.16.0.1");
        let hosts: Vec<u32> = b.host_addresses().map(u32::from).collect();
        assert!(hosts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(hosts.len(), 14);
    }

    #[test]
    fn host_addresses_empty_for_point_to_point() {
        assert_eq!(binding("10.0.0.0", 31, "10.0.0.1").host_addresses().count(), 0);
        assert_eq!(binding("10.0.0.1", 32, "10.0.0.1").host_addresses().count(), 0);
    }
}
