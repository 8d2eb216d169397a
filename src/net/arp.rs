use std::net::Ipv4Addr;

use pnet::datalink::MacAddr;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::{MutablePacket, Packet};

const ARP_PACKET_SIZE: usize = 28;
const ETHERNET_HEADER_SIZE: usize = 14;
const BROADCAST: MacAddr = MacAddr(0xff, 0xff, 0xff, 0xff, 0xff, 0xff);
const ZERO: MacAddr = MacAddr(0, 0, 0, 0, 0, 0);

/// Total buffer size for an ARP-over-Ethernet frame.
pub const FRAME_SIZE: usize = ETHERNET_HEADER_SIZE + ARP_PACKET_SIZE;

/// The five logical fields of a decoded ARP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpFrame {
    pub op: ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

/// Build an ARP request: "who has `target_ip`? tell `src_ip` at `src_mac`."
pub fn build_request(
    buffer: &mut [u8],
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
) {
    build_frame(
        buffer,
        src_mac,
        BROADCAST,
        ArpOperations::Request,
        src_mac,
        src_ip,
        ZERO,
        target_ip,
    );
}

/// Build an ARP reply telling `target_ip` that `sender_ip` lives at `sender_mac`.
///
/// The Ethernet source is `origin_mac` — the NIC the frame leaves from — which
/// is distinct from the ARP-payload `sender_mac`. A poison reply passes its own
/// MAC for both; a restoration reply keeps `origin_mac` = our NIC while the
/// payload carries the true owner's MAC.
pub fn build_reply(
    buffer: &mut [u8],
    origin_mac: MacAddr,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) {
    build_frame(
        buffer,
        origin_mac,
        target_mac,
        ArpOperations::Reply,
        sender_mac,
        sender_ip,
        target_mac,
        target_ip,
    );
}

/// Parse an Ethernet frame carrying an ARP packet over IPv4/Ethernet.
///
/// Rejects anything that is not EtherType `0x0806` or whose ARP header does
/// not match the IPv4-over-Ethernet constants. Trailing bytes appended by the
/// capture driver are ignored.
pub fn parse(frame: &[u8]) -> Option<ArpFrame> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_hardware_type() != ArpHardwareTypes::Ethernet
        || arp.get_protocol_type() != EtherTypes::Ipv4
        || arp.get_hw_addr_len() != 6
        || arp.get_proto_addr_len() != 4
    {
        return None;
    }
    Some(ArpFrame {
        op: arp.get_operation(),
        sender_mac: arp.get_sender_hw_addr(),
        sender_ip: arp.get_sender_proto_addr(),
        target_mac: arp.get_target_hw_addr(),
        target_ip: arp.get_target_proto_addr(),
    })
}

fn build_frame(
    buffer: &mut [u8],
    eth_src: MacAddr,
    eth_dst: MacAddr,
    operation: ArpOperation,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) {
    let mut eth = MutableEthernetPacket::new(buffer).expect("buffer too small for Ethernet header");
    eth.set_source(eth_src);
    eth.set_destination(eth_dst);
    eth.set_ethertype(EtherTypes::Arp);

    let mut arp = MutableArpPacket::new(eth.payload_mut()).expect("buffer too small for ARP packet");
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(operation);
    arp.set_sender_hw_addr(sender_mac);
    arp.set_sender_proto_addr(sender_ip);
    arp.set_target_hw_addr(target_mac);
    arp.set_target_proto_addr(target_ip);
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_MAC: MacAddr = MacAddr(0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc);
    const GATEWAY_MAC: MacAddr = MacAddr(0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa);
    const VICTIM_MAC: MacAddr = MacAddr(0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0xbb);

    fn gateway_ip() -> Ipv4Addr {
        "10.0.0.2".parse().unwrap()
    }

    fn victim_ip() -> Ipv4Addr {
        "10.0.0.5".parse().unwrap()
    }

    #[test]
    fn request_round_trip() {
        let src_ip: Ipv4Addr = "192.168.1.10".parse().unwrap();
        let target_ip: Ipv4Addr = "192.168.1.1".parse().unwrap();

        let mut buf = [0u8; FRAME_SIZE];
        build_request(&mut buf, OUR_MAC, src_ip, target_ip);

        let frame = parse(&buf).expect("should parse as ARP");
        assert_eq!(frame.op, ArpOperations::Request);
        assert_eq!(frame.sender_mac, OUR_MAC);
        assert_eq!(frame.sender_ip, src_ip);
        assert_eq!(frame.target_mac, ZERO);
        assert_eq!(frame.target_ip, target_ip);

        let eth = EthernetPacket::new(&buf).unwrap();
        assert_eq!(eth.get_destination(), BROADCAST);
        assert_eq!(eth.get_source(), OUR_MAC);
    }

    #[test]
    fn poison_reply_round_trip() {
        // Tell the victim the gateway IP lives at our MAC.
        let mut buf = [0u8; FRAME_SIZE];
        build_reply(&mut buf, OUR_MAC, OUR_MAC, gateway_ip(), VICTIM_MAC, victim_ip());

        let frame = parse(&buf).expect("should parse as ARP");
        assert_eq!(frame.op, ArpOperations::Reply);
        assert_eq!(frame.sender_mac, OUR_MAC);
        assert_eq!(frame.sender_ip, gateway_ip());
        assert_eq!(frame.target_mac, VICTIM_MAC);
        assert_eq!(frame.target_ip, victim_ip());

        let eth = EthernetPacket::new(&buf).unwrap();
        assert_eq!(eth.get_destination(), VICTIM_MAC);
    }

    #[test]
    fn restoration_reply_keeps_our_ethernet_source() {
        // The ARP payload carries the gateway's real MAC, but the frame
        // itself still leaves our NIC.
        let mut buf = [0u8; FRAME_SIZE];
        build_reply(&mut buf, OUR_MAC, GATEWAY_MAC, gateway_ip(), VICTIM_MAC, victim_ip());

        let eth = EthernetPacket::new(&buf).unwrap();
        assert_eq!(eth.get_source(), OUR_MAC);
        assert_eq!(eth.get_destination(), VICTIM_MAC);

        let frame = parse(&buf).unwrap();
        assert_eq!(frame.sender_mac, GATEWAY_MAC);
        assert_eq!(frame.sender_ip, gateway_ip());
    }

    #[test]
    fn emitted_frames_carry_wire_constants() {
        let mut buf = [0u8; FRAME_SIZE];
        build_request(&mut buf, OUR_MAC, victim_ip(), gateway_ip());

        assert_eq!(&buf[12..14], &[0x08, 0x06], "EtherType");
        assert_eq!(&buf[14..16], &[0x00, 0x01], "hardware type");
        assert_eq!(&buf[16..18], &[0x08, 0x00], "protocol type");
        assert_eq!(buf[18], 6, "hardware address length");
        assert_eq!(buf[19], 4, "protocol address length");
        assert_eq!(&buf[20..22], &[0x00, 0x01], "operation");
    }

    #[test]
    fn parse_rejects_non_arp_ethertype() {
        let mut buf = [0u8; FRAME_SIZE];
        build_request(&mut buf, OUR_MAC, victim_ip(), gateway_ip());
        buf[12] = 0x08;
        buf[13] = 0x00; // IPv4

        assert!(parse(&buf).is_none());
    }

    #[test]
    fn parse_rejects_wrong_hardware_type() {
        let mut buf = [0u8; FRAME_SIZE];
        build_request(&mut buf, OUR_MAC, victim_ip(), gateway_ip());
        buf[15] = 0x06; // IEEE 802 instead of Ethernet

        assert!(parse(&buf).is_none());
    }

    #[test]
    fn parse_rejects_wrong_address_lengths() {
        let mut buf = [0u8; FRAME_SIZE];
        build_reply(&mut buf, OUR_MAC, OUR_MAC, gateway_ip(), VICTIM_MAC, victim_ip());
        buf[19] = 16; // IPv6-sized protocol addresses

        assert!(parse(&buf).is_none());
    }

    #[test]
    fn parse_rejects_truncated() {
        assert!(parse(&[0u8; 10]).is_none());
    }

    #[test]
    fn parse_ignores_trailing_padding() {
        let mut buf = [0u8; FRAME_SIZE + 18];
        build_request(&mut buf[..FRAME_SIZE], OUR_MAC, victim_ip(), gateway_ip());

        let frame = parse(&buf).expect("padding must not break decoding");
        assert_eq!(frame.target_ip, gateway_ip());
    }
}
