//! Shared packet builders for dissection tests.

use std::net::{IpAddr, Ipv4Addr};

use super::{
    default_registry, dissect_record, Dissection, FragmentKey, FragmentLedger, Requirements,
    LINKTYPE_ETHERNET,
};

/// Ethernet II header with the given ethertype.
pub fn eth_header(ethertype: u16) -> Vec<u8> {
    let mut eth = Vec::with_capacity(14);
    eth.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]); // dst
    eth.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]); // src
    eth.extend_from_slice(&ethertype.to_be_bytes());
    eth
}

/// IPv4 header (no options) from 192.168.1.1 to 192.168.1.2.
pub fn ipv4_header(protocol: u8, id: u16, flags_frag: u16, payload_len: u16) -> Vec<u8> {
    let mut ip = Vec::with_capacity(20);
    ip.push(0x45); // version + IHL
    ip.push(0x00); // DSCP + ECN
    ip.extend_from_slice(&(20 + payload_len).to_be_bytes());
    ip.extend_from_slice(&id.to_be_bytes());
    ip.extend_from_slice(&flags_frag.to_be_bytes());
    ip.push(64); // TTL
    ip.push(protocol);
    ip.extend_from_slice(&[0x00, 0x00]); // checksum (not validated)
    ip.extend_from_slice(&[192, 168, 1, 1]);
    ip.extend_from_slice(&[192, 168, 1, 2]);
    ip
}

/// Full Ethernet/IPv4/TCP packet with a SYN.
pub fn eth_ipv4_tcp_packet(src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[12] = 0x50; // data offset: 5 words
    tcp[13] = 0x02; // SYN
    tcp[14..16].copy_from_slice(&64240u16.to_be_bytes());

    let mut packet = eth_header(0x0800);
    packet.extend_from_slice(&ipv4_header(6, 1, 0, 20));
    packet.extend_from_slice(&tcp);
    packet
}

/// Full Ethernet/IPv4/UDP packet.
pub fn eth_ipv4_udp_packet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let udp_len = (8 + payload.len()) as u16;
    let mut udp = Vec::with_capacity(udp_len as usize);
    udp.extend_from_slice(&src_port.to_be_bytes());
    udp.extend_from_slice(&dst_port.to_be_bytes());
    udp.extend_from_slice(&udp_len.to_be_bytes());
    udp.extend_from_slice(&[0x00, 0x00]); // checksum
    udp.extend_from_slice(payload);

    let mut packet = eth_header(0x0800);
    packet.extend_from_slice(&ipv4_header(17, 2, 0, udp_len));
    packet.extend_from_slice(&udp);
    packet
}

/// Ethernet/IPv4 UDP fragment. `offset` is in 8-byte units; the first
/// fragment (offset 0) carries a UDP header in its payload.
pub fn eth_ipv4_fragment(id: u16, offset: u16, more_fragments: bool, payload: &[u8]) -> Vec<u8> {
    let mut flags_frag = offset & 0x1fff;
    if more_fragments {
        flags_frag |= 0x2000;
    }

    let mut packet = eth_header(0x0800);
    packet.extend_from_slice(&ipv4_header(17, id, flags_frag, payload.len() as u16));
    packet.extend_from_slice(payload);
    packet
}

/// The fragment key every builder above produces.
pub fn fragment_key_for(_packet: &[u8]) -> FragmentKey {
    FragmentKey {
        src: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        dst: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
        id: 0x1234,
        protocol: 17,
    }
}

/// Dissect a packet with tree and columns, empty ledger.
pub fn dissect_for_test(packet: &[u8]) -> Dissection<'_> {
    let ledger = FragmentLedger::new();
    let registry = default_registry();
    let req = Requirements {
        columns: true,
        tree: true,
        ..Requirements::default()
    };
    dissect_record(&registry, 1, LINKTYPE_ETHERNET, packet, &ledger, &req).unwrap()
}
