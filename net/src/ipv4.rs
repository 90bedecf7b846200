//! IPv4 header build/parse, checksum, and protocol demux.

use crate::types::{checksum16, Ipv4Addr, MacAddr, ETHERTYPE_IPV4, MAC_BROADCAST};
use crate::{arp, eth, icmp, our_ip, our_mac, tcp, udp};

pub const IPV4_HEADER_LEN: usize = 20;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

pub struct Ipv4Header {
    pub total_length: u16,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

fn parse_header(packet: &[u8]) -> Option<Ipv4Header> {
    if packet.len() < IPV4_HEADER_LEN {
        return None;
    }
    let total_length = u16::from_be_bytes([packet[2], packet[3]]);
    if total_length as usize > packet.len() {
        return None;
    }
    if checksum16(&packet[..IPV4_HEADER_LEN]) != 0 {
        return None;
    }
    Some(Ipv4Header {
        total_length,
        protocol: packet[9],
        src: Ipv4Addr(packet[12..16].try_into().ok()?),
        dst: Ipv4Addr(packet[16..20].try_into().ok()?),
    })
}

pub fn handle_packet(packet: &[u8], src_mac: MacAddr) {
    let Some(header) = parse_header(packet) else {
        return;
    };
    if header.dst != our_ip() && !header.dst.is_broadcast() {
        return;
    }

    let payload = &packet[IPV4_HEADER_LEN..header.total_length as usize];
    match header.protocol {
        PROTO_ICMP => icmp::handle_packet(payload, header.src),
        PROTO_UDP => udp::handle_packet(payload, header.src, src_mac),
        PROTO_TCP => tcp::handle_segment(payload, header.src),
        _ => {}
    }
}

fn write_header(out: &mut [u8], payload_len: usize, protocol: u8, dst: Ipv4Addr) {
    let total_length = (IPV4_HEADER_LEN + payload_len) as u16;
    out[0] = 0x45;
    out[1] = 0;
    out[2..4].copy_from_slice(&total_length.to_be_bytes());
    out[4..6].copy_from_slice(&0u16.to_be_bytes());
    out[6..8].copy_from_slice(&0u16.to_be_bytes());
    out[8] = 64;
    out[9] = protocol;
    out[10..12].copy_from_slice(&0u16.to_be_bytes());
    out[12..16].copy_from_slice(&our_ip().to_be_bytes());
    out[16..20].copy_from_slice(&dst.to_be_bytes());
    let sum = checksum16(&out[..IPV4_HEADER_LEN]);
    out[10..12].copy_from_slice(&sum.to_be_bytes());
}

/// Builds Ethernet + IPv4 headers around `payload` and sends the frame.
/// Returns `false` if the destination MAC could not be resolved (the
/// caller should retry after a tick or two).
pub fn send(dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> bool {
    let mut frame = [0u8; eth::MAX_FRAME_LEN];
    let dst_mac = if dst.is_broadcast() {
        MAC_BROADCAST
    } else {
        match arp::lookup(dst) {
            Some(mac) => mac,
            None => {
                // Kick the ARP reply along by broadcasting this once; the
                // caller's retry loop will resend once the cache fills in.
                MAC_BROADCAST
            }
        }
    };

    eth::write_header(&mut frame, dst_mac, our_mac(), ETHERTYPE_IPV4);
    write_header(
        &mut frame[eth::ETH_HEADER_LEN..],
        payload.len(),
        protocol,
        dst,
    );
    let payload_start = eth::ETH_HEADER_LEN + IPV4_HEADER_LEN;
    frame[payload_start..payload_start + payload.len()].copy_from_slice(payload);

    eth::send_frame(&frame[..payload_start + payload.len()]);
    dst.is_broadcast() || arp::lookup(dst).is_some()
}

/// Computes the pseudo-header sum used by UDP and TCP checksums.
pub fn pseudo_header_sum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, len: u16) -> u32 {
    let mut buf = [0u8; 12];
    buf[0..4].copy_from_slice(&src.to_be_bytes());
    buf[4..8].copy_from_slice(&dst.to_be_bytes());
    buf[8] = 0;
    buf[9] = protocol;
    buf[10..12].copy_from_slice(&len.to_be_bytes());
    let mut sum: u32 = 0;
    for chunk in buf.chunks_exact(2) {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    sum
}
