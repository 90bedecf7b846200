//! Address Resolution Protocol: a small cache plus request/reply handling.

use drift_lib::IrqMutex;

use crate::eth;
use crate::types::{MacAddr, Ipv4Addr, ETHERTYPE_ARP, MAC_BROADCAST};
use crate::{our_ip, our_mac};

const ARP_HTYPE_ETHERNET: u16 = 1;
const ARP_PTYPE_IPV4: u16 = 0x0800;
const ARP_OP_REQUEST: u16 = 1;
const ARP_OP_REPLY: u16 = 2;
const ARP_PACKET_LEN: usize = 28;
const CACHE_SIZE: usize = 16;

#[derive(Clone, Copy)]
struct ArpEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
    used: bool,
}

impl ArpEntry {
    const fn empty() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            mac: MacAddr([0; 6]),
            used: false,
        }
    }
}

struct ArpCache {
    entries: [ArpEntry; CACHE_SIZE],
}

impl ArpCache {
    const fn new() -> Self {
        Self {
            entries: [ArpEntry::empty(); CACHE_SIZE],
        }
    }

    fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.used && e.ip == ip) {
            entry.mac = mac;
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| !e.used) {
            *entry = ArpEntry { ip, mac, used: true };
            return;
        }
        self.entries[0] = ArpEntry { ip, mac, used: true };
    }

    fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries
            .iter()
            .find(|e| e.used && e.ip == ip)
            .map(|e| e.mac)
    }
}

static CACHE: IrqMutex<ArpCache> = IrqMutex::new(ArpCache::new());

fn build_packet(out: &mut [u8; ARP_PACKET_LEN], op: u16, target_ip: Ipv4Addr, target_mac: MacAddr) {
    out[0..2].copy_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
    out[2..4].copy_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
    out[4] = 6;
    out[5] = 4;
    out[6..8].copy_from_slice(&op.to_be_bytes());
    out[8..14].copy_from_slice(&our_mac().0);
    out[14..18].copy_from_slice(&our_ip().to_be_bytes());
    out[18..24].copy_from_slice(&target_mac.0);
    out[24..28].copy_from_slice(&target_ip.to_be_bytes());
}

fn send(op: u16, dst_mac: MacAddr, target_ip: Ipv4Addr, target_mac: MacAddr) {
    let mut packet = [0u8; ARP_PACKET_LEN];
    build_packet(&mut packet, op, target_ip, target_mac);

    let mut frame = [0u8; eth::ETH_HEADER_LEN + ARP_PACKET_LEN];
    eth::write_header(&mut frame, dst_mac, our_mac(), ETHERTYPE_ARP);
    frame[eth::ETH_HEADER_LEN..].copy_from_slice(&packet);
    eth::send_frame(&frame);
}

pub fn handle_packet(payload: &[u8], _src_mac: MacAddr) {
    if payload.len() < ARP_PACKET_LEN {
        return;
    }
    let op = u16::from_be_bytes([payload[6], payload[7]]);
    let sender_mac = MacAddr(payload[8..14].try_into().unwrap());
    let sender_ip = Ipv4Addr(payload[14..18].try_into().unwrap());
    let target_ip = Ipv4Addr(payload[24..28].try_into().unwrap());

    if op != ARP_OP_REQUEST && op != ARP_OP_REPLY {
        return;
    }

    CACHE.lock().insert(sender_ip, sender_mac);

    if op == ARP_OP_REQUEST && target_ip == our_ip() {
        send(ARP_OP_REPLY, sender_mac, sender_ip, sender_mac);
    }
}

/// Resolves `ip` to a MAC address. On a cache miss this emits a request and
/// returns `None`; the caller is expected to retry after a few ticks.
pub fn lookup(ip: Ipv4Addr) -> Option<MacAddr> {
    if let Some(mac) = CACHE.lock().lookup(ip) {
        return Some(mac);
    }
    send(ARP_OP_REQUEST, MAC_BROADCAST, ip, MacAddr([0; 6]));
    None
}
