//! UDP: a small port table plus send/receive framing.

use drift_lib::IrqMutex;

use crate::ipv4;
use crate::types::{Ipv4Addr, MacAddr};

pub const UDP_HEADER_LEN: usize = 8;
const MAX_CALLBACKS: usize = 8;

pub type UdpCallback = fn(src_ip: Ipv4Addr, src_port: u16, src_mac: MacAddr, payload: &[u8]);

#[derive(Clone, Copy)]
struct Registration {
    port: u16,
    callback: UdpCallback,
    used: bool,
}

impl Registration {
    const fn empty() -> Self {
        Self {
            port: 0,
            callback: noop_callback,
            used: false,
        }
    }
}

fn noop_callback(_src_ip: Ipv4Addr, _src_port: u16, _src_mac: MacAddr, _payload: &[u8]) {}

struct PortTable {
    entries: [Registration; MAX_CALLBACKS],
}

impl PortTable {
    const fn new() -> Self {
        Self {
            entries: [Registration::empty(); MAX_CALLBACKS],
        }
    }

    fn register(&mut self, port: u16, callback: UdpCallback) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.used && e.port == port) {
            slot.callback = callback;
            return;
        }
        if let Some(slot) = self.entries.iter_mut().find(|e| !e.used) {
            *slot = Registration { port, callback, used: true };
        }
    }

    fn unregister(&mut self, port: u16) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.used && e.port == port) {
            slot.used = false;
        }
    }

    fn find(&self, port: u16) -> Option<UdpCallback> {
        self.entries
            .iter()
            .find(|e| e.used && e.port == port)
            .map(|e| e.callback)
    }
}

static TABLE: IrqMutex<PortTable> = IrqMutex::new(PortTable::new());

/// Registers `callback` for `port`, replacing any existing registration.
pub fn register(port: u16, callback: UdpCallback) {
    TABLE.lock().register(port, callback);
}

pub fn unregister(port: u16) {
    TABLE.lock().unregister(port);
}

pub fn handle_packet(packet: &[u8], src_ip: Ipv4Addr, src_mac: MacAddr) {
    if packet.len() < UDP_HEADER_LEN {
        return;
    }
    let src_port = u16::from_be_bytes([packet[0], packet[1]]);
    let dst_port = u16::from_be_bytes([packet[2], packet[3]]);
    let length = u16::from_be_bytes([packet[4], packet[5]]) as usize;
    if length > packet.len() || length < UDP_HEADER_LEN {
        return;
    }
    let payload = &packet[UDP_HEADER_LEN..length];

    if let Some(callback) = TABLE.lock().find(dst_port) {
        callback(src_ip, src_port, src_mac, payload);
    }
}

fn build_segment(out: &mut [u8], src_port: u16, dst_port: u16, payload: &[u8], dst: Ipv4Addr) {
    let length = (UDP_HEADER_LEN + payload.len()) as u16;
    out[0..2].copy_from_slice(&src_port.to_be_bytes());
    out[2..4].copy_from_slice(&dst_port.to_be_bytes());
    out[4..6].copy_from_slice(&length.to_be_bytes());
    out[6..8].copy_from_slice(&0u16.to_be_bytes());
    out[UDP_HEADER_LEN..UDP_HEADER_LEN + payload.len()].copy_from_slice(payload);

    let pseudo = ipv4::pseudo_header_sum(crate::our_ip(), dst, ipv4::PROTO_UDP, length);
    let checksum = crate::types::checksum16_seeded(&out[..length as usize], pseudo);
    let checksum = if checksum == 0 { 0xFFFF } else { checksum };
    out[6..8].copy_from_slice(&checksum.to_be_bytes());
}

pub fn send(dst: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> bool {
    let mut segment = [0u8; 1472];
    if payload.len() + UDP_HEADER_LEN > segment.len() {
        return false;
    }
    build_segment(&mut segment, src_port, dst_port, payload, dst);
    ipv4::send(dst, ipv4::PROTO_UDP, &segment[..UDP_HEADER_LEN + payload.len()])
}
