//! Ethernet frame parsing/building and the RX demux loop.

use drift_drivers::e1000;

use crate::types::{MacAddr, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use crate::{arp, ipv4, NIC_MAC};

pub const ETH_HEADER_LEN: usize = 14;
pub const MAX_FRAME_LEN: usize = 1518;

pub struct EthHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

pub fn parse_header(frame: &[u8]) -> Option<EthHeader> {
    if frame.len() < ETH_HEADER_LEN {
        return None;
    }
    Some(EthHeader {
        dst: MacAddr::new(frame[0..6].try_into().ok()?),
        src: MacAddr::new(frame[6..12].try_into().ok()?),
        ethertype: u16::from_be_bytes([frame[12], frame[13]]),
    })
}

/// Writes a 14-byte Ethernet header into `out`. Returns the number of bytes written.
pub fn write_header(out: &mut [u8], dst: MacAddr, src: MacAddr, ethertype: u16) -> usize {
    out[0..6].copy_from_slice(&dst.0);
    out[6..12].copy_from_slice(&src.0);
    out[12..14].copy_from_slice(&ethertype.to_be_bytes());
    ETH_HEADER_LEN
}

pub fn send_frame(frame: &[u8]) -> i32 {
    e1000::e1000_send_packet(frame)
}

/// Drains the NIC's RX ring, dispatching each frame to the ARP or IPv4
/// handler. Call this from anywhere that needs fresh packets: it is the
/// only place that ever reads the ring.
pub fn process_frames() {
    let mut buf = [0u8; MAX_FRAME_LEN];
    loop {
        let len = e1000::e1000_receive_packet(&mut buf);
        if len == 0 {
            break;
        }
        let frame = &buf[..len];
        let Some(header) = parse_header(frame) else {
            continue;
        };

        let our_mac = NIC_MAC.lock().unwrap_or_default();
        if header.dst != our_mac && !header.dst.is_broadcast() {
            continue;
        }

        let payload = &frame[ETH_HEADER_LEN..];
        match header.ethertype {
            ETHERTYPE_ARP => arp::handle_packet(payload, header.src),
            ETHERTYPE_IPV4 => ipv4::handle_packet(payload, header.src),
            _ => {}
        }
    }
}
