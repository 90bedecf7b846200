//! ICMP echo request/reply (ping).

use drift_lib::{klog_info, IrqMutex};

use crate::eth;
use crate::ipv4;
use crate::types::{checksum16_seeded, Ipv4Addr};

const ICMP_HEADER_LEN: usize = 8;
const ECHO_REQUEST: u8 = 8;
const ECHO_REPLY: u8 = 0;
const PING_PAYLOAD: [u8; 8] = *b"driftpg!";
const PING_TIMEOUT_TICKS: u64 = 3 * 60;

struct PingState {
    active: bool,
    id: u16,
    seq: u16,
    replied: bool,
}

impl PingState {
    const fn new() -> Self {
        Self {
            active: false,
            id: 0,
            seq: 0,
            replied: false,
        }
    }
}

static PING: IrqMutex<PingState> = IrqMutex::new(PingState::new());

pub fn handle_packet(packet: &[u8], src: Ipv4Addr) {
    if packet.len() < ICMP_HEADER_LEN {
        return;
    }
    if packet[0] != ECHO_REPLY {
        return;
    }
    let id = u16::from_be_bytes([packet[4], packet[5]]);

    let mut state = PING.lock();
    if state.active && state.id == id {
        state.replied = true;
        klog_info!("ping: reply from {src} seq={}", state.seq);
    }
}

fn build_echo(out: &mut [u8], id: u16, seq: u16) {
    out[0] = ECHO_REQUEST;
    out[1] = 0;
    out[2..4].copy_from_slice(&0u16.to_be_bytes());
    out[4..6].copy_from_slice(&id.to_be_bytes());
    out[6..8].copy_from_slice(&seq.to_be_bytes());
    out[ICMP_HEADER_LEN..ICMP_HEADER_LEN + PING_PAYLOAD.len()].copy_from_slice(&PING_PAYLOAD);
    let checksum = checksum16_seeded(&out[..ICMP_HEADER_LEN + PING_PAYLOAD.len()], 0);
    out[2..4].copy_from_slice(&checksum.to_be_bytes());
}

/// Pings `dst` four times, printing `timeout` or a reply line for each.
pub fn ping(dst: Ipv4Addr) {
    let id = 0xD417;
    for seq in 0..4u16 {
        {
            let mut state = PING.lock();
            state.active = true;
            state.id = id;
            state.seq = seq;
            state.replied = false;
        }

        let mut packet = [0u8; ICMP_HEADER_LEN + PING_PAYLOAD.len()];
        build_echo(&mut packet, id, seq);
        ipv4::send(dst, ipv4::PROTO_ICMP, &packet);

        let start = drift_drivers::irq::irq_get_timer_ticks();
        let mut replied = false;
        while drift_drivers::irq::irq_get_timer_ticks().wrapping_sub(start) < PING_TIMEOUT_TICKS {
            eth::process_frames();
            if PING.lock().replied {
                replied = true;
                break;
            }
        }

        if !replied {
            klog_info!("ping: seq={seq} timeout");
        }
    }

    PING.lock().active = false;
}
