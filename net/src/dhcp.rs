//! DHCP client: DISCOVER -> OFFER -> REQUEST -> ACK/NAK.

use drift_lib::{klog_info, klog_warn, IrqMutex};

use crate::eth;
use crate::types::{Ipv4Addr, MacAddr};
use crate::udp;

const CLIENT_PORT: u16 = 68;
const SERVER_PORT: u16 = 67;
const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const OP_REQUEST: u8 = 1;
const OP_REPLY: u8 = 2;
const HTYPE_ETHERNET: u8 = 1;

const MSG_DISCOVER: u8 = 1;
const MSG_OFFER: u8 = 2;
const MSG_REQUEST: u8 = 3;
const MSG_ACK: u8 = 5;
const MSG_NAK: u8 = 6;

const PHASE_TIMEOUT_TICKS: u64 = 3 * 60;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Reply {
    None,
    Offer { ip: Ipv4Addr, server: Ipv4Addr },
    Ack { ip: Ipv4Addr, server: Ipv4Addr, router: Ipv4Addr, dns: Ipv4Addr },
    Nak,
}

struct Session {
    xid: u32,
    reply: Reply,
}

impl Session {
    const fn new() -> Self {
        Self { xid: 0, reply: Reply::None }
    }
}

static SESSION: IrqMutex<Session> = IrqMutex::new(Session::new());

fn build_header(out: &mut [u8], xid: u32, mac: MacAddr, client_ip: Ipv4Addr) {
    out[0] = OP_REQUEST;
    out[1] = HTYPE_ETHERNET;
    out[2] = 6;
    out[3] = 0;
    out[4..8].copy_from_slice(&xid.to_be_bytes());
    out[8..10].copy_from_slice(&0u16.to_be_bytes());
    out[10..12].copy_from_slice(&0x8000u16.to_be_bytes()); // broadcast flag
    out[12..16].copy_from_slice(&client_ip.to_be_bytes());
    out[16..20].copy_from_slice(&[0; 4]); // yiaddr
    out[20..24].copy_from_slice(&[0; 4]); // siaddr
    out[24..28].copy_from_slice(&[0; 4]); // giaddr
    out[28..34].copy_from_slice(&mac.0);
    out[34..236].fill(0);
    out[236..240].copy_from_slice(&MAGIC_COOKIE);
}

fn append_option(out: &mut [u8], pos: &mut usize, code: u8, data: &[u8]) {
    out[*pos] = code;
    out[*pos + 1] = data.len() as u8;
    out[*pos + 2..*pos + 2 + data.len()].copy_from_slice(data);
    *pos += 2 + data.len();
}

fn build_discover(out: &mut [u8], xid: u32, mac: MacAddr) -> usize {
    build_header(out, xid, mac, Ipv4Addr::UNSPECIFIED);
    let mut pos = 240;
    append_option(out, &mut pos, 53, &[MSG_DISCOVER]);
    append_option(out, &mut pos, 55, &[1, 3, 6]); // param request: subnet, router, dns
    out[pos] = 0xFF;
    pos + 1
}

fn build_request(out: &mut [u8], xid: u32, mac: MacAddr, requested_ip: Ipv4Addr, server: Ipv4Addr) -> usize {
    build_header(out, xid, mac, Ipv4Addr::UNSPECIFIED);
    let mut pos = 240;
    append_option(out, &mut pos, 53, &[MSG_REQUEST]);
    append_option(out, &mut pos, 50, &requested_ip.to_be_bytes());
    append_option(out, &mut pos, 54, &server.to_be_bytes());
    out[pos] = 0xFF;
    pos + 1
}

fn parse_options(packet: &[u8]) -> Option<(u8, Ipv4Addr, Ipv4Addr, Ipv4Addr)> {
    let mut msg_type = 0u8;
    let mut server = Ipv4Addr::UNSPECIFIED;
    let mut router = Ipv4Addr::UNSPECIFIED;
    let mut dns = Ipv4Addr::UNSPECIFIED;

    let mut pos = 240;
    while pos < packet.len() {
        let code = packet[pos];
        if code == 0xFF {
            break;
        }
        if code == 0 {
            pos += 1;
            continue;
        }
        let len = *packet.get(pos + 1)? as usize;
        let data = packet.get(pos + 2..pos + 2 + len)?;
        match (code, len) {
            (53, 1) => msg_type = data[0],
            (54, 4) => server = Ipv4Addr::from_be_bytes(data.try_into().ok()?),
            (3, 4) => router = Ipv4Addr::from_be_bytes(data.try_into().ok()?),
            (6, 4) => dns = Ipv4Addr::from_be_bytes(data.try_into().ok()?),
            _ => {}
        }
        pos += 2 + len;
    }
    Some((msg_type, server, router, dns))
}

fn on_reply(_src_ip: Ipv4Addr, _src_port: u16, _src_mac: MacAddr, packet: &[u8]) {
    if packet.len() < 240 || packet[0] != OP_REPLY {
        return;
    }
    let xid = u32::from_be_bytes(packet[4..8].try_into().unwrap());
    let yiaddr = Ipv4Addr::from_be_bytes(packet[16..20].try_into().unwrap());
    let Some((msg_type, server, router, dns)) = parse_options(packet) else {
        return;
    };

    let mut session = SESSION.lock();
    if session.xid != xid {
        return;
    }
    session.reply = match msg_type {
        MSG_OFFER => Reply::Offer { ip: yiaddr, server },
        MSG_ACK => Reply::Ack { ip: yiaddr, server, router, dns },
        MSG_NAK => Reply::Nak,
        _ => return,
    };
}

fn wait_for_reply(check: impl Fn(Reply) -> bool) -> Reply {
    let start = drift_drivers::irq::irq_get_timer_ticks();
    while drift_drivers::irq::irq_get_timer_ticks().wrapping_sub(start) < PHASE_TIMEOUT_TICKS {
        eth::process_frames();
        let reply = SESSION.lock().reply;
        if check(reply) {
            return reply;
        }
    }
    Reply::None
}

/// Result of a successful DHCP lease.
pub struct Lease {
    pub ip: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns: Ipv4Addr,
}

/// Runs the DISCOVER/OFFER/REQUEST/ACK exchange and returns the lease.
pub fn acquire(mac: MacAddr, xid: u32) -> Option<Lease> {
    udp::register(CLIENT_PORT, on_reply);
    SESSION.lock().xid = xid;
    SESSION.lock().reply = Reply::None;

    let mut buf = [0u8; 300];
    let len = build_discover(&mut buf, xid, mac);
    udp::send(Ipv4Addr::BROADCAST, CLIENT_PORT, SERVER_PORT, &buf[..len]);

    let (offer_ip, offer_server) = match wait_for_reply(|r| matches!(r, Reply::Offer { .. })) {
        Reply::Offer { ip, server } => (ip, server),
        _ => {
            klog_warn!("dhcp: no offer received");
            udp::unregister(CLIENT_PORT);
            return None;
        }
    };

    SESSION.lock().reply = Reply::None;
    let len = build_request(&mut buf, xid, mac, offer_ip, offer_server);
    udp::send(Ipv4Addr::BROADCAST, CLIENT_PORT, SERVER_PORT, &buf[..len]);

    let result = match wait_for_reply(|r| matches!(r, Reply::Ack { .. } | Reply::Nak)) {
        Reply::Ack { ip, router, dns, .. } => {
            klog_info!("dhcp: leased {ip}");
            Some(Lease { ip, router, dns })
        }
        Reply::Nak => {
            klog_warn!("dhcp: request denied");
            None
        }
        _ => {
            klog_warn!("dhcp: no ack received");
            None
        }
    };

    udp::unregister(CLIENT_PORT);
    result
}
