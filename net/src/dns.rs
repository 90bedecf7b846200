//! A one-shot DNS resolver: queries A records over UDP/53.

use drift_lib::IrqMutex;

use crate::eth;
use crate::types::Ipv4Addr;
use crate::udp;

const DNS_PORT: u16 = 53;
const LOCAL_PORT: u16 = 5353;
const QUERY_TIMEOUT_TICKS: u64 = 60;
const MAX_RETRIES: u32 = 3;
const FALLBACK_SERVER: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

struct ResolveState {
    pending: bool,
    id: u16,
    result: Option<Ipv4Addr>,
}

impl ResolveState {
    const fn new() -> Self {
        Self {
            pending: false,
            id: 0,
            result: None,
        }
    }
}

static STATE: IrqMutex<ResolveState> = IrqMutex::new(ResolveState::new());
static DNS_SERVER: IrqMutex<Ipv4Addr> = IrqMutex::new(FALLBACK_SERVER);

/// Records the DHCP-learned DNS server, used instead of the fallback.
pub fn set_server(server: Ipv4Addr) {
    *DNS_SERVER.lock() = server;
}

fn server() -> Ipv4Addr {
    *DNS_SERVER.lock()
}

fn encode_name(out: &mut [u8], name: &str) -> usize {
    let mut pos = 0;
    for label in name.split('.') {
        out[pos] = label.len() as u8;
        pos += 1;
        out[pos..pos + label.len()].copy_from_slice(label.as_bytes());
        pos += label.len();
    }
    out[pos] = 0;
    pos + 1
}

fn build_query(out: &mut [u8], id: u16, name: &str) -> usize {
    out[0..2].copy_from_slice(&id.to_be_bytes());
    out[2..4].copy_from_slice(&0x0100u16.to_be_bytes()); // recursion desired
    out[4..6].copy_from_slice(&1u16.to_be_bytes()); // qdcount
    out[6..8].copy_from_slice(&0u16.to_be_bytes());
    out[8..10].copy_from_slice(&0u16.to_be_bytes());
    out[10..12].copy_from_slice(&0u16.to_be_bytes());
    let mut pos = 12 + encode_name(&mut out[12..], name);
    out[pos..pos + 2].copy_from_slice(&1u16.to_be_bytes()); // TYPE A
    pos += 2;
    out[pos..pos + 2].copy_from_slice(&1u16.to_be_bytes()); // CLASS IN
    pos + 2
}

/// Skips a (possibly compressed) name starting at `pos`, returning the
/// offset just past it.
fn skip_name(packet: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *packet.get(pos)?;
        if len == 0 {
            return Some(pos + 1);
        }
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2);
        }
        pos += 1 + len as usize;
    }
}

fn parse_reply(packet: &[u8], expected_id: u16) -> Option<Ipv4Addr> {
    if packet.len() < 12 {
        return None;
    }
    let id = u16::from_be_bytes([packet[0], packet[1]]);
    if id != expected_id {
        return None;
    }
    let ancount = u16::from_be_bytes([packet[6], packet[7]]);
    if ancount == 0 {
        return None;
    }
    let qdcount = u16::from_be_bytes([packet[4], packet[5]]);

    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_name(packet, pos)?;
        pos += 4; // QTYPE + QCLASS
    }

    for _ in 0..ancount {
        pos = skip_name(packet, pos)?;
        let rtype = u16::from_be_bytes([*packet.get(pos)?, *packet.get(pos + 1)?]);
        let rdlength = u16::from_be_bytes([*packet.get(pos + 8)?, *packet.get(pos + 9)?]) as usize;
        pos += 10;
        if rtype == 1 && rdlength == 4 {
            return Some(Ipv4Addr::from_be_bytes(packet[pos..pos + 4].try_into().ok()?));
        }
        pos += rdlength;
    }
    None
}

fn on_reply(
    _src_ip: Ipv4Addr,
    _src_port: u16,
    _src_mac: crate::types::MacAddr,
    payload: &[u8],
) {
    let mut state = STATE.lock();
    if !state.pending {
        return;
    }
    if let Some(addr) = parse_reply(payload, state.id) {
        state.result = Some(addr);
        state.pending = false;
    }
}

/// Resolves `name` to an IPv4 address, retrying up to three times.
pub fn resolve(name: &str) -> Option<Ipv4Addr> {
    udp::register(LOCAL_PORT, on_reply);
    let id = 0xD45;
    let mut buf = [0u8; 512];
    let len = build_query(&mut buf, id, name);

    for _ in 0..MAX_RETRIES {
        {
            let mut state = STATE.lock();
            state.pending = true;
            state.id = id;
            state.result = None;
        }
        udp::send(server(), LOCAL_PORT, DNS_PORT, &buf[..len]);

        let start = drift_drivers::irq::irq_get_timer_ticks();
        while drift_drivers::irq::irq_get_timer_ticks().wrapping_sub(start) < QUERY_TIMEOUT_TICKS {
            eth::process_frames();
            if !STATE.lock().pending {
                break;
            }
        }
        if let Some(addr) = STATE.lock().result {
            udp::unregister(LOCAL_PORT);
            return Some(addr);
        }
    }

    udp::unregister(LOCAL_PORT);
    None
}
