//! A single-socket TCP state machine: CLOSED -> SYN_SENT -> ESTABLISHED -> CLOSED.

use drift_lib::IrqMutex;

use crate::eth;
use crate::ipv4;
use crate::types::Ipv4Addr;

const TCP_HEADER_LEN: usize = 20;
const RX_BUFFER_CAP: usize = 2048;
const CONNECT_TIMEOUT_TICKS: u64 = 3 * 60;
const CLOSE_TIMEOUT_TICKS: u64 = 2 * 60;

const FLAG_FIN: u8 = 0x01;
const FLAG_SYN: u8 = 0x02;
const FLAG_ACK: u8 = 0x10;
const FLAG_PSH: u8 = 0x08;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    SynSent,
    Established,
}

struct Socket {
    state: State,
    remote_ip: Ipv4Addr,
    remote_port: u16,
    local_port: u16,
    send_seq: u32,
    recv_ack: u32,
    rx_buf: [u8; RX_BUFFER_CAP],
    rx_len: usize,
}

impl Socket {
    const fn new() -> Self {
        Self {
            state: State::Closed,
            remote_ip: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            local_port: 0,
            send_seq: 1000,
            recv_ack: 0,
            rx_buf: [0; RX_BUFFER_CAP],
            rx_len: 0,
        }
    }
}

static SOCKET: IrqMutex<Socket> = IrqMutex::new(Socket::new());

fn build_segment(
    out: &mut [u8],
    local_port: u16,
    remote_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    payload: &[u8],
    remote_ip: Ipv4Addr,
) -> usize {
    out[0..2].copy_from_slice(&local_port.to_be_bytes());
    out[2..4].copy_from_slice(&remote_port.to_be_bytes());
    out[4..8].copy_from_slice(&seq.to_be_bytes());
    out[8..12].copy_from_slice(&ack.to_be_bytes());
    out[12] = 5 << 4;
    out[13] = flags;
    out[14..16].copy_from_slice(&(RX_BUFFER_CAP as u16).to_be_bytes());
    out[16..18].copy_from_slice(&0u16.to_be_bytes());
    out[18..20].copy_from_slice(&0u16.to_be_bytes());
    let total = TCP_HEADER_LEN + payload.len();
    out[TCP_HEADER_LEN..total].copy_from_slice(payload);

    let pseudo = ipv4::pseudo_header_sum(
        crate::our_ip(),
        remote_ip,
        ipv4::PROTO_TCP,
        total as u16,
    );
    let checksum = crate::types::checksum16_seeded(&out[..total], pseudo);
    out[16..18].copy_from_slice(&checksum.to_be_bytes());
    total
}

fn send_segment(socket: &Socket, flags: u8, payload: &[u8]) {
    let mut buf = [0u8; 1472];
    let len = build_segment(
        &mut buf,
        socket.local_port,
        socket.remote_port,
        socket.send_seq,
        socket.recv_ack,
        flags,
        payload,
        socket.remote_ip,
    );
    ipv4::send(socket.remote_ip, ipv4::PROTO_TCP, &buf[..len]);
}

pub fn handle_segment(segment: &[u8], src_ip: Ipv4Addr) {
    if segment.len() < TCP_HEADER_LEN {
        return;
    }
    let src_port = u16::from_be_bytes([segment[0], segment[1]]);
    let dst_port = u16::from_be_bytes([segment[2], segment[3]]);
    let their_seq = u32::from_be_bytes(segment[4..8].try_into().unwrap());
    let data_offset = ((segment[12] >> 4) as usize) * 4;
    let flags = segment[13];

    let mut socket = SOCKET.lock();
    if socket.local_port != dst_port || socket.remote_ip != src_ip || socket.remote_port != src_port {
        return;
    }

    match socket.state {
        State::SynSent => {
            if flags & FLAG_SYN != 0 && flags & FLAG_ACK != 0 {
                socket.recv_ack = their_seq.wrapping_add(1);
                socket.send_seq = socket.send_seq.wrapping_add(1);
                socket.state = State::Established;
                send_segment(&socket, FLAG_ACK, &[]);
            }
        }
        State::Established => {
            if flags & FLAG_FIN != 0 {
                socket.recv_ack = socket.recv_ack.wrapping_add(1);
                send_segment(&socket, FLAG_FIN | FLAG_ACK, &[]);
                socket.state = State::Closed;
                return;
            }
            if segment.len() > data_offset {
                let payload = &segment[data_offset..];
                let room = RX_BUFFER_CAP - socket.rx_len;
                let take = payload.len().min(room);
                let start = socket.rx_len;
                socket.rx_buf[start..start + take].copy_from_slice(&payload[..take]);
                socket.rx_len += take;
                socket.recv_ack = socket.recv_ack.wrapping_add(payload.len() as u32);
                send_segment(&socket, FLAG_ACK, &[]);
            }
        }
        State::Closed => {}
    }
}

fn next_ephemeral_port(remote_port: u16) -> u16 {
    49152 + remote_port % 1000
}

/// Opens a connection to `ip:port`, busy-polling until established or timed
/// out. Returns `true` on success.
pub fn connect(ip: Ipv4Addr, port: u16) -> bool {
    {
        let mut socket = SOCKET.lock();
        *socket = Socket::new();
        socket.remote_ip = ip;
        socket.remote_port = port;
        socket.local_port = next_ephemeral_port(port);
        socket.state = State::SynSent;
        send_segment(&socket, FLAG_SYN, &[]);
        socket.send_seq = socket.send_seq.wrapping_add(1);
    }

    let start = drift_drivers::irq::irq_get_timer_ticks();
    while drift_drivers::irq::irq_get_timer_ticks().wrapping_sub(start) < CONNECT_TIMEOUT_TICKS {
        eth::process_frames();
        if SOCKET.lock().state == State::Established {
            return true;
        }
    }

    SOCKET.lock().state = State::Closed;
    false
}

pub fn send(data: &[u8]) {
    let socket = SOCKET.lock();
    if socket.state != State::Established {
        return;
    }
    send_segment(&socket, FLAG_PSH | FLAG_ACK, data);
    drop(socket);
    SOCKET.lock().send_seq = SOCKET.lock().send_seq.wrapping_add(data.len() as u32);
}

pub fn close() {
    {
        let socket = SOCKET.lock();
        if socket.state != State::Established {
            return;
        }
        send_segment(&socket, FLAG_FIN | FLAG_ACK, &[]);
    }

    let start = drift_drivers::irq::irq_get_timer_ticks();
    while drift_drivers::irq::irq_get_timer_ticks().wrapping_sub(start) < CLOSE_TIMEOUT_TICKS {
        eth::process_frames();
        if SOCKET.lock().state == State::Closed {
            break;
        }
    }
    SOCKET.lock().state = State::Closed;
}

/// Drains and returns everything accumulated in the socket's RX buffer.
pub fn read(out: &mut [u8]) -> usize {
    let mut socket = SOCKET.lock();
    let take = socket.rx_len.min(out.len());
    out[..take].copy_from_slice(&socket.rx_buf[..take]);
    socket.rx_buf.copy_within(take..socket.rx_len, 0);
    socket.rx_len -= take;
    take
}

pub fn is_connected() -> bool {
    SOCKET.lock().state == State::Established
}
