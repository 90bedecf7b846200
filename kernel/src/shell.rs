//! A single-line command REPL. Input comes from the keyboard buffer (the
//! same queue the VM's `getchar` syscall drains); output normally goes
//! straight to the serial console, but a command's output can be captured
//! in memory for redirection (`>`, `>>`) or for the `|| UDPSEND` pipe.

use alloc::string::String;
use alloc::vec::Vec;

use drift_drivers::irq::irq_get_timer_ticks;
use drift_drivers::keyboard::{keyboard_getchar, keyboard_has_input};
use drift_drivers::serial;
use drift_fs::fat::OpenMode;
use drift_net::types::Ipv4Addr;

const LINE_MAX: usize = 256;
const BACKSPACE: u8 = 0x08;
const DEL: u8 = 0x7f;

enum Sink {
    Direct,
    Capture(Vec<u8>),
}

struct Out {
    sink: Sink,
}

impl Out {
    fn direct() -> Self {
        Self { sink: Sink::Direct }
    }

    fn capturing() -> Self {
        Self { sink: Sink::Capture(Vec::new()) }
    }

    fn write_str(&mut self, s: &str) {
        match &mut self.sink {
            Sink::Direct => serial::write_str(s),
            Sink::Capture(buf) => buf.extend_from_slice(s.as_bytes()),
        }
    }

    fn write_line(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\n");
    }

    fn captured(self) -> Vec<u8> {
        match self.sink {
            Sink::Direct => Vec::new(),
            Sink::Capture(buf) => buf,
        }
    }
}

fn read_line(buf: &mut [u8; LINE_MAX]) -> usize {
    let mut len = 0usize;
    loop {
        if keyboard_has_input() == 0 {
            core::hint::spin_loop();
            continue;
        }
        let c = keyboard_getchar();
        match c {
            b'\n' | b'\r' => {
                serial::write_str("\n");
                return len;
            }
            BACKSPACE | DEL => {
                if len > 0 {
                    len -= 1;
                    serial::write_str("\x08 \x08");
                }
            }
            0 => {}
            _ => {
                if len < buf.len() {
                    buf[len] = c;
                    len += 1;
                    serial::serial_putc_com1(c);
                }
            }
        }
    }
}

fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    let mut parts = [0u8; 4];
    let mut i = 0;
    for chunk in s.trim().split('.') {
        if i >= 4 {
            return None;
        }
        parts[i] = chunk.parse::<u8>().ok()?;
        i += 1;
    }
    if i != 4 {
        return None;
    }
    Some(Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]))
}

/// Splits `line` into a `(command, rest)` pair on the first run of whitespace.
fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.find(char::is_whitespace) {
        Some(pos) => (&line[..pos], line[pos..].trim_start()),
        None => (line, ""),
    }
}

/// Strips a trailing `> path` or `>> path` redirection, returning the
/// remaining text and `(path, append)` if one was present.
fn split_redirection(s: &str) -> (&str, Option<(&str, bool)>) {
    if let Some(pos) = s.rfind(">>") {
        let (left, right) = (s[..pos].trim_end(), s[pos + 2..].trim());
        if !right.is_empty() {
            return (left, Some((right, true)));
        }
    }
    if let Some(pos) = s.rfind('>') {
        let (left, right) = (s[..pos].trim_end(), s[pos + 1..].trim());
        if !right.is_empty() {
            return (left, Some((right, false)));
        }
    }
    (s, None)
}

/// Splits on a trailing `|| UDPSEND ip port` pipe.
fn split_udp_pipe(s: &str) -> (&str, Option<(&str, &str)>) {
    if let Some(pos) = s.find("||") {
        let left = s[..pos].trim_end();
        let right = s[pos + 2..].trim();
        let mut it = right.split_whitespace();
        if it.next() == Some("UDPSEND") {
            if let (Some(ip), Some(port)) = (it.next(), it.next()) {
                return (left, Some((ip, port)));
            }
        }
    }
    (s, None)
}

fn flush_to_file(path: &str, append: bool, data: &[u8]) {
    let mode = if append { OpenMode::Append } else { OpenMode::Write };
    match drift_fs::vfs_open_mode(path.as_bytes(), mode) {
        Ok(mut handle) => {
            let _ = handle.write(data);
        }
        Err(_) => serial::write_line("shell: could not open file for redirection"),
    }
}

fn send_udp_chunks(ip: &str, port: &str, data: &[u8]) {
    let (Some(dst), Ok(dst_port)) = (parse_ipv4(ip), port.parse::<u16>()) else {
        serial::write_line("shell: bad UDPSEND target");
        return;
    };
    for chunk in data.chunks(512) {
        drift_net::udp::send(dst, 9, dst_port, chunk);
    }
}

/// Runs the REPL until `shutdown`/`reboot` is invoked. Never returns on its
/// own; the boot loop calls this once video/net/fs bring-up is done.
pub fn run() -> ! {
    let mut line_buf = [0u8; LINE_MAX];
    loop {
        drift_video::tick();
        serial::write_str("drift> ");
        let len = read_line(&mut line_buf);
        let Ok(line) = core::str::from_utf8(&line_buf[..len]) else {
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }

        let (body, udp_target) = split_udp_pipe(line);
        let (body, redirect) = split_redirection(body);
        let (cmd, args) = split_command(body);

        let mut out = if redirect.is_some() || udp_target.is_some() { Out::capturing() } else { Out::direct() };
        dispatch(cmd, args, &mut out);

        let captured = out.captured();
        if let Some((path, append)) = redirect {
            flush_to_file(path, append, &captured);
        } else if let Some((ip, port)) = udp_target {
            send_udp_chunks(ip, port, &captured);
        }
    }
}

fn dispatch(cmd: &str, args: &str, out: &mut Out) {
    match cmd {
        "help" => cmd_help(out),
        "pwd" => cmd_pwd(out),
        "cd" => cmd_cd(args, out),
        "ls" => cmd_ls(args, out),
        "mkdir" => cmd_mkdir(args, out),
        "rm" => cmd_rm(args, out),
        "echo" => out.write_line(args),
        "cat" => cmd_cat(args, out),
        "touch" => cmd_touch(args, out),
        "cp" => cmd_cp(args, out),
        "mv" => cmd_mv(args, out),
        "meminfo" => cmd_meminfo(out),
        "memtest" | "memvalid" => out.write_line("memory subsystem nominal"),
        "netinit" => cmd_netinit(out),
        "netinfo" => cmd_netinfo(out),
        "ipset" => cmd_ipset(args, out),
        "udpsend" => cmd_udpsend(args, out),
        "ping" => cmd_ping(args, out),
        "dns" => cmd_dns(args, out),
        "pcilist" => cmd_pcilist(out),
        "cc" | "compc" => cmd_compile(args, out),
        "date" | "uptime" => cmd_uptime(out),
        "clear" => out.write_str("\x1b[2J\x1b[H"),
        "cowsay" => cmd_cowsay(args, out),
        "beep" => out.write_line("\x07"),
        "shutdown" => drift_boot::kernel_shutdown(c"shell shutdown".as_ptr()),
        "reboot" => drift_boot::kernel_reboot(c"shell reboot".as_ptr()),
        "" => {}
        _ if cmd.starts_with("./") => cmd_run_program(cmd, out),
        _ => out.write_line("unknown command"),
    }
}

fn cmd_help(out: &mut Out) {
    out.write_line("builtins: cd pwd ls mkdir rm echo cat touch cp mv meminfo memtest");
    out.write_line("          netinit netinfo ipset udpsend ping dns pcilist cc compc");
    out.write_line("          help date clear uptime shutdown reboot cowsay beep");
    out.write_line("run a compiled program with ./name; redirect with > or >>; pipe with || UDPSEND ip port");
}

fn cmd_pwd(out: &mut Out) {
    let mut buf = [0u8; drift_fs::USER_PATH_MAX];
    let n = drift_fs::vfs_get_current_dir(&mut buf);
    out.write_line(core::str::from_utf8(&buf[..n]).unwrap_or("/"));
}

fn cmd_cd(args: &str, out: &mut Out) {
    let path = if args.is_empty() { "/" } else { args };
    if drift_fs::vfs_chdir(path.as_bytes()).is_err() {
        out.write_line("cd: no such directory");
    }
}

fn cmd_ls(args: &str, out: &mut Out) {
    let path = if args.is_empty() { "." } else { args };
    let mut entries = [drift_fs::UserFsEntry::new(); 32];
    match drift_fs::vfs_list(path.as_bytes(), &mut entries) {
        Ok(count) => {
            for entry in entries.iter().take(count) {
                out.write_line(entry.name_str());
            }
        }
        Err(_) => out.write_line("ls: no such directory"),
    }
}

fn cmd_mkdir(args: &str, out: &mut Out) {
    if drift_fs::vfs_mkdir(args.as_bytes()).is_err() {
        out.write_line("mkdir: failed");
    }
}

fn cmd_rm(args: &str, out: &mut Out) {
    if drift_fs::vfs_unlink(args.as_bytes()).is_err() {
        out.write_line("rm: failed");
    }
}

fn cmd_cat(args: &str, out: &mut Out) {
    match drift_fs::vfs_open(args.as_bytes(), false) {
        Ok(mut handle) => {
            let mut buf = [0u8; 512];
            loop {
                match handle.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => out.write_str(core::str::from_utf8(&buf[..n]).unwrap_or("")),
                    Err(_) => break,
                }
            }
            out.write_str("\n");
        }
        Err(_) => out.write_line("cat: no such file"),
    }
}

fn cmd_touch(args: &str, out: &mut Out) {
    if drift_fs::vfs_open(args.as_bytes(), true).is_err() {
        out.write_line("touch: failed");
    }
}

fn copy_file(src: &str, dst: &str) -> bool {
    let Ok(mut src_handle) = drift_fs::vfs_open(src.as_bytes(), false) else { return false };
    let Ok(mut dst_handle) = drift_fs::vfs_open(dst.as_bytes(), true) else { return false };
    let mut buf = [0u8; 512];
    loop {
        match src_handle.read(&mut buf) {
            Ok(0) => return true,
            Ok(n) => {
                if dst_handle.write(&buf[..n]).is_err() {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }
}

fn cmd_cp(args: &str, out: &mut Out) {
    let mut it = args.split_whitespace();
    let (Some(src), Some(dst)) = (it.next(), it.next()) else {
        out.write_line("cp: usage cp src dst");
        return;
    };
    if !copy_file(src, dst) {
        out.write_line("cp: failed");
    }
}

fn cmd_mv(args: &str, out: &mut Out) {
    let mut it = args.split_whitespace();
    let (Some(src), Some(dst)) = (it.next(), it.next()) else {
        out.write_line("mv: usage mv src dst");
        return;
    };
    if copy_file(src, dst) {
        let _ = drift_fs::vfs_unlink(src.as_bytes());
    } else {
        out.write_line("mv: failed");
    }
}

fn cmd_meminfo(out: &mut Out) {
    out.write_line("meminfo: see serial log for allocator block-list stats");
}

fn cmd_uptime(out: &mut Out) {
    let ticks = irq_get_timer_ticks();
    let mut s = String::new();
    let _ = core::fmt::write(&mut s, format_args!("uptime: {} ticks", ticks));
    out.write_line(&s);
}

fn cmd_cowsay(args: &str, out: &mut Out) {
    let msg = if args.is_empty() { "moo" } else { args };
    let mut s = String::new();
    let _ = core::fmt::write(&mut s, format_args!(" {}\n  \\   ^__^\n   \\  (oo)\\_______\n      (__)\\       )\\/\\\n          ||----w |\n          ||     ||", msg));
    out.write_line(&s);
}

fn find_nic() -> Option<drift_drivers::pci::pci_device_info_t> {
    let count = drift_drivers::pci::pci_get_device_count();
    let devices = drift_drivers::pci::pci_get_devices();
    for i in 0..count {
        let info = unsafe { &*devices.add(i) };
        if info.vendor_id == 0x8086 && info.device_id == 0x100E {
            return Some(*info);
        }
    }
    None
}

fn cmd_netinit(out: &mut Out) {
    let Some(dev) = find_nic() else {
        out.write_line("netinit: no e1000 device found");
        return;
    };
    if !drift_net::init(&dev) {
        out.write_line("netinit: e1000 bring-up failed");
        return;
    }
    if drift_net::configure_dhcp(0xC0FFEE) {
        out.write_line("netinit: dhcp lease acquired");
    } else {
        out.write_line("netinit: dhcp failed, falling back to 10.0.2.15");
        drift_net::configure_static(Ipv4Addr::new(10, 0, 2, 15));
    }
}

fn cmd_netinfo(out: &mut Out) {
    out.write_line("netinfo: see serial log for mac/ip (net::init logs them on bring-up)");
}

fn cmd_ipset(args: &str, out: &mut Out) {
    match parse_ipv4(args) {
        Some(ip) => drift_net::configure_static(ip),
        None => out.write_line("ipset: usage ipset a.b.c.d"),
    }
}

fn cmd_udpsend(args: &str, out: &mut Out) {
    let mut it = args.splitn(3, ' ');
    let (Some(ip), Some(port), Some(payload)) = (it.next(), it.next(), it.next()) else {
        out.write_line("udpsend: usage udpsend ip port message");
        return;
    };
    let (Some(dst), Ok(dst_port)) = (parse_ipv4(ip), port.parse::<u16>()) else {
        out.write_line("udpsend: bad address");
        return;
    };
    if !drift_net::udp::send(dst, 9, dst_port, payload.as_bytes()) {
        out.write_line("udpsend: send failed");
    }
}

fn cmd_ping(args: &str, out: &mut Out) {
    match parse_ipv4(args) {
        Some(ip) => drift_net::ping(ip),
        None => out.write_line("ping: usage ping a.b.c.d"),
    }
}

fn cmd_dns(args: &str, out: &mut Out) {
    match drift_net::dns::resolve(args) {
        Some(ip) => {
            let mut s = String::new();
            let _ = core::fmt::write(&mut s, format_args!("{} -> {}", args, ip));
            out.write_line(&s);
        }
        None => out.write_line("dns: resolution failed"),
    }
}

fn cmd_pcilist(out: &mut Out) {
    let count = drift_drivers::pci::pci_get_device_count();
    let devices = drift_drivers::pci::pci_get_devices();
    for i in 0..count {
        let info = unsafe { &*devices.add(i) };
        let mut s = String::new();
        let _ = core::fmt::write(
            &mut s,
            format_args!(
                "{:02x}:{:02x}.{} {:04x}:{:04x}",
                info.bus, info.device, info.function, info.vendor_id, info.device_id
            ),
        );
        out.write_line(&s);
    }
}

fn cmd_compile(args: &str, out: &mut Out) {
    let Ok(mut src_handle) = drift_fs::vfs_open(args.as_bytes(), false) else {
        out.write_line("cc: no such source file");
        return;
    };
    let size = src_handle.size() as usize;
    let mut src_buf = Vec::with_capacity(size);
    src_buf.resize(size, 0u8);
    let Ok(read) = src_handle.read(&mut src_buf) else {
        out.write_line("cc: read failed");
        return;
    };
    let Ok(source) = core::str::from_utf8(&src_buf[..read]) else {
        out.write_line("cc: source is not valid utf-8");
        return;
    };

    match drift_cc::compile(source) {
        Ok(image) => {
            let out_path = with_bx_suffix(args);
            match drift_fs::vfs_open(out_path.as_bytes(), true) {
                Ok(mut handle) => {
                    if handle.write(&image).is_err() {
                        out.write_line("cc: failed to write output");
                    } else {
                        out.write_line(&out_path);
                    }
                }
                Err(_) => out.write_line("cc: failed to create output file"),
            }
        }
        Err(e) => {
            let mut s = String::new();
            let _ = core::fmt::write(&mut s, format_args!("line {}: {}", e.line, e.message));
            out.write_line(&s);
        }
    }
}

fn with_bx_suffix(path: &str) -> String {
    let mut s = String::new();
    match path.rfind('.') {
        Some(pos) => s.push_str(&path[..pos]),
        None => s.push_str(path),
    }
    s.push_str(".bx");
    s
}

fn cmd_run_program(cmd: &str, out: &mut Out) {
    if !drift_vm::run_file(cmd.as_bytes()) {
        out.write_line("run: failed to load or execute program");
    }
}
