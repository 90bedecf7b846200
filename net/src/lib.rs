//! Cooperative network stack: Ethernet, ARP, IPv4, UDP, ICMP, TCP, DNS and DHCP
//! layered on top of the e1000 driver. Nothing here spawns a thread; callers
//! drive progress by calling [`process_frames`] (directly, or indirectly via
//! the blocking helpers below) from their own loop.

#![no_std]

pub mod arp;
pub mod dhcp;
pub mod dns;
pub mod eth;
pub mod icmp;
pub mod ipv4;
pub mod tcp;
pub mod types;
pub mod udp;

use drift_lib::{klog_info, klog_warn, IrqMutex};
use drift_drivers::e1000;
use drift_drivers::pci::pci_device_info_t;

use types::{Ipv4Addr, MacAddr};

static NIC_MAC: IrqMutex<Option<MacAddr>> = IrqMutex::new(None);
static OUR_IP: IrqMutex<Ipv4Addr> = IrqMutex::new(Ipv4Addr::UNSPECIFIED);

pub(crate) fn our_mac() -> MacAddr {
    NIC_MAC.lock().unwrap_or_default()
}

pub(crate) fn our_ip() -> Ipv4Addr {
    *OUR_IP.lock()
}

/// Brings the stack up against an already-registered e1000 device: reads the
/// MAC address and clears any stale address state. Call [`configure_dhcp`]
/// or [`configure_static`] afterwards to get an IP.
pub fn init(pci_dev: &pci_device_info_t) -> bool {
    if e1000::e1000_init(pci_dev) != 0 {
        klog_warn!("net: e1000 init failed");
        return false;
    }
    let Some(mac) = e1000::e1000_get_mac_address() else {
        klog_warn!("net: no MAC address reported");
        return false;
    };
    *NIC_MAC.lock() = Some(MacAddr::new(mac));
    *OUR_IP.lock() = Ipv4Addr::UNSPECIFIED;
    klog_info!("net: up, mac={}", MacAddr::new(mac));
    true
}

/// Assigns a static address without running DHCP.
pub fn configure_static(ip: Ipv4Addr) {
    *OUR_IP.lock() = ip;
}

/// Runs the DHCP client to completion and adopts the leased address. Returns
/// `false` if no lease could be obtained.
pub fn configure_dhcp(xid: u32) -> bool {
    let mac = our_mac();
    let Some(lease) = dhcp::acquire(mac, xid) else {
        return false;
    };
    *OUR_IP.lock() = lease.ip;
    if lease.dns != Ipv4Addr::UNSPECIFIED {
        dns::set_server(lease.dns);
    }
    klog_info!("net: leased {} via dhcp", lease.ip);
    true
}

/// Drains whatever frames are pending on the NIC. Cheap to call from an idle
/// loop; all blocking network calls (ping, DNS, TCP connect) call this
/// internally while they wait.
pub fn process_frames() {
    eth::process_frames();
}

pub use icmp::ping;
