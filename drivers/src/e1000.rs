#![allow(dead_code)]
#![allow(non_camel_case_types)]
#![allow(static_mut_refs)]

use core::ffi::{c_int, c_void};
use core::ptr;

use drift_lib::{klog_debug, klog_info};

use crate::pci::{pci_config_read32, pci_config_write32, pci_device_info_t, pci_driver_t};

const E1000_VENDOR_ID: u16 = 0x8086;
const E1000_DEVICE_ID_82540EM: u16 = 0x100E;

const E1000_REG_CTRL: u16 = 0x0000;
const E1000_REG_STATUS: u16 = 0x0008;
const E1000_REG_EERD: u16 = 0x0014;
const E1000_REG_ICR: u16 = 0x00C0;
const E1000_REG_IMS: u16 = 0x00D0;
const E1000_REG_RCTL: u16 = 0x0100;
const E1000_REG_TCTL: u16 = 0x0400;
const E1000_REG_TIPG: u16 = 0x0410;
const E1000_REG_RDBAL: u16 = 0x2800;
const E1000_REG_RDBAH: u16 = 0x2804;
const E1000_REG_RDLEN: u16 = 0x2808;
const E1000_REG_RDH: u16 = 0x2810;
const E1000_REG_RDT: u16 = 0x2818;
const E1000_REG_TDBAL: u16 = 0x3800;
const E1000_REG_TDBAH: u16 = 0x3804;
const E1000_REG_TDLEN: u16 = 0x3808;
const E1000_REG_TDH: u16 = 0x3810;
const E1000_REG_TDT: u16 = 0x3818;
const E1000_REG_RAL: u16 = 0x5400;
const E1000_REG_RAH: u16 = 0x5404;

const E1000_CTRL_RST: u32 = 1 << 26;
const E1000_CTRL_SLU: u32 = 1 << 6;

const E1000_RCTL_EN: u32 = 1 << 1;
const E1000_RCTL_SBP: u32 = 1 << 2;
const E1000_RCTL_UPE: u32 = 1 << 3;
const E1000_RCTL_MPE: u32 = 1 << 4;
const E1000_RCTL_LPE: u32 = 1 << 5;
const E1000_RCTL_LBM_NONE: u32 = 0 << 6;
const E1000_RCTL_RDMTS_HALF: u32 = 0 << 8;
const E1000_RCTL_MO_36: u32 = 0 << 12;
const E1000_RCTL_BAM: u32 = 1 << 15;
const E1000_RCTL_BSIZE_2048: u32 = 1 << 16;
const E1000_RCTL_SECRC: u32 = 1 << 26;

const E1000_TCTL_EN: u32 = 1 << 1;
const E1000_TCTL_PSP: u32 = 1 << 3;
const E1000_TCTL_CT: u32 = 0xF << 4;
const E1000_TCTL_COLD: u32 = 0x3F << 12;

const E1000_ICR_TXDW: u32 = 1 << 0;
const E1000_ICR_RXT0: u32 = 1 << 7;

const E1000_TX_RING_SIZE: usize = 32;
const E1000_RX_RING_SIZE: usize = 32;
const E1000_BUFFER_SIZE: usize = 2048;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct TxDesc {
    buffer_addr: u64,
    length: u16,
    cso: u8,
    cmd: u8,
    status: u8,
    css: u8,
    special: u16,
}

impl TxDesc {
    const fn zeroed() -> Self {
        Self {
            buffer_addr: 0,
            length: 0,
            cso: 0,
            cmd: 0,
            status: 0,
            css: 0,
            special: 0,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct RxDesc {
    buffer_addr: u64,
    length: u16,
    checksum: u16,
    status: u8,
    errors: u8,
    special: u16,
}

impl RxDesc {
    const fn zeroed() -> Self {
        Self {
            buffer_addr: 0,
            length: 0,
            checksum: 0,
            status: 0,
            errors: 0,
            special: 0,
        }
    }
}

struct E1000Device {
    mmio_base: *mut u32,
    bus: u8,
    device: u8,
    function: u8,
    initialized: bool,
    mac_address: [u8; 6],
    tx_head: u16,
    tx_tail: u16,
    rx_head: u16,
    rx_tail: u16,
}

impl E1000Device {
    const fn zeroed() -> Self {
        Self {
            mmio_base: ptr::null_mut(),
            bus: 0,
            device: 0,
            function: 0,
            initialized: false,
            mac_address: [0; 6],
            tx_head: 0,
            tx_tail: 0,
            rx_head: 0,
            rx_tail: 0,
        }
    }
}

#[repr(align(16))]
struct TxRing([TxDesc; E1000_TX_RING_SIZE]);
#[repr(align(16))]
struct RxRing([RxDesc; E1000_RX_RING_SIZE]);
#[repr(align(16))]
struct TxBuffers([[u8; E1000_BUFFER_SIZE]; E1000_TX_RING_SIZE]);
#[repr(align(16))]
struct RxBuffers([[u8; E1000_BUFFER_SIZE]; E1000_RX_RING_SIZE]);

static mut E1000_DEV: E1000Device = E1000Device::zeroed();
static mut TX_DESCRIPTORS: TxRing = TxRing([TxDesc::zeroed(); E1000_TX_RING_SIZE]);
static mut RX_DESCRIPTORS: RxRing = RxRing([RxDesc::zeroed(); E1000_RX_RING_SIZE]);
static mut TX_BUFFERS: TxBuffers = TxBuffers([[0; E1000_BUFFER_SIZE]; E1000_TX_RING_SIZE]);
static mut RX_BUFFERS: RxBuffers = RxBuffers([[0; E1000_BUFFER_SIZE]; E1000_RX_RING_SIZE]);
static mut E1000_INITIALIZED: bool = false;

unsafe extern "C" {
    fn mm_map_mmio_region(base_phys: u64, size: usize) -> *mut c_void;
    fn mm_virt_to_phys(virt: u64) -> u64;
}

#[inline]
unsafe fn read_reg(mmio_base: *mut u32, offset: u16) -> u32 {
    unsafe { ptr::read_volatile(mmio_base.add(offset as usize / 4)) }
}

#[inline]
unsafe fn write_reg(mmio_base: *mut u32, offset: u16, value: u32) {
    unsafe { ptr::write_volatile(mmio_base.add(offset as usize / 4), value) }
}

fn v2p(virt: *const core::ffi::c_void) -> u64 {
    unsafe { mm_virt_to_phys(virt as u64) }
}

/// Bring up an 82540EM-compatible NIC found behind `pci_dev`.
///
/// Mirrors the reset/ring-setup/link-up sequence of the spec's reference
/// driver: soft reset, MAC extraction from RAL/RAH, then TX/RX ring
/// programming before raising CTRL.SLU.
pub fn e1000_init(pci_dev: &pci_device_info_t) -> c_int {
    unsafe {
        if E1000_INITIALIZED {
            return 0;
        }

        let bus = pci_dev.bus;
        let device = pci_dev.device;
        let function = pci_dev.function;

        let bar0 = pci_config_read32(bus, device, function, 0x10);
        if bar0 == 0 || bar0 == 0xFFFF_FFFF {
            return -1;
        }
        if bar0 & 1 != 0 {
            return -1;
        }
        let mmio_phys = (bar0 & !0xF) as u64;
        let mmio_base = mm_map_mmio_region(mmio_phys, 0x20000) as *mut u32;
        if mmio_base.is_null() {
            return -1;
        }

        E1000_DEV = E1000Device::zeroed();
        E1000_DEV.mmio_base = mmio_base;
        E1000_DEV.bus = bus;
        E1000_DEV.device = device;
        E1000_DEV.function = function;

        let mut command = pci_config_read32(bus, device, function, 0x04);
        command |= 1 << 2;
        command |= 1 << 1;
        pci_config_write32(bus, device, function, 0x04, command);

        let mut ctrl = read_reg(mmio_base, E1000_REG_CTRL);
        write_reg(mmio_base, E1000_REG_CTRL, ctrl | E1000_CTRL_RST);
        for _ in 0..100_000 {
            ctrl = read_reg(mmio_base, E1000_REG_CTRL);
            if ctrl & E1000_CTRL_RST == 0 {
                break;
            }
        }

        let ral = read_reg(mmio_base, E1000_REG_RAL);
        let rah = read_reg(mmio_base, E1000_REG_RAH);
        E1000_DEV.mac_address = [
            (ral & 0xFF) as u8,
            ((ral >> 8) & 0xFF) as u8,
            ((ral >> 16) & 0xFF) as u8,
            ((ral >> 24) & 0xFF) as u8,
            (rah & 0xFF) as u8,
            ((rah >> 8) & 0xFF) as u8,
        ];
        klog_info!(
            "e1000: mac {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            E1000_DEV.mac_address[0],
            E1000_DEV.mac_address[1],
            E1000_DEV.mac_address[2],
            E1000_DEV.mac_address[3],
            E1000_DEV.mac_address[4],
            E1000_DEV.mac_address[5]
        );

        E1000_DEV.tx_head = 0;
        E1000_DEV.tx_tail = 0;
        for i in 0..E1000_TX_RING_SIZE {
            let buf_phys = v2p(TX_BUFFERS.0[i].as_ptr() as *const c_void);
            TX_DESCRIPTORS.0[i] = TxDesc {
                buffer_addr: buf_phys,
                length: 0,
                cso: 0,
                cmd: 0,
                status: 0,
                css: 0,
                special: 0,
            };
        }
        let tx_desc_phys = v2p(TX_DESCRIPTORS.0.as_ptr() as *const c_void);
        write_reg(mmio_base, E1000_REG_TDBAL, (tx_desc_phys & 0xFFFF_FFFF) as u32);
        write_reg(mmio_base, E1000_REG_TDBAH, (tx_desc_phys >> 32) as u32);
        write_reg(
            mmio_base,
            E1000_REG_TDLEN,
            (E1000_TX_RING_SIZE * core::mem::size_of::<TxDesc>()) as u32,
        );
        write_reg(mmio_base, E1000_REG_TDH, 0);
        write_reg(mmio_base, E1000_REG_TDT, 0);
        let tctl = E1000_TCTL_EN
            | E1000_TCTL_PSP
            | (E1000_TCTL_CT & (0x10 << 4))
            | (E1000_TCTL_COLD & (0x40 << 12));
        write_reg(mmio_base, E1000_REG_TCTL, tctl);
        write_reg(mmio_base, E1000_REG_TIPG, 0x0060200A);

        E1000_DEV.rx_head = 0;
        E1000_DEV.rx_tail = (E1000_RX_RING_SIZE - 1) as u16;
        for i in 0..E1000_RX_RING_SIZE {
            let buf_phys = v2p(RX_BUFFERS.0[i].as_ptr() as *const c_void);
            RX_DESCRIPTORS.0[i] = RxDesc {
                buffer_addr: buf_phys,
                length: 0,
                checksum: 0,
                status: 0,
                errors: 0,
                special: 0,
            };
        }
        let rx_desc_phys = v2p(RX_DESCRIPTORS.0.as_ptr() as *const c_void);
        write_reg(mmio_base, E1000_REG_RDBAL, (rx_desc_phys & 0xFFFF_FFFF) as u32);
        write_reg(mmio_base, E1000_REG_RDBAH, (rx_desc_phys >> 32) as u32);
        write_reg(
            mmio_base,
            E1000_REG_RDLEN,
            (E1000_RX_RING_SIZE * core::mem::size_of::<RxDesc>()) as u32,
        );
        write_reg(mmio_base, E1000_REG_RDH, 0);
        write_reg(mmio_base, E1000_REG_RDT, (E1000_RX_RING_SIZE - 1) as u32);
        let rctl = E1000_RCTL_EN
            | E1000_RCTL_SBP
            | E1000_RCTL_UPE
            | E1000_RCTL_MPE
            | E1000_RCTL_LPE
            | E1000_RCTL_LBM_NONE
            | E1000_RCTL_RDMTS_HALF
            | E1000_RCTL_MO_36
            | E1000_RCTL_BAM
            | E1000_RCTL_BSIZE_2048
            | E1000_RCTL_SECRC;
        write_reg(mmio_base, E1000_REG_RCTL, rctl);

        ctrl = read_reg(mmio_base, E1000_REG_CTRL);
        write_reg(mmio_base, E1000_REG_CTRL, ctrl | E1000_CTRL_SLU);

        E1000_DEV.initialized = true;
        E1000_INITIALIZED = true;
        klog_debug!("e1000: ring setup complete, link requested");
        0
    }
}

pub fn e1000_get_mac_address() -> Option<[u8; 6]> {
    unsafe {
        if E1000_INITIALIZED {
            Some(E1000_DEV.mac_address)
        } else {
            None
        }
    }
}

/// Queue `data` for transmission. Returns `-1` if the ring is full or the
/// device isn't up, `0` on success.
pub fn e1000_send_packet(data: &[u8]) -> c_int {
    unsafe {
        if !E1000_INITIALIZED || !E1000_DEV.initialized {
            return -1;
        }
        if data.len() > E1000_BUFFER_SIZE {
            return -1;
        }
        let mmio = E1000_DEV.mmio_base;
        let tail = E1000_DEV.tx_tail;
        let next_tail = (tail + 1) % E1000_TX_RING_SIZE as u16;
        if next_tail == E1000_DEV.tx_head {
            return -1;
        }
        let dst = &mut TX_BUFFERS.0[tail as usize][..data.len()];
        dst.copy_from_slice(data);
        TX_DESCRIPTORS.0[tail as usize].length = data.len() as u16;
        TX_DESCRIPTORS.0[tail as usize].cmd = 0x0B;
        TX_DESCRIPTORS.0[tail as usize].status = 0;
        E1000_DEV.tx_tail = next_tail;
        write_reg(mmio, E1000_REG_TDT, next_tail as u32);
        0
    }
}

/// Copy the oldest ready frame into `buffer`. Returns the frame length, or
/// `0` if nothing is pending.
pub fn e1000_receive_packet(buffer: &mut [u8]) -> usize {
    unsafe {
        if !E1000_INITIALIZED || !E1000_DEV.initialized {
            return 0;
        }
        let mmio = E1000_DEV.mmio_base;
        let hw_head = read_reg(mmio, E1000_REG_RDH) as u16;
        let tail = read_reg(mmio, E1000_REG_RDT) as u16;
        let next_idx = (tail + 1) % E1000_RX_RING_SIZE as u16;
        if hw_head == next_idx {
            return 0;
        }
        if RX_DESCRIPTORS.0[next_idx as usize].status & 1 == 0 {
            return 0;
        }
        let mut length = RX_DESCRIPTORS.0[next_idx as usize].length.saturating_sub(4) as usize;
        if length > buffer.len() {
            length = buffer.len();
        }
        buffer[..length].copy_from_slice(&RX_BUFFERS.0[next_idx as usize][..length]);
        RX_DESCRIPTORS.0[next_idx as usize].status = 0;
        RX_DESCRIPTORS.0[next_idx as usize].length = 0;
        write_reg(mmio, E1000_REG_RDT, next_idx as u32);
        E1000_DEV.rx_tail = next_idx;
        length
    }
}

extern "C" fn e1000_pci_match(info: *const pci_device_info_t, _ctx: *mut c_void) -> bool {
    let info = unsafe { &*info };
    info.vendor_id == E1000_VENDOR_ID && info.device_id == E1000_DEVICE_ID_82540EM
}

extern "C" fn e1000_pci_probe(info: *const pci_device_info_t, _ctx: *mut c_void) -> c_int {
    let info = unsafe { &*info };
    e1000_init(info)
}

static E1000_PCI_DRIVER_NAME: &[u8] = b"e1000\0";

static E1000_PCI_DRIVER: pci_driver_t = pci_driver_t {
    name: E1000_PCI_DRIVER_NAME.as_ptr(),
    match_fn: Some(e1000_pci_match),
    probe: Some(e1000_pci_probe),
    context: ptr::null_mut(),
};

/// Register the e1000 probe/match pair with the PCI enumeration driver
/// table, so `pci_init` picks it up without a hardcoded device list.
pub fn e1000_register() {
    crate::pci::pci_register_driver(&E1000_PCI_DRIVER as *const pci_driver_t);
}
