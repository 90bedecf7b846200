#![no_std]
#![no_main]
#![forbid(unsafe_op_in_unsafe_fn)]
#![feature(alloc_error_handler)]

extern crate alloc;

mod interrupt_hooks;
mod shell;

use core::alloc::Layout;
use core::panic::PanicInfo;

use drift_boot as boot;
use drift_drivers::{pci, serial, serial_println};
use drift_fs as fs;
use drift_lib::cpu;
use drift_mm::KernelAllocator;
use drift_net as net;
use drift_video as video;

#[global_allocator]
static GLOBAL_ALLOCATOR: KernelAllocator = KernelAllocator::new();

#[no_mangle]
pub static kernel_stack_top: u8 = 0;

#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
    serial::init();
    serial_println!("Allocation failure: {layout:?}");
    cpu::halt_loop()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial::init();
    serial_println!("Kernel panic: {info}");
    cpu::halt_loop()
}

/// Finds the first attached e1000 NIC by scanning the PCI device table
/// directly. `drift_drivers::e1000::e1000_register` self-registers a PCI
/// driver for match/probe notification, but nothing in the boot sequence
/// ever calls it, so that path never fires.
fn find_e1000() -> Option<pci::pci_device_info_t> {
    let count = pci::pci_get_device_count();
    let devices = pci::pci_get_devices();
    for i in 0..count {
        let info = unsafe { &*devices.add(i) };
        if info.vendor_id == 0x8086 && info.device_id == 0x100E {
            return Some(*info);
        }
    }
    None
}

fn bring_up_network() {
    let Some(nic) = find_e1000() else {
        serial_println!("net: no e1000 device present, skipping network bring-up");
        return;
    };
    if !net::init(&nic) {
        serial_println!("net: bring-up failed");
        return;
    }
    if !net::configure_dhcp(0xC0FFEE) {
        serial_println!("net: dhcp failed, falling back to static 10.0.2.15");
        net::configure_static(net::types::Ipv4Addr::new(10, 0, 2, 15));
    }
}

#[cfg(feature = "builtin-tests")]
fn run_builtin_tests(cmdline: Option<&str>) {
    let cfg = drift_drivers::interrupts::config_from_cmdline(cmdline);
    drift_tests::tests_reset_registry();
    drift_tests::tests_register_system_suites();
    let mut summary = drift_tests::TestRunSummary::default();
    let _ = drift_tests::tests_run_all(&cfg, &mut summary);
}

#[cfg(not(feature = "builtin-tests"))]
fn run_builtin_tests(_cmdline: Option<&str>) {}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    boot::ensure_base_revision();
    let _ = boot::early_init::boot_init_run_all();
    let boot_info = boot::boot_info();

    serial::init();
    serial_println!("drift kernel booting");
    serial_println!(
        "HHDM offset: 0x{:x} | memmap entries: {}",
        boot_info.hhdm_offset,
        boot_info.memmap_entries
    );

    if let Err(e) = fs::vfs_init() {
        serial_println!("fs: init failed: {e:?}");
    }

    video::init(boot_info.framebuffer);
    bring_up_network();

    run_builtin_tests(boot_info.cmdline);

    serial_println!("drift kernel ready, entering shell");
    shell::run()
}
