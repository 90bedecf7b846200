//! Wires the bootloader's memory map into the region tracker, the physical
//! frame allocator, paging and the kernel heap. `init_memory_system` is
//! called once from `boot` early in kernel bring-up; everything else in
//! `mm` assumes it has already run.

use core::ffi::{c_char, c_int, c_void};
use core::sync::atomic::{AtomicBool, Ordering};

use drift_lib::klog_info;

use crate::kernel_heap::init_kernel_heap;
use crate::memory_layout::{set_total_memory, set_usable_memory};
use crate::memory_reservations::{mm_region_add_usable, mm_region_map_reset, mm_region_reserve, MmReservationType};
use crate::page_alloc::{finalize_page_allocator, init_page_allocator, page_allocator_descriptor_size};
use crate::paging::init_paging;

static MEMORY_SYSTEM_READY: AtomicBool = AtomicBool::new(false);

/// Mirrors `boot::limine_protocol::LimineMemmapEntry`. Duplicated here rather
/// than pulled in as a dependency: `mm` and `boot` only share a C ABI, not a
/// Rust type, and `mm` must not depend on `boot`.
#[repr(C)]
struct LimineMemmapEntry {
    base: u64,
    length: u64,
    typ: u64,
}

#[repr(C)]
struct LimineMemmapResponse {
    revision: u64,
    entry_count: u64,
    entries: *const *const LimineMemmapEntry,
}

const LIMINE_MEMMAP_USABLE: u64 = 0;
const LIMINE_MEMMAP_ACPI_RECLAIMABLE: u64 = 4;
const LIMINE_MEMMAP_ACPI_NVS: u64 = 5;
const LIMINE_MEMMAP_FRAMEBUFFER: u64 = 6;

/// Backing storage for the page-frame descriptor table. Sized generously
/// relative to the kernel heap pool; `init_page_allocator` is told the
/// actual frame count this buffer can hold based on the real descriptor
/// size, so growing `PageFrame` never silently truncates coverage below
/// what this buffer can address.
const FRAME_TABLE_BYTES: usize = 4 * 1024 * 1024;

#[repr(C, align(8))]
struct FrameTable([u8; FRAME_TABLE_BYTES]);

#[unsafe(link_section = ".bss.frametable")]
static mut FRAME_TABLE: FrameTable = FrameTable([0; FRAME_TABLE_BYTES]);

#[unsafe(no_mangle)]
pub extern "C" fn init_memory_system(memmap: *const LimineMemmapResponse, hhdm_offset: u64) -> c_int {
    if memmap.is_null() {
        klog_info!("init_memory_system: no memory map available");
        return -1;
    }
    // hhdm_offset is already readable through `hhdm::offset()`, which boot
    // populates independently; kept as a parameter to match the call site.
    let _ = hhdm_offset;

    mm_region_map_reset();

    let response = unsafe { &*memmap };
    let mut total_bytes: u64 = 0;
    let mut usable_bytes: u64 = 0;

    for i in 0..response.entry_count as usize {
        let entry_ptr = unsafe { *response.entries.add(i) };
        if entry_ptr.is_null() {
            continue;
        }
        let entry = unsafe { &*entry_ptr };
        total_bytes += entry.length;

        let null_label = core::ptr::null::<c_char>();
        match entry.typ {
            LIMINE_MEMMAP_USABLE => {
                usable_bytes += entry.length;
                mm_region_add_usable(entry.base, entry.length, null_label);
            }
            LIMINE_MEMMAP_FRAMEBUFFER => {
                mm_region_reserve(entry.base, entry.length, MmReservationType::Framebuffer, 0, null_label);
            }
            LIMINE_MEMMAP_ACPI_RECLAIMABLE => {
                mm_region_reserve(entry.base, entry.length, MmReservationType::AcpiReclaimable, 0, null_label);
            }
            LIMINE_MEMMAP_ACPI_NVS => {
                mm_region_reserve(entry.base, entry.length, MmReservationType::AcpiNvs, 0, null_label);
            }
            _ => {
                mm_region_reserve(entry.base, entry.length, MmReservationType::FirmwareOther, 0, null_label);
            }
        }
    }

    set_total_memory(total_bytes);
    set_usable_memory(usable_bytes);

    let desc_size = page_allocator_descriptor_size().max(1);
    let max_frames = (FRAME_TABLE_BYTES / desc_size) as u32;
    let frame_array = unsafe { FRAME_TABLE.0.as_mut_ptr() } as *mut c_void;
    init_page_allocator(frame_array, max_frames);
    finalize_page_allocator();

    init_paging();

    if init_kernel_heap() != 0 {
        klog_info!("init_memory_system: kernel heap initialization failed");
        return -1;
    }

    MEMORY_SYSTEM_READY.store(true, Ordering::Release);
    klog_info!("memory system ready: {} bytes total, {} bytes usable", total_bytes, usable_bytes);
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn is_memory_system_initialized() -> c_int {
    MEMORY_SYSTEM_READY.load(Ordering::Acquire) as c_int
}
