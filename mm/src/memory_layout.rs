//! Descriptive information about kernel layout and installed memory,
//! populated once during `init_memory_system` and exposed to panic paths
//! and diagnostics that need to run before the rest of `mm` is trusted.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::mm_constants::KERNEL_VIRTUAL_BASE;
use crate::symbols::kernel_bounds;

static TOTAL_MEMORY: AtomicU64 = AtomicU64::new(0);
static USABLE_MEMORY: AtomicU64 = AtomicU64::new(0);

pub(crate) fn set_total_memory(bytes: u64) {
    TOTAL_MEMORY.store(bytes, Ordering::Relaxed);
}

pub(crate) fn set_usable_memory(bytes: u64) {
    USABLE_MEMORY.store(bytes, Ordering::Relaxed);
}

#[unsafe(no_mangle)]
pub extern "C" fn mm_get_total_memory() -> u64 {
    TOTAL_MEMORY.load(Ordering::Relaxed)
}

#[unsafe(no_mangle)]
pub extern "C" fn mm_get_usable_memory() -> u64 {
    USABLE_MEMORY.load(Ordering::Relaxed)
}

#[unsafe(no_mangle)]
pub extern "C" fn mm_get_kernel_virtual_base() -> u64 {
    KERNEL_VIRTUAL_BASE
}

/// Writes the kernel image's `[start, end)` virtual address range. Either
/// output pointer may be null.
#[unsafe(no_mangle)]
pub extern "C" fn mm_get_kernel_bounds(start: *mut u64, end: *mut u64) {
    let (kstart, kend) = kernel_bounds();
    unsafe {
        if !start.is_null() {
            *start = kstart as u64;
        }
        if !end.is_null() {
            *end = kend as u64;
        }
    }
}
