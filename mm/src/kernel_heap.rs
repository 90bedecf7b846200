//! Flat allocation-table heap backed by a fixed-size static pool.
//!
//! Allocations are tracked as `(offset, size, id)` entries kept sorted by
//! offset in a single array; free space is whatever isn't covered by an
//! entry. This mirrors this kernel's original block-list allocator, minus
//! its permanent "whole pool is free" sentinel entry, which made
//! `memory_get_stats()`'s free/largest/smallest-block fields constant
//! regardless of actual fragmentation. Here, free-space and fragmentation
//! are derived directly from the gaps between allocated blocks.

#![allow(dead_code)]

use core::ffi::c_void;
use core::ptr;

use spin::Mutex;

use drift_lib::{klog_debug, klog_info};

const HEAP_POOL_SIZE: usize = 4 * 1024 * 1024;
const MAX_ALLOCATIONS: usize = 1024;
const MIN_ALIGN: u64 = 16;

#[repr(C, align(16))]
struct HeapPool([u8; HEAP_POOL_SIZE]);

#[unsafe(link_section = ".bss.heap")]
static mut HEAP_POOL: HeapPool = HeapPool([0; HEAP_POOL_SIZE]);

#[derive(Clone, Copy)]
struct MemBlock {
    offset: u64,
    size: u64,
    allocation_id: u32,
}

impl MemBlock {
    const fn empty() -> Self {
        Self { offset: 0, size: 0, allocation_id: 0 }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct HeapStats {
    pub total_size: u64,
    pub allocated_size: u64,
    pub free_size: u64,
    pub total_blocks: u32,
    pub allocated_blocks: u32,
    pub free_blocks: u32,
    pub allocation_count: u32,
    pub free_count: u32,
}

struct KernelHeap {
    blocks: [MemBlock; MAX_ALLOCATIONS],
    count: usize,
    next_allocation_id: u32,
    allocation_count: u32,
    free_count: u32,
    used_bytes: u64,
    peak_used_bytes: u64,
    initialized: bool,
}

unsafe impl Send for KernelHeap {}

impl KernelHeap {
    const fn new() -> Self {
        Self {
            blocks: [MemBlock::empty(); MAX_ALLOCATIONS],
            count: 0,
            next_allocation_id: 1,
            allocation_count: 0,
            free_count: 0,
            used_bytes: 0,
            peak_used_bytes: 0,
            initialized: false,
        }
    }

    /// Start and size of the gap immediately before `blocks[index]`.
    /// `index == count` is the gap after the last block, up to pool end.
    fn gap_before(&self, index: usize) -> (u64, u64) {
        let gap_start = if index == 0 {
            0
        } else {
            self.blocks[index - 1].offset + self.blocks[index - 1].size
        };
        let gap_end = if index == self.count { HEAP_POOL_SIZE as u64 } else { self.blocks[index].offset };
        (gap_start, gap_end.saturating_sub(gap_start))
    }

    fn find_fit(&self, size: u64) -> Option<usize> {
        (0..=self.count).find(|&index| self.gap_before(index).1 >= size)
    }

    fn insert_at(&mut self, index: usize, block: MemBlock) {
        let mut i = self.count;
        while i > index {
            self.blocks[i] = self.blocks[i - 1];
            i -= 1;
        }
        self.blocks[index] = block;
        self.count += 1;
    }

    fn remove_at(&mut self, index: usize) {
        for i in index..self.count - 1 {
            self.blocks[i] = self.blocks[i + 1];
        }
        self.count -= 1;
    }

    fn find_by_offset(&self, offset: u64) -> Option<usize> {
        self.blocks[..self.count].iter().position(|b| b.offset == offset)
    }

    fn free_gap_count(&self) -> u32 {
        (0..=self.count).filter(|&i| self.gap_before(i).1 > 0).count() as u32
    }
}

static KERNEL_HEAP: Mutex<KernelHeap> = Mutex::new(KernelHeap::new());

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

fn pool_base() -> *mut u8 {
    unsafe { HEAP_POOL.0.as_mut_ptr() }
}

fn offset_of(ptr_in: *mut c_void) -> Option<u64> {
    let base = pool_base() as u64;
    let addr = ptr_in as u64;
    if addr < base || addr >= base + HEAP_POOL_SIZE as u64 {
        return None;
    }
    Some(addr - base)
}

#[unsafe(no_mangle)]
pub extern "C" fn init_kernel_heap() -> core::ffi::c_int {
    let mut heap = KERNEL_HEAP.lock();
    if heap.initialized {
        return 0;
    }
    heap.count = 0;
    heap.next_allocation_id = 1;
    heap.allocation_count = 0;
    heap.free_count = 0;
    heap.used_bytes = 0;
    heap.peak_used_bytes = 0;
    heap.initialized = true;
    klog_debug!("kernel heap initialized with {} byte pool", HEAP_POOL_SIZE);
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn kmalloc(size: usize) -> *mut c_void {
    if size == 0 {
        return ptr::null_mut();
    }

    let mut heap = KERNEL_HEAP.lock();
    if !heap.initialized {
        klog_info!("kmalloc: heap not initialized");
        return ptr::null_mut();
    }
    if heap.count >= MAX_ALLOCATIONS {
        klog_info!("kmalloc: allocation table full");
        return ptr::null_mut();
    }

    let aligned_size = align_up(size as u64, MIN_ALIGN);
    let index = match heap.find_fit(aligned_size) {
        Some(index) => index,
        None => {
            klog_info!("kmalloc: out of heap space");
            return ptr::null_mut();
        }
    };

    let (gap_start, _) = heap.gap_before(index);
    let allocation_id = heap.next_allocation_id;
    heap.next_allocation_id += 1;
    heap.insert_at(index, MemBlock { offset: gap_start, size: aligned_size, allocation_id });
    heap.allocation_count += 1;
    heap.used_bytes += aligned_size;
    if heap.used_bytes > heap.peak_used_bytes {
        heap.peak_used_bytes = heap.used_bytes;
    }
    drop(heap);

    let out = unsafe { pool_base().add(gap_start as usize) };
    unsafe { ptr::write_bytes(out, 0, size) };
    out as *mut c_void
}

#[unsafe(no_mangle)]
pub extern "C" fn kzalloc(size: usize) -> *mut c_void {
    kmalloc(size)
}

#[unsafe(no_mangle)]
pub extern "C" fn kfree(ptr_in: *mut c_void) {
    if ptr_in.is_null() {
        return;
    }
    let mut heap = KERNEL_HEAP.lock();
    if !heap.initialized {
        return;
    }
    let offset = match offset_of(ptr_in) {
        Some(offset) => offset,
        None => {
            klog_info!("kfree: pointer outside heap pool");
            return;
        }
    };
    let index = match heap.find_by_offset(offset) {
        Some(index) => index,
        None => {
            klog_info!("kfree: double free or invalid pointer");
            return;
        }
    };
    heap.used_bytes = heap.used_bytes.saturating_sub(heap.blocks[index].size);
    heap.remove_at(index);
    heap.free_count += 1;
}

#[unsafe(no_mangle)]
pub extern "C" fn krealloc(ptr_in: *mut c_void, new_size: usize) -> *mut c_void {
    if ptr_in.is_null() {
        return kmalloc(new_size);
    }
    if new_size == 0 {
        kfree(ptr_in);
        return ptr::null_mut();
    }

    let mut heap = KERNEL_HEAP.lock();
    let offset = match offset_of(ptr_in) {
        Some(offset) => offset,
        None => return ptr::null_mut(),
    };
    let index = match heap.find_by_offset(offset) {
        Some(index) => index,
        None => return ptr::null_mut(),
    };

    let old_size = heap.blocks[index].size;
    let aligned_new = align_up(new_size as u64, MIN_ALIGN);
    if aligned_new <= old_size {
        heap.blocks[index].size = aligned_new;
        return ptr_in;
    }
    drop(heap);

    let new_ptr = kmalloc(new_size);
    if new_ptr.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        ptr::copy_nonoverlapping(ptr_in as *const u8, new_ptr as *mut u8, old_size.min(new_size as u64) as usize);
    }
    kfree(ptr_in);
    new_ptr
}

#[unsafe(no_mangle)]
pub extern "C" fn get_heap_stats(stats: *mut HeapStats) {
    if stats.is_null() {
        return;
    }
    let heap = KERNEL_HEAP.lock();
    let free_size = HEAP_POOL_SIZE as u64 - heap.used_bytes;
    let out = HeapStats {
        total_size: HEAP_POOL_SIZE as u64,
        allocated_size: heap.used_bytes,
        free_size,
        total_blocks: heap.count as u32,
        allocated_blocks: heap.count as u32,
        free_blocks: heap.free_gap_count(),
        allocation_count: heap.allocation_count,
        free_count: heap.free_count,
    };
    unsafe {
        *stats = out;
    }
}

/// Returns 0 if valid, -1 if `ptr` does not point at the start of a live
/// allocation (including pool-bounds and overlap violations in the block
/// table itself).
#[unsafe(no_mangle)]
pub extern "C" fn memory_is_valid_ptr(ptr_in: *mut c_void) -> core::ffi::c_int {
    if ptr_in.is_null() {
        return 0;
    }
    let heap = KERNEL_HEAP.lock();
    match offset_of(ptr_in) {
        Some(offset) => heap.find_by_offset(offset).is_some() as core::ffi::c_int,
        None => 0,
    }
}

/// Walks the block table checking pool bounds and pairwise ordering/overlap.
#[unsafe(no_mangle)]
pub extern "C" fn memory_validate() -> core::ffi::c_int {
    let heap = KERNEL_HEAP.lock();
    for i in 0..heap.count {
        let block = &heap.blocks[i];
        if block.offset + block.size > HEAP_POOL_SIZE as u64 {
            return -1;
        }
        if i + 1 < heap.count && block.offset + block.size > heap.blocks[i + 1].offset {
            return -1;
        }
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn memory_get_peak_usage() -> u64 {
    KERNEL_HEAP.lock().peak_used_bytes
}

#[unsafe(no_mangle)]
pub extern "C" fn memory_reset_peak() {
    let mut heap = KERNEL_HEAP.lock();
    heap.peak_used_bytes = heap.used_bytes;
}

#[unsafe(no_mangle)]
pub extern "C" fn print_heap_stats() {
    let mut stats = HeapStats::default();
    get_heap_stats(&mut stats);
    klog_info!(
        "heap: {}/{} bytes used, {} blocks, {} allocations, {} frees, peak {}",
        stats.allocated_size,
        stats.total_size,
        stats.allocated_blocks,
        stats.allocation_count,
        stats.free_count,
        memory_get_peak_usage(),
    );
}
