//! Accessor for the bootloader's higher-half direct map offset.
//!
//! The offset itself is computed once during early boot (`boot::limine_protocol`)
//! and exposed here as a C-ABI extern to avoid a `mm` -> `boot` Cargo dependency.

use core::ffi::c_int;

unsafe extern "C" {
    fn get_hhdm_offset() -> u64;
    fn is_hhdm_available() -> c_int;
}

#[inline]
pub fn offset() -> u64 {
    unsafe { get_hhdm_offset() }
}

#[inline]
pub fn is_available() -> bool {
    unsafe { is_hhdm_available() != 0 }
}
