//! Architecture constants for x86_64, shared by boot, drivers and mm.
//!
//! No user-mode ring 3 constants live here: this kernel never drops privilege.

#![allow(dead_code)]

/// Base vector for hardware IRQs after the PIC remap (IRQ0 maps to this vector).
pub const IRQ_BASE_VECTOR: u8 = 32;

/// Size of a standard 4 KiB page.
pub const PAGE_SIZE_4KB: u64 = 4096;

/// An I/O port address, newtyped to keep it distinct from a memory address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Port(pub u16);

impl Port {
    #[inline]
    pub const fn new(port: u16) -> Self {
        Self(port)
    }
}
