#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod apic;
pub mod e1000;
pub mod interrupt_test;
pub mod interrupt_test_config;
pub mod interrupts;
pub mod ioapic;
pub mod irq;
pub mod keyboard;
pub mod mouse;
pub mod pci;
pub mod pic;
pub mod pit;
pub mod platform_init;
pub mod random;
pub mod serial;
