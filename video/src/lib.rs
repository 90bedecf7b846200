#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

extern crate alloc;

use drift_drivers::serial_println;
use drift_lib::FramebufferInfo;

pub mod apps;
pub mod backbuffer;
pub mod font;
pub mod framebuffer;
pub mod graphics;
pub mod panic_screen;
pub mod wm;

pub use apps::AppId;

/// Brings up the framebuffer and the window manager. A no-op (beyond a log
/// line) if the bootloader never handed us a framebuffer.
pub fn init(info: Option<FramebufferInfo>) {
    let Some(info) = info else {
        serial_println!("No framebuffer provided; skipping video init.");
        return;
    };

    serial_println!(
        "Framebuffer online: {}x{} pitch {} bpp {}",
        info.width,
        info.height,
        info.pitch,
        info.bpp
    );

    if framebuffer::init_with_info(info) != 0 {
        serial_println!("Framebuffer init failed; desktop will not start.");
        return;
    }

    wm::init();
}

/// Runs one composition tick (mouse/keyboard poll + paint + flip). Intended
/// to be driven from the kernel idle loop at a steady rate.
pub fn tick() {
    if framebuffer::framebuffer_is_initialized() != 0 {
        wm::tick();
    }
}
