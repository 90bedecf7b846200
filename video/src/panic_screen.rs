//! Full-screen diagnostic display shown on kernel panic.
//!
//! Paints a solid background with the panic message and register snapshot
//! over the raw framebuffer, bypassing the window manager entirely (the
//! desktop/compositor state may itself be what's broken).

use crate::font::draw_str;
use crate::graphics::{fill_rect, GraphicsContext};

const BG_COLOR: u32 = 0x000060A0;
const FG_COLOR: u32 = 0x00FFFFFF;
const MARGIN: i32 = 16;
const LINE_HEIGHT: i32 = 10;

fn write_hex(buf: &mut [u8; 18], value: u64) -> &str {
    const HEX: &[u8] = b"0123456789abcdef";
    buf[0] = b'0';
    buf[1] = b'x';
    for i in 0..16 {
        let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
        buf[2 + i] = HEX[nibble];
    }
    unsafe { core::str::from_utf8_unchecked(&buf[..]) }
}

/// Paints the panic screen. Returns `true` if a framebuffer was available
/// and the screen was drawn (caller should wait for an acknowledgement),
/// `false` if there was nothing to draw to.
pub fn display_panic_screen(
    message: Option<&str>,
    rip: Option<u64>,
    rsp: Option<u64>,
    cr0: u64,
    cr3: u64,
    cr4: u64,
) -> bool {
    let mut ctx = match GraphicsContext::new() {
        Ok(ctx) => ctx,
        Err(_) => return false,
    };

    let w = ctx.width() as i32;
    let h = ctx.height() as i32;
    fill_rect(&mut ctx, 0, 0, w, h, BG_COLOR);

    let mut y = MARGIN;
    draw_str(&mut ctx, MARGIN, y, "KERNEL PANIC", FG_COLOR, BG_COLOR);
    y += LINE_HEIGHT * 2;

    if let Some(msg) = message {
        draw_str(&mut ctx, MARGIN, y, msg, FG_COLOR, BG_COLOR);
        y += LINE_HEIGHT * 2;
    }

    let mut hexbuf = [0u8; 18];
    if let Some(rip) = rip {
        let s = write_hex(&mut hexbuf, rip);
        draw_str(&mut ctx, MARGIN, y, "RIP: ", FG_COLOR, BG_COLOR);
        draw_str(&mut ctx, MARGIN + 50, y, s, FG_COLOR, BG_COLOR);
        y += LINE_HEIGHT;
    }
    if let Some(rsp) = rsp {
        let s = write_hex(&mut hexbuf, rsp);
        draw_str(&mut ctx, MARGIN, y, "RSP: ", FG_COLOR, BG_COLOR);
        draw_str(&mut ctx, MARGIN + 50, y, s, FG_COLOR, BG_COLOR);
        y += LINE_HEIGHT;
    }
    {
        let s = write_hex(&mut hexbuf, cr0);
        draw_str(&mut ctx, MARGIN, y, "CR0: ", FG_COLOR, BG_COLOR);
        draw_str(&mut ctx, MARGIN + 50, y, s, FG_COLOR, BG_COLOR);
        y += LINE_HEIGHT;
    }
    {
        let s = write_hex(&mut hexbuf, cr3);
        draw_str(&mut ctx, MARGIN, y, "CR3: ", FG_COLOR, BG_COLOR);
        draw_str(&mut ctx, MARGIN + 50, y, s, FG_COLOR, BG_COLOR);
        y += LINE_HEIGHT;
    }
    {
        let s = write_hex(&mut hexbuf, cr4);
        draw_str(&mut ctx, MARGIN, y, "CR4: ", FG_COLOR, BG_COLOR);
        draw_str(&mut ctx, MARGIN + 50, y, s, FG_COLOR, BG_COLOR);
        y += LINE_HEIGHT * 2;
    }

    draw_str(
        &mut ctx,
        MARGIN,
        y,
        "Press ENTER to shut down.",
        FG_COLOR,
        BG_COLOR,
    );

    true
}
