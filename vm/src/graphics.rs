//! Bridges the VM's graphics syscalls to the window manager's overlay
//! surface. Every drawing call here goes through `drift_video::wm`, never
//! touches the framebuffer directly.

use drift_abi::DrawTarget;
use drift_video::wm;

pub fn install() {
    wm::clear_overlay();
}

pub fn teardown() {
    wm::clear_overlay();
}

pub fn draw_pixel(x: i32, y: i32, color: u32) {
    wm::with_canvas(|canvas| canvas.draw_pixel(x, y, color));
}

pub fn draw_rect(x: i32, y: i32, w: i32, h: i32, color: u32) {
    wm::with_canvas(|canvas| canvas.fill_rect(x, y, w, h, color));
    wm::push_overlay_rect(x, y, w, h, color);
}

pub fn draw_line(x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    wm::with_canvas(|canvas| {
        let (mut x0, mut y0) = (x0, y0);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            canvas.draw_pixel(x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    });
}

pub fn draw_text(x: i32, y: i32, text: &str, color: u32) {
    wm::with_canvas(|canvas| drift_video::font::draw_str(canvas, x, y, text, color, 0));
}

pub fn get_width() -> i32 {
    wm::screen_size().0
}

pub fn get_height() -> i32 {
    wm::screen_size().1
}
