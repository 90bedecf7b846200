//! Retro-style window manager and compositor.
//!
//! A fixed array of windows, painted bottom-to-top into a shared back
//! buffer and flipped to the framebuffer whenever something changed.

use drift_abi::DrawTarget;
use drift_drivers::keyboard::{keyboard_getchar, keyboard_has_input};
use drift_drivers::mouse::{self, MOUSE_BUTTON_LEFT, MOUSE_BUTTON_RIGHT};
use drift_lib::io::{inb, outb};
use drift_lib::IrqMutex;

use crate::apps::{self, AppId, AppScratch};
use crate::backbuffer::Canvas;
use crate::font;

pub const MAX_WINDOWS: usize = 4;

const TITLE_BAR_HEIGHT: i32 = 18;
const CLOSE_BUTTON_SIZE: i32 = 14;
const TASKBAR_HEIGHT: i32 = 24;
const START_BUTTON_WIDTH: i32 = 56;
const CURSOR_SIZE: i32 = 10;

const COLOR_DESKTOP: u32 = 0x00205070;
const COLOR_TASKBAR: u32 = 0x00303030;
const COLOR_START_BTN: u32 = 0x00505050;
const COLOR_START_MENU: u32 = 0x00404040;
const COLOR_WINDOW_BG: u32 = 0x00C0C0C0;
const COLOR_TITLE_ACTIVE: u32 = 0x00000080;
const COLOR_TITLE_INACTIVE: u32 = 0x00707070;
const COLOR_TITLE_TEXT: u32 = 0x00FFFFFF;
const COLOR_CLOSE_BTN: u32 = 0x00C04040;
const COLOR_CURSOR: u32 = 0x00FFFFFF;
const COLOR_BORDER: u32 = 0x00000000;

#[derive(Clone, Copy)]
pub struct Window {
    pub title: &'static str,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub visible: bool,
    pub focused: bool,
    pub z: i32,
    pub app: AppId,
    pub scratch: AppScratch,
}

impl Window {
    const fn new(title: &'static str, x: i32, y: i32, w: i32, h: i32, z: i32, app: AppId) -> Self {
        Self {
            title,
            x,
            y,
            w,
            h,
            visible: false,
            focused: false,
            z,
            app,
            scratch: AppScratch::new(),
        }
    }

    #[inline]
    fn contains(&self, px: i32, py: i32) -> bool {
        self.visible && px >= self.x && px < self.x + self.w && py >= self.y && py < self.y + self.h
    }

    #[inline]
    fn title_bar_rect(&self) -> (i32, i32, i32, i32) {
        (self.x, self.y, self.w, TITLE_BAR_HEIGHT)
    }

    #[inline]
    fn close_button_rect(&self) -> (i32, i32, i32, i32) {
        (
            self.x + self.w - CLOSE_BUTTON_SIZE - 2,
            self.y + 2,
            CLOSE_BUTTON_SIZE,
            CLOSE_BUTTON_SIZE,
        )
    }

    #[inline]
    fn client_rect(&self) -> (i32, i32, i32, i32) {
        (
            self.x,
            self.y + TITLE_BAR_HEIGHT,
            self.w,
            self.h - TITLE_BAR_HEIGHT,
        )
    }
}

#[derive(Clone, Copy)]
enum DragState {
    Idle,
    Dragging { idx: usize, offset_x: i32, offset_y: i32 },
}

struct WmState {
    windows: [Window; MAX_WINDOWS],
    canvas: Option<Canvas>,
    cursor_x: i32,
    cursor_y: i32,
    prev_buttons: u8,
    drag: DragState,
    start_menu_open: bool,
    force_redraw: bool,
    last_rtc_second: i32,
}

impl WmState {
    const fn new() -> Self {
        Self {
            windows: [
                Window::new("About", 40, 40, 220, 140, 0, AppId::About),
                Window::new("Calculator", 300, 60, 180, 200, 1, AppId::Calculator),
                Window::new("Notepad", 80, 220, 300, 220, 2, AppId::Notepad),
                Window::new("Editor", 360, 260, 320, 240, 3, AppId::Editor),
            ],
            canvas: None,
            cursor_x: 0,
            cursor_y: 0,
            prev_buttons: 0,
            drag: DragState::Idle,
            start_menu_open: false,
            force_redraw: true,
            last_rtc_second: -1,
        }
    }

    fn max_z(&self) -> i32 {
        self.windows.iter().map(|w| w.z).max().unwrap_or(0)
    }
}

static WM: IrqMutex<WmState> = IrqMutex::new(WmState::new());

const MAX_OVERLAY_RECTS: usize = 64;

#[derive(Clone, Copy)]
struct OverlayRect {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    color: u32,
}

static OVERLAY: IrqMutex<([Option<OverlayRect>; MAX_OVERLAY_RECTS], usize)> =
    IrqMutex::new(([None; MAX_OVERLAY_RECTS], 0));

/// Appends a filled rectangle to the overlay list, replayed on top of
/// windows on every repaint. Used by the VM's `draw_rect` syscall so its
/// drawing survives the desktop's next compose pass.
pub fn push_overlay_rect(x: i32, y: i32, w: i32, h: i32, color: u32) {
    let mut overlay = OVERLAY.lock();
    let (rects, count) = &mut *overlay;
    if *count < MAX_OVERLAY_RECTS {
        rects[*count] = Some(OverlayRect { x, y, w, h, color });
        *count += 1;
    }
    WM.lock().force_redraw = true;
}

/// Clears the overlay list. Call when a VM program halts.
pub fn clear_overlay() {
    let mut overlay = OVERLAY.lock();
    overlay.1 = 0;
    WM.lock().force_redraw = true;
}

fn paint_overlay(canvas: &mut Canvas) {
    let overlay = OVERLAY.lock();
    for rect in overlay.0[..overlay.1].iter().flatten() {
        graphics_fill(canvas, rect.x, rect.y, rect.w, rect.h, rect.color);
    }
}

/// Runs `f` against the live canvas, if one exists, marking the affected
/// region dirty. Used by the VM's direct-pixel graphics syscalls.
pub fn with_canvas<R>(f: impl FnOnce(&mut Canvas) -> R) -> Option<R> {
    let mut st = WM.lock();
    let canvas = st.canvas.as_mut()?;
    let result = f(canvas);
    canvas.force_full_redraw();
    Some(result)
}

/// Current screen dimensions, or `(0, 0)` if no framebuffer is up yet.
pub fn screen_size() -> (i32, i32) {
    let st = WM.lock();
    st.canvas
        .as_ref()
        .map(|c| (c.width() as i32, c.height() as i32))
        .unwrap_or((0, 0))
}

fn open_window_locked(st: &mut WmState, app: AppId) {
    let max_z = st.max_z();
    if let Some(idx) = st.windows.iter().position(|w| w.app == app) {
        for w in st.windows.iter_mut() {
            w.focused = false;
        }
        let w = &mut st.windows[idx];
        w.visible = true;
        w.focused = true;
        w.z = max_z + 1;
    }
    st.force_redraw = true;
}

/// Opens one of the built-in windows (shows it, raises it, focuses it).
/// Idempotent if already visible.
pub fn open_window(app: AppId) {
    let mut st = WM.lock();
    open_window_locked(&mut st, app);
}

fn read_rtc_register(reg: u8) -> u8 {
    unsafe {
        outb(0x70, reg);
        inb(0x71)
    }
}

fn rtc_second() -> i32 {
    let bcd = read_rtc_register(0x00);
    (((bcd >> 4) * 10) + (bcd & 0x0F)) as i32
}

fn focus_topmost_under(st: &mut WmState, px: i32, py: i32) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (i, w) in st.windows.iter().enumerate() {
        if w.contains(px, py) {
            if best.map(|(_, z)| w.z > z).unwrap_or(true) {
                best = Some((i, w.z));
            }
        }
    }
    best.map(|(i, _)| i)
}

fn dispatch_click(st: &mut WmState, px: i32, py: i32) {
    let Some(idx) = focus_topmost_under(st, px, py) else {
        let screen_h = st.canvas.as_ref().map(|c| c.height() as i32).unwrap_or(0);
        let taskbar_y = screen_h - TASKBAR_HEIGHT;
        let menu_h = 20 * (MAX_WINDOWS as i32 + 1);
        let menu_y = taskbar_y - menu_h;

        if st.start_menu_open && px < 120 && py >= menu_y && py < taskbar_y {
            let row = (py - menu_y) / 20;
            if row >= 0 && (row as usize) < MAX_WINDOWS {
                let app = st.windows[row as usize].app;
                open_window_locked(st, app);
            }
            st.start_menu_open = false;
            st.force_redraw = true;
            return;
        }

        if py >= taskbar_y {
            if px < START_BUTTON_WIDTH {
                st.start_menu_open = !st.start_menu_open;
            } else if st.start_menu_open {
                st.start_menu_open = false;
            }
            st.force_redraw = true;
        } else if st.start_menu_open {
            st.start_menu_open = false;
            st.force_redraw = true;
        }
        return;
    };

    let max_z = st.max_z();
    for w in st.windows.iter_mut() {
        w.focused = false;
    }

    let (cx, cy, cw, ch) = st.windows[idx].close_button_rect();
    let in_close = px >= cx && px < cx + cw && py >= cy && py < cy + ch;
    let (tx, ty, tw, th) = st.windows[idx].title_bar_rect();
    let in_title = px >= tx && px < tx + tw && py >= ty && py < ty + th;

    let w = &mut st.windows[idx];
    w.z = max_z + 1;
    w.focused = true;

    if in_close {
        w.visible = false;
        st.drag = DragState::Idle;
    } else if in_title {
        st.drag = DragState::Dragging {
            idx,
            offset_x: px - w.x,
            offset_y: py - w.y,
        };
    } else {
        let (lx, ly, lw, lh) = w.client_rect();
        if px >= lx && px < lx + lw && py >= ly && py < ly + lh {
            apps::on_click(w.app, &mut w.scratch, px - lx, py - ly);
        }
    }
    st.force_redraw = true;
}

fn dispatch_right_click(st: &mut WmState, px: i32, py: i32) {
    if let Some(idx) = focus_topmost_under(st, px, py) {
        let max_z = st.max_z();
        for w in st.windows.iter_mut() {
            w.focused = false;
        }
        let w = &mut st.windows[idx];
        w.z = max_z + 1;
        w.focused = true;
        st.force_redraw = true;
    }
}

fn poll_mouse(st: &mut WmState) {
    let (x, y) = mouse::mouse_get_position();
    let buttons = mouse::mouse_get_buttons();

    let screen_w = st.canvas.as_ref().map(|c| c.width() as i32).unwrap_or(0);
    let screen_h = st.canvas.as_ref().map(|c| c.height() as i32).unwrap_or(0);
    let new_x = x.clamp(0, (screen_w - 1).max(0));
    let new_y = y.clamp(0, (screen_h - 1).max(0));

    if new_x != st.cursor_x || new_y != st.cursor_y {
        st.force_redraw = true;
    }

    let left_was = st.prev_buttons & MOUSE_BUTTON_LEFT != 0;
    let left_now = buttons & MOUSE_BUTTON_LEFT != 0;
    let right_was = st.prev_buttons & MOUSE_BUTTON_RIGHT != 0;
    let right_now = buttons & MOUSE_BUTTON_RIGHT != 0;

    match st.drag {
        DragState::Dragging { idx, offset_x, offset_y } if left_now => {
            st.windows[idx].x = new_x - offset_x;
            st.windows[idx].y = new_y - offset_y;
            st.force_redraw = true;
        }
        DragState::Dragging { .. } if !left_now => {
            st.drag = DragState::Idle;
        }
        _ => {
            if !left_was && left_now {
                dispatch_click(st, new_x, new_y);
            }
            if !right_was && right_now {
                dispatch_right_click(st, new_x, new_y);
            }
        }
    }

    st.cursor_x = new_x;
    st.cursor_y = new_y;
    st.prev_buttons = buttons;
}

fn poll_keyboard(st: &mut WmState) {
    while keyboard_has_input() != 0 {
        let ch = keyboard_getchar();
        if ch == 0 {
            continue;
        }
        if let Some(idx) = st.windows.iter().position(|w| w.visible && w.focused) {
            let w = &mut st.windows[idx];
            apps::on_key(w.app, &mut w.scratch, ch);
            st.force_redraw = true;
        }
    }
}

fn paint(st: &mut WmState) {
    let Some(canvas) = st.canvas.as_mut() else {
        return;
    };
    let screen_w = canvas.width() as i32;
    let screen_h = canvas.height() as i32;

    graphics_fill(canvas, 0, 0, screen_w, screen_h, COLOR_DESKTOP);
    let text_color = canvas.pixel_format().convert_color(COLOR_TITLE_TEXT);

    let mut order: [usize; MAX_WINDOWS] = core::array::from_fn(|i| i);
    order.sort_by_key(|&i| st.windows[i].z);

    for &i in order.iter() {
        let w = st.windows[i];
        if !w.visible {
            continue;
        }
        let title_color = if w.focused {
            COLOR_TITLE_ACTIVE
        } else {
            COLOR_TITLE_INACTIVE
        };
        graphics_rect_outline(canvas, w.x, w.y, w.w, w.h, COLOR_BORDER);
        graphics_fill(canvas, w.x, w.y, w.w, TITLE_BAR_HEIGHT, title_color);
        font::draw_str(canvas, w.x + 4, w.y + 5, w.title, text_color, 0);
        let (cx, cy, cw, ch) = w.close_button_rect();
        graphics_fill(canvas, cx, cy, cw, ch, COLOR_CLOSE_BTN);

        let (lx, ly, lw, lh) = w.client_rect();
        graphics_fill(canvas, lx, ly, lw, lh, COLOR_WINDOW_BG);
        apps::paint(w.app, &st.windows[i].scratch, canvas, lx, ly, lw, lh);
    }

    let taskbar_y = screen_h - TASKBAR_HEIGHT;
    graphics_fill(canvas, 0, taskbar_y, screen_w, TASKBAR_HEIGHT, COLOR_TASKBAR);
    graphics_fill(
        canvas,
        0,
        taskbar_y,
        START_BUTTON_WIDTH,
        TASKBAR_HEIGHT,
        COLOR_START_BTN,
    );
    font::draw_str(canvas, 6, taskbar_y + 8, "Start", text_color, 0);

    if st.start_menu_open {
        let menu_h = 20 * (MAX_WINDOWS as i32 + 1);
        let menu_y = taskbar_y - menu_h;
        graphics_fill(canvas, 0, menu_y, 120, menu_h, COLOR_START_MENU);
        for (row, w) in st.windows.iter().enumerate() {
            font::draw_str(
                canvas,
                4,
                menu_y + 4 + row as i32 * 20,
                w.title,
                text_color,
                0,
            );
        }
    }

    let second = rtc_second();
    let clock_buf = format_clock(second);
    font::draw_str(canvas, screen_w - 60, taskbar_y + 8, &clock_buf, text_color, 0);

    paint_overlay(canvas);

    graphics_fill(
        canvas,
        st.cursor_x,
        st.cursor_y,
        CURSOR_SIZE,
        CURSOR_SIZE,
        COLOR_CURSOR,
    );
}

fn format_clock(second: i32) -> heapless_str::ClockStr {
    heapless_str::ClockStr::from_seconds(second)
}

mod heapless_str {
    pub struct ClockStr {
        buf: [u8; 8],
    }

    impl ClockStr {
        pub fn from_seconds(second: i32) -> Self {
            let mut buf = [0u8; 8];
            buf[0] = b':';
            buf[1] = b'0' + ((second / 10) % 10) as u8;
            buf[2] = b'0' + (second % 10) as u8;
            Self { buf }
        }
    }

    impl core::ops::Deref for ClockStr {
        type Target = str;
        fn deref(&self) -> &str {
            core::str::from_utf8(&self.buf[..3]).unwrap_or(":--")
        }
    }
}

fn graphics_fill(canvas: &mut Canvas, x: i32, y: i32, w: i32, h: i32, color: u32) {
    let raw = canvas.pixel_format().convert_color(color);
    canvas.fill_rect(x, y, w, h, raw);
}

fn graphics_rect_outline(canvas: &mut Canvas, x: i32, y: i32, w: i32, h: i32, color: u32) {
    let raw = canvas.pixel_format().convert_color(color);
    canvas.draw_hline(x, x + w - 1, y, raw);
    canvas.draw_hline(x, x + w - 1, y + h - 1, raw);
    canvas.draw_vline(x, y, y + h - 1, raw);
    canvas.draw_vline(x + w - 1, y, y + h - 1, raw);
}

/// Runs the full composition pipeline (mouse/keyboard poll, paint, flip)
/// once. Intended to be called from the idle loop at roughly 60 Hz.
pub fn tick() {
    let mut st = WM.lock();

    if st.canvas.is_none() {
        st.canvas = Canvas::new();
        st.force_redraw = true;
    }
    if st.canvas.is_none() {
        return;
    }

    poll_mouse(&mut st);
    poll_keyboard(&mut st);

    let second = rtc_second();
    if second != st.last_rtc_second {
        st.last_rtc_second = second;
        st.force_redraw = true;
    }

    if st.force_redraw {
        if let Some(canvas) = st.canvas.as_mut() {
            canvas.force_full_redraw();
        }
        st.force_redraw = false;
    }

    if st.canvas.as_ref().map(|c| c.is_dirty()).unwrap_or(false) {
        paint(&mut st);
        if let Some(canvas) = st.canvas.as_mut() {
            canvas.flip();
        }
    }
}

/// Call once after the framebuffer is initialized, before the first `tick()`.
pub fn init() {
    let mut st = WM.lock();
    st.canvas = Canvas::new();
    st.force_redraw = true;
    st.windows[0].visible = true;
    st.windows[0].focused = true;
    if let Some(canvas) = st.canvas.as_ref() {
        mouse::mouse_set_bounds(canvas.width() as i32, canvas.height() as i32);
    }
}

