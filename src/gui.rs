// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Overlay state: error toasts, the help box and the paint token.
//!
//! Overlays are mutated from several tasks (error feeder, input loop,
//! expiry ticker) and read by the renderer once per frame, so the state
//! sits behind one mutex. The paint token is the repaint handshake: any
//! mutation bumps a monotonic counter pair, the renderer compares the
//! pair against what it last drew and acknowledges with [`Gui::drawn`].

use crate::{
    glyphs,
    paint::{Layer, PaintBuffer, TermSize},
};
use crossterm::style::Color;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// How long an error toast stays on screen.
pub const TOAST_LIFETIME: Duration = Duration::from_secs(10);

/// Snapshot of the repaint counters, taken once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaintToken {
    paint: u64,
    invalidate: u64,
    seen_paint: u64,
    seen_invalidate: u64,
}

impl PaintToken {
    /// Whether the GUI layers must be repainted this frame.
    #[inline]
    pub fn should_draw(&self) -> bool {
        self.paint != self.seen_paint || self.should_invalidate()
    }

    /// Whether previously painted overlay cells must be discarded.
    #[inline]
    pub fn should_invalidate(&self) -> bool {
        self.invalidate != self.seen_invalidate
    }
}

/// Which counters a mutation bumps.
#[derive(Debug, Clone, Copy)]
pub struct Update {
    pub paint: bool,
    pub invalidate: bool,
}

impl Update {
    pub const PAINT: Update = Update {
        paint: true,
        invalidate: false,
    };
    pub const BOTH: Update = Update {
        paint: true,
        invalidate: true,
    };
}

#[derive(Debug)]
struct Toast {
    at: Instant,
    message: String,
}

#[derive(Debug, Default)]
struct GuiInner {
    toasts: Vec<Toast>,
    help_visible: bool,
    bindings: Vec<(&'static str, &'static str)>,
    paint_count: u64,
    invalidate_count: u64,
    seen_paint: u64,
    seen_invalidate: u64,
}

/// Shared overlay state.
#[derive(Debug, Default)]
pub struct Gui {
    inner: Mutex<GuiInner>,
}

impl Gui {
    pub fn new(help_visible: bool, bindings: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            inner: Mutex::new(GuiInner {
                help_visible,
                bindings,
                ..GuiInner::default()
            }),
        }
    }

    /// Bump the repaint counters.
    pub fn paint(&self, update: Update) {
        let mut inner = self.inner.lock();
        if update.paint {
            inner.paint_count += 1;
        }
        if update.invalidate {
            inner.invalidate_count += 1;
        }
    }

    /// Counter snapshot for this frame.
    pub fn state(&self) -> PaintToken {
        let inner = self.inner.lock();
        PaintToken {
            paint: inner.paint_count,
            invalidate: inner.invalidate_count,
            seen_paint: inner.seen_paint,
            seen_invalidate: inner.seen_invalidate,
        }
    }

    /// Acknowledge that the frame carrying `token` reached the terminal.
    pub fn drawn(&self, token: PaintToken) {
        let mut inner = self.inner.lock();
        inner.seen_paint = token.paint;
        inner.seen_invalidate = token.invalidate;
    }

    /// Queue an error toast.
    pub fn push_error(&self, message: String) {
        {
            let mut inner = self.inner.lock();
            inner.toasts.push(Toast {
                at: Instant::now(),
                message,
            });
        }
        self.paint(Update::BOTH);
    }

    /// Drop expired toasts; reports whether anything was removed.
    pub fn expire_toasts(&self) -> bool {
        self.expire_older_than(TOAST_LIFETIME)
    }

    fn expire_older_than(&self, lifetime: Duration) -> bool {
        let removed: bool = {
            let mut inner = self.inner.lock();
            let before: usize = inner.toasts.len();
            inner.toasts.retain(|t| t.at.elapsed() < lifetime);
            inner.toasts.len() != before
        };
        if removed {
            self.paint(Update::BOTH);
        }
        removed
    }

    pub fn toggle_help(&self) {
        {
            let mut inner = self.inner.lock();
            inner.help_visible = !inner.help_visible;
        }
        self.paint(Update::BOTH);
    }

    pub fn help_visible(&self) -> bool {
        self.inner.lock().help_visible
    }

    /// Paint both overlay boxes into their reserved layers.
    pub fn paint_overlays(&self, buf: &mut PaintBuffer, size: TermSize) {
        let inner = self.inner.lock();
        if !inner.toasts.is_empty() {
            let lines: Vec<String> = inner
                .toasts
                .iter()
                .map(|t| format!("{} {} {}", glyphs::WARNING, t.message, glyphs::WARNING))
                .collect();
            paint_toast_box(buf, size, &lines);
        }
        if inner.help_visible && !inner.bindings.is_empty() {
            paint_help_box(buf, size, &inner.bindings);
        }
    }
}

/// Centred rounded box with a red title, one line per toast.
fn paint_toast_box(buf: &mut PaintBuffer, size: TermSize, lines: &[String]) {
    let widest: usize = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let box_w: u16 = (widest as u16 + 4).min(size.width);
    let box_h: u16 = (lines.len() as u16 + 2).min(size.height);
    let x0: u16 = (size.width.saturating_sub(box_w)) / 2;
    let y0: u16 = (size.height.saturating_sub(box_h)) / 2;

    paint_box_frame(buf, Layer::Toast, x0, y0, box_w, box_h, true);
    let title: &str = " errors ";
    let title_x: u16 = x0 + (box_w.saturating_sub(title.chars().count() as u16)) / 2;
    buf.put_str_fg(Layer::Toast, title_x, y0, title, Some(Color::Red));

    for (i, line) in lines.iter().enumerate() {
        let y: u16 = y0 + 1 + i as u16;
        if y + 1 >= y0 + box_h {
            break;
        }
        buf.put_str(Layer::Toast, x0 + 2, y, line);
    }
}

/// Sharp-cornered key-binding box at the right centre.
fn paint_help_box(buf: &mut PaintBuffer, size: TermSize, bindings: &[(&str, &str)]) {
    let lines: Vec<String> = bindings
        .iter()
        .map(|(key, what)| format!("{key:>6}  {what}"))
        .collect();
    let widest: usize = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let box_w: u16 = (widest as u16 + 4).min(size.width);
    let box_h: u16 = (lines.len() as u16 + 2).min(size.height);
    let x0: u16 = size.width.saturating_sub(box_w + 1);
    let y0: u16 = (size.height.saturating_sub(box_h)) / 2;

    paint_box_frame(buf, Layer::Help, x0, y0, box_w, box_h, false);
    for (i, line) in lines.iter().enumerate() {
        let y: u16 = y0 + 1 + i as u16;
        if y + 1 >= y0 + box_h {
            break;
        }
        buf.put_str(Layer::Help, x0 + 2, y, line);
    }
}

fn paint_box_frame(
    buf: &mut PaintBuffer,
    layer: Layer,
    x0: u16,
    y0: u16,
    w: u16,
    h: u16,
    rounded: bool,
) {
    if w < 2 || h < 2 {
        return;
    }
    let (tl, tr, bl, br) = if rounded {
        (
            glyphs::ROUND_TOP_LEFT,
            glyphs::ROUND_TOP_RIGHT,
            glyphs::ROUND_BOTTOM_LEFT,
            glyphs::ROUND_BOTTOM_RIGHT,
        )
    } else {
        (
            glyphs::SHARP_TOP_LEFT,
            glyphs::SHARP_TOP_RIGHT,
            glyphs::SHARP_BOTTOM_LEFT,
            glyphs::SHARP_BOTTOM_RIGHT,
        )
    };
    let x1: u16 = x0 + w - 1;
    let y1: u16 = y0 + h - 1;

    for x in x0 + 1..x1 {
        buf.put(layer, x, y0, glyphs::BOX_HORIZONTAL);
        buf.put(layer, x, y1, glyphs::BOX_HORIZONTAL);
    }
    for y in y0 + 1..y1 {
        buf.put(layer, x0, y, glyphs::BOX_VERTICAL);
        buf.put(layer, x1, y, glyphs::BOX_VERTICAL);
        // blank the interior so the box covers the plot behind it
        for x in x0 + 1..x1 {
            buf.put(layer, x, y, ' ');
        }
    }
    buf.put(layer, x0, y0, tl);
    buf.put(layer, x1, y0, tr);
    buf.put(layer, x0, y1, bl);
    buf.put(layer, x1, y1, br);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gui() -> Gui {
        Gui::new(false, vec![("q", "quit"), ("h", "toggle help")])
    }

    #[test]
    fn test_token_starts_clean() {
        let gui: Gui = test_gui();
        let token: PaintToken = gui.state();
        assert!(!token.should_draw());
        assert!(!token.should_invalidate());
    }

    #[test]
    fn test_mutations_request_repaint() {
        let gui: Gui = test_gui();

        gui.push_error("disk on fire".to_string());
        let token: PaintToken = gui.state();
        assert!(token.should_draw(), "a new toast must request a repaint");
        assert!(token.should_invalidate());

        gui.drawn(token);
        let settled: PaintToken = gui.state();
        assert!(!settled.should_draw(), "acknowledged frame must settle");

        gui.toggle_help();
        assert!(gui.state().should_draw(), "help toggle must request a repaint");
        assert!(gui.help_visible());
    }

    #[test]
    fn test_paint_only_update() {
        let gui: Gui = test_gui();
        gui.paint(Update::PAINT);
        let token: PaintToken = gui.state();
        assert!(token.should_draw());
        assert!(!token.should_invalidate(), "PAINT alone must not invalidate");
    }

    #[test]
    fn test_toast_expiry() {
        let gui: Gui = test_gui();
        gui.push_error("transient".to_string());
        gui.drawn(gui.state());

        assert!(!gui.expire_toasts(), "a fresh toast must survive its lifetime");
        assert!(gui.expire_older_than(Duration::ZERO), "an aged toast expires");
        assert!(gui.state().should_draw(), "expiry must request a repaint");
        assert!(!gui.expire_older_than(Duration::ZERO), "nothing left to expire");
    }

    #[test]
    fn test_overlay_painting() {
        let gui: Gui = test_gui();
        let size: TermSize = TermSize::new(60, 20);
        let mut buf: PaintBuffer = PaintBuffer::new(size);

        gui.push_error("boom".to_string());
        gui.toggle_help();
        gui.paint_overlays(&mut buf, size);

        let text: String = buf.to_plain_string();
        assert!(text.contains("⚠ boom ⚠"), "toast text must be wrapped in warnings");
        assert!(text.contains("errors"), "toast box must carry its title");
        assert!(text.contains(glyphs::ROUND_TOP_LEFT), "toast box is rounded");
        assert!(text.contains("quit"), "help box must list bindings");
        assert!(text.contains(glyphs::SHARP_TOP_LEFT), "help box is sharp-cornered");
    }
}
