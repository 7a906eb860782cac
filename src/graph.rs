// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The latency graph renderer.
//!
//! [`compose_frame`] is a pure function from `(data, spans, size)` to a
//! [`PaintBuffer`]; the stateful [`Graph`] wraps it with the frame cache
//! (an unchanged `(total_count, size)` repaints only the spinner), the
//! spinner clock and the GUI paint-token handshake.

use crate::{
    axes::{self, SpanBand, YAxis},
    glyphs,
    gui::Gui,
    paint::{Layer, PaintBuffer, TermSize},
    spans::{SpanEngine, SpanInfo},
    stats::format_duration,
    store::Data,
};
use crossterm::style::Color;
use std::{
    collections::HashMap,
    io::{self, Write},
    time::{Duration, Instant},
};

/// Spinner frame period.
const SPIN_PERIOD: Duration = Duration::from_millis(175);

/// Minimum band width before a span earns its own min/max labels.
const SPAN_LABEL_MIN_WIDTH: u16 = 30;

/// Cell counter mapping coincident points to density glyphs.
#[derive(Debug, Default)]
struct DrawWindow {
    counts: HashMap<(u16, u16), u32>,
}

impl DrawWindow {
    fn add(&mut self, x: u16, y: u16) {
        *self.counts.entry((x, y)).or_insert(0) += 1;
    }

    fn glyph_for(count: u32) -> char {
        let band: usize = glyphs::DENSITY_BANDS
            .iter()
            .position(|&limit| count <= limit)
            .unwrap_or(glyphs::DENSITY.len() - 1);
        glyphs::DENSITY[band]
    }

    fn paint(&self, buf: &mut PaintBuffer) {
        for (&(x, y), &count) in &self.counts {
            buf.put(Layer::Data, x, y, Self::glyph_for(count));
        }
    }
}

/// A plotted extreme, remembered so its label can be painted later.
#[derive(Debug, Clone, Copy)]
struct Extreme {
    x: u16,
    y: u16,
    value: Duration,
}

impl Extreme {
    fn track_min(slot: &mut Option<Extreme>, x: u16, y: u16, value: Duration) {
        if slot.map(|e| value < e.value).unwrap_or(true) {
            *slot = Some(Extreme { x, y, value });
        }
    }

    fn track_max(slot: &mut Option<Extreme>, x: u16, y: u16, value: Duration) {
        if slot.map(|e| value > e.value).unwrap_or(true) {
            *slot = Some(Extreme { x, y, value });
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Paint a complete frame into `buf`. Pure in `(data, spans, size)`; the
/// spinner and GUI overlays are painted separately.
pub fn paint_frame(buf: &mut PaintBuffer, data: &Data, spans: &SpanEngine, size: TermSize) {
    for layer in [
        Layer::Gradient,
        Layer::Bar,
        Layer::Data,
        Layer::YAxis,
        Layer::XAxis,
        Layer::Key,
    ] {
        buf.clear_layer(layer);
    }
    if size.width < 8 || size.height < 6 {
        return;
    }

    let yaxis: YAxis = YAxis::compute(&data.header.stats, size);
    let bands: Vec<SpanBand> = axes::compute_bands(spans.spans(), yaxis.plot_left(), size.width);

    paint_title(buf, data, size);
    yaxis.paint(buf, size);
    axes::paint_x_axis(buf, size, spans.spans(), &bands, data.offset);
    paint_points(buf, data, spans.spans(), &bands, &yaxis, size);
    if data.runs.good.longest > 2 {
        paint_gradient(buf, data, spans.spans(), &bands, &yaxis, size);
    }
    paint_key(buf, size, &yaxis);
}

/// A full frame with the spinner at a fixed phase; what `drawframe` and
/// the tests consume.
pub fn compose_frame(data: &Data, spans: &SpanEngine, size: TermSize) -> PaintBuffer {
    let mut buf: PaintBuffer = PaintBuffer::new(size);
    paint_frame(&mut buf, data, spans, size);
    paint_spinner(&mut buf, size, 0);
    buf
}

fn paint_title(buf: &mut PaintBuffer, data: &Data, size: TermSize) {
    let width: usize = size.width as usize;

    let url: &str = &data.url;
    let url_x: usize = width.saturating_sub(url.chars().count()) / 2;
    buf.put_str(Layer::YAxis, url_x as u16, 0, url);

    let size_label: String = size.to_string();
    // leave the top-right corner to the spinner
    let size_x: usize = width.saturating_sub(size_label.chars().count() + 4);
    buf.put_str(Layer::YAxis, size_x as u16, 0, &size_label);

    if data.total_count > 0 {
        let room: usize = url_x.saturating_sub(2);
        let summary: String = data.header.stats.summary_fitting(room);
        buf.put_str(Layer::YAxis, 1, 0, &summary);
    }
}

fn paint_points(
    buf: &mut PaintBuffer,
    data: &Data,
    spans: &[SpanInfo],
    bands: &[SpanBand],
    yaxis: &YAxis,
    size: TermSize,
) {
    let top: u16 = YAxis::plot_top(size);
    let bottom: u16 = YAxis::plot_bottom(size);
    let mut window: DrawWindow = DrawWindow::default();
    let mut global_min: Option<Extreme> = None;
    let mut global_max: Option<Extreme> = None;
    let mut band_extremes: Vec<(Option<Extreme>, Option<Extreme>)> = Vec::new();

    for band in bands {
        let span: &SpanInfo = &spans[band.span_index];
        let mut band_min: Option<Extreme> = None;
        let mut band_max: Option<Extreme> = None;
        let mut prev_dropped_col: Option<u16> = None;

        for i in span.start_index..span.end_index {
            let Some(p) = data.get(i) else { continue };
            let x: u16 = band.x_for_index(span, i);

            if p.is_dropped() {
                for y in top..=bottom {
                    buf.put_fg(Layer::Bar, x, y, glyphs::DROP_BAR, Some(Color::Red));
                }
                // join back-to-back losses with a lighter wash
                if let Some(prev) = prev_dropped_col {
                    for cx in prev.saturating_add(1)..x {
                        for y in top..=bottom {
                            buf.put_fg(Layer::Bar, cx, y, glyphs::DROP_FILL, Some(Color::DarkRed));
                        }
                    }
                }
                prev_dropped_col = Some(x);
            } else {
                prev_dropped_col = None;
                let y: u16 = yaxis.y_for(p.duration, size);
                window.add(x, y);
                Extreme::track_min(&mut global_min, x, y, p.duration);
                Extreme::track_max(&mut global_max, x, y, p.duration);
                Extreme::track_min(&mut band_min, x, y, p.duration);
                Extreme::track_max(&mut band_max, x, y, p.duration);
            }
        }
        band_extremes.push((band_min, band_max));
    }

    window.paint(buf);

    // labels go last so they may overwrite data glyphs at their cells
    for (band, (band_min, band_max)) in bands.iter().zip(&band_extremes) {
        if band.width() <= SPAN_LABEL_MIN_WIDTH {
            continue;
        }
        if let Some(e) = band_min {
            paint_extreme_label(buf, yaxis, size, e, glyphs::MARK_MIN);
        }
        if let Some(e) = band_max {
            paint_extreme_label(buf, yaxis, size, e, glyphs::MARK_MAX);
        }
    }
    if let Some(e) = global_min {
        paint_extreme_label(buf, yaxis, size, &e, glyphs::MARK_MIN);
    }
    if let Some(e) = global_max {
        paint_extreme_label(buf, yaxis, size, &e, glyphs::MARK_MAX);
    }
}

/// Paint one min/max label, extending into the half of the plot closer
/// to the centre so it stays on screen.
fn paint_extreme_label(
    buf: &mut PaintBuffer,
    yaxis: &YAxis,
    size: TermSize,
    e: &Extreme,
    mark: char,
) {
    let text: String = format!("{mark} {}", format_duration(e.value));
    let len: u16 = text.chars().count() as u16;
    let center: u16 = (yaxis.plot_left() + size.width) / 2;

    let x: u16 = if e.x < center {
        e.x.saturating_add(1)
    } else {
        e.x.saturating_sub(len)
    };
    buf.put_str_fg(Layer::Data, x, e.y, &text, Some(Color::Cyan));
}

/// Screen-space direction of one segment between plotted points.
/// `Down` means the line heads toward the bottom of the plot (rising y).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Up,
    Flat,
    Down,
}

impl Trend {
    fn of(slope: f64) -> Trend {
        if slope > 0.3 {
            Trend::Down
        } else if slope < -0.3 {
            Trend::Up
        } else {
            Trend::Flat
        }
    }
}

fn paint_gradient(
    buf: &mut PaintBuffer,
    data: &Data,
    spans: &[SpanInfo],
    bands: &[SpanBand],
    yaxis: &YAxis,
    size: TermSize,
) {
    for band in bands {
        let span: &SpanInfo = &spans[band.span_index];

        // project the whole span up front so each segment can see the
        // one after it; a dropped point (None) breaks the chain
        let projected: Vec<Option<(u16, f64)>> = (span.start_index..span.end_index)
            .map(|i| {
                let p = data.get(i)?;
                if p.is_dropped() {
                    return None;
                }
                Some((
                    band.x_for_index(span, i),
                    yaxis.y_for_exact(p.duration, size),
                ))
            })
            .collect();

        for k in 0..projected.len() {
            let (Some(cur), Some(next)) = (
                projected[k],
                projected.get(k + 1).copied().flatten(),
            ) else {
                continue;
            };
            if next.0 <= cur.0 + 1 {
                continue;
            }

            let slope: f64 = (next.1 - cur.1) / (next.0 - cur.0) as f64;
            // direction of the segment after this one; a chain end or a
            // following drop just extends the current direction
            let onward: Trend = projected
                .get(k + 2)
                .copied()
                .flatten()
                .filter(|after| after.0 > next.0)
                .map(|after| Trend::of((after.1 - next.1) / (after.0 - next.0) as f64))
                .unwrap_or(Trend::of(slope));

            interpolate_segment(buf, cur, next, onward);
        }
    }
}

/// Draw one glyph per integer cell step along the straight line between
/// two plotted points. The glyph comes from the direction pair: the
/// segment's own slope plus where the following segment is headed, so a
/// flat stretch ahead of a turn leans into it instead of staying level.
fn interpolate_segment(buf: &mut PaintBuffer, from: (u16, f64), to: (u16, f64), onward: Trend) {
    let (x0, y0) = from;
    let (x1, y1) = to;
    let slope: f64 = (y1 - y0) / (x1 - x0) as f64;

    for x in (x0 + 1)..x1 {
        let yf: f64 = y0 + slope * (x - x0) as f64;
        let cell_y: f64 = yf.round();
        let glyph: char = gradient_glyph(slope, yf - cell_y, onward);
        if cell_y >= 0.0 {
            buf.put(Layer::Gradient, x, cell_y as u16, glyph);
        }
    }
}

/// Pick the gradient glyph from `(current slope, next direction)`.
/// `frac` is the line's offset inside the cell, used to smooth the
/// small ripples of a near-horizontal run.
fn gradient_glyph(slope: f64, frac: f64, onward: Trend) -> char {
    if slope.abs() > 1.5 {
        glyphs::GRADIENT_STEEP
    } else if slope > 0.3 {
        glyphs::GRADIENT_DOWN
    } else if slope < -0.3 {
        glyphs::GRADIENT_UP
    } else if frac > 0.2 {
        glyphs::GRADIENT_FLAT_LOW
    } else if frac < -0.2 {
        glyphs::GRADIENT_FLAT_HIGH
    } else {
        match onward {
            Trend::Down => glyphs::GRADIENT_FLAT_LOW,
            Trend::Up => glyphs::GRADIENT_FLAT_HIGH,
            Trend::Flat => glyphs::GRADIENT_FLAT,
        }
    }
}

fn paint_key(buf: &mut PaintBuffer, size: TermSize, yaxis: &YAxis) {
    let row: u16 = size.height.saturating_sub(2);
    let key: String = format!(
        "1 {}  2-5 {}  6-25 {}  >25 {}",
        glyphs::DENSITY[0],
        glyphs::DENSITY[1],
        glyphs::DENSITY[2],
        glyphs::DENSITY[3],
    );
    buf.put_str(Layer::Key, yaxis.label_size + 1, row, &key);
}

/// Paint the spinner at the top-right corner.
pub fn paint_spinner(buf: &mut PaintBuffer, size: TermSize, index: usize) {
    buf.clear_layer(Layer::Spinner);
    buf.put(
        Layer::Spinner,
        size.width.saturating_sub(3),
        0,
        glyphs::SPINNER[index % glyphs::SPINNER.len()],
    );
}

////////////////////////////////////////////////////////////////////////////////

/// Stateful renderer for the live monitor.
pub struct Graph {
    buf: PaintBuffer,
    cache: Option<(u64, TermSize)>,
    spin_index: usize,
    last_spin: Instant,
}

impl Graph {
    pub fn new(size: TermSize) -> Self {
        Self {
            buf: PaintBuffer::new(size),
            cache: None,
            spin_index: 0,
            last_spin: Instant::now(),
        }
    }

    /// Render one frame to `w`. Skips the full recompute when nothing
    /// observable changed, re-emitting only the spinner.
    pub fn render<W: Write>(
        &mut self,
        data: &Data,
        spans: &SpanEngine,
        gui: &Gui,
        size: TermSize,
        w: &mut W,
    ) -> io::Result<()> {
        self.buf.resize(size);
        let key: (u64, TermSize) = (data.total_count, size);
        let full_repaint: bool = self.cache != Some(key);
        if full_repaint {
            paint_frame(&mut self.buf, data, spans, size);
            self.cache = Some(key);
        }

        if self.last_spin.elapsed() >= SPIN_PERIOD {
            self.spin_index = (self.spin_index + 1) % glyphs::SPINNER.len();
            self.last_spin = Instant::now();
        }
        paint_spinner(&mut self.buf, size, self.spin_index);

        let token = gui.state();
        if full_repaint || token.should_draw() {
            self.buf.clear_layer(Layer::Toast);
            self.buf.clear_layer(Layer::Help);
            gui.paint_overlays(&mut self.buf, size);
            gui.drawn(token);
        }

        self.buf.queue_frame(w)?;
        w.flush()
    }

    /// The most recently composed frame as plain text.
    pub fn last_frame_text(&self) -> String {
        self.buf.to_plain_string()
    }
}
