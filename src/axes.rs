// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Axis computation for the latency graph.
//!
//! The Y axis re-scales durations linearly between the recording's global
//! min and max; its label density adapts to the terminal height. The X
//! axis hands each span a horizontal band proportional to the span's
//! point *count* (not its wall-clock length), so a two-day gap in the
//! recording costs no width, and picks its tick format from the span's
//! duration.

use crate::{
    glyphs,
    paint::{Layer, PaintBuffer, TermSize},
    spans::SpanInfo,
    stats::{Stats, format_duration},
};
use chrono::{DateTime, FixedOffset, TimeDelta, Timelike};
use std::time::Duration;

/// Vertical scale and label geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YAxis {
    pub min: Duration,
    pub max: Duration,
    /// Rows between labels.
    pub gap: u16,
    /// Width of the label column, rule included.
    pub label_size: u16,
}

impl YAxis {
    pub fn compute(stats: &Stats, size: TermSize) -> YAxis {
        let h: i32 = size.height as i32;
        let gap: i32 = 2 + (h > 20) as i32 - (h < 12) as i32;
        let label_size: i32 = 3 * gap / 2 + 4;
        YAxis {
            min: stats.min,
            max: stats.max,
            gap: gap.max(1) as u16,
            label_size: label_size as u16,
        }
    }

    /// First plot row (below the title).
    #[inline]
    pub fn plot_top(_size: TermSize) -> u16 {
        1
    }

    /// Last plot row (above key and axis rows).
    #[inline]
    pub fn plot_bottom(size: TermSize) -> u16 {
        size.height.saturating_sub(3)
    }

    /// First plot column (right of the label rule).
    #[inline]
    pub fn plot_left(&self) -> u16 {
        self.label_size + 1
    }

    /// Map a duration onto a plot row; max lands on top.
    pub fn y_for(&self, d: Duration, size: TermSize) -> u16 {
        let top: u16 = Self::plot_top(size);
        let bottom: u16 = Self::plot_bottom(size);
        if bottom <= top {
            return top;
        }
        let span_ns: f64 = (self.max.as_nanos() as f64) - (self.min.as_nanos() as f64);
        if span_ns <= 0.0 {
            return (top + bottom) / 2;
        }
        let frac: f64 = ((self.max.as_nanos() as f64 - d.as_nanos() as f64) / span_ns)
            .clamp(0.0, 1.0);
        top + (frac * (bottom - top) as f64).round() as u16
    }

    /// Exact (fractional) plot row for gradient interpolation.
    pub fn y_for_exact(&self, d: Duration, size: TermSize) -> f64 {
        let top: f64 = Self::plot_top(size) as f64;
        let bottom: f64 = Self::plot_bottom(size) as f64;
        if bottom <= top {
            return top;
        }
        let span_ns: f64 = (self.max.as_nanos() as f64) - (self.min.as_nanos() as f64);
        if span_ns <= 0.0 {
            return (top + bottom) / 2.0;
        }
        let frac: f64 = ((self.max.as_nanos() as f64 - d.as_nanos() as f64) / span_ns)
            .clamp(0.0, 1.0);
        top + frac * (bottom - top)
    }

    /// The duration a given plot row represents (inverse of [y_for](Self::y_for)).
    fn value_at_row(&self, row: u16, size: TermSize) -> Duration {
        let top: u16 = Self::plot_top(size);
        let bottom: u16 = Self::plot_bottom(size);
        if bottom <= top {
            return self.max;
        }
        let frac: f64 = (row - top) as f64 / (bottom - top) as f64;
        let span_ns: f64 = (self.max.as_nanos() as f64) - (self.min.as_nanos() as f64);
        Duration::from_nanos((self.max.as_nanos() as f64 - frac * span_ns).max(0.0) as u64)
    }

    /// Paint the label column and vertical rule.
    pub fn paint(&self, buf: &mut PaintBuffer, size: TermSize) {
        let top: u16 = Self::plot_top(size);
        let bottom: u16 = Self::plot_bottom(size);
        for row in top..=bottom {
            if (row - top) % self.gap == 0 {
                let label: String = format_duration(self.value_at_row(row, size));
                let width: usize = self.label_size as usize;
                let text: String = if label.chars().count() > width {
                    label.chars().take(width).collect()
                } else {
                    format!("{label:>width$}")
                };
                buf.put_str(Layer::YAxis, 0, row, &text);
                buf.put(Layer::YAxis, self.label_size, row, glyphs::Y_TICK);
            } else {
                buf.put(Layer::YAxis, self.label_size, row, glyphs::Y_RULE);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Horizontal band `[x0, x1)` reserved for one span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanBand {
    pub span_index: usize,
    pub x0: u16,
    pub x1: u16,
}

impl SpanBand {
    #[inline]
    pub fn width(&self) -> u16 {
        self.x1 - self.x0
    }

    /// Column for the i-th point of `span` (arrival index `i`).
    pub fn x_for_index(&self, span: &SpanInfo, i: u64) -> u16 {
        debug_assert!(span.contains_index(i));
        let offset: u64 = i - span.start_index;
        let x: u64 = self.x0 as u64 + offset * self.width() as u64 / span.count.max(1);
        x.min(self.x1 as u64 - 1) as u16
    }
}

/// Divide plot columns `[x0, x1)` into per-span bands proportional to
/// each span's count, with one separator column between adjacent bands.
pub fn compute_bands(spans: &[SpanInfo], x0: u16, x1: u16) -> Vec<SpanBand> {
    let n: usize = spans.len();
    if n == 0 || x1 <= x0 {
        return Vec::new();
    }

    let total_cols: usize = (x1 - x0) as usize;
    let seps: usize = n - 1;
    if total_cols <= seps + n {
        // too narrow for proportions: one column per band while they fit
        let mut bands: Vec<SpanBand> = Vec::new();
        let mut x: u16 = x0;
        for (i, _) in spans.iter().enumerate() {
            if x >= x1 {
                break;
            }
            bands.push(SpanBand {
                span_index: i,
                x0: x,
                x1: x + 1,
            });
            x += 2; // band plus separator
        }
        return bands;
    }

    let avail: usize = total_cols - seps;
    let total_count: u64 = spans.iter().map(|s| s.count).sum::<u64>().max(1);
    let mut widths: Vec<usize> = spans
        .iter()
        .map(|s| (s.count as usize * avail) / total_count as usize)
        .collect();

    // hand leftover columns out left to right, then guarantee a minimum
    let mut rem: usize = avail - widths.iter().sum::<usize>();
    for w in widths.iter_mut() {
        if rem == 0 {
            break;
        }
        *w += 1;
        rem -= 1;
    }
    while widths.iter().any(|&w| w == 0) {
        let donor: usize = (0..n).max_by_key(|&i| widths[i]).unwrap_or(0);
        if widths[donor] <= 1 {
            break;
        }
        widths[donor] -= 1;
        if let Some(zero) = widths.iter().position(|&w| w == 0) {
            widths[zero] += 1;
        }
    }

    let mut bands: Vec<SpanBand> = Vec::with_capacity(n);
    let mut x: usize = x0 as usize;
    for (i, &w) in widths.iter().enumerate() {
        bands.push(SpanBand {
            span_index: i,
            x0: x as u16,
            x1: (x + w) as u16,
        });
        x += w + 1;
    }
    bands
}

/// Paint the bottom axis row plus the double separator bars between spans.
pub fn paint_x_axis(
    buf: &mut PaintBuffer,
    size: TermSize,
    spans: &[SpanInfo],
    bands: &[SpanBand],
    display_offset: FixedOffset,
) {
    let row: u16 = size.height.saturating_sub(1);
    let top: u16 = YAxis::plot_top(size);
    let bottom: u16 = YAxis::plot_bottom(size);

    for (bi, band) in bands.iter().enumerate() {
        let span: &SpanInfo = &spans[band.span_index];
        let span_duration: TimeDelta = span.time_span.duration;
        let begin: DateTime<FixedOffset> = span.time_span.begin.with_timezone(&display_offset);

        // span begin at high precision
        let begin_label: String = format_span_begin(begin);
        put_clipped(buf, band.x0, row, &begin_label, band.x1);

        // interior ticks, formatted for the span's length
        let probe: String = format_tick(begin, span_duration);
        let tick_len: u16 = probe.chars().count() as u16;
        let step: u16 = tick_len + 2;
        let mut x: u16 = band.x0 + begin_label.chars().count() as u16 + 2;
        while step > 0 && x + tick_len <= band.x1 {
            let frac: f64 = (x - band.x0) as f64 / band.width().max(1) as f64;
            let at: DateTime<FixedOffset> = begin + scale_delta(span_duration, frac);
            put_clipped(buf, x, row, &format_tick(at, span_duration), band.x1);
            x += step;
        }

        // double bar between this band and the next
        if bi + 1 < bands.len() {
            for y in top..=bottom {
                buf.put(Layer::XAxis, band.x1, y, glyphs::SPAN_SEPARATOR);
            }
            buf.put(Layer::XAxis, band.x1, row, glyphs::SPAN_SEPARATOR);
        }
    }
}

fn put_clipped(buf: &mut PaintBuffer, x: u16, y: u16, s: &str, max_x: u16) {
    for (i, ch) in s.chars().enumerate() {
        let cx: u32 = x as u32 + i as u32;
        if cx >= max_x as u32 {
            break;
        }
        buf.put(Layer::XAxis, cx as u16, y, ch);
    }
}

fn scale_delta(d: TimeDelta, frac: f64) -> TimeDelta {
    TimeDelta::milliseconds((d.num_milliseconds() as f64 * frac) as i64)
}

/// Tick label format, chosen from the span's wall-clock length.
pub fn format_tick(t: DateTime<FixedOffset>, span: TimeDelta) -> String {
    let secs: i64 = span.num_seconds();
    if secs < 30 {
        format!("{:02}.{:04}", t.second(), t.timestamp_subsec_millis() * 10)
    } else if secs < 600 {
        t.format("%M:%S").to_string()
    } else if secs < 86_400 {
        t.format("%H:%M:%S").to_string()
    } else if secs < 7 * 86_400 {
        t.format("%a %H:%M:%S").to_string()
    } else if secs < 183 * 86_400 {
        t.format("%d %b %H:%M").to_string()
    } else {
        format!(
            "{}.{:02}",
            t.format("%d %b %Y %H:%M:%S"),
            t.timestamp_subsec_millis() / 10
        )
    }
}

/// Span begin label: always date-free high precision wall clock.
pub fn format_span_begin(t: DateTime<FixedOffset>) -> String {
    format!("{}.{:03}", t.format("%H:%M:%S"), t.timestamp_subsec_millis())
}
