// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered terminal paint buffers.
//!
//! The renderer paints into per-layer cell grids, back to front; overlay
//! components only ever touch their own reserved layer. Composition
//! flattens the stack into either crossterm commands (live monitor) or a
//! plain string (frame dumps and tests), which keeps the frame itself a
//! pure value.

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::{fmt, io};

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub width: u16,
    pub height: u16,
}

impl TermSize {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    #[inline]
    fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}x{}]", self.width, self.height)
    }
}

/// Paint layers, back to front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Layer {
    Gradient = 0,
    Bar,
    Data,
    YAxis,
    XAxis,
    Key,
    Toast,
    Help,
    Spinner,
}

impl Layer {
    pub const ALL: [Layer; 9] = [
        Layer::Gradient,
        Layer::Bar,
        Layer::Data,
        Layer::YAxis,
        Layer::XAxis,
        Layer::Key,
        Layer::Toast,
        Layer::Help,
        Layer::Spinner,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// One painted character cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub fg: Option<Color>,
}

/// Stack of per-layer cell grids for one frame.
#[derive(Debug, Clone)]
pub struct PaintBuffer {
    size: TermSize,
    layers: Vec<Vec<Option<Cell>>>,
}

impl PaintBuffer {
    pub fn new(size: TermSize) -> Self {
        Self {
            size,
            layers: vec![vec![None; size.cells()]; Layer::ALL.len()],
        }
    }

    #[inline]
    pub fn size(&self) -> TermSize {
        self.size
    }

    /// Adapt to a new terminal size, clearing every layer.
    pub fn resize(&mut self, size: TermSize) {
        if size != self.size {
            self.size = size;
            self.layers = vec![vec![None; size.cells()]; Layer::ALL.len()];
        }
    }

    pub fn clear_layer(&mut self, layer: Layer) {
        self.layers[layer.index()].fill(None);
    }

    #[inline]
    fn offset(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.size.width && y < self.size.height {
            Some(y as usize * self.size.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Paint one cell; out-of-bounds coordinates are ignored.
    pub fn put(&mut self, layer: Layer, x: u16, y: u16, ch: char) {
        self.put_fg(layer, x, y, ch, None);
    }

    pub fn put_fg(&mut self, layer: Layer, x: u16, y: u16, ch: char, fg: Option<Color>) {
        if let Some(off) = self.offset(x, y) {
            self.layers[layer.index()][off] = Some(Cell { ch, fg });
        }
    }

    /// Paint a string left to right starting at `(x, y)`, clipped at the
    /// right edge.
    pub fn put_str(&mut self, layer: Layer, x: u16, y: u16, s: &str) {
        self.put_str_fg(layer, x, y, s, None);
    }

    pub fn put_str_fg(&mut self, layer: Layer, x: u16, y: u16, s: &str, fg: Option<Color>) {
        for (i, ch) in s.chars().enumerate() {
            let cx: u32 = x as u32 + i as u32;
            if cx >= self.size.width as u32 {
                break;
            }
            self.put_fg(layer, cx as u16, y, ch, fg);
        }
    }

    /// The front-most painted cell at `(x, y)`.
    pub fn cell_at(&self, x: u16, y: u16) -> Option<Cell> {
        let off: usize = self.offset(x, y)?;
        for layer in Layer::ALL.iter().rev() {
            if let Some(cell) = self.layers[layer.index()][off] {
                return Some(cell);
            }
        }
        None
    }

    /// Queue the composed frame as crossterm commands. The caller flushes.
    pub fn queue_frame<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let mut current_fg: Option<Color> = None;
        for y in 0..self.size.height {
            queue!(w, MoveTo(0, y))?;
            let mut run: String = String::with_capacity(self.size.width as usize);
            for x in 0..self.size.width {
                let cell: Cell = self.cell_at(x, y).unwrap_or(Cell { ch: ' ', fg: None });
                if cell.fg != current_fg {
                    if !run.is_empty() {
                        queue!(w, Print(&run))?;
                        run.clear();
                    }
                    match cell.fg {
                        Some(color) => queue!(w, SetForegroundColor(color))?,
                        None => queue!(w, ResetColor)?,
                    }
                    current_fg = cell.fg;
                }
                run.push(cell.ch);
            }
            queue!(w, Print(&run))?;
        }
        queue!(w, ResetColor)?;
        Ok(())
    }

    /// The composed frame as plain text, colors discarded. Rows are
    /// right-trimmed and joined with newlines.
    pub fn to_plain_string(&self) -> String {
        let mut out: String = String::with_capacity(self.size.cells() + self.size.height as usize);
        for y in 0..self.size.height {
            let mut row: String = String::with_capacity(self.size.width as usize);
            for x in 0..self.size.width {
                row.push(self.cell_at(x, y).map(|c| c.ch).unwrap_or(' '));
            }
            out.push_str(row.trim_end());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_ordering() {
        let mut buf: PaintBuffer = PaintBuffer::new(TermSize::new(10, 4));
        buf.put(Layer::Gradient, 2, 1, 'g');
        buf.put(Layer::Data, 2, 1, 'd');
        buf.put(Layer::Bar, 2, 1, 'b');

        assert_eq!(buf.cell_at(2, 1).unwrap().ch, 'd', "front layer must win");
        buf.clear_layer(Layer::Data);
        assert_eq!(buf.cell_at(2, 1).unwrap().ch, 'b');
        buf.clear_layer(Layer::Bar);
        assert_eq!(buf.cell_at(2, 1).unwrap().ch, 'g');
    }

    #[test]
    fn test_out_of_bounds_is_ignored() {
        let mut buf: PaintBuffer = PaintBuffer::new(TermSize::new(4, 2));
        buf.put(Layer::Data, 99, 0, 'x');
        buf.put(Layer::Data, 0, 99, 'x');
        buf.put_str(Layer::Data, 2, 0, "abcdef"); // clipped at the edge

        let text: String = buf.to_plain_string();
        assert_eq!(text, "  ab\n\n");
    }

    #[test]
    fn test_plain_string_trims_rows() {
        let mut buf: PaintBuffer = PaintBuffer::new(TermSize::new(6, 3));
        buf.put_str(Layer::Data, 0, 0, "hi");
        buf.put(Layer::Data, 3, 2, '!');

        assert_eq!(buf.to_plain_string(), "hi\n\n   !\n");
    }

    #[test]
    fn test_resize_clears() {
        let mut buf: PaintBuffer = PaintBuffer::new(TermSize::new(4, 2));
        buf.put(Layer::Data, 0, 0, 'x');
        buf.resize(TermSize::new(5, 2));
        assert!(buf.cell_at(0, 0).is_none(), "resize must clear all layers");

        buf.put(Layer::Data, 0, 0, 'y');
        buf.resize(TermSize::new(5, 2));
        assert_eq!(buf.cell_at(0, 0).unwrap().ch, 'y', "same size is a no-op");
    }
}
