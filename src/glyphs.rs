// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Every code point the renderer paints, collected in one place.

/// Spinner frames (quadrant blocks, clockwise).
pub const SPINNER: [char; 4] = ['▘', '▝', '▗', '▖'];

/// Density band glyphs for coincident data points at one cell:
/// exactly one point, 2-5 points, 6-25 points, more than 25 points.
pub const DENSITY: [char; 4] = ['×', '▪', '▓', '█'];

/// Upper bounds (inclusive) of the first three density bands.
pub const DENSITY_BANDS: [u32; 3] = [1, 5, 25];

/// Gradient glyphs for interpolated segments between data points.
pub const GRADIENT_DOWN: char = '\\';
pub const GRADIENT_UP: char = '/';
pub const GRADIENT_STEEP: char = '|';
pub const GRADIENT_FLAT: char = '-';
pub const GRADIENT_FLAT_HIGH: char = '―';
pub const GRADIENT_FLAT_LOW: char = '_';

/// Dropped-packet bar column and the lighter fill joining adjacent bars.
pub const DROP_BAR: char = '│';
pub const DROP_FILL: char = '┆';

/// Axis furniture.
pub const Y_RULE: char = '│';
pub const Y_TICK: char = '┤';
pub const X_RULE: char = '─';
pub const SPAN_SEPARATOR: char = '║';

/// Rounded corners for the toast box.
pub const ROUND_TOP_LEFT: char = '╭';
pub const ROUND_TOP_RIGHT: char = '╮';
pub const ROUND_BOTTOM_LEFT: char = '╰';
pub const ROUND_BOTTOM_RIGHT: char = '╯';

/// Sharp corners for the help box.
pub const SHARP_TOP_LEFT: char = '┌';
pub const SHARP_TOP_RIGHT: char = '┐';
pub const SHARP_BOTTOM_LEFT: char = '└';
pub const SHARP_BOTTOM_RIGHT: char = '┘';

/// Box edges, shared by both boxes.
pub const BOX_HORIZONTAL: char = '─';
pub const BOX_VERTICAL: char = '│';

/// Warning glyph wrapped around toast messages.
pub const WARNING: char = '⚠';

/// Markers for the min/max labels on the plot.
pub const MARK_MIN: char = '▾';
pub const MARK_MAX: char = '▴';
