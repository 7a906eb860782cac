// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Segmentation of the arrival sequence into visually distinct spans.
//!
//! A span is a maximal contiguous run of points whose inter-arrival gaps
//! are consistent enough to share one X-axis segment. Splitting lets the
//! axis dedicate width per span instead of stretching across a recording
//! gap. Spans are not persisted; after a compact read they are rebuilt by
//! replaying the arrival order.

use crate::{
    stats::{Stats, TimeSpan},
    store::{Data, PingDataPoint},
};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Gap-multiple threshold while a span still has a single recorded gap.
const FIRST_GAP_FACTOR: f64 = 7.0;
/// Stddev multiples beyond the mean gap that force a split.
const SPLIT_K_GOOD: f64 = 4.0;
const SPLIT_K_DROPPED: f64 = 9.0;

/// Rolling aggregates for one span.
///
/// `span_stats` summarises inter-arrival gaps; `ping_stats` summarises the
/// durations of good pings inside the span. `end_index` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanInfo {
    pub span_stats: Stats,
    pub ping_stats: Stats,
    pub time_span: TimeSpan,
    pub last_point: DateTime<Utc>,
    pub count: u64,
    pub start_index: u64,
    pub end_index: u64,
}

impl SpanInfo {
    fn seed(index: u64, p: &PingDataPoint) -> Self {
        let mut ping_stats: Stats = Stats::default();
        if p.is_dropped() {
            ping_stats.add_dropped();
        } else {
            ping_stats.add_point(p.duration);
        }
        Self {
            span_stats: Stats::default(),
            ping_stats,
            time_span: TimeSpan::new(p.timestamp),
            last_point: p.timestamp,
            count: 1,
            start_index: index,
            end_index: index + 1,
        }
    }

    fn append(&mut self, p: &PingDataPoint, gap: Duration) {
        self.span_stats.add_point(gap);
        if p.is_dropped() {
            self.ping_stats.add_dropped();
        } else {
            self.ping_stats.add_point(p.duration);
        }
        self.time_span.extend(p.timestamp);
        self.last_point = p.timestamp;
        self.count += 1;
        self.end_index += 1;
    }

    #[inline]
    pub fn contains_index(&self, i: u64) -> bool {
        i >= self.start_index && i < self.end_index
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Per-point segmentation engine. Feed it every appended point in arrival
/// order; it decides whether the point extends the active span or seeds a
/// new one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpanEngine {
    spans: Vec<SpanInfo>,
}

impl SpanEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the segmentation by replaying a store's arrival order.
    pub fn rebuild(data: &Data) -> Self {
        let mut engine: SpanEngine = SpanEngine::new();
        for (i, p) in data.iter().enumerate() {
            engine.add_point(i as u64, p);
        }
        engine
    }

    pub fn add_point(&mut self, index: u64, p: &PingDataPoint) {
        let Some(active) = self.spans.last_mut() else {
            self.spans.push(SpanInfo::seed(index, p));
            return;
        };

        let gap: Duration = (p.timestamp - active.last_point)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if Self::should_split(active, p, gap) {
            self.spans.push(SpanInfo::seed(index, p));
        } else {
            active.append(p, gap);
        }
    }

    fn should_split(span: &SpanInfo, p: &PingDataPoint, gap: Duration) -> bool {
        let gap_ns: f64 = gap.as_nanos() as f64;
        match span.count {
            // a single point cannot establish a gap pattern yet
            1 => false,
            // one recorded gap: it is also the mean
            2 => gap_ns > span.span_stats.mean * FIRST_GAP_FACTOR,
            _ => {
                let mean: f64 = span.span_stats.mean;
                let stddev: f64 = span.span_stats.stddev;
                let k: f64 = if p.is_dropped() {
                    SPLIT_K_DROPPED
                } else {
                    SPLIT_K_GOOD
                };
                if stddev > 0.0 {
                    gap_ns > mean + k * stddev
                } else {
                    gap_ns > 2.0 * mean
                }
            }
        }
    }

    /// Total points across all spans.
    pub fn count(&self) -> u64 {
        self.spans.iter().map(|s| s.count).sum()
    }

    #[inline]
    pub fn spans(&self) -> &[SpanInfo] {
        &self.spans
    }

    /// All point indexes in arrival order, tagged with their span.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.spans
            .iter()
            .enumerate()
            .flat_map(|(si, s)| (s.start_index..s.end_index).map(move |i| (si, i)))
    }

    /// The span holding arrival index `i`.
    pub fn span_for_index(&self, i: u64) -> Option<&SpanInfo> {
        match self
            .spans
            .binary_search_by(|s| {
                if i < s.start_index {
                    std::cmp::Ordering::Greater
                } else if i >= s.end_index {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            }) {
            Ok(pos) => self.spans.get(pos),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DropReason;
    use chrono::TimeZone;

    fn point(secs: i64, dropped: bool) -> PingDataPoint {
        PingDataPoint::new(
            Duration::from_millis(10),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            if dropped {
                DropReason::Timeout
            } else {
                DropReason::NotDropped
            },
        )
    }

    fn engine_over(times: &[i64]) -> SpanEngine {
        let mut engine: SpanEngine = SpanEngine::new();
        for (i, &t) in times.iter().enumerate() {
            engine.add_point(i as u64, &point(t, false));
        }
        engine
    }

    #[test]
    fn test_split_on_large_gap() {
        let engine: SpanEngine = engine_over(&[1, 2, 3, 200]);

        assert_eq!(engine.spans().len(), 2, "gap of 197s must split");
        let second: &SpanInfo = &engine.spans()[1];
        assert_eq!(
            second.time_span.begin,
            Utc.timestamp_opt(1_700_000_200, 0).unwrap(),
            "second span must begin at the late point"
        );
        assert_eq!(second.start_index, 3);
        assert_eq!(second.count, 1);
        assert_eq!(engine.count(), 4);
    }

    #[test]
    fn test_steady_stream_stays_one_span() {
        let times: Vec<i64> = (0..60).collect();
        let engine: SpanEngine = engine_over(&times);
        assert_eq!(engine.spans().len(), 1, "steady 1s cadence must not split");
        assert_eq!(engine.spans()[0].count, 60);
    }

    #[test]
    fn test_first_gap_rule() {
        // second gap is 6x the first: under the 7x threshold, no split
        let engine: SpanEngine = engine_over(&[0, 10, 70]);
        assert_eq!(engine.spans().len(), 1);

        // second gap is 8x the first: split
        let engine: SpanEngine = engine_over(&[0, 10, 90]);
        assert_eq!(engine.spans().len(), 2);
    }

    #[test]
    fn test_dropped_points_get_wider_margin() {
        // jittered cadence so stddev > 0, then a gap that trips k=4 but not k=9
        let base: [i64; 6] = [0, 10, 21, 30, 41, 50];
        let mut good: SpanEngine = engine_over(&base);
        let mut with_drop: SpanEngine = good.clone();

        let trip: i64 = 50 + 15; // gaps {10,11,9,11,9}: mean 10s, stddev 1s; 15s > mean+4σ, < mean+9σ
        good.add_point(6, &point(trip, false));
        with_drop.add_point(6, &point(trip, true));

        assert_eq!(good.spans().len(), 2, "good point at mean+4σ margin must split");
        assert_eq!(with_drop.spans().len(), 1, "dropped point gets the 9σ margin");
    }

    #[test]
    fn test_each_point_in_exactly_one_span() {
        let times: [i64; 9] = [0, 1, 2, 3, 300, 301, 302, 900, 901];
        let engine: SpanEngine = engine_over(&times);

        for (i, &t) in times.iter().enumerate() {
            let holding: Vec<&SpanInfo> = engine
                .spans()
                .iter()
                .filter(|s| s.time_span.contains(point(t, false).timestamp))
                .collect();
            assert_eq!(holding.len(), 1, "point {i} must sit in exactly one span");

            let by_index: &SpanInfo = engine.span_for_index(i as u64).unwrap();
            assert!(by_index.contains_index(i as u64));
        }
        assert!(engine.span_for_index(times.len() as u64).is_none());

        // iter walks every point once, in arrival order, span-tagged
        let walked: Vec<(usize, u64)> = engine.iter().collect();
        assert_eq!(walked.len(), times.len());
        assert_eq!(walked[0], (0, 0));
        assert_eq!(walked[4], (1, 4), "point 4 opens the second span");
        assert!(walked.windows(2).all(|w| w[0].1 + 1 == w[1].1));
    }

    #[test]
    fn test_span_stats_track_gaps_not_durations() {
        let engine: SpanEngine = engine_over(&[0, 10, 20, 30]);
        let span: &SpanInfo = &engine.spans()[0];

        // three 10s gaps
        assert_eq!(span.span_stats.good_count, 3);
        assert!((span.span_stats.mean - 10e9).abs() < 1e-3);
        // four 10ms pings
        assert_eq!(span.ping_stats.good_count, 4);
        assert!((span.ping_stats.mean - 10e6).abs() < 1e-3);
    }
}
