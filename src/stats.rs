// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Online statistics over ping round-trip times.
//!
//! [`Stats`] keeps running mean and variance with Welford's recurrence, so
//! adding a point is O(1) and no sample buffer is needed. Two `Stats` built
//! from disjoint sample sets can be [merged](Stats::merge) with the pooled
//! (weighted-incremental) formulas and match the stats of the union.

use chrono::{DateTime, TimeDelta, Utc};
use std::{fmt, time::Duration};

const NS_PER_MS: f64 = 1e6;

/// Running summary of observed round-trip times.
///
/// `mean`, `variance`, `stddev` and `sum_sq` are in nanoseconds (squared
/// where applicable) as f64; `min`/`max` keep full [Duration] precision.
/// Variance uses Bessel's correction (N-1 divisor) and is zero until two
/// good samples have been seen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub min: Duration,
    pub max: Duration,
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
    pub good_count: u64,
    pub dropped_count: u64,
    /// Welford's M2 accumulator (sum of squared deviations from the mean).
    pub sum_sq: f64,
}

impl Stats {
    /// Fold one good round-trip time into the summary.
    pub fn add_point(&mut self, rtt: Duration) {
        if self.good_count == 0 {
            // first sample pins both extremes
            self.min = rtt;
            self.max = rtt;
        } else {
            self.min = self.min.min(rtt);
            self.max = self.max.max(rtt);
        }

        let x: f64 = rtt.as_nanos() as f64;
        self.good_count += 1;
        let n: f64 = self.good_count as f64;
        let delta: f64 = x - self.mean;
        self.mean += delta / n;
        self.sum_sq += delta * (x - self.mean);
        self.recompute_spread();
    }

    /// Count a failed probe. Failed probes carry no usable duration.
    pub fn add_dropped(&mut self) {
        self.dropped_count += 1;
    }

    /// Combine two summaries built from disjoint sample sets.
    pub fn merge(&self, other: &Stats) -> Stats {
        if self.good_count == 0 {
            let mut merged: Stats = *other;
            merged.dropped_count += self.dropped_count;
            return merged;
        }
        if other.good_count == 0 {
            let mut merged: Stats = *self;
            merged.dropped_count += other.dropped_count;
            return merged;
        }

        let n1: f64 = self.good_count as f64;
        let n2: f64 = other.good_count as f64;
        let n: f64 = n1 + n2;
        let mean: f64 = (n1 * self.mean + n2 * other.mean) / n;
        let sum_sq: f64 = self.sum_sq
            + other.sum_sq
            + n1 * (self.mean - mean).powi(2)
            + n2 * (other.mean - mean).powi(2);

        let mut merged = Stats {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            mean,
            sum_sq,
            variance: 0.0,
            stddev: 0.0,
            good_count: self.good_count + other.good_count,
            dropped_count: self.dropped_count + other.dropped_count,
        };
        merged.recompute_spread();
        merged
    }

    fn recompute_spread(&mut self) {
        if self.good_count >= 2 {
            // Rounding in the recurrence can push M2 a hair below zero.
            let mut variance: f64 = self.sum_sq / (self.good_count - 1) as f64;
            if variance < 0.0 {
                variance = 0.0;
            }
            self.variance = variance;
            self.stddev = variance.sqrt();
        } else {
            self.variance = 0.0;
            self.stddev = 0.0;
        }
    }

    #[inline]
    pub fn total_count(&self) -> u64 {
        self.good_count + self.dropped_count
    }

    /// Packet loss as a float `[0.0 .. 1.0]`.
    pub fn packet_loss(&self) -> f64 {
        let total: u64 = self.total_count();
        if total == 0 {
            0.0
        } else {
            self.dropped_count as f64 / total as f64
        }
    }

    /// Mean RTT as formatted string (as milliseconds).
    pub fn mean_str(&self) -> String {
        format!("{:.1}ms", self.mean / NS_PER_MS)
    }

    /// Standard deviation as formatted string (as milliseconds).
    pub fn stddev_str(&self) -> String {
        format!("{:.1}ms", self.stddev / NS_PER_MS)
    }

    /// Packet loss as formatted string.
    pub fn loss_str(&self) -> String {
        format!("{:.1}%", 1e2 * self.packet_loss())
    }

    /// Pick the widest summary string that fits in `width` columns.
    pub fn summary_fitting(&self, width: usize) -> String {
        let long: String = format!(
            "μ {} σ {} min {} max {} loss {} (n {})",
            self.mean_str(),
            self.stddev_str(),
            format_duration(self.min),
            format_duration(self.max),
            self.loss_str(),
            self.total_count(),
        );
        if long.chars().count() <= width {
            return long;
        }
        let medium: String = format!("μ {} σ {} loss {}", self.mean_str(), self.stddev_str(), self.loss_str());
        if medium.chars().count() <= width {
            return medium;
        }
        let short: String = format!("μ {}", self.mean_str());
        if short.chars().count() <= width {
            short
        } else {
            String::new()
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {} mean {} max {} stddev {} loss {} ({} good, {} dropped)",
            format_duration(self.min),
            self.mean_str(),
            format_duration(self.max),
            self.stddev_str(),
            self.loss_str(),
            self.good_count,
            self.dropped_count,
        )
    }
}

/// Render a duration compactly for axis labels and summaries.
pub fn format_duration(d: Duration) -> String {
    let ns: u128 = d.as_nanos();
    if ns < 1_000 {
        format!("{ns}ns")
    } else if ns < 1_000_000 {
        format!("{:.1}µs", ns as f64 / 1e3)
    } else if ns < 1_000_000_000 {
        format!("{:.1}ms", ns as f64 / 1e6)
    } else {
        format!("{:.2}s", ns as f64 / 1e9)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Closed wall-clock interval covering a set of timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: TimeDelta,
}

impl Default for TimeSpan {
    fn default() -> Self {
        Self {
            begin: DateTime::UNIX_EPOCH,
            end: DateTime::UNIX_EPOCH,
            duration: TimeDelta::zero(),
        }
    }
}

impl TimeSpan {
    pub fn new(t: DateTime<Utc>) -> Self {
        Self {
            begin: t,
            end: t,
            duration: TimeDelta::zero(),
        }
    }

    /// Grow the interval to cover `t`.
    pub fn extend(&mut self, t: DateTime<Utc>) {
        if t < self.begin {
            self.begin = t;
        }
        if t > self.end {
            self.end = t;
        }
        self.duration = self.end - self.begin;
    }

    /// Inclusive on both ends.
    #[inline]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.begin && t <= self.end
    }

    pub fn union(&self, other: &TimeSpan) -> TimeSpan {
        let begin: DateTime<Utc> = self.begin.min(other.begin);
        let end: DateTime<Utc> = self.end.max(other.end);
        TimeSpan {
            begin,
            end,
            duration: end - begin,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Longest consecutive subsequence of one packet class.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Run {
    pub longest: u64,
    pub current: u64,
    /// Arrival index of the last point of the longest run.
    pub longest_index_end: u64,
}

impl Run {
    fn advance(&mut self, index: u64) {
        self.current += 1;
        if self.current > self.longest {
            self.longest = self.current;
            self.longest_index_end = index;
        }
    }

    #[inline]
    fn reset(&mut self) {
        self.current = 0;
    }
}

/// Good and dropped streak trackers; exactly one advances per point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Runs {
    pub good: Run,
    pub dropped: Run,
}

impl Runs {
    pub fn add_point(&mut self, index: u64, is_dropped: bool) {
        if is_dropped {
            self.dropped.advance(index);
            self.good.reset();
        } else {
            self.good.advance(index);
            self.dropped.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Check two floats agree to `sig` significant figures.
    fn assert_sigfigs(actual: f64, expected: f64, sig: i32, what: &str) {
        if expected == 0.0 {
            assert!(actual.abs() < 1e-9, "{what}: expected 0, got {actual}");
            return;
        }
        let tol: f64 = expected.abs() * 10f64.powi(-sig + 1);
        assert!(
            (actual - expected).abs() <= tol,
            "{what}: expected {expected}, got {actual} (tolerance {tol})"
        );
    }

    /// Naive reference calculation over a full sample set.
    fn reference_stats(data: &[u64]) -> (f64, f64) {
        let n: f64 = data.len() as f64;
        let mean: f64 = data.iter().sum::<u64>() as f64 / n;
        let var: f64 = data
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        (mean, var)
    }

    fn stats_of(data: &[u64]) -> Stats {
        let mut s: Stats = Stats::default();
        for &ns in data {
            s.add_point(Duration::from_nanos(ns));
        }
        s
    }

    #[test]
    fn test_welford_small() {
        let data: [u64; 5] = [5_000_000, 6_000_000, 5_000_000, 7_000_000, 3_000_000];
        let s: Stats = stats_of(&data);

        assert_eq!(s.good_count, 5);
        assert_eq!(s.min, Duration::from_nanos(3_000_000), "wrong min");
        assert_eq!(s.max, Duration::from_nanos(7_000_000), "wrong max");
        assert_sigfigs(s.mean, 5.2e6, 7, "mean");
        assert_sigfigs(s.variance, 2.2e12, 7, "variance");
        assert_sigfigs(s.stddev, 1.4832397e6, 5, "stddev");
    }

    #[test]
    fn test_welford_matches_reference() {
        let data: [u64; 8] = [1200, 1900, 800, 2500, 1400, 1450, 990, 3100];
        let s: Stats = stats_of(&data);
        let (mean, var) = reference_stats(&data);

        assert_sigfigs(s.mean, mean, 7, "mean vs reference");
        assert_sigfigs(s.variance, var, 7, "variance vs reference");
        assert_sigfigs(s.stddev, var.sqrt(), 5, "stddev vs reference");
    }

    #[test]
    fn test_first_point_pins_extremes() {
        let mut s: Stats = Stats::default();
        s.add_point(Duration::from_nanos(42));
        assert_eq!(s.min, Duration::from_nanos(42));
        assert_eq!(s.max, Duration::from_nanos(42));
        assert_eq!(s.variance, 0.0, "one sample must have zero variance");
        assert_eq!(s.stddev, 0.0);
    }

    #[test]
    fn test_merge_identity() {
        let a: [u64; 6] = [8, 9, 10, 11, 7, 9];
        let b: [u64; 3] = [1001, 1002, 1003];
        let both: Vec<u64> = a.iter().chain(b.iter()).copied().collect();

        let merged: Stats = stats_of(&a).merge(&stats_of(&b));
        let expect: Stats = stats_of(&both);
        let (mean, var) = reference_stats(&both);

        assert_eq!(merged.good_count, 9);
        assert_eq!(merged.min, Duration::from_nanos(7), "wrong merged min");
        assert_eq!(merged.max, Duration::from_nanos(1003), "wrong merged max");
        assert_sigfigs(merged.mean, mean, 5, "merged mean");
        assert_sigfigs(merged.variance, var, 5, "merged variance");
        assert_sigfigs(merged.stddev, expect.stddev, 5, "merged stddev");
    }

    #[test]
    fn test_merge_with_empty() {
        let a: Stats = stats_of(&[100, 200, 300]);
        let mut empty: Stats = Stats::default();
        empty.add_dropped();

        let merged: Stats = a.merge(&empty);
        assert_eq!(merged.good_count, 3);
        assert_eq!(merged.dropped_count, 1);
        assert_sigfigs(merged.mean, a.mean, 7, "merge with empty keeps mean");

        let merged_rev: Stats = empty.merge(&a);
        assert_eq!(merged_rev.good_count, 3);
        assert_eq!(merged_rev.dropped_count, 1);
    }

    #[test]
    fn test_timespan() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 30).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 1, 11, 59, 0).unwrap();

        let mut ts: TimeSpan = TimeSpan::new(t0);
        assert!(ts.contains(t0), "a fresh span contains its seed");
        assert_eq!(ts.duration, TimeDelta::zero());

        ts.extend(t1);
        ts.extend(t2);
        assert_eq!(ts.begin, t2);
        assert_eq!(ts.end, t1);
        assert_eq!(ts.duration, t1 - t2);
        assert!(ts.contains(t0));
        assert!(ts.contains(t1), "contains is inclusive at the end");
        assert!(ts.contains(t2), "contains is inclusive at the begin");

        let later: TimeSpan = TimeSpan::new(t1 + TimeDelta::minutes(5));
        let union: TimeSpan = ts.union(&later);
        assert_eq!(union.begin, t2);
        assert_eq!(union.end, t1 + TimeDelta::minutes(5));
        assert_eq!(union.duration, union.end - union.begin);
    }

    #[test]
    fn test_runs_streaks() {
        // OK OK D D D OK OK OK D D OK D OK OK OK
        let pattern: [bool; 15] = [
            false, false, true, true, true, false, false, false, true, true, false, true, false,
            false, false,
        ];
        let mut runs: Runs = Runs::default();
        for (i, &dropped) in pattern.iter().enumerate() {
            runs.add_point(i as u64, dropped);
        }

        assert_eq!(runs.good.longest, 3, "wrong longest good streak");
        assert_eq!(runs.dropped.longest, 3, "wrong longest dropped streak");
        assert_eq!(runs.good.longest_index_end, 7, "good streak ends at index 7");
        assert_eq!(runs.dropped.longest_index_end, 4, "dropped streak ends at index 4");
        assert_eq!(runs.good.current, 3);
        assert_eq!(runs.dropped.current, 0);

        let total: u64 = pattern.len() as u64;
        assert!(runs.good.longest + runs.dropped.longest <= total);
    }
}
