// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only recording store for probe outcomes.
//!
//! Every observed packet lands in exactly one [`Block`] (one block per
//! distinct destination IP), while [`Data::insert_order`] preserves the
//! global arrival order across blocks. Header summaries, run streaks and
//! the sorted [`Network`] index are updated on every append; nothing is
//! ever mutated after insertion.

use crate::stats::{Runs, Stats, TimeSpan};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    time::Duration,
};

/// Data layout version with no persisted run streaks.
pub const VERSION_NO_RUNS: u8 = 1;
/// Data layout version whose runs lack `longest_index_end`.
pub const VERSION_RUNS_NO_INDEX: u8 = 2;
/// Current data layout version.
pub const CURRENT_DATA_VERSION: u8 = 3;

/// Stands in for a destination when DNS resolution failed.
pub const ZERO_IP: Ipv6Addr = Ipv6Addr::UNSPECIFIED;

/// Why a probe produced no usable round-trip time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DropReason {
    NotDropped = 0,
    Timeout = 1,
    SocketIo = 2,
    BadReply = 3,
    DnsFailure = 4,
}

impl DropReason {
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<DropReason> {
        match b {
            0 => Some(DropReason::NotDropped),
            1 => Some(DropReason::Timeout),
            2 => Some(DropReason::SocketIo),
            3 => Some(DropReason::BadReply),
            4 => Some(DropReason::DnsFailure),
            _ => None,
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NotDropped => write!(f, "ok"),
            DropReason::Timeout => write!(f, "timeout"),
            DropReason::SocketIo => write!(f, "socket error"),
            DropReason::BadReply => write!(f, "bad reply"),
            DropReason::DnsFailure => write!(f, "dns failure"),
        }
    }
}

/// One probe outcome. When `drop_reason` is anything but
/// [`DropReason::NotDropped`], `duration` is informational only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingDataPoint {
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub drop_reason: DropReason,
}

impl PingDataPoint {
    /// Build a point, truncating the timestamp to the millisecond
    /// resolution of the persisted form so memory and disk agree.
    pub fn new(duration: Duration, timestamp: DateTime<Utc>, drop_reason: DropReason) -> Self {
        Self {
            duration,
            timestamp: truncate_to_millis(timestamp),
            drop_reason,
        }
    }

    #[inline]
    pub fn is_dropped(&self) -> bool {
        self.drop_reason != DropReason::NotDropped
    }
}

/// Truncate a wall-clock instant to millisecond resolution.
pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Render a stored address the way a user typed it: mapped IPv4
/// addresses come back out as dotted quads.
pub fn display_ip(ip: &Ipv6Addr) -> String {
    match ip.to_ipv4_mapped() {
        Some(v4) => v4.to_string(),
        None => ip.to_string(),
    }
}

/// A probe outcome tagged with the destination it was sent to.
/// IPv4 destinations are stored mapped into IPv6 (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingResult {
    pub data: PingDataPoint,
    pub ip: Ipv6Addr,
}

impl PingResult {
    pub fn new(data: PingDataPoint, v4: Ipv4Addr) -> Self {
        Self {
            data,
            ip: v4.to_ipv6_mapped(),
        }
    }

    /// A result for a probe that never reached the network (DNS failure).
    pub fn unresolved(data: PingDataPoint) -> Self {
        Self { data, ip: ZERO_IP }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Per-entity summary: statistics plus the covered wall-clock interval.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Header {
    pub stats: Stats,
    pub time_span: TimeSpan,
}

impl Header {
    fn add_point(&mut self, p: &PingDataPoint, first: bool) {
        if first {
            self.time_span = TimeSpan::new(p.timestamp);
        } else {
            self.time_span.extend(p.timestamp);
        }
        if p.is_dropped() {
            self.stats.add_dropped();
        } else {
            self.stats.add_point(p.duration);
        }
    }
}

/// Append-only store of every point observed for one destination IP.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub header: Header,
    pub raw: Vec<PingDataPoint>,
}

impl Block {
    fn add_point(&mut self, p: PingDataPoint) -> u64 {
        let raw_index: u64 = self.raw.len() as u64;
        self.header.add_point(&p, self.raw.is_empty());
        self.raw.push(p);
        raw_index
    }
}

/// Sorted index of observed destination addresses.
///
/// `ips` stays sorted by byte order; `block_indexes[i]` is the block id
/// for `ips[i]`. A previously unseen IP is assigned the block id
/// `next_block_index`, which then increments; duplicates do not allocate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Network {
    pub ips: Vec<Ipv6Addr>,
    pub block_indexes: Vec<u64>,
    pub next_block_index: u64,
}

impl Network {
    /// Resolve `ip` to its block id, allocating a fresh id when unseen.
    /// Returns `(block_id, freshly_allocated)`.
    fn block_for(&mut self, ip: Ipv6Addr) -> (u64, bool) {
        match self.ips.binary_search(&ip) {
            Ok(pos) => (self.block_indexes[pos], false),
            Err(pos) => {
                let id: u64 = self.next_block_index;
                self.ips.insert(pos, ip);
                self.block_indexes.insert(pos, id);
                self.next_block_index += 1;
                (id, true)
            }
        }
    }

    /// Reverse lookup: the IP whose block id is `block_index`.
    pub fn ip_for_block(&self, block_index: u64) -> Option<Ipv6Addr> {
        self.block_indexes
            .iter()
            .position(|&b| b == block_index)
            .map(|pos| self.ips[pos])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ips.len()
    }
}

/// Position of one point: which block, and where inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataIndexes {
    pub block_index: u64,
    pub raw_index: u64,
}

////////////////////////////////////////////////////////////////////////////////

/// The full recording for one monitored URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub url: String,
    pub header: Header,
    pub network: Network,
    pub blocks: Vec<Block>,
    /// Arrival order across all blocks; the single source of truth for
    /// iteration. `len(insert_order) == total_count`.
    pub insert_order: Vec<DataIndexes>,
    pub total_count: u64,
    pub runs: Runs,
    pub version: u8,
    /// Display offset for timestamps; storage is always UTC.
    pub offset: FixedOffset,
}

impl Data {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            header: Header::default(),
            network: Network::default(),
            blocks: Vec::new(),
            insert_order: Vec::new(),
            total_count: 0,
            runs: Runs::default(),
            version: CURRENT_DATA_VERSION,
            offset: Utc.fix(),
        }
    }

    /// Append one probe outcome. Infallible and O(1) amortised.
    pub fn add_point(&mut self, result: PingResult) {
        let (block_id, created) = self.network.block_for(result.ip);
        if created {
            self.blocks.push(Block::default());
        }
        let raw_index: u64 = self.blocks[block_id as usize].add_point(result.data);

        self.header.add_point(&result.data, self.total_count == 0);
        self.runs.add_point(self.total_count, result.data.is_dropped());
        self.insert_order.push(DataIndexes {
            block_index: block_id,
            raw_index,
        });
        self.total_count += 1;
    }

    /// The i-th point in arrival order.
    pub fn get(&self, i: u64) -> Option<&PingDataPoint> {
        let idx: &DataIndexes = self.insert_order.get(i as usize)?;
        self.blocks
            .get(idx.block_index as usize)?
            .raw
            .get(idx.raw_index as usize)
    }

    /// The i-th point in arrival order, tagged with its destination IP.
    pub fn get_full(&self, i: u64) -> Option<PingResult> {
        let idx: &DataIndexes = self.insert_order.get(i as usize)?;
        let data: PingDataPoint = *self
            .blocks
            .get(idx.block_index as usize)?
            .raw
            .get(idx.raw_index as usize)?;
        let ip: Ipv6Addr = self.network.ip_for_block(idx.block_index)?;
        Some(PingResult { data, ip })
    }

    #[inline]
    pub fn is_last(&self, i: u64) -> bool {
        i + 1 == self.total_count
    }

    #[inline]
    pub fn end(&self, i: u64) -> bool {
        i >= self.total_count
    }

    /// Iterate all points in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &PingDataPoint> + '_ {
        self.insert_order
            .iter()
            .map(|idx| &self.blocks[idx.block_index as usize].raw[idx.raw_index as usize])
    }

    pub fn packet_loss(&self) -> f64 {
        self.header.stats.packet_loss()
    }

    /// Serialize this recording in its compact binary form.
    pub fn as_compact<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        crate::codec::write_data(self, w)
    }

    /// Decode a recording from its compact binary form.
    pub fn from_compact(bytes: &[u8]) -> Result<Data, crate::codec::CodecError> {
        crate::codec::read_data(bytes)
    }

    /// The same recording with timestamps rebased for display.
    pub fn in_timezone(&self, offset: FixedOffset) -> Data {
        let mut rebased: Data = self.clone();
        rebased.offset = offset;
        rebased
    }

    /// A stored timestamp in the display timezone.
    #[inline]
    pub fn display_time(&self, t: DateTime<Utc>) -> DateTime<FixedOffset> {
        t.with_timezone(&self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point_at(secs: i64, ms: u64, dropped: bool) -> PingDataPoint {
        PingDataPoint::new(
            Duration::from_millis(ms),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            if dropped {
                DropReason::Timeout
            } else {
                DropReason::NotDropped
            },
        )
    }

    fn result(secs: i64, ms: u64, ip: [u8; 4]) -> PingResult {
        PingResult::new(
            point_at(secs, ms, false),
            Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
        )
    }

    #[test]
    fn test_network_ordering() {
        let mut data: Data = Data::new("example.com");
        data.add_point(result(0, 5, [4, 0, 0, 0]));
        data.add_point(result(1, 6, [1, 0, 0, 0]));
        data.add_point(result(2, 7, [255, 255, 255, 255]));
        data.add_point(result(3, 8, [4, 0, 0, 0]));

        assert_eq!(data.blocks.len(), 3, "duplicate IP must not allocate");
        assert_eq!(data.total_count, 4);

        let sorted: Vec<Ipv6Addr> = vec![
            Ipv4Addr::new(1, 0, 0, 0).to_ipv6_mapped(),
            Ipv4Addr::new(4, 0, 0, 0).to_ipv6_mapped(),
            Ipv4Addr::new(255, 255, 255, 255).to_ipv6_mapped(),
        ];
        assert_eq!(data.network.ips, sorted, "ips must stay sorted by byte order");

        assert_eq!(
            data.get_full(3).unwrap().ip,
            Ipv4Addr::new(4, 0, 0, 0).to_ipv6_mapped()
        );
        assert_eq!(
            data.insert_order[3].block_index, data.insert_order[0].block_index,
            "same IP resolves to the same block"
        );

        // block_indexes is a permutation of [0, len)
        let mut ids: Vec<u64> = data.network.block_indexes.clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_insert_order_is_source_of_truth() {
        let mut data: Data = Data::new("example.com");
        let ips: [[u8; 4]; 3] = [[10, 0, 0, 1], [10, 0, 0, 2], [10, 0, 0, 3]];
        for i in 0..30u64 {
            data.add_point(result(i as i64, 5 + i, ips[(i % 3) as usize]));
        }

        assert_eq!(data.total_count, 30);
        assert_eq!(data.insert_order.len(), 30);
        let block_sum: usize = data.blocks.iter().map(|b| b.raw.len()).sum();
        assert_eq!(block_sum, 30, "block raw lengths must sum to total_count");

        // arrival order survives the block partitioning
        for i in 0..30u64 {
            let p: &PingDataPoint = data.get(i).unwrap();
            assert_eq!(p.duration, Duration::from_millis(5 + i), "wrong point at {i}");
        }
        assert!(data.is_last(29));
        assert!(!data.is_last(28));
        assert!(data.end(30));
        assert!(!data.end(29));
    }

    #[test]
    fn test_header_merges_block_stats() {
        let mut data: Data = Data::new("example.com");
        for i in 0..12u64 {
            data.add_point(result(i as i64, 3 + (i % 4), [10, 0, 0, (i % 2) as u8]));
        }

        let merged: Stats = data
            .blocks
            .iter()
            .fold(Stats::default(), |acc, b| acc.merge(&b.header.stats));
        assert_eq!(data.header.stats.good_count, merged.good_count);
        assert_eq!(data.header.stats.dropped_count, merged.dropped_count);
        assert_eq!(data.header.stats.min, merged.min);
        assert_eq!(data.header.stats.max, merged.max);
        // pooled merge and the sequential recurrence agree to rounding
        assert!(
            (data.header.stats.mean - merged.mean).abs() <= merged.mean.abs() * 1e-9,
            "header mean must equal block merge"
        );
        assert!(
            (data.header.stats.variance - merged.variance).abs()
                <= merged.variance.abs() * 1e-6,
            "header variance must equal block merge"
        );

        for block in &data.blocks {
            for p in &block.raw {
                assert!(
                    data.header.time_span.contains(p.timestamp),
                    "header time span must cover every point"
                );
            }
        }
    }

    #[test]
    fn test_runs_and_loss_through_store() {
        let mut data: Data = Data::new("example.com");
        let pattern: [bool; 15] = [
            false, false, true, true, true, false, false, false, true, true, false, true, false,
            false, false,
        ];
        for (i, &dropped) in pattern.iter().enumerate() {
            let p: PingDataPoint = point_at(i as i64, 5, dropped);
            data.add_point(PingResult::new(p, Ipv4Addr::new(10, 0, 0, 1)));
        }

        assert_eq!(data.runs.good.longest, 3);
        assert_eq!(data.runs.dropped.longest, 3);
        assert!((data.packet_loss() - 6.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_timestamps_truncate_to_millis() {
        let fine = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let p = PingDataPoint::new(Duration::from_millis(1), fine, DropReason::NotDropped);
        assert_eq!(p.timestamp.timestamp_subsec_millis(), 123);
        assert_eq!(p.timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
