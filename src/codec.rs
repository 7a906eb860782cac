// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compact binary serialization of a [`Data`] recording.
//!
//! The container is self-describing: every composite entity starts with a
//! 1-byte identifier, integers are little-endian fixed 8-byte values,
//! floats are IEEE-754 bit-cast, durations are signed nanoseconds and
//! timestamps signed Unix milliseconds. Variable-length fields use a
//! two-phase layout: the outer object writes all fixed-width header fields
//! (including child sequence lengths) first, then walks the children again
//! for their variable body portions, so a reader can compute every offset
//! from the header alone.
//!
//! The version byte is stored per `Data`. Readers understand all known
//! versions and migrate older ones by replaying the arrival order; writers
//! always emit [`CURRENT_DATA_VERSION`].

use crate::{
    stats::{Run, Runs, Stats, TimeSpan},
    store::{
        Block, CURRENT_DATA_VERSION, Data, DataIndexes, DropReason, Header, Network,
        PingDataPoint, VERSION_NO_RUNS, VERSION_RUNS_NO_INDEX,
    },
};
use chrono::{DateTime, TimeDelta, Utc};
use std::{io, io::Write, net::Ipv6Addr, time::Duration};
use thiserror::Error;

pub const ID_TIME_SPAN: u8 = 1;
pub const ID_STATS: u8 = 2;
pub const ID_BLOCK: u8 = 3;
pub const ID_HEADER: u8 = 4;
pub const ID_DATA: u8 = 5;
pub const ID_NETWORK: u8 = 6;
pub const ID_RUNS: u8 = 7;

/// Encoded entity sizes in bytes.
pub const SIZE_TIME_SPAN: usize = 1 + 8 + 8 + 8;
pub const SIZE_STATS: usize = 1 + 2 * 8 + 4 * 8 + 2 * 8;
pub const SIZE_HEADER: usize = 1 + SIZE_TIME_SPAN + SIZE_STATS;
pub const SIZE_RUN: usize = 24;
pub const SIZE_RUNS: usize = 1 + 2 * SIZE_RUN;
pub const SIZE_DATA_INDEXES: usize = 16;
pub const SIZE_POINT: usize = 8 + 8 + 1;
pub const SIZE_IP: usize = 16;
/// Per-block chunk in the data header: identifier, raw length, header.
pub const SIZE_BLOCK_HEADER: usize = 1 + 8 + SIZE_HEADER;
const SIZE_RUN_V2: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected identifier: expected {expected}, found {found}")]
    UnexpectedIdentifier { expected: u8, found: u8 },
    #[error("short read in {0}")]
    ShortRead(&'static str),
    #[error("unknown data version {0}")]
    UnknownVersion(u8),
    #[error("invalid drop reason byte {0}")]
    InvalidDropReason(u8),
    #[error("invalid timestamp {0}ms")]
    InvalidTimestamp(i64),
    #[error("insert order entry points outside its block (block {block_index}, raw {raw_index})")]
    InvalidIndex { block_index: u64, raw_index: u64 },
    #[error("url is not valid utf-8")]
    InvalidString,
}

////////////////////////////////////////////////////////////////////////////////
// Writing

/// Serialize `data` into `w`, always at the current version.
/// Only the sink can fail; the encoding itself is total.
pub fn write_data<W: Write>(data: &Data, w: &mut W) -> io::Result<()> {
    write_data_versioned(data, CURRENT_DATA_VERSION, w)
}

/// Serialize `data` into a fresh buffer.
pub fn to_bytes(data: &Data) -> io::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::with_capacity(encoded_len(data));
    write_data(data, &mut buf)?;
    Ok(buf)
}

/// Exact encoded size, handy for pre-allocation.
pub fn encoded_len(data: &Data) -> usize {
    let header: usize = 1 + 1 + 8 + 8 + 25 + 8 + 8
        + data.blocks.len() * SIZE_BLOCK_HEADER
        + 8
        + SIZE_RUNS
        + SIZE_HEADER;
    let body: usize = data.insert_order.len() * SIZE_DATA_INDEXES
        + data.network.ips.len() * SIZE_IP
        + data.network.block_indexes.len() * 8
        + data.total_count as usize * SIZE_POINT
        + data.url.len();
    header + body
}

fn write_data_versioned<W: Write>(data: &Data, version: u8, w: &mut W) -> io::Result<()> {
    // header phase: every fixed-width field, including child lengths
    w.write_all(&[ID_DATA, version])?;
    put_u64(w, data.insert_order.len() as u64)?;
    put_i64(w, data.total_count as i64)?;

    w.write_all(&[ID_NETWORK])?;
    put_u64(w, data.network.ips.len() as u64)?;
    put_u64(w, data.network.block_indexes.len() as u64)?;
    put_u64(w, data.network.next_block_index)?;

    put_i64(w, (data.blocks.len() * SIZE_BLOCK_HEADER) as i64)?;
    put_u64(w, data.blocks.len() as u64)?;
    for block in &data.blocks {
        w.write_all(&[ID_BLOCK])?;
        put_u64(w, block.raw.len() as u64)?;
        write_header(&block.header, w)?;
    }

    put_u64(w, data.url.len() as u64)?;
    match version {
        VERSION_NO_RUNS => {}
        VERSION_RUNS_NO_INDEX => write_runs_v2(&data.runs, w)?,
        _ => write_runs(&data.runs, w)?,
    }
    write_header(&data.header, w)?;

    // body phase: the variable-length tails, in header order
    for idx in &data.insert_order {
        put_u64(w, idx.block_index)?;
        put_u64(w, idx.raw_index)?;
    }
    for ip in &data.network.ips {
        w.write_all(&ip.octets())?;
    }
    for &bi in &data.network.block_indexes {
        put_u64(w, bi)?;
    }
    for block in &data.blocks {
        for p in &block.raw {
            write_point(p, w)?;
        }
    }
    w.write_all(data.url.as_bytes())?;
    Ok(())
}

fn write_time_span<W: Write>(ts: &TimeSpan, w: &mut W) -> io::Result<()> {
    w.write_all(&[ID_TIME_SPAN])?;
    put_i64(w, ts.begin.timestamp_millis())?;
    put_i64(w, ts.end.timestamp_millis())?;
    put_i64(w, ts.duration.num_nanoseconds().unwrap_or(i64::MAX))
}

fn write_stats<W: Write>(s: &Stats, w: &mut W) -> io::Result<()> {
    w.write_all(&[ID_STATS])?;
    put_i64(w, s.min.as_nanos() as i64)?;
    put_i64(w, s.max.as_nanos() as i64)?;
    put_f64(w, s.mean)?;
    put_f64(w, s.variance)?;
    put_f64(w, s.stddev)?;
    put_f64(w, s.sum_sq)?;
    put_u64(w, s.good_count)?;
    put_u64(w, s.dropped_count)
}

fn write_header<W: Write>(h: &Header, w: &mut W) -> io::Result<()> {
    w.write_all(&[ID_HEADER])?;
    write_time_span(&h.time_span, w)?;
    write_stats(&h.stats, w)
}

fn write_runs<W: Write>(r: &Runs, w: &mut W) -> io::Result<()> {
    w.write_all(&[ID_RUNS])?;
    write_run(&r.good, w)?;
    write_run(&r.dropped, w)
}

fn write_run<W: Write>(r: &Run, w: &mut W) -> io::Result<()> {
    put_u64(w, r.longest)?;
    put_u64(w, r.current)?;
    put_u64(w, r.longest_index_end)
}

fn write_runs_v2<W: Write>(r: &Runs, w: &mut W) -> io::Result<()> {
    w.write_all(&[ID_RUNS])?;
    put_u64(w, r.good.longest)?;
    put_u64(w, r.good.current)?;
    put_u64(w, r.dropped.longest)?;
    put_u64(w, r.dropped.current)
}

fn write_point<W: Write>(p: &PingDataPoint, w: &mut W) -> io::Result<()> {
    put_i64(w, p.duration.as_nanos() as i64)?;
    put_i64(w, p.timestamp.timestamp_millis())?;
    w.write_all(&[p.drop_reason.as_byte()])
}

#[inline]
fn put_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn put_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn put_f64<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_bits().to_le_bytes())
}

////////////////////////////////////////////////////////////////////////////////
// Reading

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, section: &'static str) -> Result<&'a [u8], CodecError> {
        let end: usize = self
            .pos
            .checked_add(n)
            .ok_or(CodecError::ShortRead(section))?;
        if end > self.buf.len() {
            return Err(CodecError::ShortRead(section));
        }
        let slice: &[u8] = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reject a corrupt length field before it turns into a huge
    /// allocation: `items` entries of `item_size` bytes must still fit
    /// in the unread tail.
    fn ensure(&self, items: u64, item_size: usize, section: &'static str) -> Result<(), CodecError> {
        let needed: u128 = items as u128 * item_size as u128;
        if needed > self.remaining() as u128 {
            return Err(CodecError::ShortRead(section));
        }
        Ok(())
    }

    fn u8(&mut self, section: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, section)?[0])
    }

    fn ident(&mut self, expected: u8, section: &'static str) -> Result<(), CodecError> {
        let found: u8 = self.u8(section)?;
        if found != expected {
            return Err(CodecError::UnexpectedIdentifier { expected, found });
        }
        Ok(())
    }

    fn u64(&mut self, section: &'static str) -> Result<u64, CodecError> {
        let bytes: &[u8] = self.take(8, section)?;
        let mut arr: [u8; 8] = [0; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    fn i64(&mut self, section: &'static str) -> Result<i64, CodecError> {
        Ok(self.u64(section)? as i64)
    }

    fn f64(&mut self, section: &'static str) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.u64(section)?))
    }

    fn millis(&mut self, section: &'static str) -> Result<DateTime<Utc>, CodecError> {
        let ms: i64 = self.i64(section)?;
        DateTime::from_timestamp_millis(ms).ok_or(CodecError::InvalidTimestamp(ms))
    }
}

/// Decode a complete recording from `buf`, migrating older versions.
pub fn read_data(buf: &[u8]) -> Result<Data, CodecError> {
    let mut r: Reader = Reader::new(buf);

    r.ident(ID_DATA, "data identifier")?;
    let version: u8 = r.u8("version")?;
    if version == 0 || version > CURRENT_DATA_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }

    let insert_order_len: u64 = r.u64("insert order length")?;
    let total_count: i64 = r.i64("total count")?;

    r.ident(ID_NETWORK, "network identifier")?;
    let ips_len: u64 = r.u64("network ips length")?;
    let block_indexes_len: u64 = r.u64("network block indexes length")?;
    let next_block_index: u64 = r.u64("network next block index")?;

    let block_header_len: i64 = r.i64("block header length")?;
    let block_count: u64 = r.u64("block count")?;
    if block_header_len != (block_count as usize * SIZE_BLOCK_HEADER) as i64 {
        return Err(CodecError::ShortRead("block header section"));
    }

    r.ensure(block_count, SIZE_BLOCK_HEADER, "block header section")?;
    let mut raw_lens: Vec<u64> = Vec::with_capacity(block_count as usize);
    let mut block_headers: Vec<Header> = Vec::with_capacity(block_count as usize);
    for _ in 0..block_count {
        r.ident(ID_BLOCK, "block identifier")?;
        raw_lens.push(r.u64("block raw length")?);
        block_headers.push(read_header(&mut r)?);
    }

    let url_len: u64 = r.u64("url length")?;
    let runs: Runs = match version {
        VERSION_NO_RUNS => Runs::default(),
        VERSION_RUNS_NO_INDEX => read_runs_v2(&mut r)?,
        _ => read_runs(&mut r)?,
    };
    let header: Header = read_header(&mut r)?;

    // body phase
    r.ensure(insert_order_len, SIZE_DATA_INDEXES, "insert order section")?;
    let mut insert_order: Vec<DataIndexes> = Vec::with_capacity(insert_order_len as usize);
    for _ in 0..insert_order_len {
        insert_order.push(DataIndexes {
            block_index: r.u64("insert order entry")?,
            raw_index: r.u64("insert order entry")?,
        });
    }

    r.ensure(ips_len, SIZE_IP, "network ips section")?;
    let mut ips: Vec<Ipv6Addr> = Vec::with_capacity(ips_len as usize);
    for _ in 0..ips_len {
        let bytes: &[u8] = r.take(SIZE_IP, "network ips")?;
        let mut octets: [u8; 16] = [0; 16];
        octets.copy_from_slice(bytes);
        ips.push(Ipv6Addr::from(octets));
    }

    r.ensure(block_indexes_len, 8, "network block indexes section")?;
    let mut block_indexes: Vec<u64> = Vec::with_capacity(block_indexes_len as usize);
    for _ in 0..block_indexes_len {
        block_indexes.push(r.u64("network block indexes")?);
    }

    let mut blocks: Vec<Block> = Vec::with_capacity(block_count as usize);
    for (i, &raw_len) in raw_lens.iter().enumerate() {
        r.ensure(raw_len, SIZE_POINT, "block raw section")?;
        let mut raw: Vec<PingDataPoint> = Vec::with_capacity(raw_len as usize);
        for _ in 0..raw_len {
            raw.push(read_point(&mut r)?);
        }
        blocks.push(Block {
            header: block_headers[i],
            raw,
        });
    }

    let url_bytes: &[u8] = r.take(url_len as usize, "url")?;
    let url: String = String::from_utf8(url_bytes.to_vec()).map_err(|_| CodecError::InvalidString)?;

    let mut data: Data = Data::new(url);
    data.header = header;
    data.network = Network {
        ips,
        block_indexes,
        next_block_index,
    };
    data.blocks = blocks;
    data.insert_order = insert_order;
    data.total_count = total_count as u64;
    data.runs = runs;
    data.version = version;

    // every arrival-order entry must land inside a real block before
    // anything (migration included) walks the recording
    for idx in &data.insert_order {
        let in_bounds: bool = data
            .blocks
            .get(idx.block_index as usize)
            .map(|b| (idx.raw_index as usize) < b.raw.len())
            .unwrap_or(false);
        if !in_bounds {
            return Err(CodecError::InvalidIndex {
                block_index: idx.block_index,
                raw_index: idx.raw_index,
            });
        }
    }

    migrate(&mut data);
    Ok(data)
}

fn read_time_span(r: &mut Reader) -> Result<TimeSpan, CodecError> {
    r.ident(ID_TIME_SPAN, "time span identifier")?;
    let begin: DateTime<Utc> = r.millis("time span begin")?;
    let end: DateTime<Utc> = r.millis("time span end")?;
    let duration_ns: i64 = r.i64("time span duration")?;
    Ok(TimeSpan {
        begin,
        end,
        duration: TimeDelta::nanoseconds(duration_ns),
    })
}

fn read_stats(r: &mut Reader) -> Result<Stats, CodecError> {
    r.ident(ID_STATS, "stats identifier")?;
    Ok(Stats {
        min: Duration::from_nanos(r.i64("stats min")?.max(0) as u64),
        max: Duration::from_nanos(r.i64("stats max")?.max(0) as u64),
        mean: r.f64("stats mean")?,
        variance: r.f64("stats variance")?,
        stddev: r.f64("stats stddev")?,
        sum_sq: r.f64("stats sum of squares")?,
        good_count: r.u64("stats good count")?,
        dropped_count: r.u64("stats dropped count")?,
    })
}

fn read_header(r: &mut Reader) -> Result<Header, CodecError> {
    r.ident(ID_HEADER, "header identifier")?;
    let time_span: TimeSpan = read_time_span(r)?;
    let stats: Stats = read_stats(r)?;
    Ok(Header { stats, time_span })
}

fn read_runs(r: &mut Reader) -> Result<Runs, CodecError> {
    r.ident(ID_RUNS, "runs identifier")?;
    Ok(Runs {
        good: read_run(r)?,
        dropped: read_run(r)?,
    })
}

fn read_run(r: &mut Reader) -> Result<Run, CodecError> {
    Ok(Run {
        longest: r.u64("run longest")?,
        current: r.u64("run current")?,
        longest_index_end: r.u64("run longest index end")?,
    })
}

fn read_runs_v2(r: &mut Reader) -> Result<Runs, CodecError> {
    r.ident(ID_RUNS, "runs identifier")?;
    let good = Run {
        longest: r.u64("run longest")?,
        current: r.u64("run current")?,
        longest_index_end: 0,
    };
    let dropped = Run {
        longest: r.u64("run longest")?,
        current: r.u64("run current")?,
        longest_index_end: 0,
    };
    Ok(Runs { good, dropped })
}

fn read_point(r: &mut Reader) -> Result<PingDataPoint, CodecError> {
    let duration_ns: i64 = r.i64("point duration")?;
    let timestamp: DateTime<Utc> = r.millis("point timestamp")?;
    let reason_byte: u8 = r.u8("point drop reason")?;
    let drop_reason: DropReason =
        DropReason::from_byte(reason_byte).ok_or(CodecError::InvalidDropReason(reason_byte))?;
    Ok(PingDataPoint {
        duration: Duration::from_nanos(duration_ns.max(0) as u64),
        timestamp,
        drop_reason,
    })
}

////////////////////////////////////////////////////////////////////////////////
// Migration

/// Bring a decoded recording up to the current version. Older layouts
/// reconstruct their missing structures by replaying the arrival order;
/// each known version is handled explicitly.
fn migrate(data: &mut Data) {
    match data.version {
        VERSION_NO_RUNS => {
            data.runs = replay_runs(data);
        }
        VERSION_RUNS_NO_INDEX => {
            let replayed: Runs = replay_runs(data);
            data.runs.good.longest_index_end = replayed.good.longest_index_end;
            data.runs.dropped.longest_index_end = replayed.dropped.longest_index_end;
        }
        _ => {}
    }
    data.version = CURRENT_DATA_VERSION;
}

fn replay_runs(data: &Data) -> Runs {
    let mut runs: Runs = Runs::default();
    for (i, p) in data.iter().enumerate() {
        runs.add_point(i as u64, p.is_dropped());
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PingResult;
    use chrono::TimeZone;
    use std::net::Ipv4Addr;

    fn sample_data(points: u64, rotating_ips: u8, drop_every: u64) -> Data {
        let mut data: Data = Data::new("www.google.com");
        for i in 0..points {
            let dropped: bool = drop_every != 0 && i % drop_every == 0 && i != 0;
            let p: PingDataPoint = PingDataPoint::new(
                Duration::from_micros(3_000 + (i % 47) * 113),
                Utc.timestamp_opt(1_700_000_000 + i as i64, 250_000_000).unwrap(),
                if dropped {
                    DropReason::Timeout
                } else {
                    DropReason::NotDropped
                },
            );
            let ip: Ipv4Addr = Ipv4Addr::new(10, 0, 0, (i % rotating_ips as u64) as u8);
            data.add_point(PingResult::new(p, ip));
        }
        data
    }

    #[test]
    fn test_empty_round_trip() {
        let data: Data = Data::new("www.google.com");
        let bytes: Vec<u8> = to_bytes(&data).unwrap();

        assert_eq!(bytes.len(), encoded_len(&data), "encoded_len must be exact");
        // fixed header plus the bare url
        let expected: usize = 1 + 1 + 8 + 8 + 25 + 8 + 8 + 8 + SIZE_RUNS + SIZE_HEADER + 14;
        assert_eq!(bytes.len(), expected);

        let decoded: Data = read_data(&bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_round_trip_rotating_ips() {
        // a million points over ten rotating addresses, so the length
        // accounting and block indexing run at a realistic recording size
        let data: Data = sample_data(1_000_000, 10, 13);
        let bytes: Vec<u8> = to_bytes(&data).unwrap();
        assert_eq!(bytes.len(), encoded_len(&data), "encoded_len must be exact");

        let decoded: Data = read_data(&bytes).unwrap();
        assert_eq!(decoded, data, "round trip must be bit-identical");

        // serialization is deterministic
        assert_eq!(to_bytes(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_entity_sizes() {
        assert_eq!(SIZE_TIME_SPAN, 25);
        assert_eq!(SIZE_STATS, 65);
        assert_eq!(SIZE_HEADER, 91);
        assert_eq!(SIZE_RUNS, 49);
        assert_eq!(SIZE_BLOCK_HEADER, 100);
        assert_eq!(SIZE_POINT, 17);
    }

    #[test]
    fn test_wrong_identifier() {
        let data: Data = Data::new("example.com");
        let mut bytes: Vec<u8> = to_bytes(&data).unwrap();
        bytes[0] = ID_STATS;

        match read_data(&bytes) {
            Err(CodecError::UnexpectedIdentifier { expected, found }) => {
                assert_eq!(expected, ID_DATA);
                assert_eq!(found, ID_STATS);
            }
            other => panic!("expected identifier mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_buffer() {
        let data: Data = sample_data(100, 3, 0);
        let bytes: Vec<u8> = to_bytes(&data).unwrap();

        for cut in [0, 1, 10, 50, bytes.len() - 1] {
            let result: Result<Data, CodecError> = read_data(&bytes[..cut]);
            assert!(
                matches!(result, Err(CodecError::ShortRead(_))),
                "cut at {cut} must be a short read, got {result:?}"
            );
        }
    }

    #[test]
    fn test_unknown_version() {
        let data: Data = Data::new("example.com");
        let mut bytes: Vec<u8> = to_bytes(&data).unwrap();
        bytes[1] = 99;
        assert_eq!(read_data(&bytes), Err(CodecError::UnknownVersion(99)));
    }

    #[test]
    fn test_migrate_from_no_runs() {
        let data: Data = sample_data(200, 4, 7);
        let mut bytes: Vec<u8> = Vec::new();
        write_data_versioned(&data, VERSION_NO_RUNS, &mut bytes).unwrap();

        let decoded: Data = read_data(&bytes).unwrap();
        assert_eq!(decoded.version, CURRENT_DATA_VERSION);
        assert_eq!(decoded.runs, data.runs, "runs must be rebuilt by replay");
        assert_eq!(decoded.blocks, data.blocks);
    }

    #[test]
    fn test_migrate_from_runs_without_index() {
        let data: Data = sample_data(200, 4, 7);
        let mut bytes: Vec<u8> = Vec::new();
        write_data_versioned(&data, VERSION_RUNS_NO_INDEX, &mut bytes).unwrap();

        let decoded: Data = read_data(&bytes).unwrap();
        assert_eq!(decoded.version, CURRENT_DATA_VERSION);
        assert_eq!(
            decoded.runs.good.longest_index_end, data.runs.good.longest_index_end,
            "missing index field must be reconstructed"
        );
        assert_eq!(decoded.runs, data.runs);
    }

    #[test]
    fn test_drop_reasons_survive() {
        let mut data: Data = Data::new("example.com");
        let reasons: [DropReason; 5] = [
            DropReason::NotDropped,
            DropReason::Timeout,
            DropReason::SocketIo,
            DropReason::BadReply,
            DropReason::DnsFailure,
        ];
        for (i, &reason) in reasons.iter().enumerate() {
            let p: PingDataPoint = PingDataPoint::new(
                Duration::from_millis(5),
                Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                reason,
            );
            data.add_point(PingResult::new(p, Ipv4Addr::new(10, 0, 0, 1)));
        }

        let decoded: Data = read_data(&to_bytes(&data).unwrap()).unwrap();
        for (i, &reason) in reasons.iter().enumerate() {
            assert_eq!(decoded.get(i as u64).unwrap().drop_reason, reason);
        }
    }
}
