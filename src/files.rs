// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `.pings` file handling: discovery, loading, dumps and the writer task.
//!
//! The on-disk format is the compact container from [`crate::codec`]. The
//! writer keeps its own [`Data`], applies every record from its branch of
//! the probe stream, and rewrites the file from offset zero each cycle;
//! records queued while a write was in flight coalesce into the next one.
//! Transient I/O errors are surfaced to the error channel and retried
//! with exponential backoff, indefinitely.

use crate::{
    codec,
    probe::ProbeError,
    siphon::{Drained, drain_now},
    stats::format_duration,
    store::{Data, PingResult, display_ip},
};
use chrono::SecondsFormat;
use itertools::Itertools;
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
    time::Duration,
};
use tokio::{
    fs::File,
    io::{AsyncSeekExt, AsyncWriteExt},
    sync::{broadcast, mpsc},
    time::sleep,
};
use tracing::{debug, error, warn};

/// File extension for compact recordings.
pub const PINGS_EXTENSION: &str = "pings";

/// First retry delay after a failed write cycle; doubles per attempt.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Collect `.pings` files from the given paths, descending into
/// directories recursively. Explicitly named files are taken as-is.
pub fn find_pings_files(paths: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_dir(path, &mut found)?;
        } else {
            found.push(path.clone());
        }
    }
    found.sort();
    Ok(found)
}

fn collect_dir(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path: PathBuf = entry?.path();
        if path.is_dir() {
            collect_dir(&path, found)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(PINGS_EXTENSION) {
            found.push(path);
        }
    }
    Ok(())
}

/// Load a recording from disk. A zero-length file (a writer got there
/// first but has not flushed yet) reads as an empty recording.
pub fn load_data(path: &Path, url_hint: &str) -> Result<Data, String> {
    let bytes: Vec<u8> =
        std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    if bytes.is_empty() {
        return Ok(Data::new(url_hint));
    }
    Data::from_compact(&bytes).map_err(|e| format!("corrupt recording {}: {e}", path.display()))
}

/// Load an existing recording or start a fresh one for `url`.
pub fn load_or_new(path: &Path, url: &str) -> Result<Data, String> {
    if path.exists() {
        load_data(path, url)
    } else {
        Ok(Data::new(url))
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Rewrite the whole recording at offset zero, truncating any stale tail.
async fn write_cycle(file: &mut File, data: &Data) -> io::Result<()> {
    let bytes: Vec<u8> = codec::to_bytes(data)?;
    file.seek(SeekFrom::Start(0)).await?;
    file.write_all(&bytes).await?;
    file.set_len(bytes.len() as u64).await?;
    file.flush().await?;
    Ok(())
}

/// The file-writer task. Owns `data` (its own disjoint copy of the
/// recording) and the file handle; runs until the stream closes or the
/// quit flag is raised.
pub async fn run_writer(
    mut file: File,
    mut data: Data,
    mut stream: broadcast::Receiver<Result<PingResult, ProbeError>>,
    errors: mpsc::Sender<String>,
    quit: Arc<AtomicBool>,
) {
    let mut backoff: Duration = BACKOFF_BASE;
    let mut dirty: bool = false;

    loop {
        if quit.load(Relaxed) {
            break;
        }

        let received = tokio::select! {
            item = stream.recv() => Some(item),
            _ = sleep(Duration::from_millis(250)) => None,
        };
        match received {
            Some(Ok(Ok(result))) => {
                data.add_point(result);
                dirty = true;
            }
            Some(Ok(Err(probe_err))) => {
                // fatal probe errors end the stream; record what we have
                debug!(error = %probe_err, "probe stream reported a fatal error");
            }
            Some(Err(broadcast::error::RecvError::Lagged(n))) => {
                warn!(missed = n, "writer fell behind, recording has a hole");
                let _ = errors
                    .send(format!("writer fell behind: {n} records lost"))
                    .await;
            }
            Some(Err(broadcast::error::RecvError::Closed)) => {
                flush_with_retries(&mut file, &data, &errors, &quit, &mut backoff, dirty).await;
                return;
            }
            None => continue,
        }

        // coalesce whatever queued up behind this record
        let drained: Drained<Result<PingResult, ProbeError>> = drain_now(&mut stream);
        if drained.skipped > 0 {
            warn!(missed = drained.skipped, "writer fell behind, recording has a hole");
        }
        for item in drained.items {
            if let Ok(result) = item {
                data.add_point(result);
                dirty = true;
            }
        }

        if dirty {
            flush_with_retries(&mut file, &data, &errors, &quit, &mut backoff, true).await;
            dirty = false;
        }
        if drained.closed {
            return;
        }
    }

    // records queued behind the quit still belong on disk
    let last: Drained<Result<PingResult, ProbeError>> = drain_now(&mut stream);
    for item in last.items {
        if let Ok(result) = item {
            data.add_point(result);
            dirty = true;
        }
    }
    flush_with_retries(&mut file, &data, &errors, &quit, &mut backoff, dirty).await;
}

/// Retry the write cycle until it succeeds or shutdown is requested.
async fn flush_with_retries(
    file: &mut File,
    data: &Data,
    errors: &mpsc::Sender<String>,
    quit: &Arc<AtomicBool>,
    backoff: &mut Duration,
    dirty: bool,
) {
    if !dirty {
        return;
    }
    loop {
        match write_cycle(file, data).await {
            Ok(()) => {
                *backoff = BACKOFF_BASE;
                return;
            }
            Err(e) => {
                error!(error = %e, "write cycle failed, backing off {:?}", *backoff);
                let _ = errors.send(format!("disk write failed: {e}")).await;
                sleep(*backoff).await;
                *backoff = backoff.saturating_mul(2);
                if quit.load(Relaxed) {
                    return;
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Dumps for the rawdata subcommand

/// One-line description of a recording.
pub fn summary_line(path: &Path, data: &Data) -> String {
    let begin = data.display_time(data.header.time_span.begin);
    let end = data.display_time(data.header.time_span.end);
    let addresses: String = data.network.ips.iter().map(display_ip).join(", ");
    format!(
        "{}: {} | {} packets over {} addresses ({}) | {} | {} .. {}",
        path.display(),
        data.url,
        data.total_count,
        data.network.len(),
        addresses,
        data.header.stats,
        begin.to_rfc3339_opts(SecondsFormat::Millis, true),
        end.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Print every packet, one line each, in arrival order.
pub fn write_packets<W: io::Write>(w: &mut W, data: &Data) -> io::Result<()> {
    for i in 0..data.total_count {
        let Some(full) = data.get_full(i) else { continue };
        let p = full.data;
        let when = data
            .display_time(p.timestamp)
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        if p.is_dropped() {
            writeln!(
                w,
                "{i:>8}  {when}  {:<15}  dropped ({})",
                display_ip(&full.ip),
                p.drop_reason
            )?;
        } else {
            writeln!(
                w,
                "{i:>8}  {when}  {:<15}  {}",
                display_ip(&full.ip),
                format_duration(p.duration)
            )?;
        }
    }
    Ok(())
}

/// CSV dump: `timestamp,latency,dropped,ip,header`.
pub fn write_csv<W: io::Write>(w: &mut W, data: &Data) -> io::Result<()> {
    writeln!(w, "timestamp,latency,dropped,ip,header")?;
    for i in 0..data.total_count {
        let Some(full) = data.get_full(i) else { continue };
        let p = full.data;
        let block_header = data.insert_order[i as usize].block_index;
        let header = &data.blocks[block_header as usize].header;
        writeln!(
            w,
            "{},{},{},{},\"{}\"",
            data.display_time(p.timestamp)
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            p.duration.as_nanos(),
            p.drop_reason,
            display_ip(&full.ip),
            header.stats,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DropReason, PingDataPoint};
    use chrono::{TimeZone, Utc};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn sample_data(n: u64) -> Data {
        let mut data: Data = Data::new("example.com");
        for i in 0..n {
            let p: PingDataPoint = PingDataPoint::new(
                Duration::from_millis(5 + i % 3),
                Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                if i % 7 == 3 {
                    DropReason::Timeout
                } else {
                    DropReason::NotDropped
                },
            );
            data.add_point(PingResult::new(p, Ipv4Addr::new(10, 0, 0, 1)));
        }
        data
    }

    #[test]
    fn test_find_pings_files_recurses() {
        let dir: TempDir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("one.pings"), b"").unwrap();
        std::fs::write(nested.join("two.pings"), b"").unwrap();
        std::fs::write(nested.join("ignored.txt"), b"").unwrap();

        let found: Vec<PathBuf> = find_pings_files(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.extension().unwrap() == "pings"));

        // explicitly named files skip the extension filter
        let explicit: Vec<PathBuf> =
            find_pings_files(&[nested.join("ignored.txt")]).unwrap();
        assert_eq!(explicit.len(), 1);
    }

    #[test]
    fn test_zero_length_file_reads_as_empty() {
        let dir: TempDir = TempDir::new().unwrap();
        let path = dir.path().join("empty.pings");
        std::fs::write(&path, b"").unwrap();

        let data: Data = load_data(&path, "fallback.example").unwrap();
        assert_eq!(data.total_count, 0);
        assert_eq!(data.url, "fallback.example");
    }

    #[test]
    fn test_corrupt_file_fails_to_load() {
        let dir: TempDir = TempDir::new().unwrap();
        let path = dir.path().join("bad.pings");
        std::fs::write(&path, b"not a recording").unwrap();

        let err: String = load_data(&path, "x").unwrap_err();
        assert!(err.contains("corrupt"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_write_cycle_round_trips_and_truncates() {
        let dir: TempDir = TempDir::new().unwrap();
        let path = dir.path().join("rec.pings");
        let mut file: File = File::create(&path).await.unwrap();

        let big: Data = sample_data(500);
        write_cycle(&mut file, &big).await.unwrap();
        let loaded: Data = load_data(&path, "x").unwrap();
        assert_eq!(loaded, big);

        // a smaller rewrite must not leave a stale tail behind
        let small: Data = sample_data(3);
        write_cycle(&mut file, &small).await.unwrap();
        let loaded: Data = load_data(&path, "x").unwrap();
        assert_eq!(loaded, small);
    }

    #[test]
    fn test_csv_shape() {
        let data: Data = sample_data(10);
        let mut out: Vec<u8> = Vec::new();
        write_csv(&mut out, &data).unwrap();

        let text: String = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 11, "header plus one row per packet");
        assert_eq!(lines[0], "timestamp,latency,dropped,ip,header");
        assert!(lines[4].contains("timeout"), "row 4 is the dropped packet");
        assert!(lines[1].contains("10.0.0.1"));
    }

    #[test]
    fn test_summary_line_mentions_the_essentials() {
        let data: Data = sample_data(10);
        let line: String = summary_line(Path::new("rec.pings"), &data);
        assert!(line.contains("example.com"));
        assert!(line.contains("10 packets"));
        assert!(line.contains("1 addresses"));
    }
}
