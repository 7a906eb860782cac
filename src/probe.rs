// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ICMPv4 echo prober.
//!
//! [`open_stream`] resolves a URL, opens one shared ICMP client and emits
//! an endless rate-limited stream of [`PingResult`] records. Transient
//! trouble (timeouts, socket hiccups, malformed replies) is demoted to a
//! record with a [`DropReason`] so the recording keeps its cadence; only
//! conditions that make further probing pointless (DNS failure, no IPv4
//! address, socket creation denied, every resolved address stale) end the
//! stream with an error value.

use crate::store::{DropReason, PingDataPoint, PingResult};
use chrono::Utc;
use std::{
    io,
    net::{IpAddr, Ipv4Addr},
    time::{Duration, Instant},
};
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence, Pinger, SurgeError};
use thiserror::Error;
use tokio::{
    net::lookup_host,
    sync::mpsc,
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{debug, warn};

/// Echo payload: a single byte.
const PAYLOAD: [u8; 1] = [0];

/// Consecutive failures tolerated on one address before the DNS cache
/// rotates to the next resolved address.
pub const DEFAULT_MAX_DROPS: u32 = 16;

/// Floor for the per-probe read deadline.
const MIN_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("dns lookup for {url} failed: {reason}")]
    DnsFailure { url: String, reason: String },
    #[error("{url} resolved to no IPv4 address")]
    NoIpv4 { url: String },
    #[error("cannot open ICMP socket: {0}")]
    SocketOpen(String),
    #[error("socket error: {0}")]
    SocketIo(String),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected ICMP reply: {0}")]
    BadReply(String),
    #[error("every resolved address for {url} went stale")]
    DnsExhausted { url: String },
}

impl ProbeError {
    /// Whether this error ends the probe stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProbeError::DnsFailure { .. }
                | ProbeError::NoIpv4 { .. }
                | ProbeError::SocketOpen(_)
                | ProbeError::DnsExhausted { .. }
        )
    }
}

/// Fold socket-creation failures into an actionable message.
fn socket_open_error(err: &io::Error) -> ProbeError {
    let msg: String = err.to_string().to_lowercase();
    if msg.contains("permission") || msg.contains("permitted") {
        ProbeError::SocketOpen(format!(
            "{err}. Sending ICMP needs CAP_NET_RAW (sudo setcap cap_net_raw+ep <binary>) \
             or a widened net.ipv4.ping_group_range sysctl"
        ))
    } else {
        ProbeError::SocketOpen(err.to_string())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Round-robin cache of the IPv4 addresses a URL resolved to.
///
/// The active address is re-selected once it accumulates more than
/// `max_drops` consecutive failed probes; an address that has been rotated
/// away from is considered stale and never revisited. When every address
/// is stale the cache reports [`ProbeError::DnsExhausted`].
#[derive(Debug, Clone)]
pub struct QueryCache {
    url: String,
    addrs: Vec<Ipv4Addr>,
    stale: Vec<bool>,
    current: usize,
    consecutive_drops: u32,
    max_drops: u32,
}

impl QueryCache {
    /// Resolve `url` and build the cache.
    pub async fn lookup(url: &str, max_drops: u32) -> Result<Self, ProbeError> {
        let resolved = lookup_host((url, 0u16)).await.map_err(|e| ProbeError::DnsFailure {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let addrs: Vec<Ipv4Addr> = resolved
            .filter_map(|sa| match sa.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect();
        if addrs.is_empty() {
            return Err(ProbeError::NoIpv4 {
                url: url.to_string(),
            });
        }
        debug!(url, count = addrs.len(), "resolved probe destinations");
        Ok(Self::from_addrs(url, addrs, max_drops))
    }

    fn from_addrs(url: &str, addrs: Vec<Ipv4Addr>, max_drops: u32) -> Self {
        let stale: Vec<bool> = vec![false; addrs.len()];
        Self {
            url: url.to_string(),
            addrs,
            stale,
            current: 0,
            consecutive_drops: 0,
            max_drops,
        }
    }

    /// The address probes are currently sent to.
    #[inline]
    pub fn active(&self) -> Ipv4Addr {
        self.addrs[self.current]
    }

    pub fn record_success(&mut self) {
        self.consecutive_drops = 0;
    }

    /// Note a failed probe; rotates to the next fresh address once the
    /// active one exceeds its drop budget.
    pub fn record_drop(&mut self) -> Result<(), ProbeError> {
        self.consecutive_drops += 1;
        if self.consecutive_drops <= self.max_drops {
            return Ok(());
        }

        self.stale[self.current] = true;
        self.consecutive_drops = 0;
        let len: usize = self.addrs.len();
        for step in 1..=len {
            let candidate: usize = (self.current + step) % len;
            if !self.stale[candidate] {
                warn!(
                    url = self.url,
                    from = %self.addrs[self.current],
                    to = %self.addrs[candidate],
                    "rotating to next resolved address"
                );
                self.current = candidate;
                return Ok(());
            }
        }
        Err(ProbeError::DnsExhausted {
            url: self.url.clone(),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Stable 16-bit echo identifier derived from the process id.
#[inline]
fn process_ident() -> PingIdentifier {
    PingIdentifier((std::process::id() & 0xffff) as u16)
}

/// Send interval for a probes-per-minute rate; `None` means unthrottled.
fn rate_period(pings_per_minute: f64) -> Option<Duration> {
    if pings_per_minute > 0.0 {
        Some(Duration::from_secs_f64(60.0 / pings_per_minute))
    } else {
        None
    }
}

/// Per-probe read deadline: twice the send interval, one second floor.
fn read_deadline(period: Option<Duration>) -> Duration {
    match period {
        Some(p) => (2 * p).max(MIN_DEADLINE),
        None => MIN_DEADLINE,
    }
}

/// One echo to `url`, bypassing the stream machinery.
pub async fn probe_once(url: &str) -> Result<Duration, ProbeError> {
    let cache: QueryCache = QueryCache::lookup(url, 0).await?;
    let client: Client =
        Client::new(&Config::default()).map_err(|e| socket_open_error(&e))?;
    let mut pinger: Pinger = client.pinger(IpAddr::V4(cache.active()), process_ident()).await;
    pinger.timeout(MIN_DEADLINE);

    match pinger.ping(PingSequence(0), &PAYLOAD).await {
        Ok((IcmpPacket::V4(_), rtt)) => Ok(rtt),
        Ok((IcmpPacket::V6(_), _)) => Err(ProbeError::BadReply(
            "IPv6 packet on an IPv4 probe".to_string(),
        )),
        Err(SurgeError::Timeout { .. }) => Err(ProbeError::Timeout(MIN_DEADLINE)),
        Err(e) => Err(ProbeError::SocketIo(e.to_string())),
    }
}

/// Open a never-ending probe stream at the given rate.
///
/// `pings_per_minute` of 0 means as fast as replies come back. The stream
/// ends when the receiver is dropped or a fatal error is emitted.
pub fn open_stream(
    url: String,
    pings_per_minute: f64,
    buffer_limit: usize,
) -> mpsc::Receiver<Result<PingResult, ProbeError>> {
    let (tx, rx) = mpsc::channel(buffer_limit.max(1));
    tokio::spawn(probe_loop(url, pings_per_minute, tx));
    rx
}

async fn probe_loop(
    url: String,
    pings_per_minute: f64,
    tx: mpsc::Sender<Result<PingResult, ProbeError>>,
) {
    let mut cache: QueryCache = match QueryCache::lookup(&url, DEFAULT_MAX_DROPS).await {
        Ok(c) => c,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return;
        }
    };
    let client: Client = match Client::new(&Config::default()) {
        Ok(c) => c,
        Err(e) => {
            let _ = tx.send(Err(socket_open_error(&e))).await;
            return;
        }
    };

    let ident: PingIdentifier = process_ident();
    let period: Option<Duration> = rate_period(pings_per_minute);
    let deadline: Duration = read_deadline(period);
    // Skipped ticks are dropped outright: an overrunning probe catches
    // back up to the wall-clock rate instead of bursting.
    let mut ticker: Option<Interval> = period.map(|p| {
        let mut t: Interval = time::interval(p);
        t.set_missed_tick_behavior(MissedTickBehavior::Skip);
        t
    });
    // the 16-bit sequence deliberately wraps
    let mut seq: u16 = 0;

    loop {
        if let Some(t) = ticker.as_mut() {
            t.tick().await;
        }
        if tx.is_closed() {
            break;
        }

        let ip: Ipv4Addr = cache.active();
        let begin = Utc::now();
        let sent = Instant::now();
        let mut pinger: Pinger = client.pinger(IpAddr::V4(ip), ident).await;
        pinger.timeout(deadline);
        let outcome = pinger.ping(PingSequence(seq), &PAYLOAD).await;
        seq = seq.wrapping_add(1);

        let drop_reason: DropReason = match &outcome {
            Ok((IcmpPacket::V4(_), _)) => DropReason::NotDropped,
            Ok((IcmpPacket::V6(_), _)) => DropReason::BadReply,
            Err(SurgeError::Timeout { .. }) => DropReason::Timeout,
            Err(_) => DropReason::SocketIo,
        };

        let result: PingResult = match (outcome, drop_reason) {
            (Ok((_, rtt)), DropReason::NotDropped) => {
                cache.record_success();
                PingResult::new(PingDataPoint::new(rtt, begin, DropReason::NotDropped), ip)
            }
            (_, reason) => {
                debug!(%ip, ?reason, "probe dropped");
                let failed: PingDataPoint = PingDataPoint::new(sent.elapsed(), begin, reason);
                if let Err(fatal) = cache.record_drop() {
                    let _ = tx.send(Ok(PingResult::new(failed, ip))).await;
                    // the zero address marks the point where resolution gave out
                    let exhausted: PingDataPoint =
                        PingDataPoint::new(sent.elapsed(), begin, DropReason::DnsFailure);
                    let _ = tx.send(Ok(PingResult::unresolved(exhausted))).await;
                    let _ = tx.send(Err(fatal)).await;
                    return;
                }
                PingResult::new(failed, ip)
            }
        };

        if tx.send(Ok(result)).await.is_err() {
            break;
        }
    }
}
