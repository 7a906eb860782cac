// Copyright (c) 2025 Mikko Tanner. All rights reserved.
// Licensed under the MIT License or the Apache License, Version 2.0.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out of the probe stream to independent consumers.
//!
//! The renderer and the file writer both need every probe outcome, at
//! their own pace. [`tee_buffered`] duplicates one producer stream into
//! two receivers with a shared ring capacity; a slow consumer lags and
//! loses the *oldest* records rather than ever blocking the fast one.

use tokio::sync::{broadcast, mpsc};
use tracing::trace;

/// Duplicate `input` into two independently consumed streams.
///
/// Both outputs close when `input` closes (or every receiver is dropped).
/// Overflow policy is drop-oldest per consumer: a receiver that falls more
/// than `capacity` records behind skips the missed records and keeps
/// going, observing how many were lost.
pub fn tee_buffered<T: Clone + Send + 'static>(
    mut input: mpsc::Receiver<T>,
    capacity: usize,
) -> (broadcast::Receiver<T>, broadcast::Receiver<T>) {
    let (tx, left) = broadcast::channel(capacity.max(1));
    let right: broadcast::Receiver<T> = tx.subscribe();

    tokio::spawn(async move {
        while let Some(item) = input.recv().await {
            if tx.send(item).is_err() {
                trace!("all siphon consumers gone, stopping fan-out");
                break;
            }
        }
        // dropping the sender closes both outputs
    });

    (left, right)
}

/// Everything drained from one receiver without waiting.
#[derive(Debug, Default)]
pub struct Drained<T> {
    pub items: Vec<T>,
    /// Records lost to the drop-oldest policy since the last drain.
    pub skipped: u64,
    pub closed: bool,
}

/// Pull every currently buffered record off `rx` without blocking.
pub fn drain_now<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Drained<T> {
    use broadcast::error::TryRecvError;

    let mut drained: Drained<T> = Drained {
        items: Vec::new(),
        skipped: 0,
        closed: false,
    };
    loop {
        match rx.try_recv() {
            Ok(item) => drained.items.push(item),
            Err(TryRecvError::Lagged(n)) => drained.skipped += n,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Closed) => {
                drained.closed = true;
                break;
            }
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_both_sides_see_everything() {
        let (tx, rx) = mpsc::channel::<u32>(8);
        let (mut left, mut right) = tee_buffered(rx, 16);

        for i in 0..5 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let mut left_items: Vec<u32> = Vec::new();
        while let Ok(v) = left.recv().await {
            left_items.push(v);
        }
        let mut right_items: Vec<u32> = Vec::new();
        while let Ok(v) = right.recv().await {
            right_items.push(v);
        }

        assert_eq!(left_items, vec![0, 1, 2, 3, 4]);
        assert_eq!(right_items, left_items, "both consumers see the same stream");
    }

    #[tokio::test]
    async fn test_slow_consumer_drops_oldest() {
        let (tx, rx) = mpsc::channel::<u32>(64);
        let (mut left, mut right) = tee_buffered(rx, 4);

        for i in 0..20 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        // the fast side keeps up
        let mut seen: Vec<u32> = Vec::new();
        loop {
            match left.recv().await {
                Ok(v) => seen.push(v),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        assert_eq!(*seen.last().unwrap(), 19, "newest record must survive");

        // the slow side lagged: oldest records were dropped, newest kept
        tokio::task::yield_now().await;
        let drained: Drained<u32> = drain_now(&mut right);
        assert!(drained.skipped > 0, "slow consumer must observe its losses");
        assert_eq!(*drained.items.last().unwrap(), 19);
        assert!(drained.items.len() <= 4);
    }

    #[tokio::test]
    async fn test_outputs_close_with_input() {
        let (tx, rx) = mpsc::channel::<u32>(4);
        let (mut left, _right) = tee_buffered(rx, 4);
        drop(tx);

        match left.recv().await {
            Err(broadcast::error::RecvError::Closed) => {}
            other => panic!("expected closed stream, got {other:?}"),
        }
    }
}
