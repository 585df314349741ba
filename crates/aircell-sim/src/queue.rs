//! Time-ordered delivery queue for in-flight packets.
//!
//! A mutex-protected min-heap keyed by arrival instant, with a sequence
//! counter breaking ties in insertion order. `pop_arrived` drains every
//! due packet atomically under the lock and releases it before the caller
//! does any processing.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::counters::ActivityCounters;

/// One frame in flight through a pipeline stage.
///
/// Constructing a packet increments the referenced endpoints' in-flight
/// counters; dropping it decrements them. The pipeline consumes a packet
/// exactly once via [`Packet::settle`], so the decrement always lands at
/// delivery time regardless of the outcome (delivered, corrupted, or
/// egressed).
#[derive(Debug)]
pub struct Packet {
    pub arrival: Instant,
    pub frame: Bytes,
    /// Packet-error probability sampled at enqueue time, in [0, 1].
    pub per_rate: f64,
    src: Option<Arc<ActivityCounters>>,
    dst: Option<Arc<ActivityCounters>>,
}

impl Packet {
    pub fn new(
        arrival: Instant,
        frame: Bytes,
        per_rate: f64,
        src: Option<Arc<ActivityCounters>>,
        dst: Option<Arc<ActivityCounters>>,
    ) -> Self {
        if let Some(src) = &src {
            src.begin_upload();
        }
        if let Some(dst) = &dst {
            dst.begin_download();
        }
        Self {
            arrival,
            frame,
            per_rate,
            src,
            dst,
        }
    }

    /// Consume the packet, releasing its counters and yielding the frame
    /// and the pre-sampled error probability.
    pub fn settle(self) -> (Bytes, f64) {
        (self.frame.clone(), self.per_rate)
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        if let Some(src) = &self.src {
            src.end_upload();
        }
        if let Some(dst) = &self.dst {
            dst.end_download();
        }
    }
}

struct Entry {
    seq: u64,
    packet: Packet,
}

impl Entry {
    fn key(&self) -> (Instant, u64) {
        (self.packet.arrival, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key().cmp(&other.key())
    }
}

#[derive(Default)]
pub struct DelayQueue {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    seq: AtomicU64,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn enqueue(&self, packet: Packet) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Reverse(Entry { seq, packet }));
    }

    /// Pop every packet whose arrival instant has passed, in ascending
    /// arrival order. Collected under the lock in one go; processing
    /// happens after release.
    pub fn pop_arrived(&self) -> Vec<Packet> {
        let now = Instant::now();
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        let mut arrived = Vec::new();
        loop {
            match heap.peek() {
                Some(Reverse(head)) if head.packet.arrival <= now => {}
                _ => break,
            }
            if let Some(Reverse(entry)) = heap.pop() {
                arrived.push(entry.packet);
            }
        }
        arrived
    }

    /// Time until the head packet is due, clamped to zero, or `None` when
    /// the queue is empty.
    pub fn next_due_in(&self) -> Option<Duration> {
        let heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        heap.peek()
            .map(|Reverse(entry)| entry.packet.arrival.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
