//! Per-endpoint accounting of in-flight packets.
//!
//! Every queued packet holds its source's upload counter and its
//! destination's download counter up for the duration of its queue stay.
//! The radio model reads these to decide which endpoints count as active
//! co-channel interferers. Snapshots are best-effort; only the
//! increment/decrement pairing is exact.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ActivityCounters {
    upload_in_flight: AtomicU32,
    download_in_flight: AtomicU32,
    last_upload_ms: AtomicU64,
    last_download_ms: AtomicU64,
}

/// Point-in-time view of one endpoint's counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CounterSnapshot {
    pub up_packets: u32,
    pub down_packets: u32,
    pub last_upload_ms: u64,
    pub last_download_ms: u64,
}

impl ActivityCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_upload(&self) {
        self.upload_in_flight.fetch_add(1, Ordering::Relaxed);
        self.last_upload_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn end_upload(&self) {
        self.upload_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn begin_download(&self) {
        self.download_in_flight.fetch_add(1, Ordering::Relaxed);
        self.last_download_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn end_download(&self) {
        self.download_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn upload_in_flight(&self) -> u32 {
        self.upload_in_flight.load(Ordering::Relaxed)
    }

    pub fn download_in_flight(&self) -> u32 {
        self.download_in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            up_packets: self.upload_in_flight(),
            down_packets: self.download_in_flight(),
            last_upload_ms: self.last_upload_ms.load(Ordering::Relaxed),
            last_download_ms: self.last_download_ms.load(Ordering::Relaxed),
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
