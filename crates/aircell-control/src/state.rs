//! Shared application state.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use aircell_sim::Simulator;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    sim: Arc<Simulator>,
    /// View scale: request bodies carry pixels, the engine works in meters.
    pixels_per_meter: Mutex<f64>,
    /// Broadcast channel for packet-transfer WebSocket subscribers.
    transfer_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(sim: Arc<Simulator>) -> Self {
        let (transfer_tx, _) = broadcast::channel(256);

        // Blocking fan-out from the simulator's transfer feed into the
        // async broadcast. Exits once the simulator is gone.
        let feed = sim.transfer_feed();
        let fanout = transfer_tx.clone();
        std::thread::Builder::new()
            .name("aircell-transfer-fanout".into())
            .spawn(move || {
                while let Ok(record) = feed.recv() {
                    // Ignore send errors (no subscribers).
                    let _ = fanout.send(format!(
                        "{} -> {}: {} bytes",
                        record.src, record.dst, record.len
                    ));
                }
            })
            .expect("failed to spawn transfer fan-out thread");

        Self {
            inner: Arc::new(Inner {
                sim,
                pixels_per_meter: Mutex::new(1.0),
                transfer_tx,
            }),
        }
    }

    pub fn sim(&self) -> &Arc<Simulator> {
        &self.inner.sim
    }

    pub fn pixels_per_meter(&self) -> f64 {
        *self
            .inner
            .pixels_per_meter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_pixels_per_meter(&self, ppm: f64) {
        *self
            .inner
            .pixels_per_meter
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = ppm;
    }

    /// Subscribe to packet-transfer lines (returns a receiver).
    pub fn subscribe_transfers(&self) -> broadcast::Receiver<String> {
        self.inner.transfer_tx.subscribe()
    }
}
