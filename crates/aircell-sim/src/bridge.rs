//! Layer-3 frame source/sink abstraction.
//!
//! The pipeline pushes and pulls raw IPv4 frames through a
//! [`FrameBridge`]: in production a TUN/virtual-NIC integration, in tests
//! and the loopback demo an in-memory channel pair. `poll_frame` may block
//! briefly but has to return periodically so the ingress thread observes
//! pause and shutdown flags.

use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};

pub trait FrameBridge: Send + Sync {
    /// Registers a new L3 endpoint.
    fn create_ue(&self, ip: Ipv4Addr) -> anyhow::Result<()>;

    /// Re-registers an endpoint under a new address.
    fn change_ip(&self, old: Ipv4Addr, new: Ipv4Addr) -> anyhow::Result<()>;

    /// Next pending ingress frame, or `None` if nothing arrived in time.
    fn poll_frame(&self) -> Option<Bytes>;

    /// Hands a frame over for delivery. Failures are reported, not fatal.
    fn send_frame(&self, frame: Bytes) -> anyhow::Result<()>;
}

/// In-memory bridge backed by two channels: one carrying injected ingress
/// frames toward the simulator, one collecting delivered egress frames.
pub struct ChannelBridge {
    ingress_tx: Sender<Bytes>,
    ingress_rx: Receiver<Bytes>,
    egress_tx: Sender<Bytes>,
    egress_rx: Receiver<Bytes>,
    registered: Mutex<Vec<Ipv4Addr>>,
    poll_timeout: Duration,
}

impl ChannelBridge {
    pub fn new() -> Self {
        let (ingress_tx, ingress_rx) = unbounded();
        let (egress_tx, egress_rx) = unbounded();
        Self {
            ingress_tx,
            ingress_rx,
            egress_tx,
            egress_rx,
            registered: Mutex::new(Vec::new()),
            poll_timeout: Duration::from_millis(50),
        }
    }

    /// Push a frame toward the simulator, as the virtual NIC would.
    pub fn inject(&self, frame: Bytes) {
        let _ = self.ingress_tx.send(frame);
    }

    /// Next delivered frame, without waiting.
    pub fn try_delivered(&self) -> Option<Bytes> {
        self.egress_rx.try_recv().ok()
    }

    /// Next delivered frame, waiting up to `timeout`.
    pub fn delivered_within(&self, timeout: Duration) -> Option<Bytes> {
        self.egress_rx.recv_timeout(timeout).ok()
    }

    /// Addresses registered so far, in registration order.
    pub fn registered(&self) -> Vec<Ipv4Addr> {
        self.registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ChannelBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBridge for ChannelBridge {
    fn create_ue(&self, ip: Ipv4Addr) -> anyhow::Result<()> {
        self.registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ip);
        Ok(())
    }

    fn change_ip(&self, old: Ipv4Addr, new: Ipv4Addr) -> anyhow::Result<()> {
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        match registered.iter_mut().find(|ip| **ip == old) {
            Some(slot) => {
                *slot = new;
                Ok(())
            }
            None => Err(anyhow::anyhow!("no endpoint registered at {old}")),
        }
    }

    fn poll_frame(&self) -> Option<Bytes> {
        self.ingress_rx.recv_timeout(self.poll_timeout).ok()
    }

    fn send_frame(&self, frame: Bytes) -> anyhow::Result<()> {
        self.egress_tx
            .send(frame)
            .map_err(|_| anyhow::anyhow!("egress receiver disconnected"))
    }
}
