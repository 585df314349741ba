//! The simulator facade: topology ownership, control operations, and the
//! worker-thread lifecycle.
//!
//! One [`Simulator`] value owns everything; there are no process-wide
//! singletons. The HTTP layer holds it in an `Arc` and calls the control
//! operations. `start` spawns the ingress, drain, and stats workers, and
//! `shutdown` joins them.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::warn;

use crate::bridge::FrameBridge;
use crate::config::SimConfig;
use crate::counters::CounterSnapshot;
use crate::error::SimError;
use crate::ipalloc::IpAllocator;
use crate::phy::{ber_qpsk, packet_error_prob, NetworkType, RadioModel, SHADOWING_SEED};
use crate::pipeline;
use crate::stats;
use crate::topology::{distance, Topology, Tower, TowerDescriptor, TowerId, Ue, UeDescriptor, UeId};
use crate::queue::DelayQueue;

/// Reference payload size for link-quality figures, in bytes.
pub(crate) const REPORT_NBYTES: usize = 1024;

/// One enqueued frame, mirrored to the packet-transfer feed.
#[derive(Debug, Clone, Copy)]
pub struct TransferRecord {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub len: usize,
}

/// Link-quality snapshot for one attached UE. Latencies are in
/// milliseconds and absent when the sampled SINR came out non-positive;
/// bandwidths are in Mbps.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStats {
    pub upload_latency: Option<f64>,
    pub download_latency: Option<f64>,
    pub upload_bandwidth: f64,
    pub download_bandwidth: f64,
    pub upload_per: f64,
    pub download_per: f64,
}

/// Counter view of one UE, as served by the check endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UeCheck {
    pub id: UeId,
    pub up_packets: u32,
    pub down_packets: u32,
    pub last_upload_ms: u64,
    pub last_download_ms: u64,
}

/// Sampled uplink/downlink quality of one UE↔tower link.
pub(crate) struct LinkEval {
    pub d_m: f64,
    pub ul_sinr: f64,
    pub dl_sinr: f64,
}

/// Worker loops hold only weak references to the simulator, so dropping
/// the last handle triggers a graceful shutdown of the workers.
pub struct Simulator {
    pub(crate) cfg: SimConfig,
    pub(crate) bridge: Arc<dyn FrameBridge>,
    pub(crate) topology: RwLock<Topology>,
    pub(crate) upload_q: DelayQueue,
    pub(crate) download_q: DelayQueue,
    pub(crate) paused: AtomicBool,
    pub(crate) dropping: AtomicBool,
    pub(crate) delaying: AtomicBool,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) shadow_rng: Mutex<StdRng>,
    allocator: Mutex<IpAllocator>,
    default_network: Mutex<NetworkType>,
    uplink_wake_tx: Sender<()>,
    pub(crate) uplink_wake_rx: Receiver<()>,
    downlink_wake_tx: Sender<()>,
    pub(crate) downlink_wake_rx: Receiver<()>,
    transfer_tx: Sender<TransferRecord>,
    transfer_rx: Receiver<TransferRecord>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Simulator {
    pub fn new(cfg: SimConfig, bridge: Arc<dyn FrameBridge>) -> Self {
        let (uplink_wake_tx, uplink_wake_rx) = bounded(1);
        let (downlink_wake_tx, downlink_wake_rx) = bounded(1);
        let (transfer_tx, transfer_rx) = bounded(1024);
        let allocator = IpAllocator::new(cfg.starting_ip);
        let default_network = cfg.network_type;
        Self {
            cfg,
            bridge,
            topology: RwLock::new(Topology::new()),
            upload_q: DelayQueue::new(),
            download_q: DelayQueue::new(),
            // Workers idle until an explicit init unpauses the simulation.
            paused: AtomicBool::new(true),
            dropping: AtomicBool::new(true),
            delaying: AtomicBool::new(true),
            shutting_down: AtomicBool::new(false),
            shadow_rng: Mutex::new(StdRng::seed_from_u64(SHADOWING_SEED)),
            allocator: Mutex::new(allocator),
            default_network: Mutex::new(default_network),
            uplink_wake_tx,
            uplink_wake_rx,
            downlink_wake_tx,
            downlink_wake_rx,
            transfer_tx,
            transfer_rx,
            workers: Mutex::new(Vec::new()),
        }
    }

    // ── Worker lifecycle ────────────────────────────────────────────

    /// Spawn the ingress, drain, and stats workers and unpause. Returns
    /// false when the workers were already running (the call still
    /// unpauses).
    pub fn start(self: &Arc<Self>) -> bool {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let started = if workers.is_empty() {
            let spawn = |name: &str, f: Box<dyn FnOnce() + Send>| {
                thread::Builder::new()
                    .name(name.into())
                    .spawn(f)
                    .expect("failed to spawn simulator worker")
            };
            let sim = Arc::downgrade(self);
            workers.push(spawn("aircell-ingress", Box::new(move || pipeline::ingress_loop(sim))));
            let sim = Arc::downgrade(self);
            workers.push(spawn("aircell-uplink", Box::new(move || pipeline::uplink_loop(sim))));
            let sim = Arc::downgrade(self);
            workers.push(spawn("aircell-downlink", Box::new(move || pipeline::downlink_loop(sim))));
            let sim = Arc::downgrade(self);
            workers.push(spawn("aircell-stats", Box::new(move || stats::reporter_loop(sim))));
            true
        } else {
            false
        };
        drop(workers);

        self.paused.store(false, Ordering::Relaxed);
        self.wake_uplink();
        self.wake_downlink();
        started
    }

    /// Stop all workers and wait for them to exit. Idempotent. Packets
    /// still queued are abandoned.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.wake_uplink();
        self.wake_downlink();
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            // The final handle can be dropped from a worker thread; a
            // thread cannot join itself.
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        !self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    // ── Run-state toggles ───────────────────────────────────────────

    pub fn toggle_pause(&self) -> bool {
        let now_paused = !self.paused.fetch_xor(true, Ordering::Relaxed);
        if !now_paused {
            self.wake_uplink();
            self.wake_downlink();
        }
        now_paused
    }

    pub fn toggle_dropping(&self) -> bool {
        !self.dropping.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn toggle_delaying(&self) -> bool {
        !self.delaying.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn dropping_enabled(&self) -> bool {
        self.dropping.load(Ordering::Relaxed)
    }

    pub fn delaying_enabled(&self) -> bool {
        self.delaying.load(Ordering::Relaxed)
    }

    // ── Topology control ────────────────────────────────────────────

    pub fn add_tower(&self, x: f64, y: f64, powered: bool) -> TowerDescriptor {
        let profile = self
            .default_network
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .profile();
        let mut topo = self.topology.write().unwrap_or_else(|e| e.into_inner());
        let id = topo.add_tower(x, y, powered, profile);
        TowerDescriptor {
            id,
            x,
            y,
            on: powered,
        }
    }

    pub fn update_tower(
        &self,
        id: TowerId,
        x: f64,
        y: f64,
        powered: bool,
    ) -> Result<TowerDescriptor, SimError> {
        let mut topo = self.topology.write().unwrap_or_else(|e| e.into_inner());
        {
            let tower = topo.tower_mut(id).ok_or(SimError::UnknownTower(id))?;
            tower.x = x;
            tower.y = y;
            tower.powered = powered;
        }
        topo.synchronize();
        topo.describe_tower(id).ok_or(SimError::UnknownTower(id))
    }

    pub fn tower_descriptor(&self, id: TowerId) -> Result<TowerDescriptor, SimError> {
        self.topology
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .describe_tower(id)
            .ok_or(SimError::UnknownTower(id))
    }

    pub fn add_ue(&self, x: f64, y: f64) -> Result<UeDescriptor, SimError> {
        let ip = self
            .allocator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .allocate()?;
        self.bridge.create_ue(ip).map_err(SimError::Bridge)?;
        let mut topo = self.topology.write().unwrap_or_else(|e| e.into_inner());
        let id = topo.add_ue(x, y, ip);
        topo.describe_ue(id).ok_or(SimError::UnknownUe(id))
    }

    pub fn update_ue(
        &self,
        id: UeId,
        x: f64,
        y: f64,
        change_ip: bool,
    ) -> Result<UeDescriptor, SimError> {
        let mut topo = self.topology.write().unwrap_or_else(|e| e.into_inner());
        let old_ip = match topo.ue(id) {
            Some(ue) => ue.ip,
            None => return Err(SimError::UnknownUe(id)),
        };
        let new_ip = if change_ip {
            let ip = self
                .allocator
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .allocate()?;
            self.bridge.change_ip(old_ip, ip).map_err(SimError::Bridge)?;
            Some(ip)
        } else {
            None
        };
        if let Some(ue) = topo.ue_mut(id) {
            ue.x = x;
            ue.y = y;
            if let Some(ip) = new_ip {
                ue.ip = ip;
            }
        }
        topo.synchronize();
        topo.describe_ue(id).ok_or(SimError::UnknownUe(id))
    }

    pub fn ue_descriptor(&self, id: UeId) -> Result<UeDescriptor, SimError> {
        self.topology
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .describe_ue(id)
            .ok_or(SimError::UnknownUe(id))
    }

    pub fn ue_check(&self, id: UeId) -> Result<UeCheck, SimError> {
        let topo = self.topology.read().unwrap_or_else(|e| e.into_inner());
        let ue = topo.ue(id).ok_or(SimError::UnknownUe(id))?;
        let snap: CounterSnapshot = ue.counters.snapshot();
        Ok(UeCheck {
            id: ue.id,
            up_packets: snap.up_packets,
            down_packets: snap.down_packets,
            last_upload_ms: snap.last_upload_ms,
            last_download_ms: snap.last_download_ms,
        })
    }

    /// Apply a PHY profile to every existing tower and make it the default
    /// for new ones; move the allocator's starting address. The address
    /// move is ignored once UEs hold issued addresses, so their subnet
    /// membership never changes mid-run.
    pub fn configure(&self, network_type: NetworkType, starting_ip: Ipv4Addr) {
        *self
            .default_network
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = network_type;
        let moved = self
            .allocator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_starting(starting_ip);
        if !moved {
            warn!(%starting_ip, "starting_ip change ignored, addresses already issued");
        }
        let profile = network_type.profile();
        let mut topo = self.topology.write().unwrap_or_else(|e| e.into_inner());
        for tower in topo.towers_mut() {
            tower.profile = profile.clone();
        }
    }

    // ── Link quality ────────────────────────────────────────────────

    pub fn link_stats(&self, id: UeId) -> Result<LinkStats, SimError> {
        let topo = self.topology.read().unwrap_or_else(|e| e.into_inner());
        let ue = topo.ue(id).ok_or(SimError::UnknownUe(id))?;
        let tower = topo.serving_tower(ue).ok_or(SimError::NotAttached(id))?;
        let eval = self.evaluate_link(&topo, ue, tower);
        let radio = RadioModel::new(&tower.profile);
        Ok(LinkStats {
            upload_latency: (eval.ul_sinr > 0.0)
                .then(|| radio.latency_ms(eval.d_m, REPORT_NBYTES, eval.ul_sinr)),
            download_latency: (eval.dl_sinr > 0.0)
                .then(|| radio.latency_ms(eval.d_m, REPORT_NBYTES, eval.dl_sinr)),
            upload_bandwidth: radio.rate_bps(eval.ul_sinr) / 1e6,
            download_bandwidth: radio.rate_bps(eval.dl_sinr) / 1e6,
            upload_per: packet_error_prob(ber_qpsk(eval.ul_sinr), REPORT_NBYTES),
            download_per: packet_error_prob(ber_qpsk(eval.dl_sinr), REPORT_NBYTES),
        })
    }

    /// Sample both directions of one link against the current activity
    /// snapshots.
    pub(crate) fn evaluate_link(&self, topo: &Topology, ue: &Ue, tower: &Tower) -> LinkEval {
        let d_m = distance(ue.x, ue.y, tower.x, tower.y);
        let ue_ds = topo.active_ue_distances(ue.id, tower);
        let tower_ds = topo.active_tower_distances(tower.id, ue.x, ue.y);
        let radio = RadioModel::new(&tower.profile);
        let mut rng = self.shadow_rng.lock().unwrap_or_else(|e| e.into_inner());
        LinkEval {
            d_m,
            ul_sinr: radio.sinr_ul(d_m, &ue_ds, &mut *rng),
            dl_sinr: radio.sinr_dl(d_m, &tower_ds, &mut *rng),
        }
    }

    // ── Pipeline plumbing ───────────────────────────────────────────

    pub(crate) fn subnet_contains(&self, ip: Ipv4Addr) -> bool {
        self.allocator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(ip)
    }

    pub(crate) fn wake_uplink(&self) {
        let _ = self.uplink_wake_tx.try_send(());
    }

    pub(crate) fn wake_downlink(&self) {
        let _ = self.downlink_wake_tx.try_send(());
    }

    /// Mirror an enqueued frame to the transfer feed; drops records when
    /// no consumer keeps up.
    pub(crate) fn record_transfer(&self, src: Ipv4Addr, dst: Ipv4Addr, len: usize) {
        let _ = self.transfer_tx.try_send(TransferRecord { src, dst, len });
    }

    /// Receiver side of the packet-transfer feed (cloneable).
    pub fn transfer_feed(&self) -> Receiver<TransferRecord> {
        self.transfer_rx.clone()
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ChannelBridge;

    fn simulator() -> (Arc<Simulator>, Arc<ChannelBridge>) {
        let bridge = Arc::new(ChannelBridge::new());
        let sim = Arc::new(Simulator::new(SimConfig::default(), bridge.clone()));
        (sim, bridge)
    }

    #[test]
    fn ue_creation_allocates_and_registers() {
        let (sim, bridge) = simulator();
        sim.add_tower(0.0, 0.0, true);
        let ue = sim.add_ue(10.0, 10.0).unwrap();
        assert_eq!(ue.ip, "10.0.0.1");
        assert_eq!(ue.bs, 0);
        assert_eq!(bridge.registered(), vec![Ipv4Addr::new(10, 0, 0, 1)]);

        let ue2 = sim.add_ue(20.0, 20.0).unwrap();
        assert_eq!(ue2.ip, "10.0.0.2");
    }

    #[test]
    fn reip_notifies_the_bridge() {
        let (sim, bridge) = simulator();
        let ue = sim.add_ue(0.0, 0.0).unwrap();
        let updated = sim.update_ue(ue.id, 5.0, 5.0, true).unwrap();
        assert_eq!(updated.ip, "10.0.0.2");
        assert_eq!(bridge.registered(), vec![Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let (sim, _bridge) = simulator();
        assert!(matches!(
            sim.tower_descriptor(7),
            Err(SimError::UnknownTower(7))
        ));
        assert!(matches!(sim.ue_descriptor(7), Err(SimError::UnknownUe(7))));
        assert!(matches!(
            sim.update_ue(3, 0.0, 0.0, false),
            Err(SimError::UnknownUe(3))
        ));
    }

    #[test]
    fn link_stats_requires_attachment() {
        let (sim, _bridge) = simulator();
        let ue = sim.add_ue(100.0, 100.0).unwrap();
        assert!(matches!(
            sim.link_stats(ue.id),
            Err(SimError::NotAttached(_))
        ));

        sim.add_tower(120.0, 100.0, true);
        let stats = sim.link_stats(ue.id).unwrap();
        assert!(stats.upload_per >= 0.0 && stats.upload_per <= 1.0);
        assert!(stats.download_bandwidth >= 0.0);
    }

    #[test]
    fn configure_swaps_profiles_everywhere() {
        let (sim, _bridge) = simulator();
        sim.add_tower(0.0, 0.0, true);
        sim.configure(NetworkType::Nr100, Ipv4Addr::new(10, 0, 0, 10));

        {
            let topo = sim.topology.read().unwrap();
            assert_eq!(topo.tower(0).unwrap().profile.name, "NR-100MHz");
        }
        // New towers and new UEs pick up the reconfigured defaults.
        sim.add_tower(50.0, 50.0, true);
        let topo = sim.topology.read().unwrap();
        assert_eq!(topo.tower(1).unwrap().profile.name, "NR-100MHz");
        drop(topo);
        assert_eq!(sim.add_ue(0.0, 0.0).unwrap().ip, "10.0.0.10");

        // With an address issued, a later subnet move is ignored: the
        // existing UE stays internal and the sequence keeps counting.
        sim.configure(NetworkType::Nr100, Ipv4Addr::new(192, 168, 1, 1));
        assert!(sim.subnet_contains(Ipv4Addr::new(10, 0, 0, 10)));
        assert_eq!(sim.add_ue(1.0, 1.0).unwrap().ip, "10.0.0.11");
    }

    #[test]
    fn toggles_flip_and_report_the_new_state() {
        let (sim, _bridge) = simulator();
        assert!(sim.is_paused());
        assert!(!sim.toggle_pause());
        assert!(sim.toggle_pause());

        assert!(sim.dropping_enabled());
        assert!(!sim.toggle_dropping());
        assert!(!sim.dropping_enabled());

        assert!(sim.delaying_enabled());
        assert!(!sim.toggle_delaying());
        assert!(sim.toggle_delaying());
    }

    #[test]
    fn start_is_idempotent_and_unpauses() {
        let cfg = SimConfig {
            stats_path: std::env::temp_dir().join("aircell-engine-start-test.log"),
            ..SimConfig::default()
        };
        let bridge = Arc::new(ChannelBridge::new());
        let sim = Arc::new(Simulator::new(cfg, bridge));
        assert!(sim.start());
        assert!(!sim.start());
        assert!(!sim.is_paused());
        assert!(sim.is_running());
        sim.shutdown();
        assert!(!sim.is_running());
        // A second shutdown is a no-op.
        sim.shutdown();
    }
}
