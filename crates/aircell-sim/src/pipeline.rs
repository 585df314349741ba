//! The two-stage delay pipeline: ingress → upload queue → download queue
//! → egress.
//!
//! Three worker loops drive it. The ingress loop blocks on the bridge and
//! schedules the upload stage; each drain loop sleeps until its queue's
//! head is due or a wake signal arrives from the upstream stage. Errors
//! are injected at drain time against the packet's pre-sampled error
//! probability. Workers never exit on a bad frame or a failed delivery;
//! they log and keep looping.

use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::RecvTimeoutError;
use rand::Rng;
use tracing::{debug, warn};

use crate::engine::Simulator;
use crate::frame::extract_ips;
use crate::phy::{ber_qpsk, packet_error_prob, RadioModel};
use crate::queue::Packet;

/// Upper bound on any drain sleep, so pause and shutdown flags are
/// observed promptly even with a far-future queue head.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Re-check cadence while the simulation is paused.
const PAUSE_WAIT: Duration = Duration::from_millis(100);

/// Ceiling on a single stage delay. A link slow enough to hit this has a
/// PER of ~1 anyway, so the packet is corrupted at arrival regardless.
const MAX_STAGE_DELAY: Duration = Duration::from_secs(3600);

/// Convert a computed latency to a queue delay, guarding against the
/// unbounded values a near-dead link produces.
fn stage_delay(latency_ms: f64) -> Duration {
    if !latency_ms.is_finite() || latency_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64((latency_ms / 1e3).min(MAX_STAGE_DELAY.as_secs_f64()))
}

/// Ingress worker: poll the bridge and schedule the upload stage.
///
/// Workers upgrade a weak simulator handle per iteration; when the last
/// strong handle is gone they exit on their own.
pub(crate) fn ingress_loop(weak: Weak<Simulator>) {
    while let Some(sim) = weak.upgrade() {
        if sim.shutting_down.load(Ordering::Relaxed) {
            break;
        }
        if sim.paused.load(Ordering::Relaxed) {
            drop(sim);
            thread::sleep(PAUSE_WAIT);
            continue;
        }
        if let Some(frame) = sim.bridge.poll_frame() {
            ingress_frame(&sim, frame);
        }
    }
}

/// Upload-stage worker: drain due packets, inject errors, route onward.
pub(crate) fn uplink_loop(weak: Weak<Simulator>) {
    let wake = match weak.upgrade() {
        Some(sim) => sim.uplink_wake_rx.clone(),
        None => return,
    };
    while let Some(sim) = weak.upgrade() {
        if sim.shutting_down.load(Ordering::Relaxed) {
            break;
        }
        if sim.paused.load(Ordering::Relaxed) {
            drop(sim);
            match wake.recv_timeout(PAUSE_WAIT) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for packet in sim.upload_q.pop_arrived() {
            drain_upload(&sim, packet);
        }
        let wait = sim.upload_q.next_due_in().unwrap_or(IDLE_WAIT).min(IDLE_WAIT);
        drop(sim);
        if wait.is_zero() {
            continue;
        }
        match wake.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Download-stage worker: drain due packets and deliver survivors.
pub(crate) fn downlink_loop(weak: Weak<Simulator>) {
    let wake = match weak.upgrade() {
        Some(sim) => sim.downlink_wake_rx.clone(),
        None => return,
    };
    while let Some(sim) = weak.upgrade() {
        if sim.shutting_down.load(Ordering::Relaxed) {
            break;
        }
        if sim.paused.load(Ordering::Relaxed) {
            drop(sim);
            match wake.recv_timeout(PAUSE_WAIT) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for packet in sim.download_q.pop_arrived() {
            drain_download(&sim, packet);
        }
        let wait = sim
            .download_q
            .next_due_in()
            .unwrap_or(IDLE_WAIT)
            .min(IDLE_WAIT);
        drop(sim);
        if wait.is_zero() {
            continue;
        }
        match wake.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Classify one ingress frame and schedule its upload stage.
fn ingress_frame(sim: &Simulator, frame: Bytes) {
    let (src, dst) = match extract_ips(&frame) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(%err, "discarding ingress frame");
            return;
        }
    };
    let now = Instant::now();
    let len = frame.len();

    // Internet-origin traffic takes the upload queue untouched so the
    // drain logic routes it like any other arrival.
    if !sim.subnet_contains(src) {
        sim.record_transfer(src, dst, len);
        sim.upload_q.enqueue(Packet::new(now, frame, 0.0, None, None));
        sim.wake_uplink();
        return;
    }

    let packet = {
        let topo = sim.topology.read().unwrap_or_else(|e| e.into_inner());
        let Some(ue) = topo.ue_by_ip(src) else {
            debug!(%src, "dropping frame from unknown source address");
            return;
        };
        let Some(tower) = topo.serving_tower(ue) else {
            debug!(ue = ue.id, "dropping frame from detached UE");
            return;
        };
        let eval = sim.evaluate_link(&topo, ue, tower);
        let (latency_ms, per) = stage_cost(&RadioModel::new(&tower.profile), eval.d_m, len, eval.ul_sinr);
        let per = if sim.dropping.load(Ordering::Relaxed) { per } else { 0.0 };
        let arrival = if sim.delaying.load(Ordering::Relaxed) {
            now + stage_delay(latency_ms)
        } else {
            now
        };
        Packet::new(
            arrival,
            frame,
            per,
            Some(ue.counters.clone()),
            Some(tower.counters.clone()),
        )
    };

    sim.record_transfer(src, dst, len);
    sim.upload_q.enqueue(packet);
    sim.wake_uplink();
}

/// One packet leaving the upload stage: error check, then egress or the
/// download stage.
fn drain_upload(sim: &Simulator, packet: Packet) {
    let (frame, per) = packet.settle();
    if rand::rng().random::<f64>() < per {
        debug!("upload-stage packet corrupted");
        return;
    }
    let (src, dst) = match extract_ips(&frame) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(%err, "dropping malformed queued frame");
            return;
        }
    };
    let len = frame.len();

    // Traffic leaving toward the Internet skips the download stage.
    if !sim.subnet_contains(dst) {
        if let Err(err) = sim.bridge.send_frame(frame) {
            warn!(%err, "egress delivery failed");
        }
        return;
    }

    let packet = {
        let topo = sim.topology.read().unwrap_or_else(|e| e.into_inner());
        let Some(ue) = topo.ue_by_ip(dst) else {
            debug!(%dst, "dropping frame for unknown destination address");
            return;
        };
        let Some(tower) = topo.serving_tower(ue) else {
            debug!(ue = ue.id, "dropping frame for detached UE");
            return;
        };
        let eval = sim.evaluate_link(&topo, ue, tower);
        let (latency_ms, per) = stage_cost(&RadioModel::new(&tower.profile), eval.d_m, len, eval.dl_sinr);
        let per = if sim.dropping.load(Ordering::Relaxed) { per } else { 0.0 };
        let arrival = if sim.delaying.load(Ordering::Relaxed) {
            Instant::now() + stage_delay(latency_ms)
        } else {
            Instant::now()
        };
        Packet::new(
            arrival,
            frame,
            per,
            Some(tower.counters.clone()),
            Some(ue.counters.clone()),
        )
    };

    sim.record_transfer(src, dst, len);
    sim.download_q.enqueue(packet);
    sim.wake_downlink();
}

/// One packet leaving the download stage: error check, then delivery.
fn drain_download(sim: &Simulator, packet: Packet) {
    let (frame, per) = packet.settle();
    if rand::rng().random::<f64>() < per {
        debug!("download-stage packet corrupted");
        return;
    }
    if let Err(err) = sim.bridge.send_frame(frame) {
        warn!(%err, "frame delivery failed");
    }
}

/// Latency and error probability of moving `nbytes` over a link with the
/// sampled SINR. A dead link (sinr ≤ 0) corrupts the packet outright and
/// skips the latency math entirely.
fn stage_cost(radio: &RadioModel<'_>, d_m: f64, nbytes: usize, sinr: f64) -> (f64, f64) {
    if sinr <= 0.0 {
        (0.0, 1.0)
    } else {
        (
            radio.latency_ms(d_m, nbytes, sinr),
            packet_error_prob(ber_qpsk(sinr), nbytes),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::TechProfile;

    #[test]
    fn dead_links_corrupt_instead_of_dividing_by_zero() {
        let profile = TechProfile::lte_20();
        let radio = RadioModel::new(&profile);
        assert_eq!(stage_cost(&radio, 100.0, 1024, 0.0), (0.0, 1.0));
        assert_eq!(stage_cost(&radio, 100.0, 1024, -4.2), (0.0, 1.0));
    }

    #[test]
    fn live_links_price_both_delay_and_errors() {
        let profile = TechProfile::lte_20();
        let radio = RadioModel::new(&profile);
        let (latency_ms, per) = stage_cost(&radio, 100.0, 1024, 8.0);
        assert!(latency_ms > 0.0);
        assert!(latency_ms < 50.0);
        assert!((0.0..1.0).contains(&per));
    }
}
