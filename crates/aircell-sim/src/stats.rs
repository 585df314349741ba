//! Periodic per-UE link-quality reporting.
//!
//! A dedicated worker samples every UE's link on a fixed tick and appends
//! one text line per UE to the configured report file (optionally mirrored
//! to stdout). Purely observational: counters are read as best-effort
//! snapshots and nothing is mutated. Like the pipeline workers, the
//! reporter parks while the simulation is paused.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::engine::{Simulator, REPORT_NBYTES};
use crate::phy::{ber_qpsk, packet_error_prob, RadioModel};

pub(crate) fn reporter_loop(weak: Weak<Simulator>) {
    let (interval, mut writer) = {
        let Some(sim) = weak.upgrade() else { return };
        let interval = Duration::from_millis(sim.cfg.stats_interval_ms.max(1));
        let writer = match File::create(&sim.cfg.stats_path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(err) => {
                warn!(%err, path = %sim.cfg.stats_path.display(), "link report file unavailable");
                None
            }
        };
        (interval, writer)
    };

    loop {
        thread::sleep(interval);
        let Some(sim) = weak.upgrade() else { break };
        if sim.shutting_down.load(Ordering::Relaxed) {
            break;
        }
        if sim.paused.load(Ordering::Relaxed) {
            continue;
        }
        for line in report_lines(&sim) {
            if sim.cfg.stats_to_stdout {
                println!("{line}");
            }
            if let Some(w) = writer.as_mut() {
                let _ = writeln!(w, "{line}");
            }
        }
        if let Some(w) = writer.as_mut() {
            let _ = w.flush();
        }
    }
}

fn report_lines(sim: &Simulator) -> Vec<String> {
    let topo = sim.topology.read().unwrap_or_else(|e| e.into_inner());
    topo.ues()
        .iter()
        .map(|ue| match topo.serving_tower(ue) {
            None => format!("ue={} tower=none", ue.id),
            Some(tower) => {
                let eval = sim.evaluate_link(&topo, ue, tower);
                let radio = RadioModel::new(&tower.profile);
                format!(
                    "ue={} tower={} distance_m={:.1} dl_per={:.6} ul_per={:.6} dl_mbps={:.3} ul_mbps={:.3}",
                    ue.id,
                    tower.id,
                    eval.d_m,
                    packet_error_prob(ber_qpsk(eval.dl_sinr), REPORT_NBYTES),
                    packet_error_prob(ber_qpsk(eval.ul_sinr), REPORT_NBYTES),
                    radio.rate_bps(eval.dl_sinr) / 1e6,
                    radio.rate_bps(eval.ul_sinr) / 1e6,
                )
            }
        })
        .collect()
}
