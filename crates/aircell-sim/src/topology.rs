//! Tower and UE arenas with nearest-tower association.
//!
//! Endpoints are stored in arenas indexed by dense, monotonically assigned
//! ids; UEs reference their serving tower by id, never by pointer.
//! `synchronize` must run after every mutation that can change the
//! geometry or a tower's powered state.

use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::Serialize;

use crate::counters::ActivityCounters;
use crate::phy::TechProfile;

pub type TowerId = u32;
pub type UeId = u32;

#[derive(Debug)]
pub struct Tower {
    pub id: TowerId,
    pub x: f64,
    pub y: f64,
    pub powered: bool,
    pub profile: TechProfile,
    pub counters: Arc<ActivityCounters>,
}

#[derive(Debug)]
pub struct Ue {
    pub id: UeId,
    pub x: f64,
    pub y: f64,
    pub ip: Ipv4Addr,
    pub serving: Option<TowerId>,
    pub counters: Arc<ActivityCounters>,
}

/// Euclidean distance between two points on the plane, in meters.
pub fn distance(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    (ax - bx).hypot(ay - by)
}

/// JSON shape of a tower, as returned by the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct TowerDescriptor {
    pub id: TowerId,
    pub x: f64,
    pub y: f64,
    pub on: bool,
}

/// JSON shape of a UE. `bs` is the serving tower id, or −1 when detached.
#[derive(Debug, Clone, Serialize)]
pub struct UeDescriptor {
    pub id: UeId,
    pub x: f64,
    pub y: f64,
    pub ip: String,
    pub bs: i64,
    pub up_packets: u32,
    pub down_packets: u32,
}

#[derive(Debug, Default)]
pub struct Topology {
    towers: Vec<Tower>,
    ues: Vec<Ue>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tower(&mut self, x: f64, y: f64, powered: bool, profile: TechProfile) -> TowerId {
        let id = self.towers.len() as TowerId;
        self.towers.push(Tower {
            id,
            x,
            y,
            powered,
            profile,
            counters: Arc::new(ActivityCounters::new()),
        });
        self.synchronize();
        id
    }

    pub fn add_ue(&mut self, x: f64, y: f64, ip: Ipv4Addr) -> UeId {
        let id = self.ues.len() as UeId;
        self.ues.push(Ue {
            id,
            x,
            y,
            ip,
            serving: None,
            counters: Arc::new(ActivityCounters::new()),
        });
        self.synchronize();
        id
    }

    pub fn tower(&self, id: TowerId) -> Option<&Tower> {
        self.towers.get(id as usize)
    }

    pub fn tower_mut(&mut self, id: TowerId) -> Option<&mut Tower> {
        self.towers.get_mut(id as usize)
    }

    pub fn ue(&self, id: UeId) -> Option<&Ue> {
        self.ues.get(id as usize)
    }

    pub fn ue_mut(&mut self, id: UeId) -> Option<&mut Ue> {
        self.ues.get_mut(id as usize)
    }

    pub fn ue_by_ip(&self, ip: Ipv4Addr) -> Option<&Ue> {
        self.ues.iter().find(|ue| ue.ip == ip)
    }

    pub fn towers(&self) -> &[Tower] {
        &self.towers
    }

    pub fn towers_mut(&mut self) -> impl Iterator<Item = &mut Tower> {
        self.towers.iter_mut()
    }

    pub fn ues(&self) -> &[Ue] {
        &self.ues
    }

    pub fn serving_tower(&self, ue: &Ue) -> Option<&Tower> {
        ue.serving.and_then(|id| self.tower(id))
    }

    /// Recompute every UE's serving tower: the geometrically nearest
    /// powered tower, lower id winning ties, or none when nothing is
    /// powered.
    pub fn synchronize(&mut self) {
        for ue in &mut self.ues {
            let mut best: Option<(TowerId, f64)> = None;
            for tower in &self.towers {
                if !tower.powered {
                    continue;
                }
                let d = distance(ue.x, ue.y, tower.x, tower.y);
                let closer = match best {
                    None => true,
                    Some((_, best_d)) => d < best_d,
                };
                if closer {
                    best = Some((tower.id, d));
                }
            }
            ue.serving = best.map(|(id, _)| id);
        }
    }

    /// Distances from each active co-channel UE (upload in flight, not the
    /// excluded one) to the given tower. Interference input for the uplink.
    pub fn active_ue_distances(&self, exclude: UeId, tower: &Tower) -> Vec<f64> {
        self.ues
            .iter()
            .filter(|ue| ue.id != exclude && ue.counters.upload_in_flight() > 0)
            .map(|ue| distance(ue.x, ue.y, tower.x, tower.y))
            .collect()
    }

    /// Distances from each actively transmitting powered tower (other than
    /// the excluded serving tower) to the given point. Interference input
    /// for the downlink.
    pub fn active_tower_distances(&self, exclude: TowerId, x: f64, y: f64) -> Vec<f64> {
        self.towers
            .iter()
            .filter(|t| t.id != exclude && t.powered && t.counters.upload_in_flight() > 0)
            .map(|t| distance(x, y, t.x, t.y))
            .collect()
    }

    pub fn describe_tower(&self, id: TowerId) -> Option<TowerDescriptor> {
        self.tower(id).map(|t| TowerDescriptor {
            id: t.id,
            x: t.x,
            y: t.y,
            on: t.powered,
        })
    }

    pub fn describe_ue(&self, id: UeId) -> Option<UeDescriptor> {
        self.ue(id).map(|ue| {
            let snap = ue.counters.snapshot();
            UeDescriptor {
                id: ue.id,
                x: ue.x,
                y: ue.y,
                ip: ue.ip.to_string(),
                bs: ue.serving.map(i64::from).unwrap_or(-1),
                up_packets: snap.up_packets,
                down_packets: snap.down_packets,
            }
        })
    }
}
