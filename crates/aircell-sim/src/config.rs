//! Simulator configuration.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::phy::NetworkType;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// First address handed to a UE; its /24 bounds the simulated subnet.
    pub starting_ip: Ipv4Addr,
    /// PHY profile applied to new towers.
    pub network_type: NetworkType,
    /// Destination file for the periodic link-quality report.
    pub stats_path: PathBuf,
    /// Mirror link-quality lines to stdout.
    pub stats_to_stdout: bool,
    /// Interval between link-quality reports, in milliseconds.
    pub stats_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            starting_ip: Ipv4Addr::new(10, 0, 0, 1),
            network_type: NetworkType::Lte20,
            stats_path: PathBuf::from("ue_link_stats.log"),
            stats_to_stdout: false,
            stats_interval_ms: 500,
        }
    }
}
