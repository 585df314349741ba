//! # aircell-sim
//!
//! Cellular-network simulator core. Models UEs and base-station towers on
//! a 2D plane, prices every UE↔tower link with a log-distance/shadowing
//! radio model, and pushes real IPv4 frames through a two-stage delay and
//! error pipeline that mimics the air interface in real time.
//!
//! ## Crate structure
//!
//! - [`phy`] — propagation, SINR, Shannon rate, and error-probability math
//! - [`topology`] — tower/UE arenas and nearest-tower association
//! - [`counters`] — per-endpoint in-flight packet accounting
//! - [`queue`] — mutex-protected min-heap of pending packets
//! - [`pipeline`] — ingress/upload/download stages and error injection
//! - [`engine`] — the [`Simulator`] facade and worker lifecycle
//! - [`bridge`] — L3 frame source/sink abstraction ([`ChannelBridge`] for
//!   in-memory use)
//! - [`ipalloc`] — sequential address issuance inside one /24
//! - [`stats`] — periodic link-quality reporting
//! - [`config`] — simulator settings
//! - [`frame`] — IPv4 header inspection

pub mod bridge;
pub mod config;
pub mod counters;
pub mod engine;
pub mod error;
pub mod frame;
pub mod ipalloc;
pub mod phy;
pub mod pipeline;
pub mod queue;
pub mod stats;
pub mod topology;

pub use bridge::{ChannelBridge, FrameBridge};
pub use config::SimConfig;
pub use engine::{LinkStats, Simulator, TransferRecord, UeCheck};
pub use error::SimError;
pub use phy::NetworkType;
pub use topology::{TowerDescriptor, TowerId, UeDescriptor, UeId};
