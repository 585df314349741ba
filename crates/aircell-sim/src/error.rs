//! Simulator error types.

use thiserror::Error;

use crate::ipalloc::SubnetExhausted;
use crate::topology::{TowerId, UeId};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown base station id {0}")]
    UnknownTower(TowerId),
    #[error("unknown user equipment id {0}")]
    UnknownUe(UeId),
    #[error("user equipment {0} is not attached to any base station")]
    NotAttached(UeId),
    #[error(transparent)]
    Subnet(#[from] SubnetExhausted),
    #[error("frame bridge rejected the operation: {0}")]
    Bridge(#[source] anyhow::Error),
}
