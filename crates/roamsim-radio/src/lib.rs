//! # roamsim-radio
//!
//! The physical side of the simulation: where nodes are and how strongly they
//! hear each other.
//!
//! - **Mobility**: constant-velocity motion, evaluated lazily as a pure function
//!   of time, with velocity changes that re-anchor the trajectory.
//! - **Propagation**: distance-based path-loss models (log-distance, free space).
//! - **Shadowing**: optional zero-mean Gaussian term, reproducible from the seed.
//!
//! [`RadioWorld`] ties them together and implements
//! [`roamsim_common::RadioEnvironment`] for the entities.

mod mobility;
mod propagation;
mod world;

pub use mobility::{MobilityEngine, MobilityState};
pub use propagation::{
    FreeSpaceModel, LogDistanceModel, PropagationConfig, PropagationLossModel,
    DEFAULT_REFERENCE_LOSS_DB, MIN_DISTANCE_M,
};
pub use world::{RadioWorld, Shadowing, DEFAULT_TX_POWER_DBM};
