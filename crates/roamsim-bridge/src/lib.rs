//! # roamsim-bridge
//!
//! Transparent learning bridges. Each AP owns a two-port bridge (radio port and
//! wired uplink); a central switch joins every AP uplink and the server uplink
//! into one broadcast domain.
//!
//! Ports live in a per-bridge arena and are referred to by [`PortId`] index;
//! peers are referred to by entity id, so bridges hold no references to each
//! other.
//!
//! [`PortId`]: roamsim_common::PortId

mod bridge;
mod mac_table;

pub use bridge::{
    BridgeConfig, BridgePort, BridgeStats, ForwardDecision, LearningBridge, MacTableRow,
    PortAttachment,
};
pub use mac_table::{Learned, MacTable, MacTableEntry};
