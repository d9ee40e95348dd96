//! Error types for the simulation core.

use crate::{EntityId, NodeId, SimTime};
use thiserror::Error;

/// Errors raised by the event queue and by entities while handling events.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Scheduling at a time before the current clock.
    #[error("Invalid time: requested {requested}, clock is at {now}")]
    InvalidTime {
        /// Requested absolute time.
        requested: SimTime,
        /// Clock when the request was made.
        now: SimTime,
    },

    /// A duration that is negative or not finite.
    #[error("Invalid duration: {0} seconds")]
    InvalidDuration(f64),

    /// An event targeted an entity that does not exist.
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// A node id with no mobility state.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// An entity could not process an event.
    #[error("Entity {entity} failed: {reason}")]
    EntityFailure {
        entity: EntityId,
        reason: String,
    },
}
