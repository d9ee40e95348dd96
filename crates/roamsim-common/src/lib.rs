//! # roamsim-common
//!
//! Core types shared by every roamsim crate.
//!
//! The simulation is a single timeline of [`Event`]s popped in `(time, ordinal)`
//! order from an [`EventQueue`]. Each event is delivered to one or more
//! [`Entity`] implementations (stations, AP agents, bridges, traffic agents),
//! which react by posting further events through a [`SimContext`]. Entities never
//! touch each other directly; the only shared read-only view is the
//! [`RadioEnvironment`] (positions and received signal strength).

pub mod entity_tracer;

mod context;
mod error;
mod event;
mod frame;
mod geometry;
mod ids;
mod queue;
mod time;

pub use context::{Entity, NullEnvironment, RadioEnvironment, SimContext};
pub use error::SimError;
pub use event::{
    AssociationRequestEvent, AssociationResponseEvent, CourseChangeEvent, Event, EventPayload,
    ProbeRequestEvent, ProbeResponse, ProbeResponseEvent, RadioFrameEvent, WiredFrameEvent,
};
pub use frame::{Frame, FrameKind};
pub use geometry::Vec3;
pub use ids::{ApId, Channel, EntityId, EventId, FlowId, MacAddress, NodeId, PortId};
pub use queue::{EventHandle, EventQueue};
pub use time::SimTime;
