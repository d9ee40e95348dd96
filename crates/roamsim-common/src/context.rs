//! The seam between the event loop and the entities it drives.

use crate::entity_tracer::EntityTracer;
use crate::{EntityId, Event, EventHandle, EventPayload, EventQueue, NodeId, SimError, SimTime, Vec3};
use std::any::Any;

/// Read-only view of the radio world: where nodes are and how well they hear
/// each other. Implemented by the mobility/propagation layer.
pub trait RadioEnvironment {
    /// Position of `node` at `time`, or `None` for an unknown node.
    fn position(&self, node: NodeId, time: SimTime) -> Option<Vec3>;

    /// Signal measure in dBm received at `rx` from `tx` at `time`, or `None`
    /// if either node is unknown.
    fn signal_dbm(&self, tx: NodeId, rx: NodeId, time: SimTime) -> Option<f64>;
}

/// Environment with no nodes. Used by purely wired setups and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEnvironment;

impl RadioEnvironment for NullEnvironment {
    fn position(&self, _node: NodeId, _time: SimTime) -> Option<Vec3> {
        None
    }

    fn signal_dbm(&self, _tx: NodeId, _rx: NodeId, _time: SimTime) -> Option<f64> {
        None
    }
}

/// Context handed to an entity while it handles one event.
///
/// All mutation of shared simulation state goes through here, so every change
/// happens on the single event timeline.
pub struct SimContext<'a> {
    queue: &'a mut EventQueue,
    env: &'a dyn RadioEnvironment,
    tracer: &'a EntityTracer,
    entity: EntityId,
}

impl<'a> SimContext<'a> {
    pub fn new(
        queue: &'a mut EventQueue,
        env: &'a dyn RadioEnvironment,
        tracer: &'a EntityTracer,
        entity: EntityId,
    ) -> Self {
        SimContext {
            queue,
            env,
            tracer,
            entity,
        }
    }

    /// Current simulation time.
    pub fn time(&self) -> SimTime {
        self.queue.now()
    }

    /// The entity currently handling an event.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn env(&self) -> &dyn RadioEnvironment {
        self.env
    }

    pub fn tracer(&self) -> &EntityTracer {
        self.tracer
    }

    /// Schedule an event after `delay`.
    pub fn post_event(
        &mut self,
        delay: SimTime,
        targets: Vec<EntityId>,
        payload: EventPayload,
    ) -> EventHandle {
        self.queue.schedule(self.entity, delay, targets, payload)
    }

    /// Schedule an event at the current time, after every event already
    /// queued for this instant.
    pub fn post_immediate(&mut self, targets: Vec<EntityId>, payload: EventPayload) -> EventHandle {
        self.post_event(SimTime::ZERO, targets, payload)
    }

    /// Schedule an event at an absolute time.
    pub fn post_at(
        &mut self,
        time: SimTime,
        targets: Vec<EntityId>,
        payload: EventPayload,
    ) -> Result<EventHandle, SimError> {
        self.queue.schedule_at(self.entity, time, targets, payload)
    }

    /// Cancel a previously scheduled event.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.queue.cancel(handle)
    }
}

/// A simulation participant.
pub trait Entity: Any {
    fn entity_id(&self) -> EntityId;

    /// Human-readable name, used for tracing and lookups.
    fn name(&self) -> &str;

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError>;

    /// Downcast support for observers that need the concrete type.
    fn as_any(&self) -> &dyn Any;
}
