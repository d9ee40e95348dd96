//! # roamsim-wifi
//!
//! The 802.11 layer of the simulator, reduced to what handoff needs:
//!
//! - [`AccessPointAgent`]: answers probes and association requests on its own
//!   channel and acts as the radio port of its bridge.
//! - [`Station`]: the scan / select / associate state machine that keeps a
//!   mobile station attached to the strongest usable AP.
//!
//! Both sides use one usable-signal threshold ([`WifiParams::usable_threshold_dbm`])
//! for probe answers, association admission and data frame reception.

mod ap;
mod params;
mod scan;
mod station;

pub use ap::{AccessPointAgent, AccessPointConfig, ApStats, AssociatedStation};
pub use params::{default_scan_deadline, WifiParams};
pub use scan::select_best;
pub use station::{
    ApDirectoryEntry, AssociationRecord, Station, StationConfig, StationState, StationStats,
    TIMER_STARTUP,
};

#[cfg(test)]
mod test_support {
    use roamsim_common::entity_tracer::EntityTracer;
    use roamsim_common::{Entity, Event, EventId, EventPayload, EventQueue, SimContext, SimError, SimTime};
    use roamsim_radio::{PropagationConfig, RadioWorld, DEFAULT_TX_POWER_DBM};

    /// Queue plus radio world for driving entities by hand.
    pub struct Harness {
        pub queue: EventQueue,
        pub world: RadioWorld,
        pub tracer: EntityTracer,
    }

    impl Harness {
        pub fn new() -> Self {
            Harness {
                queue: EventQueue::new(),
                world: RadioWorld::new(&PropagationConfig::default(), DEFAULT_TX_POWER_DBM),
                tracer: EntityTracer::disabled(),
            }
        }

        /// Hand `event` to `entity` at the current time.
        pub fn dispatch<E: Entity>(&mut self, entity: &mut E, event: &Event) -> Result<(), SimError> {
            let mut ctx = SimContext::new(&mut self.queue, &self.world, &self.tracer, entity.entity_id());
            entity.handle_event(event, &mut ctx)
        }

        /// Deliver `payload` to `entity` now, as if it had just fired.
        pub fn deliver<E: Entity>(&mut self, entity: &mut E, payload: EventPayload) -> Result<(), SimError> {
            let event = Event {
                id: EventId(u64::MAX),
                time: self.queue.now(),
                source: entity.entity_id(),
                targets: vec![entity.entity_id()],
                payload,
            };
            self.dispatch(entity, &event)
        }
    }

    /// Pop every pending event.
    pub fn drain(queue: &mut EventQueue) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(e) = queue.pop_due(SimTime::MAX) {
            out.push(e);
        }
        out
    }
}
