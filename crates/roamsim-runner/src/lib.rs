//! # roamsim-runner
//!
//! The discrete-event loop that drives a built [`Simulation`], plus the
//! observation API used by tests and the `roamsim` binary.
//!
//! Events are processed strictly in `(time, insertion order)`. The loop owns
//! the scenario-level events (mobility ticks, position reports, course
//! changes) and hands everything else to the targeted entities.
//!
//! ```rust,ignore
//! let config = roamsim_runner::load_model("scenarios/handoff.yaml")?;
//! let simulation = roamsim_runner::build_simulation(&config, config.seed)?;
//! let mut event_loop = roamsim_runner::create_event_loop(simulation);
//! let stats = event_loop.run(SimTime::from_secs(60.0))?;
//! println!("{} handoffs", stats.handoffs);
//! ```

pub mod flow_tracker;

use flow_tracker::{analyze_flow, emit_gap_metrics, FlowReport};
use roamsim_agents::{CbrSource, FlowSink};
use roamsim_bridge::{LearningBridge, MacTableRow};
use roamsim_common::entity_tracer::{EntityTracer, EntityTracerConfig};
use roamsim_common::{
    ApId, Entity, EntityId, Event, EventPayload, EventQueue, FlowId, NodeId, RadioEnvironment,
    SimContext, SimError, Vec3,
};
use roamsim_radio::RadioWorld;
use roamsim_wifi::{AccessPointAgent, AssociationRecord, Station, StationStats};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub use roamsim_common::SimTime;
pub use roamsim_metrics::metric_defs;
pub use roamsim_model::{
    build_simulation, load_model, load_model_from_str, Layout, ModelError, ScenarioConfig,
    Simulation, SCENARIO_SOURCE,
};

/// Errors from loading, building or running a simulation.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("simulation error: {0}")]
    Simulation(#[from] SimError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown flow: {0}")]
    UnknownFlow(FlowId),
}

// ============================================================================
// Statistics
// ============================================================================

/// End-of-run view of one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub name: String,
    pub state: String,
    pub associated_ap: Option<ApId>,
    pub position: Option<Vec3>,
    pub stats: StationStats,
    pub timeline: Vec<AssociationRecord>,
}

/// Statistics from a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationStats {
    /// Total number of events processed.
    pub total_events: u64,
    /// Simulation time reached, in microseconds.
    pub simulation_time_us: u64,
    pub associations: u64,
    pub handoffs: u64,
    pub scans: u64,
    pub empty_scans: u64,
    pub bridge_frames_forwarded: u64,
    pub bridge_frames_flooded: u64,
    pub mac_moves: u64,
    pub stations: Vec<StationSummary>,
    pub flows: Vec<FlowReport>,
}

// ============================================================================
// Event Loop
// ============================================================================

/// Single-threaded event loop over one simulation.
pub struct EventLoop {
    queue: EventQueue,
    entities: Vec<Box<dyn Entity>>,
    world: RadioWorld,
    tracer: EntityTracer,
    layout: Layout,
    duration: SimTime,
    tick: SimTime,
    position_log_interval: Option<SimTime>,
    total_events: u64,
}

/// Wrap a built simulation in an event loop with its initial events queued.
pub fn create_event_loop(simulation: Simulation) -> EventLoop {
    let tracer_config = simulation
        .trace
        .as_deref()
        .map(EntityTracerConfig::from_spec)
        .unwrap_or_else(EntityTracerConfig::none);

    let mut queue = EventQueue::new();
    for event in simulation.initial_events {
        // The clock is at zero, so every absolute time is reachable as a delay.
        queue.schedule(event.source, event.time, event.targets, event.payload);
    }

    EventLoop {
        queue,
        entities: simulation.entities,
        world: simulation.world,
        tracer: EntityTracer::new(tracer_config),
        layout: simulation.layout,
        duration: simulation.duration,
        tick: simulation.tick,
        position_log_interval: simulation.position_log_interval,
        total_events: 0,
    }
}

impl EventLoop {
    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// Configured run length.
    pub fn duration(&self) -> SimTime {
        self.duration
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn world(&self) -> &RadioWorld {
        &self.world
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    /// Process every event due at or before `until`, then move the clock to
    /// `until`. Can be called repeatedly with increasing times.
    pub fn run_until(&mut self, until: SimTime) -> Result<(), RunnerError> {
        while let Some(event) = self.queue.pop_due(until) {
            self.dispatch(event)?;
        }
        self.queue.advance_to(until);
        Ok(())
    }

    /// Run until `until` and return the statistics at that point.
    pub fn run(&mut self, until: SimTime) -> Result<SimulationStats, RunnerError> {
        info!("Running simulation until {}", until);
        self.run_until(until)?;
        self.queue.schedule(
            SCENARIO_SOURCE,
            SimTime::ZERO,
            Vec::new(),
            EventPayload::SimulationEnd,
        );
        self.run_until(until)?;

        let stats = self.stats();
        for flow in &stats.flows {
            emit_gap_metrics(flow);
        }
        info!(
            "Simulation finished: {} events, {} associations, {} handoffs",
            stats.total_events, stats.associations, stats.handoffs
        );
        Ok(stats)
    }

    /// Run for the configured duration.
    pub fn run_to_end(&mut self) -> Result<SimulationStats, RunnerError> {
        self.run(self.duration)
    }

    fn dispatch(&mut self, event: Event) -> Result<(), RunnerError> {
        self.total_events += 1;
        metrics::counter!(
            metric_defs::SIMULATION_EVENTS.name,
            "event" => event.payload.name()
        )
        .increment(1);

        match &event.payload {
            EventPayload::MobilityTick => {
                metrics::gauge!(metric_defs::SIMULATION_TIME.name).set(event.time.as_secs_f64());
                self.queue.schedule(
                    SCENARIO_SOURCE,
                    self.tick,
                    event.targets.clone(),
                    EventPayload::MobilityTick,
                );
            }
            EventPayload::PositionReport => {
                self.log_positions(event.time);
                if let Some(interval) = self.position_log_interval {
                    self.queue.schedule(
                        SCENARIO_SOURCE,
                        interval,
                        Vec::new(),
                        EventPayload::PositionReport,
                    );
                }
            }
            EventPayload::CourseChange(change) => {
                self.world
                    .mobility_mut()
                    .set_velocity(change.node, change.velocity, event.time)?;
                info!(
                    "t = {:.3} course change of {}: velocity {}",
                    event.time.as_secs_f64(),
                    change.node,
                    change.velocity
                );
            }
            EventPayload::SimulationEnd => {
                debug!("Simulation end at {}", event.time);
            }
            _ => {}
        }

        for &target in &event.targets {
            self.deliver(target, &event)?;
        }
        Ok(())
    }

    fn deliver(&mut self, target: EntityId, event: &Event) -> Result<(), RunnerError> {
        let entity = self
            .entities
            .get_mut(target.0 as usize)
            .ok_or(SimError::UnknownEntity(target))?;
        self.tracer
            .log_event_received(Some(entity.name()), target, event.time, event);
        let mut ctx = SimContext::new(&mut self.queue, &self.world, &self.tracer, target);
        entity.handle_event(event, &mut ctx)?;
        Ok(())
    }

    fn log_positions(&self, time: SimTime) {
        for station in &self.layout.stations {
            if let Some(pos) = self.world.position(station.node, time) {
                info!(
                    "t = {:.1} {}: x = {:.2}, y = {:.2}",
                    time.as_secs_f64(),
                    station.name,
                    pos.x,
                    pos.y
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Flow control
    // ------------------------------------------------------------------------

    /// Start `flow` (source and sink) at absolute time `at`.
    pub fn start_flow(&mut self, flow: FlowId, at: SimTime) -> Result<(), RunnerError> {
        self.schedule_flow(flow, at, EventPayload::FlowStart { flow })
    }

    /// Stop `flow` (source and sink) at absolute time `at`.
    pub fn stop_flow(&mut self, flow: FlowId, at: SimTime) -> Result<(), RunnerError> {
        self.schedule_flow(flow, at, EventPayload::FlowStop { flow })
    }

    fn schedule_flow(
        &mut self,
        flow: FlowId,
        at: SimTime,
        payload: EventPayload,
    ) -> Result<(), RunnerError> {
        let info = self
            .layout
            .flows
            .iter()
            .find(|f| f.flow == flow)
            .ok_or(RunnerError::UnknownFlow(flow))?;
        let targets = vec![info.source, info.sink];
        self.queue.schedule_at(SCENARIO_SOURCE, at, targets, payload)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    /// Entity by name, downcast to its concrete type.
    pub fn entity<T: 'static>(&self, name: &str) -> Option<&T> {
        let id = self.layout.entity(name)?;
        self.entity_by_id(id)
    }

    fn entity_by_id<T: 'static>(&self, id: EntityId) -> Option<&T> {
        self.entities
            .get(id.0 as usize)?
            .as_any()
            .downcast_ref::<T>()
    }

    pub fn station(&self, name: &str) -> Option<&Station> {
        self.entity(name)
    }

    pub fn access_point(&self, ap: ApId) -> Option<&AccessPointAgent> {
        let info = self.layout.ap(ap)?;
        self.entity_by_id(info.entity)
    }

    /// A bridge by name: `switch` or `ap<i>-bridge`.
    pub fn bridge(&self, name: &str) -> Option<&LearningBridge> {
        self.entity(name)
    }

    fn node_of(&self, name: &str) -> Option<NodeId> {
        if let Some(station) = self.layout.station(name) {
            return Some(station.node);
        }
        self.layout.aps.iter().find(|a| a.name == name).map(|a| a.node)
    }

    /// Current position of a station or AP.
    pub fn position_of(&self, name: &str) -> Option<Vec3> {
        self.world.position(self.node_of(name)?, self.now())
    }

    /// Current positions of every station.
    pub fn positions(&self) -> Vec<(String, Vec3)> {
        let now = self.now();
        self.layout
            .stations
            .iter()
            .filter_map(|s| Some((s.name.clone(), self.world.position(s.node, now)?)))
            .collect()
    }

    /// Serving AP of a station, if associated.
    pub fn association_of(&self, name: &str) -> Option<ApId> {
        self.station(name)?.associated_ap()
    }

    /// Serving AP of every station.
    pub fn associations(&self) -> Vec<(String, Option<ApId>)> {
        self.layout
            .stations
            .iter()
            .map(|s| (s.name.clone(), self.association_of(&s.name)))
            .collect()
    }

    /// MAC table of a bridge.
    pub fn mac_table(&self, bridge: &str) -> Option<Vec<MacTableRow>> {
        Some(self.bridge(bridge)?.mac_table())
    }

    /// Delivery report of every flow so far.
    pub fn flow_reports(&self) -> Vec<FlowReport> {
        self.layout
            .flows
            .iter()
            .filter_map(|info| {
                let source: &CbrSource = self.entity_by_id(info.source)?;
                let sink: &FlowSink = self.entity_by_id(info.sink)?;
                Some(analyze_flow(
                    info,
                    source.sent(),
                    sink.receptions(),
                    sink.rejected(),
                ))
            })
            .collect()
    }

    /// Statistics at the current time.
    pub fn stats(&self) -> SimulationStats {
        let now = self.now();
        let stations: Vec<StationSummary> = self
            .layout
            .stations
            .iter()
            .filter_map(|info| {
                let station = self.station(&info.name)?;
                Some(StationSummary {
                    name: info.name.clone(),
                    state: station.state().to_string(),
                    associated_ap: station.associated_ap(),
                    position: self.world.position(info.node, now),
                    stats: station.stats().clone(),
                    timeline: station.timeline().to_vec(),
                })
            })
            .collect();

        let mut stats = SimulationStats {
            total_events: self.total_events,
            simulation_time_us: now.as_micros(),
            associations: stations.iter().map(|s| s.stats.associations).sum(),
            handoffs: stations.iter().map(|s| s.stats.handoffs).sum(),
            scans: stations.iter().map(|s| s.stats.scans).sum(),
            empty_scans: stations.iter().map(|s| s.stats.empty_scans).sum(),
            bridge_frames_forwarded: 0,
            bridge_frames_flooded: 0,
            mac_moves: 0,
            stations,
            flows: self.flow_reports(),
        };
        for (name, _) in self.layout.bridges() {
            if let Some(bridge) = self.bridge(&name) {
                stats.bridge_frames_forwarded += bridge.stats().frames_forwarded;
                stats.bridge_frames_flooded += bridge.stats().frames_flooded;
                stats.mac_moves += bridge.stats().mac_moves;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_loop(yaml: &str) -> EventLoop {
        let config = load_model_from_str(yaml).unwrap();
        let simulation = build_simulation(&config, config.seed).unwrap();
        create_event_loop(simulation)
    }

    #[test]
    fn test_run_until_is_resumable() {
        let mut event_loop = small_loop("duration_s: 2.0");
        event_loop.run_until(SimTime::from_millis(500)).unwrap();
        assert_eq!(event_loop.now(), SimTime::from_millis(500));
        let first = event_loop.total_events();
        assert!(first > 0);

        event_loop.run_until(SimTime::from_millis(1000)).unwrap();
        assert_eq!(event_loop.now(), SimTime::from_millis(1000));
        assert!(event_loop.total_events() > first);
    }

    #[test]
    fn test_every_station_associates_at_start() {
        let mut event_loop = small_loop("{}");
        event_loop.run_until(SimTime::from_millis(300)).unwrap();
        for (name, ap) in event_loop.associations() {
            assert_eq!(ap, Some(ApId(0)), "{} should be served by AP0", name);
        }
    }

    #[test]
    fn test_course_change_stops_the_mobile_station() {
        let yaml = r#"
mobility:
  course_changes:
    - node: sta-0-0
      at_s: 1.0
      velocity: [0.0, 0.0, 0.0]
"#;
        let mut event_loop = small_loop(yaml);
        event_loop.run_until(SimTime::from_secs(3.0)).unwrap();
        let pos = event_loop.position_of("sta-0-0").unwrap();
        assert!((pos.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_flow_can_be_started_and_stopped_manually() {
        let yaml = r#"
flows:
  - name: late
    source: server
    destination: sta-0-1
    start_s: 100.0
    stop_s: 200.0
"#;
        let mut event_loop = small_loop(yaml);
        event_loop.start_flow(FlowId(0), SimTime::from_secs(1.0)).unwrap();
        event_loop.stop_flow(FlowId(0), SimTime::from_secs(2.0)).unwrap();
        event_loop.run_until(SimTime::from_secs(3.0)).unwrap();

        let report = &event_loop.flow_reports()[0];
        assert!(report.sent >= 100 && report.sent <= 101, "sent {}", report.sent);
        assert!(report.received > 0);
        assert!(report.last_received_at.unwrap() < SimTime::from_millis(2010));
    }

    #[test]
    fn test_flow_start_in_the_past_is_rejected() {
        let mut event_loop = small_loop("{}");
        event_loop.run_until(SimTime::from_secs(1.0)).unwrap();
        let err = event_loop
            .start_flow(FlowId(0), SimTime::from_millis(500))
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Simulation(SimError::InvalidTime { .. })
        ));
        assert!(matches!(
            event_loop.start_flow(FlowId(7), SimTime::from_secs(2.0)),
            Err(RunnerError::UnknownFlow(FlowId(7)))
        ));
    }

    #[test]
    fn test_mac_table_lookup_by_bridge_name() {
        let mut event_loop = small_loop("{}");
        event_loop.run_until(SimTime::from_secs(1.0)).unwrap();
        let sta = event_loop.layout().station("sta-0-0").unwrap().mac;
        let table = event_loop.mac_table("switch").unwrap();
        let row = table.iter().find(|r| r.address == sta).unwrap();
        assert_eq!(row.port_name, "ap0");
        assert!(event_loop.mac_table("nope").is_none());
    }
}
