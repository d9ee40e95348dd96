//! Entity-level trace logging for simulation debugging.
//!
//! Selected entities (by name or id) emit a record for every event they
//! receive, every state change and every timer. Records go to the `tracing`
//! target `roamsim::trace` at INFO level so they interleave with regular logs.
//!
//! ```rust,ignore
//! use roamsim_common::entity_tracer::{EntityTracer, EntityTracerConfig, TraceEvent};
//!
//! let tracer = EntityTracer::new(EntityTracerConfig::from_spec("sta-0-0,ap1"));
//! tracer.log(TraceEvent::state_change(Some("sta-0-0"), id, now, "SCANNING"));
//! ```

use crate::{EntityId, Event, EventPayload, SimTime};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Trace Event Types
// ============================================================================

/// Categories of trace events for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceCategory {
    /// Event received by entity.
    EventReceived,
    /// State change within entity.
    StateChange,
    /// Entity-specific operation (probe, forward, ...).
    Operation,
    /// Timer scheduled, fired or cancelled.
    Timer,
}

impl TraceCategory {
    /// Parse a category selector as used in a trace spec (`event`, `state`,
    /// `op`, `timer`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "event" | "event_rx" => Some(TraceCategory::EventReceived),
            "state" => Some(TraceCategory::StateChange),
            "op" | "operation" => Some(TraceCategory::Operation),
            "timer" => Some(TraceCategory::Timer),
            _ => None,
        }
    }
}

impl fmt::Display for TraceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceCategory::EventReceived => write!(f, "EVENT_RX"),
            TraceCategory::StateChange => write!(f, "STATE"),
            TraceCategory::Operation => write!(f, "OP"),
            TraceCategory::Timer => write!(f, "TIMER"),
        }
    }
}

/// A trace event record.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub entity_name: Option<String>,
    pub entity_id: EntityId,
    pub sim_time: SimTime,
    pub category: TraceCategory,
    pub description: String,
    /// Additional key-value details.
    pub details: Vec<(String, String)>,
}

impl TraceEvent {
    fn new(
        entity_name: Option<&str>,
        entity_id: EntityId,
        sim_time: SimTime,
        category: TraceCategory,
        description: impl Into<String>,
    ) -> Self {
        TraceEvent {
            entity_name: entity_name.map(|s| s.to_string()),
            entity_id,
            sim_time,
            category,
            description: description.into(),
            details: Vec::new(),
        }
    }

    /// Trace record for an event being received.
    pub fn event_received(
        entity_name: Option<&str>,
        entity_id: EntityId,
        sim_time: SimTime,
        event: &Event,
    ) -> Self {
        let mut trace = TraceEvent::new(
            entity_name,
            entity_id,
            sim_time,
            TraceCategory::EventReceived,
            event.payload.name(),
        );
        trace.details = describe_event_payload(&event.payload);
        trace.details.push(("source".to_string(), event.source.0.to_string()));
        trace
    }

    pub fn state_change(
        entity_name: Option<&str>,
        entity_id: EntityId,
        sim_time: SimTime,
        description: impl Into<String>,
    ) -> Self {
        TraceEvent::new(
            entity_name,
            entity_id,
            sim_time,
            TraceCategory::StateChange,
            description,
        )
    }

    pub fn operation(
        entity_name: Option<&str>,
        entity_id: EntityId,
        sim_time: SimTime,
        description: impl Into<String>,
    ) -> Self {
        TraceEvent::new(
            entity_name,
            entity_id,
            sim_time,
            TraceCategory::Operation,
            description,
        )
    }

    pub fn timer(
        entity_name: Option<&str>,
        entity_id: EntityId,
        sim_time: SimTime,
        description: impl Into<String>,
    ) -> Self {
        TraceEvent::new(
            entity_name,
            entity_id,
            sim_time,
            TraceCategory::Timer,
            description,
        )
    }

    /// Add a detail to this event.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }
}

/// Describe an event payload for tracing.
fn describe_event_payload(payload: &EventPayload) -> Vec<(String, String)> {
    let kv = |k: &str, v: String| (k.to_string(), v);
    match payload {
        EventPayload::Timer { timer_id } => vec![kv("timer_id", timer_id.to_string())],
        EventPayload::CourseChange(e) => vec![
            kv("node", e.node.to_string()),
            kv("velocity", e.velocity.to_string()),
        ],
        EventPayload::ProbeRequest(e) => vec![
            kv("station", e.station.to_string()),
            kv("channel", e.channel.to_string()),
        ],
        EventPayload::ProbeResponse(e) => vec![
            kv("ap", e.response.ap.to_string()),
            kv("channel", e.response.channel.to_string()),
            kv("signal_dbm", format!("{:.2}", e.response.signal_dbm)),
        ],
        EventPayload::AssociationRequest(e) => vec![
            kv("station", e.station.to_string()),
            kv("mac", e.station_mac.to_string()),
        ],
        EventPayload::AssociationResponse(e) => vec![
            kv("ap", e.ap.to_string()),
            kv("accepted", e.accepted.to_string()),
        ],
        EventPayload::RadioFrame(e) => vec![
            kv("ap", e.ap.to_string()),
            kv("src", e.frame.src.to_string()),
            kv("dst", e.frame.dst.to_string()),
        ],
        EventPayload::WiredFrame(e) => vec![
            kv("port", e.port.to_string()),
            kv("src", e.frame.src.to_string()),
            kv("dst", e.frame.dst.to_string()),
        ],
        EventPayload::RadioTxRequest(frame)
        | EventPayload::UplinkRequest(frame)
        | EventPayload::Deliver(frame) => vec![
            kv("src", frame.src.to_string()),
            kv("dst", frame.dst.to_string()),
            kv("size", frame.size_bytes.to_string()),
        ],
        EventPayload::FlowStart { flow } | EventPayload::FlowStop { flow } => {
            vec![kv("flow", flow.to_string())]
        }
        EventPayload::MobilityTick | EventPayload::PositionReport | EventPayload::SimulationEnd => {
            Vec::new()
        }
    }
}

// ============================================================================
// Tracer Configuration
// ============================================================================

/// Configuration for entity tracing.
#[derive(Debug, Clone, Default)]
pub struct EntityTracerConfig {
    /// Entity names to trace. If empty and ids is empty, no tracing is done.
    pub traced_names: HashSet<String>,
    /// Entity IDs to trace.
    pub traced_ids: HashSet<u64>,
    /// Categories to trace. If empty, all categories are traced.
    pub traced_categories: HashSet<TraceCategory>,
}

impl EntityTracerConfig {
    /// A config that traces nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list of entity names, `entity:<id>` ids, or `*`.
    /// `category:<event|state|op|timer>` entries restrict the records emitted
    /// for the selected entities.
    ///
    /// ```rust,ignore
    /// let config = EntityTracerConfig::from_spec("sta-0-0,entity:4,category:timer");
    /// ```
    pub fn from_spec(spec: &str) -> Self {
        let mut config = Self::none();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some(id_str) = part.strip_prefix("entity:") {
                if let Ok(id) = id_str.parse::<u64>() {
                    config.traced_ids.insert(id);
                }
            } else if let Some(category) = part.strip_prefix("category:") {
                match TraceCategory::parse(category) {
                    Some(category) => config = config.with_category(category),
                    None => tracing::warn!("Unknown trace category '{}'", category),
                }
            } else {
                config.traced_names.insert(part.to_string());
            }
        }
        config
    }

    pub fn is_enabled(&self) -> bool {
        !self.traced_names.is_empty() || !self.traced_ids.is_empty()
    }

    pub fn traces_all(&self) -> bool {
        self.traced_names.contains("*")
    }

    /// Check if an entity should be traced (by name or ID).
    pub fn should_trace(&self, name: Option<&str>, id: EntityId) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self.traces_all() {
            return true;
        }
        if let Some(n) = name {
            if self.traced_names.contains(n) {
                return true;
            }
        }
        self.traced_ids.contains(&id.0)
    }

    pub fn should_trace_category(&self, category: TraceCategory) -> bool {
        self.traced_categories.is_empty() || self.traced_categories.contains(&category)
    }

    pub fn with_category(mut self, category: TraceCategory) -> Self {
        self.traced_categories.insert(category);
        self
    }
}

// ============================================================================
// Entity Tracer
// ============================================================================

/// Shared, cheaply clonable tracer.
#[derive(Clone, Default)]
pub struct EntityTracer {
    config: Arc<EntityTracerConfig>,
}

impl EntityTracer {
    pub fn new(config: EntityTracerConfig) -> Self {
        EntityTracer {
            config: Arc::new(config),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    pub fn should_trace(&self, name: Option<&str>, id: EntityId) -> bool {
        self.config.should_trace(name, id)
    }

    pub fn config(&self) -> &EntityTracerConfig {
        &self.config
    }

    /// Log a trace event if its entity and category are selected.
    pub fn log(&self, event: TraceEvent) {
        if !self
            .config
            .should_trace(event.entity_name.as_deref(), event.entity_id)
        {
            return;
        }
        if !self.config.should_trace_category(event.category) {
            return;
        }
        Self::output_trace(&event);
    }

    /// Log that an entity is handling an event.
    pub fn log_event_received(
        &self,
        entity_name: Option<&str>,
        entity_id: EntityId,
        sim_time: SimTime,
        event: &Event,
    ) {
        if !self.config.should_trace(entity_name, entity_id) {
            return;
        }
        self.log(TraceEvent::event_received(
            entity_name,
            entity_id,
            sim_time,
            event,
        ));
    }

    pub fn log_state_change(
        &self,
        entity_name: Option<&str>,
        entity_id: EntityId,
        sim_time: SimTime,
        description: impl Into<String>,
    ) {
        if !self.config.should_trace(entity_name, entity_id) {
            return;
        }
        self.log(TraceEvent::state_change(
            entity_name,
            entity_id,
            sim_time,
            description,
        ));
    }

    fn output_trace(event: &TraceEvent) {
        let entity = match event.entity_name {
            Some(ref name) => format!("{} ({})", name, event.entity_id),
            None => event.entity_id.to_string(),
        };
        let details = if event.details.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = event
                .details
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!(" [{}]", parts.join(", "))
        };
        tracing::info!(
            target: "roamsim::trace",
            "{} @ {:.3}ms: {} {}{}",
            entity,
            event.sim_time.as_micros() as f64 / 1000.0,
            event.category,
            event.description,
            details
        );
    }
}
