//! Events and their payloads.

use crate::{ApId, Channel, EntityId, EventId, FlowId, Frame, NodeId, PortId, SimTime, Vec3};

/// A scheduled event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique id; also the insertion ordinal used to break timestamp ties.
    pub id: EventId,
    /// When the event fires.
    pub time: SimTime,
    /// Entity that scheduled it.
    pub source: EntityId,
    /// Entities the payload is delivered to, in order. Empty for events the
    /// event loop handles itself (mobility ticks, course changes).
    pub targets: Vec<EntityId>,
    pub payload: EventPayload,
}

/// A probe response as collected by a scanning station.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub ap: ApId,
    pub channel: Channel,
    pub ssid: String,
    /// Signal measure in dBm, computed by the AP when it answered.
    pub signal_dbm: f64,
}

/// Active-scan probe sent by a station on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequestEvent {
    pub station: NodeId,
    pub station_entity: EntityId,
    pub channel: Channel,
    /// SSID to match; `None` is the wildcard SSID.
    pub ssid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponseEvent {
    pub response: ProbeResponse,
    /// Node carrying the responding AP's radio.
    pub ap_node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRequestEvent {
    pub station: NodeId,
    pub station_entity: EntityId,
    pub station_mac: crate::MacAddress,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationResponseEvent {
    pub ap: ApId,
    pub channel: Channel,
    pub accepted: bool,
}

/// A data frame on the air between an AP and a station (either direction).
#[derive(Debug, Clone, PartialEq)]
pub struct RadioFrameEvent {
    /// The AP end of the exchange.
    pub ap: ApId,
    pub channel: Channel,
    /// Transmitting node, for signal evaluation at the receiver.
    pub tx_node: NodeId,
    pub frame: Frame,
}

/// A frame arriving on a bridge or host port.
#[derive(Debug, Clone, PartialEq)]
pub struct WiredFrameEvent {
    /// Receiving port, local to the target entity.
    pub port: PortId,
    pub frame: Frame,
}

/// A scheduled velocity change of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseChangeEvent {
    pub node: NodeId,
    pub velocity: Vec3,
}

/// Event payloads.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Entity-local timer.
    Timer { timer_id: u64 },
    /// Periodic mobility tick; positions are materialized and stations
    /// re-evaluate their link.
    MobilityTick,
    /// Periodic position report for observability.
    PositionReport,
    CourseChange(CourseChangeEvent),
    ProbeRequest(ProbeRequestEvent),
    ProbeResponse(ProbeResponseEvent),
    AssociationRequest(AssociationRequestEvent),
    AssociationResponse(AssociationResponseEvent),
    RadioFrame(RadioFrameEvent),
    WiredFrame(WiredFrameEvent),
    /// Frame handed from a bridge's radio port to its AP agent.
    RadioTxRequest(Frame),
    /// Frame handed from an application to its host for transmission.
    UplinkRequest(Frame),
    /// Frame handed from a host to the application that consumes it.
    Deliver(Frame),
    FlowStart { flow: FlowId },
    FlowStop { flow: FlowId },
    SimulationEnd,
}

impl EventPayload {
    /// Short payload name for logs and traces.
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::Timer { .. } => "Timer",
            EventPayload::MobilityTick => "MobilityTick",
            EventPayload::PositionReport => "PositionReport",
            EventPayload::CourseChange(_) => "CourseChange",
            EventPayload::ProbeRequest(_) => "ProbeRequest",
            EventPayload::ProbeResponse(_) => "ProbeResponse",
            EventPayload::AssociationRequest(_) => "AssociationRequest",
            EventPayload::AssociationResponse(_) => "AssociationResponse",
            EventPayload::RadioFrame(_) => "RadioFrame",
            EventPayload::WiredFrame(_) => "WiredFrame",
            EventPayload::RadioTxRequest(_) => "RadioTxRequest",
            EventPayload::UplinkRequest(_) => "UplinkRequest",
            EventPayload::Deliver(_) => "Deliver",
            EventPayload::FlowStart { .. } => "FlowStart",
            EventPayload::FlowStop { .. } => "FlowStop",
            EventPayload::SimulationEnd => "SimulationEnd",
        }
    }
}
