//! Learning bridge entity.

use crate::{Learned, MacTable};
use roamsim_common::{
    Entity, EntityId, Event, EventPayload, Frame, MacAddress, PortId, SimContext, SimError,
    SimTime, WiredFrameEvent,
};
use roamsim_metrics::{metric_defs, MetricLabels};
use serde::Serialize;
use std::any::Any;
use tracing::{debug, trace};

/// What sits on the far side of a bridge port.
#[derive(Debug, Clone, PartialEq)]
pub enum PortAttachment {
    /// Point-to-point wired link to port `peer_port` of entity `peer`.
    Link {
        peer: EntityId,
        peer_port: PortId,
        delay: SimTime,
    },
    /// The radio interface of an AP agent.
    Radio { ap: EntityId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgePort {
    pub name: String,
    pub attachment: PortAttachment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Wired line rate used for serialization delay; 0 means instantaneous.
    pub data_rate_bps: u64,
    /// MAC table ageing; `None` keeps entries until relearned elsewhere.
    pub ageing_time: Option<SimTime>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            data_rate_bps: 100_000_000,
            ageing_time: None,
        }
    }
}

/// Forwarding decision for one received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardDecision {
    Unicast(PortId),
    Flood(Vec<PortId>),
    /// Destination is on the ingress segment; nothing to send.
    Filter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub frames_received: u64,
    pub frames_forwarded: u64,
    pub frames_flooded: u64,
    pub frames_filtered: u64,
    pub mac_moves: u64,
}

/// One row of a MAC table dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacTableRow {
    pub address: MacAddress,
    pub port: PortId,
    pub port_name: String,
    pub last_seen: SimTime,
}

/// An N-port transparent learning bridge.
pub struct LearningBridge {
    id: EntityId,
    name: String,
    config: BridgeConfig,
    ports: Vec<BridgePort>,
    table: MacTable,
    stats: BridgeStats,
    labels: MetricLabels,
}

impl LearningBridge {
    pub fn new(id: EntityId, name: impl Into<String>, config: BridgeConfig) -> Self {
        let name = name.into();
        let labels = MetricLabels::new(name.clone(), "bridge");
        let table = MacTable::new(config.ageing_time);
        LearningBridge {
            id,
            name,
            config,
            ports: Vec::new(),
            table,
            stats: BridgeStats::default(),
            labels,
        }
    }

    /// Append a port; returns its index.
    pub fn add_port(&mut self, name: impl Into<String>, attachment: PortAttachment) -> PortId {
        let id = PortId(self.ports.len() as u16);
        self.ports.push(BridgePort {
            name: name.into(),
            attachment,
        });
        id
    }

    /// Index the next [`add_port`](Self::add_port) call will return, for
    /// wiring links whose far end is built first.
    pub fn next_port(&self) -> PortId {
        PortId(self.ports.len() as u16)
    }

    pub fn port(&self, port: PortId) -> Option<&BridgePort> {
        self.ports.get(usize::from(port.0))
    }

    pub fn ports(&self) -> &[BridgePort] {
        &self.ports
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn table(&self) -> &MacTable {
        &self.table
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Port through which `mac` is currently reached.
    pub fn port_for(&self, mac: MacAddress, now: SimTime) -> Option<PortId> {
        self.table.lookup(mac, now)
    }

    /// MAC table contents with port names resolved.
    pub fn mac_table(&self) -> Vec<MacTableRow> {
        self.table
            .iter()
            .map(|(address, entry)| MacTableRow {
                address: *address,
                port: entry.port,
                port_name: self
                    .port(entry.port)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
                last_seen: entry.last_seen,
            })
            .collect()
    }

    /// Learn the frame's source on `in_port` and decide where it goes.
    pub fn forward(&mut self, in_port: PortId, frame: &Frame, now: SimTime) -> ForwardDecision {
        let expired = self.table.expire(now);
        if expired > 0 {
            debug!("Bridge[{}]: {} MAC entries aged out", self.name, expired);
        }
        if !frame.src.is_broadcast() {
            if let Learned::Moved { from } = self.table.learn(frame.src, in_port, now) {
                self.stats.mac_moves += 1;
                metrics::counter!(metric_defs::BRIDGE_MAC_MOVES.name, &self.labels.to_labels())
                    .increment(1);
                debug!(
                    "Bridge[{}]: {} moved {} -> {}",
                    self.name,
                    frame.src,
                    self.port_label(from),
                    self.port_label(in_port)
                );
            }
            metrics::gauge!(metric_defs::BRIDGE_MAC_TABLE_SIZE.name, &self.labels.to_labels())
                .set(self.table.len() as f64);
        }

        if !frame.dst.is_broadcast() {
            match self.table.lookup(frame.dst, now) {
                Some(port) if port == in_port => return ForwardDecision::Filter,
                Some(port) => return ForwardDecision::Unicast(port),
                None => {}
            }
        }
        let out = (0..self.ports.len() as u16)
            .map(PortId)
            .filter(|p| *p != in_port)
            .collect();
        ForwardDecision::Flood(out)
    }

    fn port_label(&self, port: PortId) -> &str {
        self.port(port).map(|p| p.name.as_str()).unwrap_or("?")
    }

    fn transmit(&self, port: PortId, frame: &Frame, ctx: &mut SimContext) {
        let Some(p) = self.port(port) else {
            return;
        };
        match &p.attachment {
            PortAttachment::Link {
                peer,
                peer_port,
                delay,
            } => {
                let when =
                    *delay + SimTime::transmission(frame.size_bytes, self.config.data_rate_bps);
                ctx.post_event(
                    when,
                    vec![*peer],
                    EventPayload::WiredFrame(WiredFrameEvent {
                        port: *peer_port,
                        frame: frame.clone(),
                    }),
                );
            }
            PortAttachment::Radio { ap } => {
                ctx.post_immediate(vec![*ap], EventPayload::RadioTxRequest(frame.clone()));
            }
        }
    }

    fn on_frame(&mut self, ev: &WiredFrameEvent, ctx: &mut SimContext) -> Result<(), SimError> {
        if self.port(ev.port).is_none() {
            return Err(SimError::EntityFailure {
                entity: self.id,
                reason: format!("frame on unknown port {}", ev.port),
            });
        }
        self.stats.frames_received += 1;
        let decision = self.forward(ev.port, &ev.frame, ctx.time());
        trace!(
            "Bridge[{}]: {} -> {} on {}: {:?}",
            self.name,
            ev.frame.src,
            ev.frame.dst,
            self.port_label(ev.port),
            decision
        );
        match decision {
            ForwardDecision::Unicast(port) => {
                self.stats.frames_forwarded += 1;
                metrics::counter!(
                    metric_defs::BRIDGE_FRAMES_FORWARDED.name,
                    &self.labels.to_labels()
                )
                .increment(1);
                self.transmit(port, &ev.frame, ctx);
            }
            ForwardDecision::Flood(ports) => {
                self.stats.frames_flooded += 1;
                metrics::counter!(
                    metric_defs::BRIDGE_FRAMES_FLOODED.name,
                    &self.labels.to_labels()
                )
                .increment(1);
                for port in ports {
                    self.transmit(port, &ev.frame, ctx);
                }
            }
            ForwardDecision::Filter => {
                self.stats.frames_filtered += 1;
                metrics::counter!(
                    metric_defs::BRIDGE_FRAMES_FILTERED.name,
                    &self.labels.to_labels()
                )
                .increment(1);
            }
        }
        Ok(())
    }
}

impl Entity for LearningBridge {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::WiredFrame(ev) => self.on_frame(ev, ctx),
            _ => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
