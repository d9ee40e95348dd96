//! Flow sink.

use roamsim_common::{
    Entity, EntityId, Event, EventPayload, FlowId, Frame, FrameKind, SimContext, SimError,
    SimTime,
};
use roamsim_metrics::{metric_defs, MetricLabels};
use serde::Serialize;
use std::any::Any;
use tracing::{debug, trace};

/// One datagram as seen by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reception {
    pub seq: u64,
    pub sent_at: SimTime,
    pub received_at: SimTime,
}

/// Consumes the datagrams of one flow, but only while listening, i.e. between
/// its own `FlowStart` and `FlowStop`.
pub struct FlowSink {
    id: EntityId,
    name: String,
    flow: FlowId,
    listening: bool,
    receptions: Vec<Reception>,
    rejected: u64,
    labels: MetricLabels,
}

impl FlowSink {
    pub fn new(id: EntityId, name: impl Into<String>, flow: FlowId) -> Self {
        let name = name.into();
        let labels = MetricLabels::new(name.clone(), "flow_sink");
        FlowSink {
            id,
            name,
            flow,
            listening: false,
            receptions: Vec::new(),
            rejected: 0,
            labels,
        }
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Accepted datagrams in arrival order.
    pub fn receptions(&self) -> &[Reception] {
        &self.receptions
    }

    /// Datagrams of this flow that arrived outside the listening window.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    fn on_deliver(&mut self, frame: &Frame, ctx: &SimContext) {
        let FrameKind::Data {
            flow, seq, sent_at, ..
        } = frame.kind
        else {
            return;
        };
        if flow != self.flow {
            return;
        }
        let labels = self.labels.with(&[("flow", flow.to_string())]);
        if !self.listening {
            trace!("Sink[{}]: not listening, dropping seq {}", self.name, seq);
            self.rejected += 1;
            metrics::counter!(metric_defs::FLOW_PACKETS_REJECTED.name, &labels).increment(1);
            return;
        }
        let now = ctx.time();
        metrics::counter!(metric_defs::FLOW_PACKETS_RECEIVED.name, &labels).increment(1);
        metrics::histogram!(metric_defs::FLOW_LATENCY.name, &labels)
            .record(now.saturating_sub(sent_at).as_micros() as f64);
        self.receptions.push(Reception {
            seq,
            sent_at,
            received_at: now,
        });
    }
}

impl Entity for FlowSink {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::FlowStart { flow } if *flow == self.flow => {
                debug!("Sink[{}]: listening for {}", self.name, flow);
                self.listening = true;
            }
            EventPayload::FlowStop { flow } if *flow == self.flow => {
                debug!("Sink[{}]: stopped listening for {}", self.name, flow);
                self.listening = false;
            }
            EventPayload::Deliver(frame) => self.on_deliver(frame, ctx),
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::deliver;
    use roamsim_common::{EventQueue, MacAddress};

    fn datagram(flow: u32, seq: u64) -> EventPayload {
        EventPayload::Deliver(Frame::data(
            MacAddress::from_index(1),
            MacAddress::from_index(2),
            1450,
            FlowId(flow),
            9,
            seq,
            SimTime::ZERO,
        ))
    }

    #[test]
    fn test_accepts_only_inside_window() {
        let mut q = EventQueue::new();
        let mut sink = FlowSink::new(EntityId(0), "sink", FlowId(0));
        deliver(&mut q, &mut sink, datagram(0, 0)).unwrap();
        assert_eq!(sink.rejected(), 1);

        deliver(&mut q, &mut sink, EventPayload::FlowStart { flow: FlowId(0) }).unwrap();
        q.advance_to(SimTime::from_millis(3));
        deliver(&mut q, &mut sink, datagram(0, 1)).unwrap();
        deliver(&mut q, &mut sink, datagram(4, 1)).unwrap();
        assert_eq!(
            sink.receptions(),
            &[Reception {
                seq: 1,
                sent_at: SimTime::ZERO,
                received_at: SimTime::from_millis(3),
            }]
        );

        deliver(&mut q, &mut sink, EventPayload::FlowStop { flow: FlowId(0) }).unwrap();
        deliver(&mut q, &mut sink, datagram(0, 2)).unwrap();
        assert_eq!(sink.receptions().len(), 1);
        assert_eq!(sink.rejected(), 2);
    }
}
