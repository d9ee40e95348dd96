//! Constant-bit-rate datagram source.

use roamsim_common::{
    entity_tracer::TraceEvent, Entity, EntityId, Event, EventHandle, EventPayload, FlowId, Frame,
    MacAddress, SimContext, SimError, SimTime,
};
use roamsim_metrics::{metric_defs, MetricLabels};
use std::any::Any;
use tracing::{debug, info};

/// Timer that emits the next datagram.
pub const TIMER_SEND: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct CbrConfig {
    pub flow: FlowId,
    pub src: MacAddress,
    pub dst: MacAddress,
    /// Destination port carried in every datagram.
    pub port: u16,
    pub interval: SimTime,
    pub packet_size: u32,
    /// Stop after this many datagrams; `None` sends until stopped.
    pub max_packets: Option<u64>,
}

/// Sends one datagram every `interval` between `FlowStart` and `FlowStop`.
pub struct CbrSource {
    id: EntityId,
    name: String,
    config: CbrConfig,
    /// Entity that puts our frames on the network (a wired host or a station).
    host: EntityId,
    running: bool,
    next_seq: u64,
    send_timer: Option<EventHandle>,
    labels: MetricLabels,
}

impl CbrSource {
    pub fn new(id: EntityId, name: impl Into<String>, config: CbrConfig, host: EntityId) -> Self {
        let name = name.into();
        let labels = MetricLabels::new(name.clone(), "cbr_source");
        CbrSource {
            id,
            name,
            config,
            host,
            running: false,
            next_seq: 0,
            send_timer: None,
            labels,
        }
    }

    pub fn flow(&self) -> FlowId {
        self.config.flow
    }

    pub fn config(&self) -> &CbrConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Datagrams sent so far.
    pub fn sent(&self) -> u64 {
        self.next_seq
    }

    fn exhausted(&self) -> bool {
        self.config.max_packets.is_some_and(|max| self.next_seq >= max)
    }

    fn start(&mut self, ctx: &mut SimContext) {
        if self.running {
            return;
        }
        info!("Source[{}]: starting {} at t={}", self.name, self.config.flow, ctx.time());
        self.running = true;
        self.send(ctx);
    }

    fn stop(&mut self, ctx: &mut SimContext) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(handle) = self.send_timer.take() {
            ctx.cancel(handle);
        }
        info!(
            "Source[{}]: stopped {} at t={} after {} datagrams",
            self.name,
            self.config.flow,
            ctx.time(),
            self.next_seq
        );
    }

    fn send(&mut self, ctx: &mut SimContext) {
        self.send_timer = None;
        if !self.running {
            return;
        }
        if self.exhausted() {
            debug!("Source[{}]: reached {} datagrams", self.name, self.next_seq);
            self.running = false;
            return;
        }
        let frame = Frame::data(
            self.config.src,
            self.config.dst,
            self.config.packet_size,
            self.config.flow,
            self.config.port,
            self.next_seq,
            ctx.time(),
        );
        ctx.post_immediate(vec![self.host], EventPayload::UplinkRequest(frame));
        metrics::counter!(
            metric_defs::FLOW_PACKETS_SENT.name,
            &self.labels.with(&[("flow", self.config.flow.to_string())])
        )
        .increment(1);
        ctx.tracer().log(
            TraceEvent::operation(Some(&self.name), self.id, ctx.time(), "send")
                .with_detail("seq", self.next_seq),
        );
        self.next_seq += 1;

        if !self.exhausted() {
            self.send_timer = Some(ctx.post_event(
                self.config.interval,
                vec![self.id],
                EventPayload::Timer {
                    timer_id: TIMER_SEND,
                },
            ));
        }
    }
}

impl Entity for CbrSource {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::FlowStart { flow } if *flow == self.config.flow => self.start(ctx),
            EventPayload::FlowStop { flow } if *flow == self.config.flow => self.stop(ctx),
            EventPayload::Timer {
                timer_id: TIMER_SEND,
            } => {
                ctx.tracer().log(
                    TraceEvent::timer(Some(&self.name), self.id, ctx.time(), "send")
                        .with_detail("seq", self.next_seq),
                );
                self.send(ctx);
            }
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
