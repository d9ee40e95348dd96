//! Wired host entity.

use roamsim_common::{
    Entity, EntityId, Event, EventPayload, Frame, FrameKind, MacAddress, PortId, SimContext,
    SimError, SimTime, WiredFrameEvent,
};
use serde::Serialize;
use std::any::Any;
use tracing::trace;

/// The host's single wired link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WiredUplink {
    pub peer: EntityId,
    pub peer_port: PortId,
    pub delay: SimTime,
    pub data_rate_bps: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub frames_tx: u64,
    pub frames_rx: u64,
    pub frames_ignored: u64,
}

/// A host with one wired interface, e.g. the server.
pub struct WiredHost {
    id: EntityId,
    name: String,
    mac: MacAddress,
    uplink: WiredUplink,
    apps: Vec<EntityId>,
    stats: HostStats,
}

impl WiredHost {
    pub fn new(id: EntityId, name: impl Into<String>, mac: MacAddress, uplink: WiredUplink) -> Self {
        WiredHost {
            id,
            name: name.into(),
            mac,
            uplink,
            apps: Vec::new(),
            stats: HostStats::default(),
        }
    }

    pub fn attach_app(&mut self, app: EntityId) {
        self.apps.push(app);
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    fn on_wired_frame(&mut self, ev: &WiredFrameEvent, ctx: &mut SimContext) {
        // Only datagrams addressed to us reach the applications; L2 updates
        // and frames flooded past us stop here.
        let wanted = matches!(ev.frame.kind, FrameKind::Data { .. }) && ev.frame.dst == self.mac;
        if !wanted {
            self.stats.frames_ignored += 1;
            trace!("Host[{}]: ignoring frame {} -> {}", self.name, ev.frame.src, ev.frame.dst);
            return;
        }
        self.stats.frames_rx += 1;
        if !self.apps.is_empty() {
            ctx.post_immediate(self.apps.clone(), EventPayload::Deliver(ev.frame.clone()));
        }
    }

    fn on_uplink_request(&mut self, frame: &Frame, ctx: &mut SimContext) {
        self.stats.frames_tx += 1;
        let serialization = SimTime::transmission(frame.size_bytes, self.uplink.data_rate_bps);
        ctx.post_event(
            self.uplink.delay + serialization,
            vec![self.uplink.peer],
            EventPayload::WiredFrame(WiredFrameEvent {
                port: self.uplink.peer_port,
                frame: frame.clone(),
            }),
        );
    }
}

impl Entity for WiredHost {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::WiredFrame(ev) => self.on_wired_frame(ev, ctx),
            EventPayload::UplinkRequest(frame) => self.on_uplink_request(frame, ctx),
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
