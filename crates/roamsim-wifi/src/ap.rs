//! Access point agent.
//!
//! Each AP sits on one fixed channel and answers probe and association
//! requests heard on that channel. Towards the wired side it is the radio port
//! of its bridge: frames the bridge sends out of that port arrive here as
//! [`EventPayload::RadioTxRequest`] and are put on the air to associated
//! stations; frames received from associated stations are handed back to the
//! bridge on the same port.

use crate::WifiParams;
use roamsim_common::{
    entity_tracer::TraceEvent, ApId, AssociationRequestEvent, AssociationResponseEvent, Channel,
    Entity, EntityId, Event, EventPayload, Frame, MacAddress, NodeId, PortId, ProbeRequestEvent,
    ProbeResponse, ProbeResponseEvent, RadioFrameEvent, SimContext, SimError, SimTime,
    WiredFrameEvent,
};
use roamsim_metrics::{metric_defs, MetricLabels};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

/// Identity and placement of one AP.
#[derive(Debug, Clone)]
pub struct AccessPointConfig {
    pub name: String,
    pub ap: ApId,
    /// Node carrying the AP radio.
    pub node: NodeId,
    pub channel: Channel,
    pub bssid: MacAddress,
}

/// A station the AP currently serves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssociatedStation {
    pub node: NodeId,
    pub entity: EntityId,
    pub since: SimTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApStats {
    pub probe_responses: u64,
    pub requests_ignored: u64,
    pub associations_accepted: u64,
    pub associations_rejected: u64,
    /// Associations dropped because the station showed up behind another AP.
    pub stale_associations_dropped: u64,
    pub frames_to_air: u64,
    pub frames_from_air: u64,
    pub frames_dropped: u64,
}

/// Access point entity.
pub struct AccessPointAgent {
    id: EntityId,
    config: AccessPointConfig,
    params: WifiParams,
    bridge: EntityId,
    bridge_port: PortId,
    associated: BTreeMap<MacAddress, AssociatedStation>,
    stats: ApStats,
    labels: MetricLabels,
}

impl AccessPointAgent {
    /// `bridge` is the AP's bridge entity and `bridge_port` the bridge port
    /// that stands for this radio.
    pub fn new(
        id: EntityId,
        config: AccessPointConfig,
        params: WifiParams,
        bridge: EntityId,
        bridge_port: PortId,
    ) -> Self {
        let labels = MetricLabels::new(config.name.clone(), "access_point");
        AccessPointAgent {
            id,
            config,
            params,
            bridge,
            bridge_port,
            associated: BTreeMap::new(),
            stats: ApStats::default(),
            labels,
        }
    }

    pub fn config(&self) -> &AccessPointConfig {
        &self.config
    }

    pub fn ap_id(&self) -> ApId {
        self.config.ap
    }

    pub fn channel(&self) -> Channel {
        self.config.channel
    }

    pub fn ssid(&self) -> &str {
        &self.params.ssid
    }

    pub fn stats(&self) -> &ApStats {
        &self.stats
    }

    pub fn is_associated(&self, station: MacAddress) -> bool {
        self.associated.contains_key(&station)
    }

    /// Stations currently associated, by MAC address.
    pub fn associated_stations(&self) -> impl Iterator<Item = (&MacAddress, &AssociatedStation)> {
        self.associated.iter()
    }

    fn ignore(&mut self, reason: &'static str, what: &str) {
        trace!("AP[{}]: ignoring {} ({})", self.config.name, what, reason);
        self.stats.requests_ignored += 1;
        metrics::counter!(
            metric_defs::WIFI_REQUESTS_IGNORED.name,
            &self.labels.with(&[("reason", reason.to_string())])
        )
        .increment(1);
    }

    /// Whether the AP can hear `node` right now.
    fn hears(&self, node: NodeId, ctx: &SimContext) -> Option<f64> {
        ctx.env()
            .signal_dbm(node, self.config.node, ctx.time())
            .filter(|s| self.params.is_usable(*s))
    }

    fn on_probe_request(&mut self, req: &ProbeRequestEvent, ctx: &mut SimContext) {
        if req.channel != self.config.channel {
            self.ignore("channel", "probe request");
            return;
        }
        if let Some(ssid) = &req.ssid {
            if *ssid != self.params.ssid {
                self.ignore("ssid", "probe request");
                return;
            }
        }
        if self.hears(req.station, ctx).is_none() {
            self.ignore("signal", "probe request");
            return;
        }
        let Some(signal_dbm) = ctx
            .env()
            .signal_dbm(self.config.node, req.station, ctx.time())
        else {
            return;
        };

        trace!(
            "AP[{}]: probe response to {} ({:.2} dBm)",
            self.config.name,
            req.station,
            signal_dbm
        );
        self.stats.probe_responses += 1;
        metrics::counter!(
            metric_defs::WIFI_PROBE_RESPONSES.name,
            &self.labels.with(&[("channel", self.config.channel.0.to_string())])
        )
        .increment(1);

        ctx.post_event(
            self.params.response_delay,
            vec![req.station_entity],
            EventPayload::ProbeResponse(ProbeResponseEvent {
                response: ProbeResponse {
                    ap: self.config.ap,
                    channel: self.config.channel,
                    ssid: self.params.ssid.clone(),
                    signal_dbm,
                },
                ap_node: self.config.node,
            }),
        );
    }

    fn on_association_request(&mut self, req: &AssociationRequestEvent, ctx: &mut SimContext) {
        if req.channel != self.config.channel {
            self.ignore("channel", "association request");
            return;
        }
        if self.hears(req.station, ctx).is_none() {
            self.ignore("signal", "association request");
            return;
        }

        let full = self
            .params
            .max_stations_per_ap
            .is_some_and(|max| self.associated.len() >= max);
        let accepted = self.associated.contains_key(&req.station_mac) || !full;

        if accepted {
            self.associated.insert(
                req.station_mac,
                AssociatedStation {
                    node: req.station,
                    entity: req.station_entity,
                    since: ctx.time(),
                },
            );
            self.stats.associations_accepted += 1;
            debug!(
                "AP[{}]: accepted association of {} ({} stations)",
                self.config.name,
                req.station_mac,
                self.associated.len()
            );
            metrics::gauge!(metric_defs::WIFI_ASSOCIATED_STATIONS.name, &self.labels.to_labels())
                .set(self.associated.len() as f64);
        } else {
            self.stats.associations_rejected += 1;
            debug!(
                "AP[{}]: rejected association of {} (full)",
                self.config.name, req.station_mac
            );
        }
        ctx.tracer().log(
            TraceEvent::operation(
                Some(&self.config.name),
                self.id,
                ctx.time(),
                if accepted { "association accepted" } else { "association rejected" },
            )
            .with_detail("station", req.station_mac),
        );

        ctx.post_event(
            self.params.response_delay,
            vec![req.station_entity],
            EventPayload::AssociationResponse(AssociationResponseEvent {
                ap: self.config.ap,
                channel: self.config.channel,
                accepted,
            }),
        );

        // Announce the station to the fabric the moment it becomes associated,
        // queued after the response so the station switches first.
        if accepted && self.params.l2_update_on_association {
            ctx.post_event(
                self.params.response_delay,
                vec![self.bridge],
                EventPayload::WiredFrame(WiredFrameEvent {
                    port: self.bridge_port,
                    frame: Frame::l2_update(req.station_mac),
                }),
            );
        }
    }

    /// A frame leaving the bridge through the radio port.
    fn on_downlink(&mut self, frame: &Frame, ctx: &mut SimContext) {
        if frame.is_l2_update() {
            // The station announced itself behind another AP.
            if self.associated.remove(&frame.src).is_some() {
                self.stats.stale_associations_dropped += 1;
                info!(
                    "AP[{}]: {} moved to another AP, dropping association",
                    self.config.name, frame.src
                );
                metrics::gauge!(metric_defs::WIFI_ASSOCIATED_STATIONS.name, &self.labels.to_labels())
                    .set(self.associated.len() as f64);
            }
            return;
        }

        let targets: Vec<EntityId> = if frame.dst.is_broadcast() {
            self.associated.values().map(|s| s.entity).collect()
        } else {
            match self.associated.get(&frame.dst) {
                Some(s) => vec![s.entity],
                None => Vec::new(),
            }
        };
        if targets.is_empty() {
            trace!(
                "AP[{}]: no associated station for {}",
                self.config.name,
                frame.dst
            );
            self.stats.frames_dropped += 1;
            metrics::counter!(
                metric_defs::WIFI_FRAMES_DROPPED.name,
                &self.labels.with(&[("reason", "unknown_station".to_string())])
            )
            .increment(1);
            return;
        }

        self.stats.frames_to_air += 1;
        metrics::counter!(metric_defs::WIFI_FRAMES_TX.name, &self.labels.to_labels()).increment(1);
        ctx.post_event(
            self.params.airtime(frame.size_bytes),
            targets,
            EventPayload::RadioFrame(RadioFrameEvent {
                ap: self.config.ap,
                channel: self.config.channel,
                tx_node: self.config.node,
                frame: frame.clone(),
            }),
        );
    }

    /// A frame received over the air from a station.
    fn on_uplink(&mut self, ev: &RadioFrameEvent, ctx: &mut SimContext) {
        if ev.ap != self.config.ap || ev.channel != self.config.channel {
            return;
        }
        let reason = if !self.associated.contains_key(&ev.frame.src) {
            Some("not_associated")
        } else if self.hears(ev.tx_node, ctx).is_none() {
            Some("weak")
        } else {
            None
        };
        if let Some(reason) = reason {
            trace!(
                "AP[{}]: dropping uplink frame from {} ({})",
                self.config.name,
                ev.frame.src,
                reason
            );
            self.stats.frames_dropped += 1;
            metrics::counter!(
                metric_defs::WIFI_FRAMES_DROPPED.name,
                &self.labels.with(&[("reason", reason.to_string())])
            )
            .increment(1);
            return;
        }

        self.stats.frames_from_air += 1;
        metrics::counter!(metric_defs::WIFI_FRAMES_RX.name, &self.labels.to_labels()).increment(1);
        ctx.post_immediate(
            vec![self.bridge],
            EventPayload::WiredFrame(WiredFrameEvent {
                port: self.bridge_port,
                frame: ev.frame.clone(),
            }),
        );
    }
}

impl Entity for AccessPointAgent {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::ProbeRequest(req) => self.on_probe_request(req, ctx),
            EventPayload::AssociationRequest(req) => self.on_association_request(req, ctx),
            EventPayload::RadioTxRequest(frame) => self.on_downlink(frame, ctx),
            EventPayload::RadioFrame(ev) => self.on_uplink(ev, ctx),
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
