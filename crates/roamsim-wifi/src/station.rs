//! Station handoff state machine.
//!
//! A station starts `UNASSOCIATED` and runs an active scan at start-up. While
//! associated it checks the serving AP's signal at every mobility tick; once
//! the signal drops below the usable threshold it scans again:
//!
//! ```text
//! UNASSOCIATED ──startup/retry──▶ SCANNING ──all channels probed──▶ SELECTING
//!      ▲                              ▲                               │   │
//!      │ no candidate,                │ degraded                      │   │ best response
//!      │ prior link unusable          │                               │   ▼
//!      └──────────────────────── ASSOCIATED(k) ◀──accepted── ASSOCIATING(k)
//!                                                                  │
//!                        rejected / timed out: drop candidate ─────┘─▶ SELECTING
//! ```
//!
//! The station keeps its prior association through a scan; a new association
//! replaces it implicitly.

use crate::{select_best, WifiParams};
use roamsim_common::{
    entity_tracer::TraceEvent, ApId, AssociationRequestEvent, AssociationResponseEvent, Channel,
    Entity, EntityId, Event, EventHandle, EventPayload, Frame, MacAddress, NodeId,
    ProbeRequestEvent, ProbeResponse, RadioFrameEvent, SimContext, SimError, SimTime,
};
use roamsim_metrics::{metric_defs, MetricLabels};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use tracing::{debug, info, trace, warn};

// ============================================================================
// Timer IDs
// ============================================================================

/// Timer that starts the initial scan. Scheduled by whoever builds the station.
pub const TIMER_STARTUP: u64 = 0;
const TIMER_CHANNEL_DWELL: u64 = 1;
const TIMER_SCAN_DEADLINE: u64 = 2;
const TIMER_SCAN_RETRY: u64 = 3;
const TIMER_ASSOCIATION_TIMEOUT: u64 = 4;

fn timer_name(timer_id: u64) -> &'static str {
    match timer_id {
        TIMER_STARTUP => "startup",
        TIMER_CHANNEL_DWELL => "channel dwell",
        TIMER_SCAN_DEADLINE => "scan deadline",
        TIMER_SCAN_RETRY => "scan retry",
        TIMER_ASSOCIATION_TIMEOUT => "association timeout",
        _ => "unknown",
    }
}

// ============================================================================
// Types
// ============================================================================

/// State of the handoff state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StationState {
    Unassociated,
    Scanning,
    Selecting,
    Associating(ApId),
    Associated(ApId),
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationState::Unassociated => write!(f, "UNASSOCIATED"),
            StationState::Scanning => write!(f, "SCANNING"),
            StationState::Selecting => write!(f, "SELECTING"),
            StationState::Associating(ap) => write!(f, "ASSOCIATING({})", ap),
            StationState::Associated(ap) => write!(f, "ASSOCIATED({})", ap),
        }
    }
}

/// What a station knows about an AP before scanning: where to send
/// management frames and which node to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApDirectoryEntry {
    pub ap: ApId,
    pub entity: EntityId,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub name: String,
    pub node: NodeId,
    pub mac: MacAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Association {
    ap: ApId,
    channel: Channel,
}

/// One change of association, for the handoff timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssociationRecord {
    pub time: SimTime,
    /// Previous AP, if any.
    pub from: Option<ApId>,
    /// New AP; `None` when the association was lost.
    pub to: Option<ApId>,
    /// Signal of the new AP as reported in its probe response.
    pub signal_dbm: Option<f64>,
}

impl AssociationRecord {
    pub fn is_handoff(&self) -> bool {
        matches!((self.from, self.to), (Some(a), Some(b)) if a != b)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StationStats {
    pub scans: u64,
    pub empty_scans: u64,
    pub probes_sent: u64,
    pub probe_responses: u64,
    pub associations: u64,
    pub handoffs: u64,
    pub rejections: u64,
    pub frames_rx: u64,
    pub frames_tx: u64,
    pub frames_dropped: u64,
}

#[derive(Debug, Default)]
struct ScanState {
    channel_index: usize,
    started_at: SimTime,
    results: Vec<ProbeResponse>,
}

#[derive(Debug, Default)]
struct Timers {
    dwell: Option<EventHandle>,
    deadline: Option<EventHandle>,
    retry: Option<EventHandle>,
    association: Option<EventHandle>,
}

// ============================================================================
// Station Entity
// ============================================================================

/// Wi-Fi station entity: the handoff state machine plus the host side of the
/// radio (delivering received frames to local applications and sending theirs
/// through the serving AP).
pub struct Station {
    id: EntityId,
    config: StationConfig,
    params: WifiParams,
    aps: Vec<ApDirectoryEntry>,
    apps: Vec<EntityId>,

    state: StationState,
    /// Operating channel; follows the scan, then the serving AP.
    channel: Channel,
    association: Option<Association>,
    scan: ScanState,
    timers: Timers,

    timeline: Vec<AssociationRecord>,
    stats: StationStats,
    labels: MetricLabels,
}

impl Station {
    pub fn new(id: EntityId, config: StationConfig, params: WifiParams, aps: Vec<ApDirectoryEntry>) -> Self {
        let labels = MetricLabels::new(config.name.clone(), "station");
        let channel = params.scan_channels.first().copied().unwrap_or(Channel(1));
        Station {
            id,
            config,
            params,
            aps,
            apps: Vec::new(),
            state: StationState::Unassociated,
            channel,
            association: None,
            scan: ScanState::default(),
            timers: Timers::default(),
            timeline: Vec::new(),
            stats: StationStats::default(),
            labels,
        }
    }

    /// Register an application entity that consumes frames for this station.
    pub fn attach_app(&mut self, app: EntityId) {
        self.apps.push(app);
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn node(&self) -> NodeId {
        self.config.node
    }

    pub fn mac(&self) -> MacAddress {
        self.config.mac
    }

    pub fn state(&self) -> StationState {
        self.state
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// The AP the station is associated with, only while in `ASSOCIATED`.
    pub fn associated_ap(&self) -> Option<ApId> {
        match self.state {
            StationState::Associated(ap) => Some(ap),
            _ => None,
        }
    }

    /// Responses collected by the scan in progress (or the last one).
    pub fn scan_results(&self) -> &[ProbeResponse] {
        &self.scan.results
    }

    pub fn timeline(&self) -> &[AssociationRecord] {
        &self.timeline
    }

    pub fn stats(&self) -> &StationStats {
        &self.stats
    }

    fn directory(&self, ap: ApId) -> Option<ApDirectoryEntry> {
        self.aps.iter().find(|e| e.ap == ap).copied()
    }

    fn set_state(&mut self, state: StationState, ctx: &SimContext) {
        if self.state == state {
            return;
        }
        trace!("Station[{}]: {} -> {}", self.config.name, self.state, state);
        ctx.tracer().log_state_change(
            Some(&self.config.name),
            self.id,
            ctx.time(),
            format!("{} -> {}", self.state, state),
        );
        self.state = state;
    }

    fn signal_from(&self, ap: ApId, ctx: &SimContext) -> Option<f64> {
        let entry = self.directory(ap)?;
        ctx.env().signal_dbm(entry.node, self.config.node, ctx.time())
    }

    fn link_usable(&self, ap: ApId, ctx: &SimContext) -> bool {
        self.signal_from(ap, ctx)
            .is_some_and(|s| self.params.is_usable(s))
    }

    fn cancel(slot: &mut Option<EventHandle>, ctx: &mut SimContext) {
        if let Some(handle) = slot.take() {
            ctx.cancel(handle);
        }
    }

    fn timer(&self, delay: SimTime, timer_id: u64, ctx: &mut SimContext) -> Option<EventHandle> {
        Some(ctx.post_event(delay, vec![self.id], EventPayload::Timer { timer_id }))
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    fn start_scan(&mut self, ctx: &mut SimContext) {
        Self::cancel(&mut self.timers.retry, ctx);
        self.set_state(StationState::Scanning, ctx);
        self.scan = ScanState {
            channel_index: 0,
            started_at: ctx.time(),
            results: Vec::new(),
        };
        self.stats.scans += 1;
        metrics::counter!(metric_defs::WIFI_SCANS_STARTED.name, &self.labels.to_labels()).increment(1);
        debug!(
            "Station[{}]: scanning {} channels",
            self.config.name,
            self.params.scan_channels.len()
        );

        if self.params.scan_channels.is_empty() {
            self.finish_scan(ctx);
            return;
        }
        self.timers.deadline = self.timer(self.params.scan_deadline, TIMER_SCAN_DEADLINE, ctx);
        self.probe_current_channel(ctx);
    }

    fn probe_current_channel(&mut self, ctx: &mut SimContext) {
        let Some(&channel) = self.params.scan_channels.get(self.scan.channel_index) else {
            return;
        };
        self.channel = channel;
        self.stats.probes_sent += 1;
        metrics::counter!(
            metric_defs::WIFI_PROBE_REQUESTS.name,
            &self.labels.with(&[("channel", channel.0.to_string())])
        )
        .increment(1);

        // Broadcast medium: every AP sees the request and filters by channel.
        let targets: Vec<EntityId> = self.aps.iter().map(|e| e.entity).collect();
        ctx.post_immediate(
            targets,
            EventPayload::ProbeRequest(ProbeRequestEvent {
                station: self.config.node,
                station_entity: self.id,
                channel,
                ssid: Some(self.params.ssid.clone()),
            }),
        );
        self.timers.dwell = self.timer(self.params.probe_timeout, TIMER_CHANNEL_DWELL, ctx);
    }

    fn on_channel_dwell_elapsed(&mut self, ctx: &mut SimContext) {
        self.timers.dwell = None;
        if self.state != StationState::Scanning {
            return;
        }
        self.scan.channel_index += 1;
        if self.scan.channel_index < self.params.scan_channels.len() {
            self.probe_current_channel(ctx);
        } else {
            self.finish_scan(ctx);
        }
    }

    fn on_scan_deadline(&mut self, ctx: &mut SimContext) {
        self.timers.deadline = None;
        if self.state != StationState::Scanning {
            return;
        }
        debug!("Station[{}]: scan deadline reached", self.config.name);
        self.finish_scan(ctx);
    }

    fn on_probe_response(&mut self, response: &ProbeResponse) {
        if self.state != StationState::Scanning
            || response.channel != self.channel
            || response.ssid != self.params.ssid
        {
            trace!(
                "Station[{}]: ignoring probe response from {}",
                self.config.name,
                response.ap
            );
            return;
        }
        self.stats.probe_responses += 1;
        self.scan.results.push(response.clone());
    }

    fn finish_scan(&mut self, ctx: &mut SimContext) {
        Self::cancel(&mut self.timers.dwell, ctx);
        Self::cancel(&mut self.timers.deadline, ctx);
        let elapsed = ctx.time().saturating_sub(self.scan.started_at);
        metrics::histogram!(metric_defs::WIFI_SCAN_DURATION.name, &self.labels.to_labels())
            .record(elapsed.as_micros() as f64 / 1000.0);
        debug!(
            "Station[{}]: scan complete, {} responses",
            self.config.name,
            self.scan.results.len()
        );
        self.set_state(StationState::Selecting, ctx);
        self.select(ctx);
    }

    // ========================================================================
    // Selection and association
    // ========================================================================

    fn select(&mut self, ctx: &mut SimContext) {
        match select_best(&self.scan.results).cloned() {
            Some(best) => self.begin_association(best, ctx),
            None => self.no_candidates(ctx),
        }
    }

    fn no_candidates(&mut self, ctx: &mut SimContext) {
        self.stats.empty_scans += 1;
        metrics::counter!(metric_defs::WIFI_SCANS_EMPTY.name, &self.labels.to_labels()).increment(1);

        match self.association {
            Some(prior) if self.link_usable(prior.ap, ctx) => {
                debug!(
                    "Station[{}]: no candidates, keeping {}",
                    self.config.name, prior.ap
                );
                self.channel = prior.channel;
                self.set_state(StationState::Associated(prior.ap), ctx);
            }
            prior => {
                if let Some(prior) = prior {
                    info!(
                        "Station[{}]: lost association with {} at {}",
                        self.config.name,
                        prior.ap,
                        self.position_str(ctx)
                    );
                    self.timeline.push(AssociationRecord {
                        time: ctx.time(),
                        from: Some(prior.ap),
                        to: None,
                        signal_dbm: None,
                    });
                }
                self.association = None;
                self.set_state(StationState::Unassociated, ctx);
            }
        }
        self.timers.retry = self.timer(self.params.scan_backoff, TIMER_SCAN_RETRY, ctx);
    }

    fn begin_association(&mut self, candidate: ProbeResponse, ctx: &mut SimContext) {
        let Some(entry) = self.directory(candidate.ap) else {
            warn!(
                "Station[{}]: response from unknown {}",
                self.config.name, candidate.ap
            );
            self.drop_candidate(candidate.ap, ctx);
            return;
        };
        debug!(
            "Station[{}]: associating with {} on {} ({:.2} dBm)",
            self.config.name, candidate.ap, candidate.channel, candidate.signal_dbm
        );
        self.channel = candidate.channel;
        self.set_state(StationState::Associating(candidate.ap), ctx);
        ctx.post_immediate(
            vec![entry.entity],
            EventPayload::AssociationRequest(AssociationRequestEvent {
                station: self.config.node,
                station_entity: self.id,
                station_mac: self.config.mac,
                channel: candidate.channel,
            }),
        );
        self.timers.association =
            self.timer(self.params.association_timeout, TIMER_ASSOCIATION_TIMEOUT, ctx);
    }

    fn on_association_response(&mut self, resp: &AssociationResponseEvent, ctx: &mut SimContext) {
        if self.state != StationState::Associating(resp.ap) {
            trace!(
                "Station[{}]: stale association response from {}",
                self.config.name,
                resp.ap
            );
            return;
        }
        Self::cancel(&mut self.timers.association, ctx);
        if resp.accepted {
            self.complete_association(resp.ap, resp.channel, ctx);
        } else {
            debug!("Station[{}]: {} rejected association", self.config.name, resp.ap);
            self.drop_candidate(resp.ap, ctx);
        }
    }

    fn on_association_timeout(&mut self, ctx: &mut SimContext) {
        self.timers.association = None;
        if let StationState::Associating(ap) = self.state {
            debug!("Station[{}]: no association response from {}", self.config.name, ap);
            self.drop_candidate(ap, ctx);
        }
    }

    /// Remove a candidate that would not take us and select again.
    fn drop_candidate(&mut self, ap: ApId, ctx: &mut SimContext) {
        self.stats.rejections += 1;
        metrics::counter!(
            metric_defs::WIFI_ASSOCIATION_REJECTIONS.name,
            &self.labels.with(&[("ap", ap.to_string())])
        )
        .increment(1);
        self.scan.results.retain(|r| r.ap != ap);
        self.set_state(StationState::Selecting, ctx);
        self.select(ctx);
    }

    fn complete_association(&mut self, ap: ApId, channel: Channel, ctx: &mut SimContext) {
        let previous = self.association.map(|a| a.ap);
        let signal_dbm = self
            .scan
            .results
            .iter()
            .find(|r| r.ap == ap)
            .map(|r| r.signal_dbm);

        self.association = Some(Association { ap, channel });
        self.channel = channel;
        self.set_state(StationState::Associated(ap), ctx);
        self.stats.associations += 1;
        metrics::counter!(
            metric_defs::WIFI_ASSOCIATIONS.name,
            &self.labels.with(&[("ap", ap.to_string())])
        )
        .increment(1);

        if previous == Some(ap) {
            debug!("Station[{}]: re-associated with {}", self.config.name, ap);
            return;
        }
        let record = AssociationRecord {
            time: ctx.time(),
            from: previous,
            to: Some(ap),
            signal_dbm,
        };
        match previous {
            Some(from) => {
                self.stats.handoffs += 1;
                metrics::counter!(
                    metric_defs::WIFI_HANDOFFS.name,
                    &self.labels.with(&[("from", from.to_string()), ("to", ap.to_string())])
                )
                .increment(1);
                info!(
                    "Station[{}]: handoff {} -> {} ({}) at t={} {}",
                    self.config.name,
                    from,
                    ap,
                    channel,
                    ctx.time(),
                    self.position_str(ctx)
                );
            }
            None => {
                info!(
                    "Station[{}]: associated with {} ({}) at t={} {}",
                    self.config.name,
                    ap,
                    channel,
                    ctx.time(),
                    self.position_str(ctx)
                );
            }
        }
        ctx.tracer().log(
            TraceEvent::operation(Some(&self.config.name), self.id, ctx.time(), "associated")
                .with_detail("ap", ap)
                .with_detail("channel", channel),
        );
        self.timeline.push(record);
    }

    fn position_str(&self, ctx: &SimContext) -> String {
        match ctx.env().position(self.config.node, ctx.time()) {
            Some(p) => format!("x = {:.2}, y = {:.2}", p.x, p.y),
            None => String::from("position unknown"),
        }
    }

    // ========================================================================
    // Link supervision
    // ========================================================================

    fn on_mobility_tick(&mut self, ctx: &mut SimContext) {
        let StationState::Associated(ap) = self.state else {
            return;
        };
        let Some(signal) = self.signal_from(ap, ctx) else {
            return;
        };
        metrics::gauge!(
            metric_defs::WIFI_STATION_RSSI.name,
            &self.labels.with(&[("ap", ap.to_string())])
        )
        .set(signal);

        if !self.params.is_usable(signal) && self.timers.retry.is_none() {
            info!(
                "Station[{}]: signal to {} degraded to {:.2} dBm at {}, scanning",
                self.config.name,
                ap,
                signal,
                self.position_str(ctx)
            );
            self.start_scan(ctx);
        }
    }

    fn on_retry(&mut self, ctx: &mut SimContext) {
        self.timers.retry = None;
        match self.state {
            StationState::Unassociated => self.start_scan(ctx),
            StationState::Associated(ap) if !self.link_usable(ap, ctx) => self.start_scan(ctx),
            _ => {}
        }
    }

    // ========================================================================
    // Data path
    // ========================================================================

    fn drop_frame(&mut self, reason: &'static str) {
        self.stats.frames_dropped += 1;
        metrics::counter!(
            metric_defs::WIFI_FRAMES_DROPPED.name,
            &self.labels.with(&[("reason", reason.to_string())])
        )
        .increment(1);
    }

    fn on_radio_frame(&mut self, ev: &RadioFrameEvent, ctx: &mut SimContext) {
        if !ev.frame.is_for(self.config.mac) {
            return;
        }
        // Only the serving AP on the current channel is heard.
        if self.state != StationState::Associated(ev.ap) || ev.channel != self.channel {
            trace!(
                "Station[{}]: dropping frame from {} in state {}",
                self.config.name,
                ev.ap,
                self.state
            );
            self.drop_frame("not_associated");
            return;
        }
        let usable = ctx
            .env()
            .signal_dbm(ev.tx_node, self.config.node, ctx.time())
            .is_some_and(|s| self.params.is_usable(s));
        if !usable {
            self.drop_frame("weak");
            return;
        }
        self.stats.frames_rx += 1;
        metrics::counter!(metric_defs::WIFI_FRAMES_RX.name, &self.labels.to_labels()).increment(1);
        if !self.apps.is_empty() {
            ctx.post_immediate(self.apps.clone(), EventPayload::Deliver(ev.frame.clone()));
        }
    }

    fn on_uplink_request(&mut self, frame: &Frame, ctx: &mut SimContext) {
        let StationState::Associated(ap) = self.state else {
            self.drop_frame("not_associated");
            return;
        };
        let Some(entry) = self.directory(ap) else {
            self.drop_frame("not_associated");
            return;
        };
        self.stats.frames_tx += 1;
        metrics::counter!(metric_defs::WIFI_FRAMES_TX.name, &self.labels.to_labels()).increment(1);
        ctx.post_event(
            self.params.airtime(frame.size_bytes),
            vec![entry.entity],
            EventPayload::RadioFrame(RadioFrameEvent {
                ap,
                channel: self.channel,
                tx_node: self.config.node,
                frame: frame.clone(),
            }),
        );
    }
}

impl Entity for Station {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::Timer { timer_id } => {
                ctx.tracer().log(
                    TraceEvent::timer(
                        Some(&self.config.name),
                        self.id,
                        ctx.time(),
                        timer_name(*timer_id),
                    )
                    .with_detail("state", self.state),
                );
                match *timer_id {
                    TIMER_STARTUP => {
                        if self.state == StationState::Unassociated {
                            self.start_scan(ctx);
                        }
                    }
                    TIMER_CHANNEL_DWELL => self.on_channel_dwell_elapsed(ctx),
                    TIMER_SCAN_DEADLINE => self.on_scan_deadline(ctx),
                    TIMER_SCAN_RETRY => self.on_retry(ctx),
                    TIMER_ASSOCIATION_TIMEOUT => self.on_association_timeout(ctx),
                    _ => {}
                }
            }
            EventPayload::MobilityTick => self.on_mobility_tick(ctx),
            EventPayload::ProbeResponse(ev) => self.on_probe_response(&ev.response),
            EventPayload::AssociationResponse(resp) => self.on_association_response(resp, ctx),
            EventPayload::RadioFrame(ev) => self.on_radio_frame(ev, ctx),
            EventPayload::UplinkRequest(frame) => self.on_uplink_request(frame, ctx),
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
