//! Metrics infrastructure for the roamsim simulator.
//!
//! Every metric the simulator emits is declared here as a structured
//! [`Metric`] constant, so names cannot drift between emitters and exporters.
//! The `metrics` facade is a no-op until a recorder is installed.
//!
//! ```rust,ignore
//! use roamsim_metrics::{describe_metrics, metric_defs, MetricLabels};
//!
//! describe_metrics();
//! let labels = MetricLabels::new("sta-0-0", "station");
//! metrics::counter!(metric_defs::WIFI_SCANS_STARTED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use roamsim_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("roamsim.bridge.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["node"]);
///
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "roamsim.wifi.handoffs").
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Unit name, or an empty string for unitless metrics.
    pub fn unit_str(&self) -> &'static str {
        self.unit.map(|u| u.as_str()).unwrap_or("")
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the simulator.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on all node-scoped metrics.
    pub const STANDARD_LABELS: &[&str] = &["node", "node_type"];

    // ========================================================================
    // Wi-Fi management
    // ========================================================================

    pub const WIFI_PROBE_REQUESTS: Metric = Metric::counter("roamsim.wifi.probe_requests")
        .with_description("Probe requests sent by stations")
        .with_unit(Unit::Count)
        .with_labels(&["node", "node_type", "channel"]);

    pub const WIFI_PROBE_RESPONSES: Metric = Metric::counter("roamsim.wifi.probe_responses")
        .with_description("Probe responses sent by access points")
        .with_unit(Unit::Count)
        .with_labels(&["node", "node_type", "channel"]);

    /// Probe or association requests an AP did not answer.
    ///
    /// Labels: node, node_type, reason (`channel`, `ssid`, `signal`)
    pub const WIFI_REQUESTS_IGNORED: Metric = Metric::counter("roamsim.wifi.requests_ignored")
        .with_description("Management requests ignored by access points")
        .with_unit(Unit::Count)
        .with_labels(&["node", "node_type", "reason"]);

    pub const WIFI_SCANS_STARTED: Metric = Metric::counter("roamsim.wifi.scans_started")
        .with_description("Active scans started")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const WIFI_SCANS_EMPTY: Metric = Metric::counter("roamsim.wifi.scans_empty")
        .with_description("Scans that ended without a usable candidate")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const WIFI_SCAN_DURATION: Metric = Metric::histogram("roamsim.wifi.scan_duration_ms")
        .with_description("Time from scan start to selection")
        .with_unit(Unit::Milliseconds)
        .with_labels(STANDARD_LABELS);

    /// Labels: node, node_type, ap
    pub const WIFI_ASSOCIATIONS: Metric = Metric::counter("roamsim.wifi.associations")
        .with_description("Successful associations")
        .with_unit(Unit::Count)
        .with_labels(&["node", "node_type", "ap"]);

    /// Associations that moved a station from one AP to another.
    ///
    /// Labels: node, node_type, from, to
    pub const WIFI_HANDOFFS: Metric = Metric::counter("roamsim.wifi.handoffs")
        .with_description("Station handoffs between access points")
        .with_unit(Unit::Count)
        .with_labels(&["node", "node_type", "from", "to"]);

    pub const WIFI_ASSOCIATION_REJECTIONS: Metric =
        Metric::counter("roamsim.wifi.association_rejections")
            .with_description("Association attempts rejected or timed out")
            .with_unit(Unit::Count)
            .with_labels(&["node", "node_type", "ap"]);

    /// Signal from the serving AP, sampled at every mobility tick.
    pub const WIFI_STATION_RSSI: Metric = Metric::gauge("roamsim.wifi.station_rssi_dbm")
        .with_description("Received signal from the serving access point in dBm")
        .with_labels(&["node", "node_type", "ap"]);

    pub const WIFI_ASSOCIATED_STATIONS: Metric = Metric::gauge("roamsim.wifi.associated_stations")
        .with_description("Stations associated with an access point")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const WIFI_FRAMES_TX: Metric = Metric::counter("roamsim.wifi.frames_tx")
        .with_description("Data frames transmitted over the air")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const WIFI_FRAMES_RX: Metric = Metric::counter("roamsim.wifi.frames_rx")
        .with_description("Data frames received over the air")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Frames dropped at the receiver.
    ///
    /// Labels: node, node_type, reason (`weak`, `not_associated`, `unknown_station`)
    pub const WIFI_FRAMES_DROPPED: Metric = Metric::counter("roamsim.wifi.frames_dropped")
        .with_description("Data frames dropped at the radio")
        .with_unit(Unit::Count)
        .with_labels(&["node", "node_type", "reason"]);

    // ========================================================================
    // Bridging fabric
    // ========================================================================

    pub const BRIDGE_FRAMES_FORWARDED: Metric = Metric::counter("roamsim.bridge.frames_forwarded")
        .with_description("Frames forwarded to a single learned port")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const BRIDGE_FRAMES_FLOODED: Metric = Metric::counter("roamsim.bridge.frames_flooded")
        .with_description("Frames flooded to every port but the ingress")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const BRIDGE_FRAMES_FILTERED: Metric = Metric::counter("roamsim.bridge.frames_filtered")
        .with_description("Frames dropped because the destination is behind the ingress port")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const BRIDGE_MAC_MOVES: Metric = Metric::counter("roamsim.bridge.mac_moves")
        .with_description("Learned addresses that moved to a different port")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const BRIDGE_MAC_TABLE_SIZE: Metric = Metric::gauge("roamsim.bridge.mac_table_size")
        .with_description("Entries in the MAC table")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Traffic flows
    // ========================================================================

    pub const FLOW_PACKETS_SENT: Metric = Metric::counter("roamsim.flow.packets_sent")
        .with_description("Datagrams emitted by flow sources")
        .with_unit(Unit::Count)
        .with_labels(&["flow"]);

    pub const FLOW_PACKETS_RECEIVED: Metric = Metric::counter("roamsim.flow.packets_received")
        .with_description("Datagrams accepted by flow sinks")
        .with_unit(Unit::Count)
        .with_labels(&["flow"]);

    pub const FLOW_PACKETS_REJECTED: Metric = Metric::counter("roamsim.flow.packets_rejected")
        .with_description("Datagrams that reached a sink outside its window")
        .with_unit(Unit::Count)
        .with_labels(&["flow"]);

    pub const FLOW_LATENCY: Metric = Metric::histogram("roamsim.flow.latency_us")
        .with_description("One-way datagram latency")
        .with_unit(Unit::Microseconds)
        .with_labels(&["flow"]);

    /// Reception gaps longer than three send intervals, typically handoffs.
    pub const FLOW_GAP: Metric = Metric::histogram("roamsim.flow.gap_ms")
        .with_description("Reception gaps longer than three send intervals")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["flow"]);

    // ========================================================================
    // Simulation
    // ========================================================================

    pub const SIMULATION_EVENTS: Metric = Metric::counter("roamsim.simulation.events")
        .with_description("Events processed by the event loop")
        .with_unit(Unit::Count);

    pub const SIMULATION_TIME: Metric = Metric::gauge("roamsim.simulation.time_s")
        .with_description("Current simulated time")
        .with_unit(Unit::Seconds);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        // Wi-Fi management
        &WIFI_PROBE_REQUESTS,
        &WIFI_PROBE_RESPONSES,
        &WIFI_REQUESTS_IGNORED,
        &WIFI_SCANS_STARTED,
        &WIFI_SCANS_EMPTY,
        &WIFI_SCAN_DURATION,
        &WIFI_ASSOCIATIONS,
        &WIFI_HANDOFFS,
        &WIFI_ASSOCIATION_REJECTIONS,
        &WIFI_STATION_RSSI,
        &WIFI_ASSOCIATED_STATIONS,
        &WIFI_FRAMES_TX,
        &WIFI_FRAMES_RX,
        &WIFI_FRAMES_DROPPED,
        // Bridging
        &BRIDGE_FRAMES_FORWARDED,
        &BRIDGE_FRAMES_FLOODED,
        &BRIDGE_FRAMES_FILTERED,
        &BRIDGE_MAC_MOVES,
        &BRIDGE_MAC_TABLE_SIZE,
        // Flows
        &FLOW_PACKETS_SENT,
        &FLOW_PACKETS_RECEIVED,
        &FLOW_PACKETS_REJECTED,
        &FLOW_LATENCY,
        &FLOW_GAP,
        // Simulation
        &SIMULATION_EVENTS,
        &SIMULATION_TIME,
    ];
}

/// Labels identifying the entity a metric belongs to.
///
/// ```rust
/// use roamsim_metrics::MetricLabels;
///
/// let labels = MetricLabels::new("ap1", "access_point");
/// let extended = labels.with(&[("reason", "channel".to_string())]);
/// assert_eq!(extended.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Entity name
    pub node: String,
    /// `station`, `access_point`, `bridge`, `host`
    pub node_type: String,
}

impl MetricLabels {
    pub fn new(node: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            node_type: node_type.into(),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("node", self.node.clone()),
            ("node_type", self.node_type.clone()),
        ]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all metrics used in the simulator. Call once after installing a
/// recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_labels() {
        let labels = MetricLabels::new("sta-0-0", "station");
        let label_vec = labels.to_labels();
        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("node", "sta-0-0".to_string())));
        assert!(label_vec.contains(&("node_type", "station".to_string())));
    }

    #[test]
    fn test_with_extra_labels() {
        let labels = MetricLabels::new("ap0", "access_point");
        let extended = labels.with(&[("reason", "ssid".to_string()), ("channel", "1".to_string())]);
        assert_eq!(extended.len(), 4);
        assert!(extended.contains(&("reason", "ssid".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::WIFI_HANDOFFS.name, "roamsim.wifi.handoffs");
        assert_eq!(metric_defs::WIFI_HANDOFFS.kind, MetricKind::Counter);
        assert_eq!(metric_defs::WIFI_STATION_RSSI.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::WIFI_STATION_RSSI.unit, None);
        assert_eq!(metric_defs::FLOW_LATENCY.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::FLOW_LATENCY.unit, Some(Unit::Microseconds));
    }

    #[test]
    fn test_metric_names_are_unique_and_namespaced() {
        let mut seen = HashSet::new();
        for metric in metric_defs::ALL {
            assert!(metric.name.starts_with("roamsim."), "{}", metric.name);
            assert!(seen.insert(metric.name), "duplicate metric {}", metric.name);
            assert!(!metric.description.is_empty(), "{} lacks a description", metric.name);
        }
        assert_eq!(seen.len(), 26);
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::counter("minimal");
        assert_eq!(MINIMAL.kind, MetricKind::Counter);
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
    }

    #[test]
    fn test_describe_without_recorder_is_noop() {
        describe_metrics();
    }
}
