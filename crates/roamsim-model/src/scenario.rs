//! Scenario configuration.
//!
//! Every field has a default, and the defaults reproduce the reference
//! roaming scenario: three APs 150 m apart on channels 1, 6 and 11, two
//! stations per cell, station `sta-0-0` moving along the AP line at 10 m/s,
//! and a 1450-byte datagram every 10 ms from the server to that station.

use crate::ModelError;
use roamsim_common::{Channel, SimTime, Vec3};
use roamsim_radio::{PropagationConfig, DEFAULT_TX_POWER_DBM};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the wired server host.
pub const SERVER_NAME: &str = "server";
/// Name of the central switch.
pub const SWITCH_NAME: &str = "switch";

/// Name of station `index` of cell `cell`.
pub fn station_name(cell: usize, index: usize) -> String {
    format!("sta-{}-{}", cell, index)
}

pub fn ap_name(index: usize) -> String {
    format!("ap{}", index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Seed for every stochastic element (only shadowing at present).
    pub seed: u64,
    pub duration_s: f64,
    pub topology: TopologyConfig,
    pub radio: RadioConfig,
    pub wifi: WifiConfig,
    pub wired: WiredConfig,
    pub mobility: MobilityConfig,
    pub flows: Vec<FlowConfig>,
    /// Entity trace selection, e.g. `"sta-0-0,ap1"` or `"*"`.
    pub trace: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            seed: 0,
            duration_s: 60.0,
            topology: TopologyConfig::default(),
            radio: RadioConfig::default(),
            wifi: WifiConfig::default(),
            wired: WiredConfig::default(),
            mobility: MobilityConfig::default(),
            flows: vec![FlowConfig::default()],
            trace: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopologyConfig {
    pub ap_count: usize,
    /// Distance between neighbouring APs along the x axis.
    pub ap_spacing_m: f64,
    /// AP `i` uses `channels[i % channels.len()]`.
    pub channels: Vec<u8>,
    pub ssid: String,
    pub stations_per_cell: usize,
    /// Stations of every cell sit on a column at x = 0, y = k * spacing.
    pub station_grid_spacing_m: f64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            ap_count: 3,
            ap_spacing_m: 150.0,
            channels: vec![1, 6, 11],
            ssid: "wifi-default".to_string(),
            stations_per_cell: 2,
            station_grid_spacing_m: 5.0,
        }
    }
}

impl TopologyConfig {
    pub fn ap_channel(&self, index: usize) -> Option<Channel> {
        if self.channels.is_empty() {
            return None;
        }
        Some(Channel(self.channels[index % self.channels.len()]))
    }

    pub fn ap_position(&self, index: usize) -> Vec3 {
        Vec3::new(index as f64 * self.ap_spacing_m, 0.0, 0.0)
    }

    pub fn station_position(&self, index: usize) -> Vec3 {
        Vec3::new(0.0, index as f64 * self.station_grid_spacing_m, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadioConfig {
    pub tx_power_dbm: f64,
    pub rx_sensitivity_dbm: f64,
    /// Margin above sensitivity for a link to count as usable.
    pub roam_margin_db: f64,
    pub propagation: PropagationConfig,
    /// Standard deviation of log-normal shadowing; 0 disables it.
    pub shadowing_std_dev_db: f64,
    pub shadowing_coherence_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            rx_sensitivity_dbm: -98.65,
            roam_margin_db: 0.0,
            propagation: PropagationConfig::default(),
            shadowing_std_dev_db: 0.0,
            shadowing_coherence_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WifiConfig {
    /// Dwell time per scanned channel.
    pub probe_timeout_ms: u64,
    /// Whole-scan deadline; defaults to one dwell per channel plus one.
    pub scan_deadline_ms: Option<u64>,
    pub probe_response_delay_us: u64,
    pub association_timeout_ms: u64,
    pub scan_backoff_ms: u64,
    pub data_rate_mbps: f64,
    /// Scan channels 1..=11 instead of only the channels the APs use.
    pub scan_all_channels: bool,
    pub max_stations_per_ap: Option<usize>,
    pub l2_update_on_association: bool,
}

impl Default for WifiConfig {
    fn default() -> Self {
        WifiConfig {
            probe_timeout_ms: 50,
            scan_deadline_ms: None,
            probe_response_delay_us: 500,
            association_timeout_ms: 100,
            scan_backoff_ms: 1000,
            data_rate_mbps: 54.0,
            scan_all_channels: false,
            max_stations_per_ap: None,
            l2_update_on_association: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WiredConfig {
    pub data_rate_mbps: f64,
    pub delay_us: u64,
    /// MAC table ageing time of every bridge; unset keeps entries until they
    /// are relearned elsewhere.
    pub mac_ageing_s: Option<f64>,
}

impl Default for WiredConfig {
    fn default() -> Self {
        WiredConfig {
            data_rate_mbps: 100.0,
            delay_us: 0,
            mac_ageing_s: None,
        }
    }
}

/// Initial placement and velocity of a moving station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MobileStationConfig {
    pub station: String,
    #[serde(default)]
    pub position: Option<Vec3>,
    pub velocity: Vec3,
}

/// A velocity change of a node at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CourseChangeConfig {
    pub node: String,
    pub at_s: f64,
    pub velocity: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MobilityConfig {
    /// Link re-evaluation period of the stations.
    pub tick_ms: u64,
    /// Period of the station position log; 0 disables it.
    pub position_log_interval_s: f64,
    pub mobile: Vec<MobileStationConfig>,
    pub course_changes: Vec<CourseChangeConfig>,
}

impl Default for MobilityConfig {
    fn default() -> Self {
        MobilityConfig {
            tick_ms: 100,
            position_log_interval_s: 1.0,
            mobile: vec![MobileStationConfig {
                station: station_name(0, 0),
                position: Some(Vec3::ZERO),
                velocity: Vec3::new(10.0, 0.0, 0.0),
            }],
            course_changes: Vec::new(),
        }
    }
}

/// A constant-bit-rate datagram flow between two hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    pub name: String,
    /// Sending host: `server` or a station name.
    pub source: String,
    pub destination: String,
    pub port: u16,
    pub interval_ms: f64,
    pub packet_size: u32,
    pub max_packets: Option<u64>,
    pub start_s: f64,
    pub stop_s: f64,
    /// Listening window of the sink; defaults to the source window.
    pub sink_start_s: Option<f64>,
    pub sink_stop_s: Option<f64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            name: "udp".to_string(),
            source: SERVER_NAME.to_string(),
            destination: station_name(0, 0),
            port: 9,
            interval_ms: 10.0,
            packet_size: 1450,
            max_packets: None,
            start_s: 0.5,
            stop_s: 60.0,
            sink_start_s: None,
            sink_stop_s: None,
        }
    }
}

impl FlowConfig {
    pub fn sink_window(&self) -> (f64, f64) {
        (
            self.sink_start_s.unwrap_or(self.start_s),
            self.sink_stop_s.unwrap_or(self.stop_s),
        )
    }
}

/// Load a scenario from a YAML file.
pub fn load_model(path: impl AsRef<Path>) -> Result<ScenarioConfig, ModelError> {
    let text = std::fs::read_to_string(path)?;
    load_model_from_str(&text)
}

/// Parse and validate a scenario from YAML text.
pub fn load_model_from_str(yaml: &str) -> Result<ScenarioConfig, ModelError> {
    let config: ScenarioConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

fn check_positive(field: &str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ModelError::invalid(field, format!("must be positive, got {}", value)))
    }
}

fn check_time(field: &str, value: f64) -> Result<SimTime, ModelError> {
    SimTime::try_from_secs(value).map_err(|_| {
        ModelError::invalid(field, format!("must be a non-negative time, got {}", value))
    })
}

/// A period that must last at least one clock tick (1 us).
fn check_period(field: &str, secs: f64) -> Result<SimTime, ModelError> {
    match check_time(field, secs)? {
        SimTime::ZERO => Err(ModelError::invalid(
            field,
            format!("must be at least 1 us, got {} s", secs),
        )),
        period => Ok(period),
    }
}

impl ScenarioConfig {
    pub fn to_yaml(&self) -> Result<String, ModelError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn duration(&self) -> Result<SimTime, ModelError> {
        check_time("duration_s", self.duration_s)
    }

    /// Names of every host that can terminate a flow.
    pub fn host_names(&self) -> Vec<String> {
        let mut names = vec![SERVER_NAME.to_string()];
        for cell in 0..self.topology.ap_count {
            for k in 0..self.topology.stations_per_cell {
                names.push(station_name(cell, k));
            }
        }
        names
    }

    fn is_station(&self, name: &str) -> bool {
        name != SERVER_NAME && self.host_names().iter().any(|n| n == name)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let topo = &self.topology;
        if topo.ap_count == 0 {
            return Err(ModelError::NoAccessPoints);
        }
        if topo.channels.is_empty() {
            return Err(ModelError::NoChannels);
        }
        if let Some(&bad) = topo.channels.iter().find(|c| !Channel(**c).is_valid()) {
            return Err(ModelError::InvalidChannel(bad));
        }
        if !(topo.ap_spacing_m.is_finite() && topo.ap_spacing_m >= 0.0) {
            return Err(ModelError::invalid("topology.ap_spacing_m", "must be non-negative"));
        }
        if topo.ssid.is_empty() {
            return Err(ModelError::invalid("topology.ssid", "must not be empty"));
        }

        check_time("duration_s", self.duration_s)?;
        if !self.radio.tx_power_dbm.is_finite() || !self.radio.rx_sensitivity_dbm.is_finite() {
            return Err(ModelError::invalid("radio", "powers must be finite"));
        }
        if !(self.radio.shadowing_std_dev_db.is_finite() && self.radio.shadowing_std_dev_db >= 0.0) {
            return Err(ModelError::invalid(
                "radio.shadowing_std_dev_db",
                "must be non-negative",
            ));
        }
        self.radio
            .propagation
            .validate()
            .map_err(|reason| ModelError::invalid("radio.propagation", reason))?;

        if self.wifi.probe_timeout_ms == 0 {
            return Err(ModelError::invalid("wifi.probe_timeout_ms", "must be positive"));
        }
        // Responses arrive after the response delay; a deadline or timeout
        // that expires first can never see one.
        let response_delay = SimTime::from_micros(self.wifi.probe_response_delay_us);
        if let Some(ms) = self.wifi.scan_deadline_ms {
            if SimTime::from_millis(ms) <= response_delay {
                return Err(ModelError::invalid(
                    "wifi.scan_deadline_ms",
                    format!("must exceed the probe response delay ({})", response_delay),
                ));
            }
        }
        if SimTime::from_millis(self.wifi.association_timeout_ms) <= response_delay {
            return Err(ModelError::invalid(
                "wifi.association_timeout_ms",
                format!("must exceed the probe response delay ({})", response_delay),
            ));
        }
        check_positive("wifi.data_rate_mbps", self.wifi.data_rate_mbps)?;
        check_positive("wired.data_rate_mbps", self.wired.data_rate_mbps)?;
        if let Some(ageing) = self.wired.mac_ageing_s {
            check_period("wired.mac_ageing_s", ageing)?;
        }
        if self.mobility.tick_ms == 0 {
            return Err(ModelError::invalid("mobility.tick_ms", "must be positive"));
        }
        check_time(
            "mobility.position_log_interval_s",
            self.mobility.position_log_interval_s,
        )?;

        for mobile in &self.mobility.mobile {
            if !self.is_station(&mobile.station) {
                return Err(ModelError::UnknownNode(mobile.station.clone()));
            }
        }
        for change in &self.mobility.course_changes {
            if !self.is_station(&change.node) {
                return Err(ModelError::UnknownNode(change.node.clone()));
            }
            check_time("mobility.course_changes.at_s", change.at_s)?;
        }

        let hosts = self.host_names();
        for flow in &self.flows {
            for endpoint in [&flow.source, &flow.destination] {
                if !hosts.contains(endpoint) {
                    return Err(ModelError::UnknownEndpoint {
                        flow: flow.name.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
            }
            if flow.source == flow.destination {
                return Err(ModelError::invalid(
                    format!("flows.{}", flow.name),
                    "source and destination are the same host",
                ));
            }
            check_positive(&format!("flows.{}.interval_ms", flow.name), flow.interval_ms)?;
            check_period(
                &format!("flows.{}.interval_ms", flow.name),
                flow.interval_ms / 1000.0,
            )?;
            if flow.packet_size == 0 {
                return Err(ModelError::invalid(
                    format!("flows.{}.packet_size", flow.name),
                    "must be positive",
                ));
            }
            let (sink_start, sink_stop) = flow.sink_window();
            for (start_s, stop_s) in [(flow.start_s, flow.stop_s), (sink_start, sink_stop)] {
                check_time(&format!("flows.{}", flow.name), start_s)?;
                check_time(&format!("flows.{}", flow.name), stop_s)?;
                if stop_s < start_s {
                    return Err(ModelError::InvalidWindow {
                        flow: flow.name.clone(),
                        start_s,
                        stop_s,
                    });
                }
            }
        }
        Ok(())
    }
}
