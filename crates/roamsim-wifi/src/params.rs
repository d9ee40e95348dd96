//! Parameters shared by access points and stations.

use roamsim_common::{Channel, SimTime};

/// MAC and PHY parameters of the Wi-Fi layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WifiParams {
    /// Network name advertised by every AP and probed for by stations.
    pub ssid: String,
    /// Weakest signal a receiver can decode, in dBm.
    pub rx_sensitivity_dbm: f64,
    /// Extra margin above sensitivity before a link counts as usable.
    pub roam_margin_db: f64,
    /// Channels a scan visits, in order.
    pub scan_channels: Vec<Channel>,
    /// Dwell time on each scanned channel.
    pub probe_timeout: SimTime,
    /// Hard limit on a whole scan.
    pub scan_deadline: SimTime,
    /// AP processing time before a probe or association response.
    pub response_delay: SimTime,
    /// How long a station waits for an association response.
    pub association_timeout: SimTime,
    /// Wait before rescanning after a scan found nothing.
    pub scan_backoff: SimTime,
    pub data_rate_bps: u64,
    /// Admission limit per AP; `None` accepts every station.
    pub max_stations_per_ap: Option<usize>,
    /// Whether an AP announces newly associated stations to the fabric.
    pub l2_update_on_association: bool,
}

impl Default for WifiParams {
    fn default() -> Self {
        let scan_channels = vec![Channel(1), Channel(6), Channel(11)];
        let probe_timeout = SimTime::from_millis(50);
        WifiParams {
            ssid: "wifi-default".to_string(),
            rx_sensitivity_dbm: -98.65,
            roam_margin_db: 0.0,
            scan_deadline: default_scan_deadline(scan_channels.len(), probe_timeout),
            scan_channels,
            probe_timeout,
            response_delay: SimTime::from_micros(500),
            association_timeout: SimTime::from_millis(100),
            scan_backoff: SimTime::from_secs(1.0),
            data_rate_bps: 54_000_000,
            max_stations_per_ap: None,
            l2_update_on_association: true,
        }
    }
}

/// One dwell per channel plus one spare.
pub fn default_scan_deadline(channels: usize, probe_timeout: SimTime) -> SimTime {
    SimTime::from_micros(
        probe_timeout
            .as_micros()
            .saturating_mul((channels as u64).saturating_add(1)),
    )
}

impl WifiParams {
    /// Signal at or above which a link is usable, both for frame reception
    /// and for staying associated.
    pub fn usable_threshold_dbm(&self) -> f64 {
        self.rx_sensitivity_dbm + self.roam_margin_db
    }

    pub fn is_usable(&self, signal_dbm: f64) -> bool {
        signal_dbm >= self.usable_threshold_dbm()
    }

    /// Time to put `size_bytes` on the air.
    pub fn airtime(&self, size_bytes: u32) -> SimTime {
        SimTime::transmission(size_bytes, self.data_rate_bps)
    }
}
