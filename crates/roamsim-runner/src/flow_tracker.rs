//! Per-flow delivery analysis.
//!
//! After (or during) a run, the [`FlowReport`] of a flow compares what its
//! source sent with what its sink accepted:
//! - unique, duplicated and lost datagrams,
//! - latency,
//! - reception gaps: stretches between consecutive accepted datagrams longer
//!   than [`GAP_INTERVALS`] send intervals, which is where handoffs show up.

use roamsim_agents::Reception;
use roamsim_common::SimTime;
use roamsim_metrics::metric_defs;
use roamsim_model::FlowInfo;
use serde::Serialize;
use std::collections::BTreeSet;

/// A silence longer than this many send intervals counts as a gap.
pub const GAP_INTERVALS: u64 = 3;

/// A stretch with no accepted datagram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReceptionGap {
    /// Last reception before the gap.
    pub from: SimTime,
    /// First reception after it.
    pub to: SimTime,
    /// Sequence numbers that never arrived inside the gap.
    pub missing: u64,
}

impl ReceptionGap {
    pub fn duration(&self) -> SimTime {
        self.to.saturating_sub(self.from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub sent: u64,
    pub received: u64,
    pub duplicates: u64,
    pub lost: u64,
    /// Datagrams that arrived outside the sink's listening window.
    pub rejected: u64,
    pub first_received_at: Option<SimTime>,
    pub last_received_at: Option<SimTime>,
    pub mean_latency_us: Option<f64>,
    pub max_latency_us: Option<u64>,
    pub gaps: Vec<ReceptionGap>,
}

impl FlowReport {
    /// Longest gap, if any.
    pub fn max_gap(&self) -> Option<SimTime> {
        self.gaps.iter().map(|g| g.duration()).max()
    }

    /// Gaps that start inside `[from, to]`.
    pub fn gaps_between(&self, from: SimTime, to: SimTime) -> impl Iterator<Item = &ReceptionGap> {
        self.gaps
            .iter()
            .filter(move |g| g.from >= from && g.from <= to)
    }

    /// Unique datagrams received over datagrams sent.
    pub fn delivery_ratio(&self) -> f64 {
        if self.sent == 0 {
            return 1.0;
        }
        (self.received - self.duplicates) as f64 / self.sent as f64
    }
}

/// Build the report of one flow.
pub fn analyze_flow(
    info: &FlowInfo,
    sent: u64,
    receptions: &[Reception],
    rejected: u64,
) -> FlowReport {
    let mut seen = BTreeSet::new();
    let mut duplicates = 0u64;
    for r in receptions {
        if !seen.insert(r.seq) {
            duplicates += 1;
        }
    }
    let unique = seen.len() as u64;

    let latencies: Vec<u64> = receptions
        .iter()
        .map(|r| r.received_at.saturating_sub(r.sent_at).as_micros())
        .collect();
    let mean_latency_us = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
    };

    let threshold = SimTime::from_micros(info.interval.as_micros().saturating_mul(GAP_INTERVALS));
    let gaps = receptions
        .windows(2)
        .filter(|w| w[1].received_at.saturating_sub(w[0].received_at) > threshold)
        .map(|w| ReceptionGap {
            from: w[0].received_at,
            to: w[1].received_at,
            missing: w[1].seq.saturating_sub(w[0].seq + 1),
        })
        .collect();

    FlowReport {
        name: info.name.clone(),
        source: info.source_host.clone(),
        destination: info.destination_host.clone(),
        sent,
        received: receptions.len() as u64,
        duplicates,
        lost: sent.saturating_sub(unique),
        rejected,
        first_received_at: receptions.first().map(|r| r.received_at),
        last_received_at: receptions.last().map(|r| r.received_at),
        mean_latency_us,
        max_latency_us: latencies.iter().max().copied(),
        gaps,
    }
}

/// Record the gaps of a finished flow in the gap histogram.
pub fn emit_gap_metrics(report: &FlowReport) {
    for gap in &report.gaps {
        metrics::histogram!(
            metric_defs::FLOW_GAP.name,
            "flow" => report.name.clone()
        )
        .record(gap.duration().as_micros() as f64 / 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roamsim_common::{EntityId, FlowId};

    fn info() -> FlowInfo {
        FlowInfo {
            flow: FlowId(0),
            name: "udp".to_string(),
            source: EntityId(0),
            sink: EntityId(1),
            source_host: "server".to_string(),
            destination_host: "sta-0-0".to_string(),
            interval: SimTime::from_millis(10),
            start: SimTime::ZERO,
            stop: SimTime::from_secs(1.0),
            sink_start: SimTime::ZERO,
            sink_stop: SimTime::from_secs(1.0),
        }
    }

    fn rx(seq: u64) -> Reception {
        Reception {
            seq,
            sent_at: SimTime::from_millis(10 * seq),
            received_at: SimTime::from_micros(10_000 * seq + 400),
        }
    }

    #[test]
    fn test_clean_flow() {
        let receptions: Vec<Reception> = (0..10).map(rx).collect();
        let r = analyze_flow(&info(), 10, &receptions, 0);
        assert_eq!(r.received, 10);
        assert_eq!(r.lost, 0);
        assert!(r.gaps.is_empty());
        assert_eq!(r.mean_latency_us, Some(400.0));
        assert_eq!(r.delivery_ratio(), 1.0);
    }

    #[test]
    fn test_gap_and_loss() {
        // 5..=19 lost during a handoff
        let receptions: Vec<Reception> = (0..5).chain(20..30).map(rx).collect();
        let r = analyze_flow(&info(), 30, &receptions, 2);
        assert_eq!(r.lost, 15);
        assert_eq!(r.rejected, 2);
        assert_eq!(r.gaps.len(), 1);
        assert_eq!(r.gaps[0].missing, 15);
        assert_eq!(r.max_gap(), Some(SimTime::from_millis(160)));
        assert_eq!(r.gaps_between(SimTime::ZERO, SimTime::from_millis(50)).count(), 1);
    }

    #[test]
    fn test_short_hiccup_is_not_a_gap() {
        // Two missing datagrams: 30 ms of silence, exactly the threshold.
        let receptions: Vec<Reception> = [0, 1, 4, 5].into_iter().map(rx).collect();
        let r = analyze_flow(&info(), 6, &receptions, 0);
        assert!(r.gaps.is_empty());
        assert_eq!(r.lost, 2);
    }

    #[test]
    fn test_duplicates() {
        let receptions = vec![rx(0), rx(1), rx(1), rx(2)];
        let r = analyze_flow(&info(), 3, &receptions, 0);
        assert_eq!(r.duplicates, 1);
        assert_eq!(r.lost, 0);
    }
}
