//! End-to-end runs of the reference roaming scenario.
//!
//! The mobile station `sta-0-0` walks along the AP line at 10 m/s. With the
//! default radio parameters the link is usable up to roughly 184.7 m, so the
//! station should:
//! - associate with AP0 right after start-up,
//! - hand off to AP1 at the 18.5 s tick (185 m from AP0),
//! - hand off to AP2 at the 33.5 s tick (185 m from AP1), completing around
//!   33.65 s; the reference timeline quotes 33.8 s, which the window below
//!   also admits,
//! - lose coverage at the 48.5 s tick (185 m past AP2).

use roamsim_common::{ApId, RadioEnvironment};
use roamsim_runner::{
    build_simulation, create_event_loop, load_model, EventLoop, ScenarioConfig, SimTime,
};
use roamsim_wifi::StationState;

const MOBILE: &str = "sta-0-0";

fn scenario_path() -> String {
    format!("{}/scenarios/handoff.yaml", env!("CARGO_MANIFEST_DIR"))
}

fn handoff_loop() -> (ScenarioConfig, EventLoop) {
    let config = load_model(scenario_path()).expect("Failed to load scenario");
    let simulation = build_simulation(&config, config.seed).expect("Failed to build simulation");
    (config, create_event_loop(simulation))
}

fn secs(t: SimTime) -> f64 {
    t.as_secs_f64()
}

#[test]
fn test_scenario_file_matches_builtin_defaults() {
    let config = load_model(scenario_path()).unwrap();
    assert_eq!(config, ScenarioConfig::default());
}

#[test]
fn test_handoff_timeline() {
    let (_, mut event_loop) = handoff_loop();
    let stats = event_loop.run(SimTime::from_secs(60.0)).unwrap();
    let sta = stats.stations.iter().find(|s| s.name == MOBILE).unwrap();

    let timeline: Vec<(f64, Option<ApId>, Option<ApId>)> = sta
        .timeline
        .iter()
        .map(|r| (secs(r.time), r.from, r.to))
        .collect();
    println!("timeline: {:?}", timeline);
    assert_eq!(timeline.len(), 4, "timeline: {:?}", timeline);

    let (t, from, to) = timeline[0];
    assert_eq!((from, to), (None, Some(ApId(0))));
    assert!(t > 0.1 && t < 0.2, "initial association at {}", t);

    let (t, from, to) = timeline[1];
    assert_eq!((from, to), (Some(ApId(0)), Some(ApId(1))));
    assert!(t > 18.5 && t < 18.8, "first handoff at {}", t);

    let (t, from, to) = timeline[2];
    assert_eq!((from, to), (Some(ApId(1)), Some(ApId(2))));
    assert!(t > 33.4 && t < 33.9, "second handoff at {}", t);

    let (t, from, to) = timeline[3];
    assert_eq!((from, to), (Some(ApId(2)), None));
    assert!(t > 48.4 && t < 48.8, "coverage lost at {}", t);

    assert_eq!(sta.stats.handoffs, 2);
    assert_eq!(sta.associated_ap, None);
    // Retries run back to back, so the run may end mid-scan.
    let idle = [
        StationState::Unassociated.to_string(),
        StationState::Scanning.to_string(),
        StationState::Selecting.to_string(),
    ];
    assert!(idle.contains(&sta.state), "final state {}", sta.state);
    // Retries keep scanning once coverage is gone.
    assert!(sta.stats.empty_scans >= 8, "{} empty scans", sta.stats.empty_scans);
}

#[test]
fn test_association_checkpoints() {
    let (_, mut event_loop) = handoff_loop();

    let checkpoints = [
        (10.0, Some(ApId(0))),
        (18.4, Some(ApId(0))),
        (25.0, Some(ApId(1))),
        (40.0, Some(ApId(2))),
        (47.5, Some(ApId(2))),
        (55.0, None),
    ];
    for (t, expected) in checkpoints {
        event_loop.run_until(SimTime::from_secs(t)).unwrap();
        assert_eq!(
            event_loop.association_of(MOBILE),
            expected,
            "association of {} at {} s",
            MOBILE,
            t
        );
    }
}

#[test]
fn test_stationary_stations_stay_on_ap0() {
    let (_, mut event_loop) = handoff_loop();
    let stats = event_loop.run(SimTime::from_secs(60.0)).unwrap();
    for sta in stats.stations.iter().filter(|s| s.name != MOBILE) {
        assert_eq!(sta.associated_ap, Some(ApId(0)), "{}", sta.name);
        assert_eq!(sta.stats.handoffs, 0, "{}", sta.name);
        assert_eq!(sta.timeline.len(), 1, "{}", sta.name);
    }
}

/// Sampled at every mobility tick:
/// - an associated station is tuned to its AP's channel,
/// - its link is usable,
/// - no station is listed by more than one AP.
#[test]
fn test_association_invariants_hold_at_every_tick() {
    let (config, mut event_loop) = handoff_loop();
    let threshold = config.radio.rx_sensitivity_dbm + config.radio.roam_margin_db;
    let layout = event_loop.layout().clone();

    let mut t = SimTime::ZERO;
    while t <= SimTime::from_secs(60.0) {
        event_loop.run_until(t).unwrap();
        for info in &layout.stations {
            let station = event_loop.station(&info.name).unwrap();
            if let StationState::Associated(ap) = station.state() {
                let ap_info = layout.ap(ap).unwrap();
                assert_eq!(
                    station.channel(),
                    ap_info.channel,
                    "{} on wrong channel at {}",
                    info.name,
                    t
                );
                let signal = event_loop
                    .world()
                    .signal_dbm(ap_info.node, info.node, t)
                    .unwrap();
                assert!(
                    signal >= threshold,
                    "{} associated with {} at {:.2} dBm at {}",
                    info.name,
                    ap,
                    signal,
                    t
                );
            }

            let serving = layout
                .aps
                .iter()
                .filter(|a| {
                    event_loop
                        .access_point(a.ap)
                        .is_some_and(|agent| agent.is_associated(info.mac))
                })
                .count();
            assert!(serving <= 1, "{} listed by {} APs at {}", info.name, serving, t);
        }
        t += SimTime::from_millis(100);
    }
}

#[test]
fn test_flow_survives_handoffs() {
    let (_, mut event_loop) = handoff_loop();
    let stats = event_loop.run(SimTime::from_secs(60.0)).unwrap();
    let flow = &stats.flows[0];

    assert_eq!(flow.duplicates, 0);
    assert!(flow.first_received_at.unwrap() < SimTime::from_millis(520));
    let last = secs(flow.last_received_at.unwrap());
    assert!(last > 48.3 && last < 48.6, "last datagram at {}", last);

    // Every interruption while in coverage is a handoff, and short.
    let in_coverage: Vec<_> = flow
        .gaps_between(SimTime::ZERO, SimTime::from_secs(47.5))
        .collect();
    assert_eq!(in_coverage.len(), 2, "gaps: {:?}", in_coverage);
    for gap in &in_coverage {
        assert!(
            gap.duration() < SimTime::from_millis(500),
            "gap of {} starting at {}",
            gap.duration(),
            gap.from
        );
    }
    assert!(secs(in_coverage[0].from) > 18.3 && secs(in_coverage[0].to) < 18.8);
    assert!(secs(in_coverage[1].from) > 33.3 && secs(in_coverage[1].to) < 33.9);

    // ~4800 datagrams reach the station before it leaves coverage.
    assert!(flow.received > 4700, "received {}", flow.received);
    assert!(flow.mean_latency_us.unwrap() < 2000.0);
}

#[test]
fn test_positions_follow_velocity() {
    let (_, mut event_loop) = handoff_loop();
    event_loop.run_until(SimTime::from_secs(12.5)).unwrap();
    let pos = event_loop.position_of(MOBILE).unwrap();
    assert!((pos.x - 125.0).abs() < 1e-9);
    assert_eq!(pos.y, 0.0);

    let ap2 = event_loop.position_of("ap2").unwrap();
    assert_eq!(ap2.x, 300.0);

    let positions = event_loop.positions();
    assert_eq!(positions.len(), 6);
    assert_eq!(positions[1].0, "sta-0-1");
    assert_eq!(positions[1].1.y, 5.0);
}
