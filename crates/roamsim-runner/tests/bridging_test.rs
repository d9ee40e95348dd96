//! Wired backbone behaviour across handoffs: MAC relearning after the L2
//! update, stale association cleanup, and the uplink path.

use roamsim_bridge::MacTableRow;
use roamsim_common::{ApId, MacAddress};
use roamsim_runner::{
    build_simulation, create_event_loop, load_model_from_str, EventLoop, ScenarioConfig, SimTime,
};

fn event_loop_for(config: &ScenarioConfig) -> EventLoop {
    let simulation = build_simulation(config, config.seed).expect("Failed to build simulation");
    create_event_loop(simulation)
}

fn port_of(table: &[MacTableRow], mac: MacAddress) -> Option<&str> {
    table
        .iter()
        .find(|row| row.address == mac)
        .map(|row| row.port_name.as_str())
}

#[test]
fn test_mac_tables_follow_the_station() {
    let mut event_loop = event_loop_for(&ScenarioConfig::default());
    let sta = event_loop.layout().station("sta-0-0").unwrap().mac;
    let server = event_loop.layout().server_mac;

    event_loop.run_until(SimTime::from_secs(10.0)).unwrap();
    assert_eq!(port_of(&event_loop.mac_table("switch").unwrap(), sta), Some("ap0"));
    assert_eq!(port_of(&event_loop.mac_table("switch").unwrap(), server), Some("server"));
    assert_eq!(port_of(&event_loop.mac_table("ap0-bridge").unwrap(), sta), Some("radio"));

    event_loop.run_until(SimTime::from_secs(20.0)).unwrap();
    assert_eq!(event_loop.association_of("sta-0-0"), Some(ApId(1)));
    assert_eq!(port_of(&event_loop.mac_table("switch").unwrap(), sta), Some("ap1"));
    assert_eq!(port_of(&event_loop.mac_table("ap1-bridge").unwrap(), sta), Some("radio"));
    assert_eq!(port_of(&event_loop.mac_table("ap0-bridge").unwrap(), sta), Some("uplink"));

    let switch = event_loop.bridge("switch").unwrap();
    assert!(switch.stats().mac_moves >= 1);

    event_loop.run_until(SimTime::from_secs(40.0)).unwrap();
    assert_eq!(port_of(&event_loop.mac_table("switch").unwrap(), sta), Some("ap2"));
}

#[test]
fn test_old_ap_drops_stale_association() {
    let mut event_loop = event_loop_for(&ScenarioConfig::default());
    let sta = event_loop.layout().station("sta-0-0").unwrap().mac;

    event_loop.run_until(SimTime::from_secs(10.0)).unwrap();
    assert!(event_loop.access_point(ApId(0)).unwrap().is_associated(sta));

    event_loop.run_until(SimTime::from_secs(20.0)).unwrap();
    let ap0 = event_loop.access_point(ApId(0)).unwrap();
    let ap1 = event_loop.access_point(ApId(1)).unwrap();
    assert!(!ap0.is_associated(sta));
    assert!(ap1.is_associated(sta));
    assert_eq!(ap0.stats().stale_associations_dropped, 1);
}

#[test]
fn test_downlink_resumes_on_new_ap_quickly() {
    let mut event_loop = event_loop_for(&ScenarioConfig::default());
    event_loop.run_until(SimTime::from_secs(20.0)).unwrap();

    let report = &event_loop.flow_reports()[0];
    let handoff_gap = report
        .gaps
        .iter()
        .find(|g| g.from > SimTime::from_secs(18.0))
        .expect("handoff gap");
    // Scan (150 ms) plus association; the L2 update itself takes microseconds.
    assert!(handoff_gap.duration() < SimTime::from_millis(250));
    assert!(report.last_received_at.unwrap() > SimTime::from_millis(19_980));
}

#[test]
fn test_uplink_flow_reaches_server() {
    let config = load_model_from_str(
        r#"
flows:
  - name: down
    source: server
    destination: sta-0-0
  - name: up
    source: sta-0-1
    destination: server
    interval_ms: 20.0
    packet_size: 200
    start_s: 1.0
    stop_s: 10.0
"#,
    )
    .unwrap();
    let mut event_loop = event_loop_for(&config);
    event_loop.run_until(SimTime::from_secs(12.0)).unwrap();

    let reports = event_loop.flow_reports();
    let up = reports.iter().find(|r| r.name == "up").unwrap();
    assert_eq!(up.sent, 450);
    assert_eq!(up.received, up.sent);
    assert_eq!(up.lost, 0);

    // The uplink taught the backbone where sta-0-1 lives.
    let sta = event_loop.layout().station("sta-0-1").unwrap().mac;
    assert_eq!(port_of(&event_loop.mac_table("switch").unwrap(), sta), Some("ap0"));
    assert_eq!(port_of(&event_loop.mac_table("ap0-bridge").unwrap(), sta), Some("radio"));
}

#[test]
fn test_frames_for_unknown_stations_are_flooded_and_dropped() {
    let config = load_model_from_str(
        r#"
wifi:
  l2_update_on_association: false
"#,
    )
    .unwrap();
    let mut event_loop = event_loop_for(&config);
    event_loop.run_until(SimTime::from_secs(5.0)).unwrap();

    // Without an L2 update the station is never learned: the switch floods to
    // every AP and only the serving one delivers.
    let sta = event_loop.layout().station("sta-0-0").unwrap().mac;
    assert_eq!(port_of(&event_loop.mac_table("switch").unwrap(), sta), None);
    assert!(event_loop.bridge("switch").unwrap().stats().frames_flooded > 0);
    assert!(event_loop.access_point(ApId(2)).unwrap().stats().frames_dropped > 0);
    assert!(event_loop.flow_reports()[0].received > 400);
}

#[test]
fn test_idle_stations_age_out_of_the_backbone() {
    let config = load_model_from_str(
        r#"
wired:
  mac_ageing_s: 5.0
flows:
  - name: down
    source: server
    destination: sta-0-0
  - name: up
    source: sta-0-1
    destination: server
    start_s: 1.0
    stop_s: 2.0
"#,
    )
    .unwrap();
    let mut event_loop = event_loop_for(&config);
    let mobile = event_loop.layout().station("sta-0-0").unwrap().mac;
    let idle = event_loop.layout().station("sta-0-1").unwrap().mac;
    let server = event_loop.layout().server_mac;

    event_loop.run_until(SimTime::from_secs(3.0)).unwrap();
    let table = event_loop.mac_table("switch").unwrap();
    assert_eq!(port_of(&table, idle), Some("ap0"));
    assert_eq!(port_of(&table, mobile), Some("ap0"));

    // sta-0-1 went quiet at 2 s and sta-0-0 only ever receives after its
    // L2 update; the downlink keeps the server fresh.
    event_loop.run_until(SimTime::from_secs(8.0)).unwrap();
    let table = event_loop.mac_table("switch").unwrap();
    assert_eq!(port_of(&table, idle), None);
    assert_eq!(port_of(&table, mobile), None);
    assert_eq!(port_of(&table, server), Some("server"));

    // Flooding still reaches the station.
    let flooded = event_loop.bridge("switch").unwrap().stats().frames_flooded;
    event_loop.run_until(SimTime::from_secs(9.0)).unwrap();
    assert!(event_loop.bridge("switch").unwrap().stats().frames_flooded > flooded + 90);
    let down = event_loop
        .flow_reports()
        .into_iter()
        .find(|r| r.name == "down")
        .unwrap();
    assert!(down.last_received_at.unwrap() > SimTime::from_millis(8_980));
    assert!(down.gaps.is_empty(), "gaps: {:?}", down.gaps);
}
