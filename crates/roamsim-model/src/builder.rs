//! Turns a [`ScenarioConfig`] into entities, a radio world and the events that
//! start the run.
//!
//! Entity ids are dense indices in creation order:
//!
//! | ids | entity |
//! |---|---|
//! | 0 | central switch (ports `0..N` to the AP bridges, port `N` to the server) |
//! | 1 | server host |
//! | `2 + 2i`, `3 + 2i` | bridge and agent of AP `i` |
//! | then | stations, cell by cell |
//! | then | source and sink of each flow |

use crate::scenario::{ap_name, station_name, SERVER_NAME, SWITCH_NAME};
use crate::{ModelError, ScenarioConfig};
use roamsim_agents::{CbrConfig, CbrSource, FlowSink, WiredHost, WiredUplink};
use roamsim_bridge::{BridgeConfig, LearningBridge, PortAttachment};
use roamsim_common::{
    ApId, Channel, CourseChangeEvent, Entity, EntityId, EventPayload, FlowId, MacAddress, NodeId,
    PortId, SimTime, Vec3,
};
use roamsim_radio::{RadioWorld, Shadowing};
use roamsim_wifi::{
    default_scan_deadline, AccessPointAgent, AccessPointConfig, ApDirectoryEntry, Station,
    StationConfig, WifiParams, TIMER_STARTUP,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Source id of events scheduled by the scenario itself.
pub const SCENARIO_SOURCE: EntityId = EntityId(u64::MAX);

/// An event to schedule before the run starts.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: SimTime,
    pub source: EntityId,
    pub targets: Vec<EntityId>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApInfo {
    pub name: String,
    pub ap: ApId,
    pub entity: EntityId,
    pub bridge: EntityId,
    pub node: NodeId,
    pub channel: Channel,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub name: String,
    pub cell: usize,
    pub entity: EntityId,
    pub node: NodeId,
    pub mac: MacAddress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowInfo {
    pub flow: FlowId,
    pub name: String,
    pub source: EntityId,
    pub sink: EntityId,
    pub source_host: String,
    pub destination_host: String,
    pub interval: SimTime,
    pub start: SimTime,
    pub stop: SimTime,
    pub sink_start: SimTime,
    pub sink_stop: SimTime,
}

/// Where everything ended up; the observation side of a built simulation.
#[derive(Debug, Clone)]
pub struct Layout {
    pub switch: EntityId,
    pub server: EntityId,
    pub server_mac: MacAddress,
    pub aps: Vec<ApInfo>,
    pub stations: Vec<StationInfo>,
    pub flows: Vec<FlowInfo>,
    names: BTreeMap<String, EntityId>,
}

impl Layout {
    /// Entity id by name.
    pub fn entity(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    pub fn station(&self, name: &str) -> Option<&StationInfo> {
        self.stations.iter().find(|s| s.name == name)
    }

    pub fn ap(&self, ap: ApId) -> Option<&ApInfo> {
        self.aps.iter().find(|a| a.ap == ap)
    }

    /// Every bridge by name: the central switch, then the AP bridges.
    pub fn bridges(&self) -> Vec<(String, EntityId)> {
        let mut out = vec![(SWITCH_NAME.to_string(), self.switch)];
        out.extend(
            self.aps
                .iter()
                .map(|a| (format!("{}-bridge", a.name), a.bridge)),
        );
        out
    }

    fn register(&mut self, name: impl Into<String>, id: EntityId) {
        self.names.insert(name.into(), id);
    }
}

/// A fully built simulation, ready to be handed to an event loop.
pub struct Simulation {
    /// Entities indexed by their id.
    pub entities: Vec<Box<dyn Entity>>,
    pub world: RadioWorld,
    pub initial_events: Vec<ScheduledEvent>,
    pub layout: Layout,
    pub duration: SimTime,
    /// Mobility tick period; ticks are re-posted by the event loop.
    pub tick: SimTime,
    /// Position log period; `None` when disabled.
    pub position_log_interval: Option<SimTime>,
    pub trace: Option<String>,
}

fn secs(field: &str, value: f64) -> Result<SimTime, ModelError> {
    SimTime::try_from_secs(value)
        .map_err(|_| ModelError::invalid(field, format!("invalid time {}", value)))
}

fn wifi_params(config: &ScenarioConfig) -> WifiParams {
    let wifi = &config.wifi;
    let mut scan_channels: Vec<Channel> = if wifi.scan_all_channels {
        (1..=11).map(Channel).collect()
    } else {
        (0..config.topology.ap_count)
            .filter_map(|i| config.topology.ap_channel(i))
            .collect()
    };
    scan_channels.sort();
    scan_channels.dedup();

    let probe_timeout = SimTime::from_millis(wifi.probe_timeout_ms);
    let scan_deadline = match wifi.scan_deadline_ms {
        Some(ms) => SimTime::from_millis(ms),
        None => default_scan_deadline(scan_channels.len(), probe_timeout),
    };
    WifiParams {
        ssid: config.topology.ssid.clone(),
        rx_sensitivity_dbm: config.radio.rx_sensitivity_dbm,
        roam_margin_db: config.radio.roam_margin_db,
        scan_channels,
        probe_timeout,
        scan_deadline,
        response_delay: SimTime::from_micros(wifi.probe_response_delay_us),
        association_timeout: SimTime::from_millis(wifi.association_timeout_ms),
        scan_backoff: SimTime::from_millis(wifi.scan_backoff_ms),
        data_rate_bps: (wifi.data_rate_mbps * 1e6) as u64,
        max_stations_per_ap: wifi.max_stations_per_ap,
        l2_update_on_association: wifi.l2_update_on_association,
    }
}

/// Build the simulation. `seed` overrides `config.seed`.
pub fn build_simulation(config: &ScenarioConfig, seed: u64) -> Result<Simulation, ModelError> {
    config.validate()?;
    let topo = &config.topology;
    let n_aps = topo.ap_count;
    let params = wifi_params(config);
    let wired_rate = (config.wired.data_rate_mbps * 1e6) as u64;
    let wired_delay = SimTime::from_micros(config.wired.delay_us);

    let mut mac_counter = 0u64;
    let mut next_mac = || {
        mac_counter += 1;
        MacAddress::from_index(mac_counter)
    };

    // ------------------------------------------------------------------
    // Radio world
    // ------------------------------------------------------------------
    let shadowing = Shadowing::new(
        config.radio.shadowing_std_dev_db,
        seed,
        SimTime::from_millis(config.radio.shadowing_coherence_ms),
    );
    let mut world =
        RadioWorld::new(&config.radio.propagation, config.radio.tx_power_dbm).with_shadowing(shadowing);

    // ------------------------------------------------------------------
    // Fabric: switch and server
    // ------------------------------------------------------------------
    let switch_id = EntityId(0);
    let server_id = EntityId(1);
    let ap_bridge_id = |i: usize| EntityId(2 + 2 * i as u64);
    let ap_agent_id = |i: usize| EntityId(3 + 2 * i as u64);
    let first_station = 2 + 2 * n_aps as u64;

    let ageing_time = config
        .wired
        .mac_ageing_s
        .map(|s| secs("wired.mac_ageing_s", s))
        .transpose()?;
    let bridge_config = BridgeConfig {
        data_rate_bps: wired_rate,
        ageing_time,
    };
    let mut switch = LearningBridge::new(switch_id, SWITCH_NAME, bridge_config.clone());
    for i in 0..n_aps {
        switch.add_port(
            ap_name(i),
            PortAttachment::Link {
                peer: ap_bridge_id(i),
                peer_port: PortId(1),
                delay: wired_delay,
            },
        );
    }
    let server_port = switch.add_port(
        SERVER_NAME,
        PortAttachment::Link {
            peer: server_id,
            peer_port: PortId(0),
            delay: wired_delay,
        },
    );
    let server_mac = next_mac();
    let mut layout = Layout {
        switch: switch_id,
        server: server_id,
        server_mac,
        aps: Vec::with_capacity(n_aps),
        stations: Vec::new(),
        flows: Vec::new(),
        names: BTreeMap::new(),
    };
    layout.register(SWITCH_NAME, switch_id);

    let mut server = WiredHost::new(
        server_id,
        SERVER_NAME,
        server_mac,
        WiredUplink {
            peer: switch_id,
            peer_port: server_port,
            delay: wired_delay,
            data_rate_bps: wired_rate,
        },
    );
    layout.register(SERVER_NAME, server_id);

    // ------------------------------------------------------------------
    // Access points
    // ------------------------------------------------------------------
    let mut ap_entities: Vec<(LearningBridge, AccessPointAgent)> = Vec::with_capacity(n_aps);
    let mut directory = Vec::with_capacity(n_aps);
    for i in 0..n_aps {
        let name = ap_name(i);
        let channel = topo.ap_channel(i).ok_or(ModelError::NoChannels)?;
        let node = NodeId(i as u32);
        let position = topo.ap_position(i);
        world.add_node(node, position, Vec3::ZERO);

        let bridge_name = format!("{}-bridge", name);
        let mut bridge = LearningBridge::new(ap_bridge_id(i), bridge_name.clone(), bridge_config.clone());
        let radio_port = bridge.add_port("radio", PortAttachment::Radio { ap: ap_agent_id(i) });
        bridge.add_port(
            "uplink",
            PortAttachment::Link {
                peer: switch_id,
                peer_port: PortId(i as u16),
                delay: wired_delay,
            },
        );
        let agent = AccessPointAgent::new(
            ap_agent_id(i),
            AccessPointConfig {
                name: name.clone(),
                ap: ApId(i as u32),
                node,
                channel,
                bssid: next_mac(),
            },
            params.clone(),
            ap_bridge_id(i),
            radio_port,
        );
        debug!("AP {} on {} at {}", name, channel, position);

        directory.push(ApDirectoryEntry {
            ap: ApId(i as u32),
            entity: ap_agent_id(i),
            node,
        });
        layout.register(bridge_name, ap_bridge_id(i));
        layout.register(name.clone(), ap_agent_id(i));
        layout.aps.push(ApInfo {
            name,
            ap: ApId(i as u32),
            entity: ap_agent_id(i),
            bridge: ap_bridge_id(i),
            node,
            channel,
            position,
        });
        ap_entities.push((bridge, agent));
    }

    // ------------------------------------------------------------------
    // Stations
    // ------------------------------------------------------------------
    let mut stations = Vec::new();
    for cell in 0..n_aps {
        for k in 0..topo.stations_per_cell {
            let index = stations.len();
            let name = station_name(cell, k);
            let entity = EntityId(first_station + index as u64);
            let node = NodeId((n_aps + index) as u32);
            let mac = next_mac();

            let mobile = config.mobility.mobile.iter().find(|m| m.station == name);
            let position = mobile
                .and_then(|m| m.position)
                .unwrap_or_else(|| topo.station_position(k));
            let velocity = mobile.map(|m| m.velocity).unwrap_or(Vec3::ZERO);
            world.add_node(node, position, velocity);

            stations.push(Station::new(
                entity,
                StationConfig {
                    name: name.clone(),
                    node,
                    mac,
                },
                params.clone(),
                directory.clone(),
            ));
            layout.register(name.clone(), entity);
            layout.stations.push(StationInfo {
                name,
                cell,
                entity,
                node,
                mac,
            });
        }
    }

    // ------------------------------------------------------------------
    // Flows
    // ------------------------------------------------------------------
    let first_flow = first_station + stations.len() as u64;
    let mut flow_entities: Vec<(CbrSource, FlowSink)> = Vec::new();
    let mut initial_events = Vec::new();

    for (index, flow) in config.flows.iter().enumerate() {
        let flow_id = FlowId(index as u32);
        let source_id = EntityId(first_flow + 2 * index as u64);
        let sink_id = EntityId(first_flow + 2 * index as u64 + 1);
        let unknown = |endpoint: &String| ModelError::UnknownEndpoint {
            flow: flow.name.clone(),
            endpoint: endpoint.clone(),
        };

        let (src_host, src_mac) = if flow.source == SERVER_NAME {
            (server_id, server_mac)
        } else {
            let s = layout.station(&flow.source).ok_or_else(|| unknown(&flow.source))?;
            (s.entity, s.mac)
        };
        let dst_mac = if flow.destination == SERVER_NAME {
            server.attach_app(sink_id);
            server_mac
        } else {
            let index = layout
                .stations
                .iter()
                .position(|s| s.name == flow.destination)
                .ok_or_else(|| unknown(&flow.destination))?;
            stations[index].attach_app(sink_id);
            layout.stations[index].mac
        };

        let interval = secs("interval_ms", flow.interval_ms / 1000.0)?;
        let start = secs("start_s", flow.start_s)?;
        let stop = secs("stop_s", flow.stop_s)?;
        let (sink_start_s, sink_stop_s) = flow.sink_window();
        let sink_start = secs("sink_start_s", sink_start_s)?;
        let sink_stop = secs("sink_stop_s", sink_stop_s)?;

        let source = CbrSource::new(
            source_id,
            format!("{}-source", flow.name),
            CbrConfig {
                flow: flow_id,
                src: src_mac,
                dst: dst_mac,
                port: flow.port,
                interval,
                packet_size: flow.packet_size,
                max_packets: flow.max_packets,
            },
            src_host,
        );
        let sink = FlowSink::new(sink_id, format!("{}-sink", flow.name), flow_id);
        layout.register(format!("{}-source", flow.name), source_id);
        layout.register(format!("{}-sink", flow.name), sink_id);

        for (time, target, payload) in [
            (sink_start, sink_id, EventPayload::FlowStart { flow: flow_id }),
            (start, source_id, EventPayload::FlowStart { flow: flow_id }),
            (stop, source_id, EventPayload::FlowStop { flow: flow_id }),
            (sink_stop, sink_id, EventPayload::FlowStop { flow: flow_id }),
        ] {
            initial_events.push(ScheduledEvent {
                time,
                source: SCENARIO_SOURCE,
                targets: vec![target],
                payload,
            });
        }
        layout.flows.push(FlowInfo {
            flow: flow_id,
            name: flow.name.clone(),
            source: source_id,
            sink: sink_id,
            source_host: flow.source.clone(),
            destination_host: flow.destination.clone(),
            interval,
            start,
            stop,
            sink_start,
            sink_stop,
        });
        flow_entities.push((source, sink));
    }

    // ------------------------------------------------------------------
    // Start-up, mobility and course-change events
    // ------------------------------------------------------------------
    let station_ids: Vec<EntityId> = layout.stations.iter().map(|s| s.entity).collect();
    for &id in &station_ids {
        initial_events.push(ScheduledEvent {
            time: SimTime::ZERO,
            source: id,
            targets: vec![id],
            payload: EventPayload::Timer {
                timer_id: TIMER_STARTUP,
            },
        });
    }
    let tick = SimTime::from_millis(config.mobility.tick_ms);
    initial_events.push(ScheduledEvent {
        time: tick,
        source: SCENARIO_SOURCE,
        targets: station_ids,
        payload: EventPayload::MobilityTick,
    });

    let position_log_interval = match secs(
        "position_log_interval_s",
        config.mobility.position_log_interval_s,
    )? {
        SimTime::ZERO => None,
        interval => {
            initial_events.push(ScheduledEvent {
                time: SimTime::ZERO,
                source: SCENARIO_SOURCE,
                targets: Vec::new(),
                payload: EventPayload::PositionReport,
            });
            Some(interval)
        }
    };

    for change in &config.mobility.course_changes {
        let node = layout
            .station(&change.node)
            .map(|s| s.node)
            .ok_or_else(|| ModelError::UnknownNode(change.node.clone()))?;
        initial_events.push(ScheduledEvent {
            time: secs("at_s", change.at_s)?,
            source: SCENARIO_SOURCE,
            targets: Vec::new(),
            payload: EventPayload::CourseChange(CourseChangeEvent {
                node,
                velocity: change.velocity,
            }),
        });
    }

    // ------------------------------------------------------------------
    // Entities in id order
    // ------------------------------------------------------------------
    let mut entities: Vec<Box<dyn Entity>> = Vec::new();
    entities.push(Box::new(switch));
    entities.push(Box::new(server));
    for (bridge, agent) in ap_entities {
        entities.push(Box::new(bridge));
        entities.push(Box::new(agent));
    }
    for station in stations {
        entities.push(Box::new(station));
    }
    for (source, sink) in flow_entities {
        entities.push(Box::new(source));
        entities.push(Box::new(sink));
    }
    debug_assert!(entities
        .iter()
        .enumerate()
        .all(|(i, e)| e.entity_id() == EntityId(i as u64)));

    Ok(Simulation {
        entities,
        world,
        initial_events,
        layout,
        duration: config.duration()?,
        tick,
        position_log_interval,
        trace: config.trace.clone(),
    })
}
