//! # roamsim-model
//!
//! Scenario loading and simulation building.
//!
//! A scenario is a YAML document deserialized into [`ScenarioConfig`]; every
//! field is optional and the defaults describe the reference roaming run.
//! [`build_simulation`] turns a validated config into the entity set, the
//! [`RadioWorld`](roamsim_radio::RadioWorld) and the events that start the run.
//!
//! ```rust,ignore
//! let config = roamsim_model::load_model("scenarios/handoff.yaml")?;
//! let simulation = roamsim_model::build_simulation(&config, config.seed)?;
//! ```

mod builder;
mod error;
mod scenario;

pub use builder::{
    build_simulation, ApInfo, FlowInfo, Layout, ScheduledEvent, Simulation, StationInfo,
    SCENARIO_SOURCE,
};
pub use error::ModelError;
pub use scenario::{
    ap_name, load_model, load_model_from_str, station_name, CourseChangeConfig, FlowConfig,
    MobileStationConfig, MobilityConfig, RadioConfig, ScenarioConfig, TopologyConfig,
    WifiConfig, WiredConfig, SERVER_NAME, SWITCH_NAME,
};
