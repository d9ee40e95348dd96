//! # roamsim-agents
//!
//! Entities at the edges of the fabric:
//!
//! - [`WiredHost`]: the server, a host with one wired uplink into the switch.
//! - [`CbrSource`]: constant-bit-rate datagram generator riding on a host or
//!   a station.
//! - [`FlowSink`]: records datagrams of one flow inside its listening window.
//!
//! Applications never touch the network directly: they hand frames to their
//! host with [`EventPayload::UplinkRequest`] and receive them as
//! [`EventPayload::Deliver`].
//!
//! [`EventPayload::UplinkRequest`]: roamsim_common::EventPayload::UplinkRequest
//! [`EventPayload::Deliver`]: roamsim_common::EventPayload::Deliver

mod cbr;
mod host;
mod sink;

pub use cbr::{CbrConfig, CbrSource, TIMER_SEND};
pub use host::{HostStats, WiredHost, WiredUplink};
pub use sink::{FlowSink, Reception};
