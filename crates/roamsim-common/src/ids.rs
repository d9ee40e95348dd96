//! Identifiers and link-layer addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an entity that can receive events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub const fn new(id: u64) -> Self {
        EntityId(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// Identifies a scheduled event. Ids are handed out in scheduling order and
/// double as the tie-breaking ordinal for events sharing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// Identifies a node that has a position (AP, station, server, switch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Identifies an access point. Lower ids win selection ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApId(pub u32);

impl fmt::Display for ApId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AP{}", self.0)
    }
}

/// Index of a port inside the bridge that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub u16);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// Identifies a traffic flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(pub u32);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow{}", self.0)
    }
}

/// A 2.4 GHz 802.11 channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(pub u8);

impl Channel {
    /// Channels a station sweeps when scanning the whole band.
    pub const BAND_2_4GHZ: std::ops::RangeInclusive<u8> = 1..=11;

    /// Whether the channel number exists in the 2.4 GHz band.
    pub fn is_valid(self) -> bool {
        (1..=14).contains(&self.0)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// A 48-bit IEEE MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Build a locally administered unicast address from a sequence number.
    pub fn from_index(index: u64) -> Self {
        let b = index.to_be_bytes();
        MacAddress([0x02, b[3], b[4], b[5], b[6], b[7]])
    }

    pub fn is_broadcast(&self) -> bool {
        *self == MacAddress::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_from_index_is_unique_and_unicast() {
        let a = MacAddress::from_index(1);
        let b = MacAddress::from_index(2);
        assert_ne!(a, b);
        assert!(!a.is_broadcast());
        assert_eq!(a.to_string(), "02:00:00:00:00:01");
        assert!(MacAddress::BROADCAST.is_broadcast());
    }

    #[test]
    fn test_channel_validity() {
        assert!(Channel(1).is_valid());
        assert!(Channel(14).is_valid());
        assert!(!Channel(0).is_valid());
        assert!(!Channel(36).is_valid());
    }
}
