//! Address table of a learning bridge.

use roamsim_common::{MacAddress, PortId, SimTime};
use serde::Serialize;
use std::collections::BTreeMap;

/// Where an address was last seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MacTableEntry {
    pub port: PortId,
    pub last_seen: SimTime,
}

/// Outcome of learning a source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learned {
    New,
    Refreshed,
    /// The address showed up on a different port than before.
    Moved { from: PortId },
}

/// MAC address table. Entries are relearned on every received frame; with an
/// ageing time set, entries not refreshed within it are ignored on lookup.
#[derive(Debug, Clone, Default)]
pub struct MacTable {
    entries: BTreeMap<MacAddress, MacTableEntry>,
    ageing_time: Option<SimTime>,
}

impl MacTable {
    pub fn new(ageing_time: Option<SimTime>) -> Self {
        MacTable {
            entries: BTreeMap::new(),
            ageing_time,
        }
    }

    /// Record that `mac` was seen on `port` at `now`.
    pub fn learn(&mut self, mac: MacAddress, port: PortId, now: SimTime) -> Learned {
        let entry = MacTableEntry {
            port,
            last_seen: now,
        };
        match self.entries.insert(mac, entry) {
            None => Learned::New,
            Some(old) if old.port == port => Learned::Refreshed,
            Some(old) if self.is_expired(&old, now) => Learned::New,
            Some(old) => Learned::Moved { from: old.port },
        }
    }

    /// Port to reach `mac`, if known and not aged out.
    pub fn lookup(&self, mac: MacAddress, now: SimTime) -> Option<PortId> {
        self.entries
            .get(&mac)
            .filter(|e| !self.is_expired(e, now))
            .map(|e| e.port)
    }

    pub fn get(&self, mac: MacAddress) -> Option<&MacTableEntry> {
        self.entries.get(&mac)
    }

    /// Drop aged-out entries; returns how many were removed.
    pub fn expire(&mut self, now: SimTime) -> usize {
        let Some(ageing) = self.ageing_time else {
            return 0;
        };
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_sub(e.last_seen) <= ageing);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MacAddress, &MacTableEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &MacTableEntry, now: SimTime) -> bool {
        self.ageing_time
            .is_some_and(|ageing| now.saturating_sub(entry.last_seen) > ageing)
    }
}
