//! Constant-velocity mobility.

use roamsim_common::{NodeId, SimError, SimTime, Vec3};
use std::collections::BTreeMap;

/// Trajectory of one node: `position(t) = origin + velocity * (t - t0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MobilityState {
    origin: Vec3,
    t0: SimTime,
    velocity: Vec3,
}

impl MobilityState {
    pub fn stationary(position: Vec3) -> Self {
        MobilityState {
            origin: position,
            t0: SimTime::ZERO,
            velocity: Vec3::ZERO,
        }
    }

    pub fn moving(position: Vec3, velocity: Vec3, t0: SimTime) -> Self {
        MobilityState {
            origin: position,
            t0,
            velocity,
        }
    }

    /// Position at `time`. Pure: the same `time` always yields the same point.
    pub fn position_at(&self, time: SimTime) -> Vec3 {
        if self.velocity.is_zero() {
            return self.origin;
        }
        let dt = time.as_secs_f64() - self.t0.as_secs_f64();
        self.origin + self.velocity * dt
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Anchor of the current trajectory segment.
    pub fn anchor(&self) -> (Vec3, SimTime) {
        (self.origin, self.t0)
    }

    /// Re-anchor at `now` and continue with a new velocity.
    fn set_velocity(&mut self, velocity: Vec3, now: SimTime) {
        self.origin = self.position_at(now);
        self.t0 = now;
        self.velocity = velocity;
    }

    fn set_position(&mut self, position: Vec3, now: SimTime) {
        self.origin = position;
        self.t0 = now;
    }
}

/// Per-node mobility state, keyed by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct MobilityEngine {
    nodes: BTreeMap<NodeId, MobilityState>,
}

impl MobilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Re-registering replaces its trajectory.
    pub fn add_node(&mut self, node: NodeId, position: Vec3, velocity: Vec3) {
        self.nodes
            .insert(node, MobilityState::moving(position, velocity, SimTime::ZERO));
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn state(&self, node: NodeId) -> Option<&MobilityState> {
        self.nodes.get(&node)
    }

    pub fn position_at(&self, node: NodeId, time: SimTime) -> Option<Vec3> {
        self.nodes.get(&node).map(|s| s.position_at(time))
    }

    pub fn velocity_of(&self, node: NodeId) -> Option<Vec3> {
        self.nodes.get(&node).map(|s| s.velocity())
    }

    /// Apply a velocity change at `now`. The trajectory is re-anchored at the
    /// current position first, so no error accumulates across changes.
    pub fn set_velocity(&mut self, node: NodeId, velocity: Vec3, now: SimTime) -> Result<(), SimError> {
        let state = self.nodes.get_mut(&node).ok_or(SimError::UnknownNode(node))?;
        state.set_velocity(velocity, now);
        Ok(())
    }

    /// Teleport a node, keeping its velocity.
    pub fn set_position(&mut self, node: NodeId, position: Vec3, now: SimTime) -> Result<(), SimError> {
        let state = self.nodes.get_mut(&node).ok_or(SimError::UnknownNode(node))?;
        state.set_position(position, now);
        Ok(())
    }

    /// Snapshot of every node position at `time`, in node order.
    pub fn materialize(&self, time: SimTime) -> Vec<(NodeId, Vec3)> {
        self.nodes
            .iter()
            .map(|(id, s)| (*id, s.position_at(time)))
            .collect()
    }

    /// Nodes with a non-zero velocity.
    pub fn moving_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, s)| !s.velocity().is_zero())
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
