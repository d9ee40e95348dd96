//! The radio world: mobility plus propagation, seen through
//! [`RadioEnvironment`].

use crate::{MobilityEngine, PropagationConfig, PropagationLossModel};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use roamsim_common::{NodeId, RadioEnvironment, SimTime, Vec3};
use std::collections::HashMap;

/// Transmit power of the reference scenario (40 mW).
pub const DEFAULT_TX_POWER_DBM: f64 = 16.0206;

/// Zero-mean Gaussian shadowing.
///
/// A sample depends only on the seed, the unordered node pair and the
/// coherence interval containing the query time, so repeated queries agree and
/// the link is reciprocal.
#[derive(Debug, Clone)]
pub struct Shadowing {
    normal: Normal<f64>,
    seed: u64,
    coherence: SimTime,
}

impl Shadowing {
    /// `None` when `std_dev_db` is zero or not a valid standard deviation.
    pub fn new(std_dev_db: f64, seed: u64, coherence: SimTime) -> Option<Self> {
        if std_dev_db <= 0.0 {
            return None;
        }
        let normal = Normal::new(0.0, std_dev_db).ok()?;
        Some(Shadowing {
            normal,
            seed,
            coherence: if coherence == SimTime::ZERO {
                SimTime::from_secs(1.0)
            } else {
                coherence
            },
        })
    }

    pub fn sample_db(&self, a: NodeId, b: NodeId, time: SimTime) -> f64 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let bucket = time.as_micros() / self.coherence.as_micros();
        let key = mix(mix(mix(self.seed ^ u64::from(lo.0)) ^ (u64::from(hi.0) << 32)) ^ bucket);
        let mut rng = ChaCha8Rng::seed_from_u64(key);
        self.normal.sample(&mut rng)
    }
}

/// splitmix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Node positions and link budgets.
#[derive(Debug)]
pub struct RadioWorld {
    mobility: MobilityEngine,
    propagation: Box<dyn PropagationLossModel>,
    default_tx_power_dbm: f64,
    tx_power_dbm: HashMap<NodeId, f64>,
    shadowing: Option<Shadowing>,
}

impl RadioWorld {
    pub fn new(propagation: &PropagationConfig, default_tx_power_dbm: f64) -> Self {
        RadioWorld {
            mobility: MobilityEngine::new(),
            propagation: propagation.build(),
            default_tx_power_dbm,
            tx_power_dbm: HashMap::new(),
            shadowing: None,
        }
    }

    pub fn with_shadowing(mut self, shadowing: Option<Shadowing>) -> Self {
        self.shadowing = shadowing;
        self
    }

    pub fn add_node(&mut self, node: NodeId, position: Vec3, velocity: Vec3) {
        self.mobility.add_node(node, position, velocity);
    }

    /// Override the transmit power of one node.
    pub fn set_tx_power(&mut self, node: NodeId, dbm: f64) {
        self.tx_power_dbm.insert(node, dbm);
    }

    pub fn tx_power_dbm(&self, node: NodeId) -> f64 {
        self.tx_power_dbm
            .get(&node)
            .copied()
            .unwrap_or(self.default_tx_power_dbm)
    }

    pub fn mobility(&self) -> &MobilityEngine {
        &self.mobility
    }

    pub fn mobility_mut(&mut self) -> &mut MobilityEngine {
        &mut self.mobility
    }

    /// Deterministic received power for a transmitter at `tx_pos`, without
    /// shadowing.
    pub fn rx_power_at(&self, tx_power_dbm: f64, tx_pos: Vec3, rx_pos: Vec3) -> f64 {
        tx_power_dbm - self.propagation.path_loss_db(tx_pos.distance(&rx_pos))
    }
}

impl RadioEnvironment for RadioWorld {
    fn position(&self, node: NodeId, time: SimTime) -> Option<Vec3> {
        self.mobility.position_at(node, time)
    }

    fn signal_dbm(&self, tx: NodeId, rx: NodeId, time: SimTime) -> Option<f64> {
        let tx_pos = self.mobility.position_at(tx, time)?;
        let rx_pos = self.mobility.position_at(rx, time)?;
        let mut rx_power = self.rx_power_at(self.tx_power_dbm(tx), tx_pos, rx_pos);
        if let Some(shadowing) = &self.shadowing {
            rx_power += shadowing.sample_db(tx, rx, time);
        }
        Some(rx_power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const AP0: NodeId = NodeId(0);
    const AP1: NodeId = NodeId(1);
    const AP2: NodeId = NodeId(2);
    const STA: NodeId = NodeId(10);

    const SENSITIVITY_DBM: f64 = -98.65;

    fn reference_world() -> RadioWorld {
        let mut w = RadioWorld::new(&PropagationConfig::default(), DEFAULT_TX_POWER_DBM);
        w.add_node(AP0, Vec3::new(0.0, 0.0, 0.0), Vec3::ZERO);
        w.add_node(AP1, Vec3::new(150.0, 0.0, 0.0), Vec3::ZERO);
        w.add_node(AP2, Vec3::new(300.0, 0.0, 0.0), Vec3::ZERO);
        w.add_node(STA, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0));
        w
    }

    fn signal(w: &RadioWorld, ap: NodeId, secs: f64) -> f64 {
        w.signal_dbm(ap, STA, SimTime::from_secs(secs)).unwrap()
    }

    #[test]
    fn test_reference_link_budget_crosses_sensitivity_near_185m() {
        let w = reference_world();
        assert_relative_eq!(signal(&w, AP0, 18.4), -98.6016, epsilon = 1e-3);
        assert_relative_eq!(signal(&w, AP0, 18.5), -98.6722, epsilon = 1e-3);
        assert!(signal(&w, AP0, 18.4) >= SENSITIVITY_DBM);
        assert!(signal(&w, AP0, 18.5) < SENSITIVITY_DBM);
    }

    #[test]
    fn test_nearer_ap_is_stronger() {
        let w = reference_world();
        // At x = 185 m AP1 is 35 m away and AP2 115 m.
        assert!(signal(&w, AP1, 18.5) > signal(&w, AP2, 18.5));
        assert!(signal(&w, AP2, 18.5) > SENSITIVITY_DBM);
        // At the start AP2 (300 m) is out of range.
        assert!(signal(&w, AP2, 0.0) < SENSITIVITY_DBM);
    }

    #[test]
    fn test_signal_is_reciprocal_and_pure() {
        let w = reference_world();
        let t = SimTime::from_secs(21.37);
        assert_eq!(w.signal_dbm(AP1, STA, t), w.signal_dbm(STA, AP1, t));
        assert_eq!(w.signal_dbm(AP1, STA, t), w.signal_dbm(AP1, STA, t));
        assert_eq!(w.signal_dbm(AP1, NodeId(77), t), None);
    }

    #[test]
    fn test_tx_power_override() {
        let mut w = reference_world();
        let before = signal(&w, AP0, 5.0);
        w.set_tx_power(AP0, DEFAULT_TX_POWER_DBM + 3.0);
        assert_relative_eq!(signal(&w, AP0, 5.0), before + 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_shadowing_is_deterministic_and_reciprocal() {
        let s = Shadowing::new(4.0, 7, SimTime::from_secs(1.0)).unwrap();
        let t = SimTime::from_millis(2_500);
        assert_eq!(s.sample_db(AP0, STA, t), s.sample_db(STA, AP0, t));
        assert_eq!(
            s.sample_db(AP0, STA, t),
            s.sample_db(AP0, STA, SimTime::from_millis(2_999))
        );
        let other_seed = Shadowing::new(4.0, 8, SimTime::from_secs(1.0)).unwrap();
        assert_ne!(s.sample_db(AP0, STA, t), other_seed.sample_db(AP0, STA, t));
        assert!(Shadowing::new(0.0, 7, SimTime::from_secs(1.0)).is_none());
    }

    #[test]
    fn test_shadowing_has_roughly_zero_mean() {
        let s = Shadowing::new(4.0, 42, SimTime::from_millis(100)).unwrap();
        let n = 2000;
        let mean: f64 = (0..n)
            .map(|i| s.sample_db(AP0, STA, SimTime::from_millis(i * 100)))
            .sum::<f64>()
            / n as f64;
        assert!(mean.abs() < 0.5, "mean {}", mean);
    }
}
