//! Distance-based path-loss models.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Distances below this are clamped; there is no near-field model.
pub const MIN_DISTANCE_M: f64 = 1.0;

/// Loss at 1 m of the reference scenario (free-space loss at 5.15 GHz).
pub const DEFAULT_REFERENCE_LOSS_DB: f64 = 46.6777;

/// Maps a distance to a path loss. Implementations must be pure and
/// monotonically non-decreasing in distance.
pub trait PropagationLossModel: Debug + Send + Sync {
    fn path_loss_db(&self, distance_m: f64) -> f64;
}

/// `L(d) = L0 + 10 n log10(d / d0)` for `d > d0`, `L0` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogDistanceModel {
    pub exponent: f64,
    pub reference_distance_m: f64,
    pub reference_loss_db: f64,
}

impl Default for LogDistanceModel {
    fn default() -> Self {
        LogDistanceModel {
            exponent: 3.0,
            reference_distance_m: 1.0,
            reference_loss_db: DEFAULT_REFERENCE_LOSS_DB,
        }
    }
}

impl PropagationLossModel for LogDistanceModel {
    fn path_loss_db(&self, distance_m: f64) -> f64 {
        if distance_m <= self.reference_distance_m {
            return self.reference_loss_db;
        }
        self.reference_loss_db
            + 10.0 * self.exponent * (distance_m / self.reference_distance_m).log10()
    }
}

/// Friis free-space loss, `20 log10(d) + 20 log10(f_MHz) - 27.55`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeSpaceModel {
    pub frequency_mhz: f64,
}

impl PropagationLossModel for FreeSpaceModel {
    fn path_loss_db(&self, distance_m: f64) -> f64 {
        let d = distance_m.max(MIN_DISTANCE_M);
        20.0 * d.log10() + 20.0 * self.frequency_mhz.log10() - 27.55
    }
}

/// Serializable choice of propagation model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PropagationConfig {
    LogDistance {
        #[serde(default = "default_exponent")]
        exponent: f64,
        #[serde(default = "default_reference_distance")]
        reference_distance_m: f64,
        #[serde(default = "default_reference_loss")]
        reference_loss_db: f64,
    },
    FreeSpace {
        #[serde(default = "default_frequency")]
        frequency_mhz: f64,
    },
}

fn default_exponent() -> f64 {
    3.0
}

fn default_reference_distance() -> f64 {
    1.0
}

fn default_reference_loss() -> f64 {
    DEFAULT_REFERENCE_LOSS_DB
}

fn default_frequency() -> f64 {
    2412.0
}

impl Default for PropagationConfig {
    fn default() -> Self {
        let m = LogDistanceModel::default();
        PropagationConfig::LogDistance {
            exponent: m.exponent,
            reference_distance_m: m.reference_distance_m,
            reference_loss_db: m.reference_loss_db,
        }
    }
}

impl PropagationConfig {
    pub fn build(&self) -> Box<dyn PropagationLossModel> {
        match *self {
            PropagationConfig::LogDistance {
                exponent,
                reference_distance_m,
                reference_loss_db,
            } => Box::new(LogDistanceModel {
                exponent,
                reference_distance_m,
                reference_loss_db,
            }),
            PropagationConfig::FreeSpace { frequency_mhz } => {
                Box::new(FreeSpaceModel { frequency_mhz })
            }
        }
    }

    /// Returns a description of the first invalid parameter, if any.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            PropagationConfig::LogDistance {
                exponent,
                reference_distance_m,
                reference_loss_db,
            } => {
                if !(exponent.is_finite() && exponent > 0.0) {
                    return Err(format!("path loss exponent must be positive, got {}", exponent));
                }
                if !(reference_distance_m.is_finite() && reference_distance_m > 0.0) {
                    return Err(format!(
                        "reference distance must be positive, got {}",
                        reference_distance_m
                    ));
                }
                if !reference_loss_db.is_finite() {
                    return Err("reference loss must be finite".to_string());
                }
                Ok(())
            }
            PropagationConfig::FreeSpace { frequency_mhz } => {
                if frequency_mhz.is_finite() && frequency_mhz > 0.0 {
                    Ok(())
                } else {
                    Err(format!("frequency must be positive, got {}", frequency_mhz))
                }
            }
        }
    }
}
