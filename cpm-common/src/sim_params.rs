use serde::{Deserialize, Serialize};

use crate::topology::LatticeTopology;

/// Construction parameters of one model instance, derived from the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub topology: LatticeTopology,
    /// Axis length; every axis is periodic with this period.
    pub dimension: usize,
    /// Number of cell types, type 0 being the medium.
    pub number_of_types: usize,
    pub temperature: f64,
    /// Seed for the Monte Carlo random stream (`None` = OS entropy).
    pub seed: Option<u64>,
}
