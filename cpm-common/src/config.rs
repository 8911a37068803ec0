use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::ModelParams;
use crate::topology::LatticeTopology;
use std::path::Path;

/// Largest number of cell types the packed site encoding can carry (type bits 24..32).
pub const MAX_CELL_TYPES: usize = 256;

// Lattice geometry
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LatticeConfig {
    pub topology: LatticeTopology,
    pub dimension: usize,
}

// Model-wide physics
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelConfig {
    pub number_of_types: usize,
    pub temperature: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub total_ticks: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval_ticks: u32,
}

/// Keyword-style constraint block for one cell type.
///
/// Each term is applied only when all of its keys are present; a block may
/// carry any subset of terms. Missing keys leave the current value untouched.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct TypeConstraints {
    pub cell_type: u8,
    pub other_cell_type: Option<u8>,
    pub adhesion: Option<f64>,
    pub lambda_area: Option<f64>,
    pub target_area: Option<f64>,
    pub lambda_perimeter: Option<f64>,
    pub target_perimeter: Option<f64>,
    pub lambda_act: Option<f64>,
    pub max_act: Option<u32>,
    pub lambda_connectivity: Option<f64>,
    pub lambda_chemotaxis: Option<f64>,
    pub lambda_persistence: Option<f64>,
    /// History length (in ticks) used to measure the recent displacement.
    pub persistence_time: Option<usize>,
    /// Smoothing weight of the previous preferred direction, in `[0, 1)`.
    pub persistence_diffusion: Option<f64>,
    pub fixed: Option<bool>,
}

impl TypeConstraints {
    /// Starts an empty block for `cell_type`.
    pub fn for_type(cell_type: u8) -> Self {
        TypeConstraints { cell_type, ..Default::default() }
    }
}

// Initial cell seeding used by the driver
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub num_cells: u32,
    #[serde(default = "default_initial_cell_type")]
    pub cell_type: u8,
    pub placement_seed: u64,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default)]
    pub save_tracks: bool,
}

fn default_record_interval() -> u32 {
    10
}

fn default_initial_cell_type() -> u8 {
    1
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub lattice: LatticeConfig,
    pub model: ModelConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub constraints: Vec<TypeConstraints>,
    pub initial_conditions: InitialConditions,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lattice.dimension < 2 {
            anyhow::bail!("lattice.dimension must be at least 2.");
        }
        let types = self.model.number_of_types;
        if types == 0 || types > MAX_CELL_TYPES {
            anyhow::bail!("model.number_of_types must be in 1..={}.", MAX_CELL_TYPES);
        }
        if !self.model.temperature.is_finite() || self.model.temperature < 0.0 {
            anyhow::bail!("model.temperature must be finite and non-negative.");
        }
        if self.timing.record_interval_ticks == 0 {
            anyhow::bail!("timing.record_interval_ticks must be greater than 0.");
        }
        for (i, block) in self.constraints.iter().enumerate() {
            if usize::from(block.cell_type) >= types {
                anyhow::bail!("constraints[{}].cell_type {} is not below number_of_types {}.", i, block.cell_type, types);
            }
            if let Some(other) = block.other_cell_type {
                if usize::from(other) >= types {
                    anyhow::bail!("constraints[{}].other_cell_type {} is not below number_of_types {}.", i, other, types);
                }
            }
            if let Some(p) = block.persistence_diffusion {
                if !(0.0..1.0).contains(&p) {
                    anyhow::bail!("constraints[{}].persistence_diffusion must be in [0, 1).", i);
                }
            }
        }
        if usize::from(self.initial_conditions.cell_type) >= types {
            anyhow::bail!("initial_conditions.cell_type is not below number_of_types.");
        }
        Ok(())
    }

    /// Converts the configuration into the parameters a model is constructed from.
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            topology: self.lattice.topology,
            dimension: self.lattice.dimension,
            number_of_types: self.model.number_of_types,
            temperature: self.model.temperature,
            seed: self.model.seed,
        }
    }
}
