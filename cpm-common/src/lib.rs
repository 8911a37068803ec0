pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod topology;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, LatticeConfig, ModelConfig, TimingConfig, TypeConstraints, InitialConditions, OutputConfig, MAX_CELL_TYPES};
pub use sim_params::ModelParams;
pub use snapshot::{Snapshot, CellRecord};
pub use topology::LatticeTopology;
pub use vecmath::{Point, IntPoint};
