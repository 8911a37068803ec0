//! Cellular Potts model engine.
//!
//! Cells are sets of sites on a periodic 2D or 3D lattice. Each Monte Carlo
//! Step proposes copies of a site's owner into a neighbouring site and accepts
//! them by the Metropolis rule on an energy built from adhesion, area,
//! perimeter, activity, connectivity, persistence and chemotaxis terms.
//! [`Cpm`] is the entry point.

pub mod cell_book;
pub mod centroids;
pub mod cpm;
pub mod dice_set;
pub mod error;
pub mod hamiltonian;
pub mod lattice;
pub mod simulation;
pub mod site;

pub use cpm::{Cpm, RunSummary};
pub use error::{CpmError, Result};
pub use hamiltonian::{EnabledTerms, Hamiltonian};
pub use simulation::{Simulation, StepStats};
pub use site::{CellId, CellType, Occupant, Site, MAX_CELL_ID};

pub use cpm_common::{
    CellRecord, IntPoint, LatticeTopology, ModelParams, Point, SimulationConfig, Snapshot, TypeConstraints,
};
