use thiserror::Error;

use crate::site::{CellId, CellType};

/// Contract violations surfaced at the engine boundary.
///
/// The engine performs no I/O, so none of these are transient: each one means
/// the caller asked for something the model cannot represent or is not in a
/// state to do.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CpmError {
    #[error("cell id {requested} does not fit the 24-bit identity encoding")]
    CapacityExceeded { requested: u64 },
    #[error("cell type {cell_type} is not below number_of_types {number_of_types}")]
    UnknownCellType { cell_type: CellType, number_of_types: usize },
    #[error("cell {cell_id} has not been created")]
    UnknownCell { cell_id: CellId },
    #[error("the medium (cell 0) has type 0, got {cell_type}")]
    TypedMedium { cell_type: CellType },
    #[error("cell {cell_id} has type {expected}, got {actual}")]
    CellTypeMismatch { cell_id: CellId, expected: CellType, actual: CellType },
    #[error("lattice dimension must be at least 2, got {0}")]
    InvalidDimension(usize),
    #[error("number_of_types must be in 1..=256, got {0}")]
    InvalidTypeCount(usize),
    #[error("temperature must be finite and non-negative, got {0}")]
    InvalidTemperature(f64),
    #[error("occupancy grid has {actual} sites, lattice has {expected}")]
    GridSizeMismatch { expected: usize, actual: usize },
    #[error("field buffer has {actual} values, expected {expected}")]
    FieldSizeMismatch { expected: usize, actual: usize },
    #[error("occupancy grid references cell {cell_id} but cell_count is {cell_count}")]
    GridCellOutOfRange { cell_id: CellId, cell_count: u32 },
    #[error("a background run is outstanding; join or cancel it first")]
    RunInProgress,
    #[error("no background run is outstanding")]
    NotRunning,
    #[error("background run panicked; model state is lost")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, CpmError>;
