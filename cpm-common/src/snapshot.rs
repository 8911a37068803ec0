use serde::{Deserialize, Serialize};

/// A readout of the model at a tick boundary. Owned copy, never a view into live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of Monte Carlo Steps completed when the snapshot was taken.
    pub tick: u32,
    /// Cells with at least one site.
    pub live_cells: usize,
    /// Size of the active boundary set.
    pub border_sites: usize,
    /// Trial moves evaluated during the most recent tick.
    pub attempted_moves: u64,
    /// Trial moves accepted during the most recent tick.
    pub accepted_moves: u64,
    /// One record per live cell, ordered by id.
    pub cells: Vec<CellRecord>,
}

/// Per-cell row of a snapshot; flat so it can go straight into a CSV writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub tick: u32,
    pub cell_id: u32,
    pub cell_type: u8,
    pub area: i64,
    pub perimeter: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
