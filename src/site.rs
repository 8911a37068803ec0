//! Site identity encoding and the decoded per-site view.

use cpm_common::IntPoint;

/// Cell identity. 0 is the medium, live cells are numbered from 1.
pub type CellId = u32;
/// Cell type index. 0 is the medium type.
pub type CellType = u8;

pub const CELL_ID_BITS: u32 = 24;
pub const CELL_ID_MASK: u32 = (1 << CELL_ID_BITS) - 1;
/// Largest id the packed encoding can hold.
pub const MAX_CELL_ID: CellId = CELL_ID_MASK;

/// Packed `cell_id | (cell_type << 24)` occupancy word.
///
/// This bit layout is the external grid format; keep it stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Occupant(u32);

impl Occupant {
    pub const MEDIUM: Occupant = Occupant(0);

    /// Packs an id and type. Ids above [`MAX_CELL_ID`] are a caller bug and
    /// are rejected at cell creation, so only the low bits are kept here.
    pub fn new(cell_id: CellId, cell_type: CellType) -> Self {
        debug_assert!(cell_id <= MAX_CELL_ID);
        Occupant((cell_id & CELL_ID_MASK) | (u32::from(cell_type) << CELL_ID_BITS))
    }

    pub fn from_raw(raw: u32) -> Self {
        Occupant(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn cell_id(self) -> CellId {
        self.0 & CELL_ID_MASK
    }

    pub fn cell_type(self) -> CellType {
        (self.0 >> CELL_ID_BITS) as CellType
    }
}

/// Decoded view of one lattice site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub cell_id: CellId,
    pub cell_type: CellType,
    /// Wrapped lattice coordinates.
    pub position: IntPoint,
    /// Tick at which the site was last taken over; 0 unless activity tracking is on.
    pub act: u32,
}

impl Site {
    pub fn occupant(&self) -> Occupant {
        Occupant::new(self.cell_id, self.cell_type)
    }

    pub fn is_medium(&self) -> bool {
        self.cell_id == 0
    }

    /// The same position seen as medium, used when a fixed cell may not donate.
    pub fn as_medium(&self) -> Site {
        Site { cell_id: 0, cell_type: 0, ..*self }
    }
}
