use serde::{Deserialize, Serialize};

use crate::vecmath::IntPoint;

// Ring order matters: the connectivity term walks these cyclically.
const MOORE_2D: [IntPoint; 8] = [
    IntPoint::planar(-1, 1),
    IntPoint::planar(0, 1),
    IntPoint::planar(1, 1),
    IntPoint::planar(1, 0),
    IntPoint::planar(1, -1),
    IntPoint::planar(0, -1),
    IntPoint::planar(-1, -1),
    IntPoint::planar(-1, 0),
];

// Upper plane ring + centre, middle plane ring, lower plane ring + centre.
const MOORE_3D: [IntPoint; 26] = [
    IntPoint::new(-1, 1, 1),
    IntPoint::new(0, 1, 1),
    IntPoint::new(1, 1, 1),
    IntPoint::new(1, 0, 1),
    IntPoint::new(1, -1, 1),
    IntPoint::new(0, -1, 1),
    IntPoint::new(-1, -1, 1),
    IntPoint::new(-1, 0, 1),
    IntPoint::new(0, 0, 1),
    IntPoint::new(-1, 1, 0),
    IntPoint::new(0, 1, 0),
    IntPoint::new(1, 1, 0),
    IntPoint::new(1, 0, 0),
    IntPoint::new(1, -1, 0),
    IntPoint::new(0, -1, 0),
    IntPoint::new(-1, -1, 0),
    IntPoint::new(-1, 0, 0),
    IntPoint::new(-1, 1, -1),
    IntPoint::new(0, 1, -1),
    IntPoint::new(1, 1, -1),
    IntPoint::new(1, 0, -1),
    IntPoint::new(1, -1, -1),
    IntPoint::new(0, -1, -1),
    IntPoint::new(-1, -1, -1),
    IntPoint::new(-1, 0, -1),
    IntPoint::new(0, 0, -1),
];

/// Neighbourhood geometry of a periodic lattice, selected once at construction.
///
/// Every engine component asks the topology for its dimensionality and its
/// neighbour offset table instead of being specialised per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatticeTopology {
    /// Square lattice with the 8-site Moore ring.
    #[serde(rename = "2d")]
    Moore2d,
    /// Cubic lattice with the 26-site Moore cube.
    #[serde(rename = "3d")]
    Moore3d,
}

impl LatticeTopology {
    /// Number of spatial axes (2 or 3).
    pub fn dimensionality(self) -> usize {
        match self {
            LatticeTopology::Moore2d => 2,
            LatticeTopology::Moore3d => 3,
        }
    }

    pub fn neighbor_offsets(self) -> &'static [IntPoint] {
        match self {
            LatticeTopology::Moore2d => &MOORE_2D,
            LatticeTopology::Moore3d => &MOORE_3D,
        }
    }

    pub fn neighbor_count(self) -> usize {
        self.neighbor_offsets().len()
    }

    /// Total number of sites of a lattice with the given axis length.
    pub fn site_count(self, dimension: usize) -> usize {
        dimension.pow(self.dimensionality() as u32)
    }
}
