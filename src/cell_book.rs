use rayon::prelude::*;

use crate::lattice::Lattice;
use crate::site::{CellId, CellType, Site};

/// Per-cell area, perimeter and type, indexed by `cell_id - 1`.
///
/// Entries are only ever appended; killing a cell zeroes its numbers but
/// keeps its id allocated.
#[derive(Debug, Clone, Default)]
pub struct CellBook {
    areas: Vec<i64>,
    perimeters: Vec<i64>,
    types: Vec<CellType>,
}

impl CellBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a ledger entry and returns its id (prior count + 1).
    pub fn add_cell(&mut self, area: i64, perimeter: i64, cell_type: CellType) -> CellId {
        self.areas.push(area);
        self.perimeters.push(perimeter);
        self.types.push(cell_type);
        self.areas.len() as CellId
    }

    /// Id the next `add_cell` will hand out.
    pub fn next_id(&self) -> u64 {
        self.areas.len() as u64 + 1
    }

    /// Number of allocated ids, live or killed.
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn contains(&self, cell_id: CellId) -> bool {
        cell_id >= 1 && (cell_id as usize) <= self.areas.len()
    }

    pub fn area(&self, cell_id: CellId) -> i64 {
        self.areas[slot(cell_id)]
    }

    pub fn perimeter(&self, cell_id: CellId) -> i64 {
        self.perimeters[slot(cell_id)]
    }

    pub fn cell_type(&self, cell_id: CellId) -> CellType {
        self.types[slot(cell_id)]
    }

    pub fn update_type(&mut self, cell_id: CellId, cell_type: CellType) {
        self.types[slot(cell_id)] = cell_type;
    }

    /// `target`'s site is being overwritten with `source`'s identity.
    pub fn update_areas(&mut self, source: &Site, target: &Site) {
        if !source.is_medium() {
            self.areas[slot(source.cell_id)] += 1;
        }
        if !target.is_medium() {
            self.areas[slot(target.cell_id)] -= 1;
        }
    }

    /// Applies the perimeter change of `target` switching from its current
    /// owner to `source`'s, from a single scan of `target`'s neighbours.
    pub fn update_perimeters(&mut self, source: &Site, target: &Site, lattice: &Lattice) {
        let delta = PerimeterDelta::scan(source, target, lattice);
        if !source.is_medium() {
            self.perimeters[slot(source.cell_id)] += delta.source;
        }
        if !target.is_medium() {
            self.perimeters[slot(target.cell_id)] += delta.target;
        }
    }

    /// Resets the ledger to `cell_count` cells and derives every area,
    /// perimeter and type from the lattice in one pass.
    ///
    /// A cell's type is taken from its sites; ids with no site get type 0.
    pub fn initialize_from_grid(&mut self, lattice: &Lattice, cell_count: usize) {
        self.areas = vec![0; cell_count];
        self.perimeters = vec![0; cell_count];
        self.types = vec![0; cell_count];
        for i in 0..lattice.site_count() {
            let site = lattice.site_at(i);
            if site.is_medium() {
                continue;
            }
            let s = slot(site.cell_id);
            self.areas[s] += 1;
            self.types[s] = site.cell_type;
            self.perimeters[s] += lattice
                .neighbors(site.position)
                .filter(|n| n.cell_id != site.cell_id)
                .count() as i64;
        }
    }

    /// Brute-force perimeter of one cell, recounted over the whole lattice.
    pub fn count_perimeter(lattice: &Lattice, cell_id: CellId) -> i64 {
        (0..lattice.site_count())
            .into_par_iter()
            .filter(|&i| lattice.occupancy()[i].cell_id() == cell_id)
            .map(|i| {
                lattice
                    .neighbors(lattice.position(i))
                    .filter(|n| n.cell_id != cell_id)
                    .count() as i64
            })
            .sum()
    }

    /// Replaces the stored perimeter of `cell_id` with a full recount.
    pub fn recalc_perimeter(&mut self, lattice: &Lattice, cell_id: CellId) {
        self.perimeters[slot(cell_id)] = Self::count_perimeter(lattice, cell_id);
    }

    /// Number of live (area > 0) cells of `cell_type`.
    pub fn count_type(&self, cell_type: CellType) -> usize {
        self.live_ids(cell_type).count()
    }

    /// Ids of live (area > 0) cells of `cell_type`, ascending.
    pub fn cell_ids(&self, cell_type: CellType) -> Vec<CellId> {
        self.live_ids(cell_type).collect()
    }

    fn live_ids(&self, cell_type: CellType) -> impl Iterator<Item = CellId> + '_ {
        self.types
            .iter()
            .zip(&self.areas)
            .enumerate()
            .filter(move |(_, (t, a))| **t == cell_type && **a > 0)
            .map(|(i, _)| i as CellId + 1)
    }

    /// Ids of every cell with area > 0, ascending.
    pub fn live_cells(&self) -> Vec<CellId> {
        self.areas
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 0)
            .map(|(i, _)| i as CellId + 1)
            .collect()
    }

    pub fn kill(&mut self, cell_id: CellId) {
        self.areas[slot(cell_id)] = 0;
        self.perimeters[slot(cell_id)] = 0;
    }
}

#[inline(always)]
fn slot(cell_id: CellId) -> usize {
    cell_id as usize - 1
}

/// Perimeter change of the gaining (`source`) and losing (`target`) cell when
/// `target`'s site changes hands, from one pass over its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerimeterDelta {
    pub source: i64,
    pub target: i64,
}

impl PerimeterDelta {
    pub fn scan(source: &Site, target: &Site, lattice: &Lattice) -> Self {
        let total = lattice.neighbor_count() as i64;
        let mut matching_source = 0;
        let mut matching_target = 0;
        for neighbor in lattice.neighbors(target.position) {
            if neighbor.cell_id == source.cell_id {
                matching_source += 1;
            }
            if neighbor.cell_id == target.cell_id {
                matching_target += 1;
            }
        }
        // The gainer stops counting its own neighbours of the site and starts
        // counting the foreign ones; the loser does the opposite.
        PerimeterDelta {
            source: (total - matching_source) - matching_source,
            target: matching_target - (total - matching_target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Occupant;
    use cpm_common::{IntPoint, LatticeTopology};

    #[test]
    fn killed_cells_are_excluded_by_type_queries() {
        let mut book = CellBook::new();
        for _ in 0..3 {
            book.add_cell(5, 12, 1);
        }
        book.kill(2);
        assert_eq!(book.count_type(1), 2);
        assert_eq!(book.cell_ids(1), vec![1, 3]);
        assert_eq!(book.area(2), 0);
        assert_eq!(book.perimeter(2), 0);
        assert_eq!(book.next_id(), 4);
    }

    #[test]
    fn incremental_updates_match_recount() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 8).unwrap();
        let mut book = CellBook::new();
        let a = book.add_cell(0, 0, 1);
        let b = book.add_cell(0, 0, 1);

        let moves = [
            (a, IntPoint::planar(1, 1)),
            (a, IntPoint::planar(2, 1)),
            (b, IntPoint::planar(3, 1)),
            (a, IntPoint::planar(2, 2)),
            (b, IntPoint::planar(2, 1)),
            (b, IntPoint::planar(7, 7)),
        ];
        for (id, p) in moves {
            let target = lattice.site(p);
            let source = Site { cell_id: id, cell_type: 1, ..target };
            lattice.copy(&source, &target, 0);
            book.update_areas(&source, &target);
            book.update_perimeters(&source, &target, &lattice);
        }
        assert_eq!(book.area(a), 2);
        assert_eq!(book.area(b), 3);
        for id in [a, b] {
            assert_eq!(book.perimeter(id), CellBook::count_perimeter(&lattice, id));
        }
    }

    #[test]
    fn initialize_from_grid_derives_state() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 8).unwrap();
        lattice.set_site(Occupant::new(1, 2), IntPoint::planar(0, 0), 0);
        lattice.set_site(Occupant::new(1, 2), IntPoint::planar(1, 0), 0);
        lattice.set_site(Occupant::new(3, 1), IntPoint::planar(5, 5), 0);
        let mut book = CellBook::new();
        book.initialize_from_grid(&lattice, 3);
        assert_eq!(book.len(), 3);
        assert_eq!(book.area(1), 2);
        assert_eq!(book.perimeter(1), 14);
        assert_eq!(book.cell_type(1), 2);
        assert_eq!(book.area(2), 0);
        assert_eq!(book.perimeter(3), 8);
        assert_eq!(book.live_cells(), vec![1, 3]);
    }

    #[test]
    fn recalc_perimeter_repairs_drift() {
        let mut lattice = Lattice::new(LatticeTopology::Moore3d, 6).unwrap();
        lattice.set_site(Occupant::new(1, 1), IntPoint::new(2, 2, 2), 0);
        let mut book = CellBook::new();
        book.add_cell(1, 0, 1);
        book.recalc_perimeter(&lattice, 1);
        assert_eq!(book.perimeter(1), 26);
    }
}
