use cpm_common::{IntPoint, LatticeTopology, Point};
use rand::Rng;
use rayon::prelude::*;

use crate::dice_set::DiceSet;
use crate::error::{CpmError, Result};
use crate::site::{CellId, CellType, Occupant, Site};

/// Periodic lattice of packed occupants plus the bookkeeping that has to stay
/// in lockstep with it: per-site activity ages and the set of border sites.
///
/// Every axis has length `dimension` and wraps around, so any integer
/// coordinate is a valid address.
#[derive(Debug, Clone)]
pub struct Lattice {
    topology: LatticeTopology,
    dimension: usize,
    occupancy: Vec<Occupant>,
    activity: Vec<u32>,
    /// Component-major: component `k` of site `i` lives at `i + k * site_count`.
    field: Vec<f64>,
    border: DiceSet,
    track_activity: bool,
}

impl Lattice {
    /// Creates an all-medium lattice. The border set starts empty.
    pub fn new(topology: LatticeTopology, dimension: usize) -> Result<Self> {
        if dimension < 2 {
            return Err(CpmError::InvalidDimension(dimension));
        }
        let sites = topology.site_count(dimension);
        Ok(Self {
            topology,
            dimension,
            occupancy: vec![Occupant::MEDIUM; sites],
            activity: vec![0; sites],
            field: vec![0.0; sites * topology.dimensionality()],
            border: DiceSet::with_capacity(sites / 4),
            track_activity: false,
        })
    }

    pub fn topology(&self) -> LatticeTopology {
        self.topology
    }

    /// Axis length.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of spatial axes.
    pub fn dimensionality(&self) -> usize {
        self.topology.dimensionality()
    }

    pub fn site_count(&self) -> usize {
        self.occupancy.len()
    }

    pub fn neighbor_count(&self) -> usize {
        self.topology.neighbor_count()
    }

    /// Folds a coordinate onto the periodic lattice. Planar lattices ignore `z`.
    #[inline(always)]
    pub fn wrap(&self, p: IntPoint) -> IntPoint {
        let mut w = p.rem_euclid(self.dimension as i64);
        if self.dimensionality() == 2 {
            w.z = 0;
        }
        w
    }

    /// Linear index of a (possibly unwrapped) coordinate: `(z * d + y) * d + x`.
    #[inline(always)]
    pub fn index(&self, p: IntPoint) -> usize {
        let d = self.dimension as i64;
        let w = self.wrap(p);
        ((w.z * d + w.y) * d + w.x) as usize
    }

    #[inline(always)]
    pub fn position(&self, index: usize) -> IntPoint {
        let d = self.dimension;
        IntPoint::new(
            (index % d) as i64,
            ((index / d) % d) as i64,
            (index / (d * d)) as i64,
        )
    }

    #[inline(always)]
    pub fn site_at(&self, index: usize) -> Site {
        let occupant = self.occupancy[index];
        let act = if self.track_activity { self.activity[index] } else { 0 };
        Site {
            cell_id: occupant.cell_id(),
            cell_type: occupant.cell_type(),
            position: self.position(index),
            act,
        }
    }

    #[inline(always)]
    pub fn site(&self, p: IntPoint) -> Site {
        self.site_at(self.index(p))
    }

    /// The `i`-th neighbour of `p` under the topology's fixed offset table.
    #[inline(always)]
    pub fn neighbor(&self, p: IntPoint, i: usize) -> Site {
        self.site(p + self.topology.neighbor_offsets()[i])
    }

    /// All neighbours of `p`, in offset-table order.
    pub fn neighbors(&self, p: IntPoint) -> impl Iterator<Item = Site> + '_ {
        self.topology
            .neighbor_offsets()
            .iter()
            .map(move |offset| self.site(p + *offset))
    }

    /// True if any neighbour is owned by a different cell id. Two medium sites
    /// never make a border; medium next to a cell does.
    pub fn is_border(&self, p: IntPoint) -> bool {
        let cell_id = self.occupancy[self.index(p)].cell_id();
        self.topology
            .neighbor_offsets()
            .iter()
            .any(|offset| self.occupancy[self.index(p + *offset)].cell_id() != cell_id)
    }

    /// Writes a site and restores the border invariant around it.
    pub fn set_site(&mut self, occupant: Occupant, p: IntPoint, act: u32) {
        let index = self.index(p);
        self.occupancy[index] = occupant;
        self.activity[index] = act;
        self.resync_border(p);
    }

    /// Recomputes border membership of `p` and of each of its neighbours.
    pub fn resync_border(&mut self, p: IntPoint) {
        self.resync_site(p);
        for offset in self.topology.neighbor_offsets() {
            self.resync_site(p + *offset);
        }
    }

    #[inline(always)]
    fn resync_site(&mut self, p: IntPoint) {
        let index = self.index(p);
        if self.is_border(p) {
            self.border.add(index);
        } else {
            self.border.remove(index);
        }
    }

    /// Gives `target`'s position the identity of `source`, stamped with `time`.
    pub fn copy(&mut self, source: &Site, target: &Site, time: u32) {
        self.set_site(source.occupant(), target.position, time);
    }

    /// Uniformly samples a border site; `None` when no border exists.
    pub fn random_border_site<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Site> {
        if self.border.is_empty() {
            return None;
        }
        let ordinal = rng.random_range(0..self.border.len());
        self.border.get(ordinal).map(|index| self.site_at(index))
    }

    /// Uniformly samples one of the neighbours of `site`.
    pub fn random_neighbor<R: Rng + ?Sized>(&self, site: &Site, rng: &mut R) -> Site {
        let i = rng.random_range(0..self.neighbor_count());
        self.neighbor(site.position, i)
    }

    pub fn border_len(&self) -> usize {
        self.border.len()
    }

    pub fn border_contains(&self, index: usize) -> bool {
        self.border.contains(index)
    }

    /// Activity ages are only reported when the activity term is in use.
    pub fn set_activity_tracking(&mut self, enabled: bool) {
        self.track_activity = enabled;
    }

    /// Externally supplied field vector at the site's position.
    pub fn field_at(&self, site: &Site) -> Point {
        let i = self.index(site.position);
        let n = self.site_count();
        match self.dimensionality() {
            2 => Point::planar(self.field[i], self.field[i + n]),
            _ => Point::new(self.field[i], self.field[i + n], self.field[i + 2 * n]),
        }
    }

    /// Installs a precomputed field (component-major layout).
    pub fn set_field(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.field.len() {
            return Err(CpmError::FieldSizeMismatch {
                expected: self.field.len(),
                actual: values.len(),
            });
        }
        self.field.copy_from_slice(values);
        Ok(())
    }

    pub fn field(&self) -> &[f64] {
        &self.field
    }

    pub fn occupancy(&self) -> &[Occupant] {
        &self.occupancy
    }

    /// Packed occupancy words in linear index order.
    pub fn occupancy_raw(&self) -> Vec<u32> {
        self.occupancy.iter().map(|o| o.raw()).collect()
    }

    pub fn activity(&self) -> &[u32] {
        &self.activity
    }

    /// Replaces the whole occupancy from packed words, clears activity ages
    /// and rebuilds the border set from scratch.
    pub fn load_occupancy(&mut self, grid: &[u32]) -> Result<()> {
        if grid.len() != self.site_count() {
            return Err(CpmError::GridSizeMismatch {
                expected: self.site_count(),
                actual: grid.len(),
            });
        }
        for (slot, raw) in self.occupancy.iter_mut().zip(grid) {
            *slot = Occupant::from_raw(*raw);
        }
        self.activity.iter_mut().for_each(|a| *a = 0);
        self.rebuild_border();
        Ok(())
    }

    /// Full O(grid) recomputation of the border set.
    pub fn rebuild_border(&mut self) {
        let flags: Vec<bool> = (0..self.site_count())
            .into_par_iter()
            .map(|i| self.is_border(self.position(i)))
            .collect();
        self.border.clear();
        for (i, is_border) in flags.into_iter().enumerate() {
            if is_border {
                self.border.add(i);
            }
        }
    }

    /// Arithmetic mean of the (wrapped) coordinates of all sites of `cell_id`.
    /// Full scan; not aware of cells straddling the periodic boundary.
    pub fn center_of_mass(&self, cell_id: CellId) -> Option<Point> {
        let (sum, count) = self
            .occupancy
            .par_iter()
            .enumerate()
            .filter(|(_, o)| o.cell_id() == cell_id)
            .map(|(i, _)| (self.position(i), 1i64))
            .reduce(|| (IntPoint::zero(), 0), |a, b| (a.0 + b.0, a.1 + b.1));
        if count == 0 {
            None
        } else {
            Some(sum.divide(count as f64))
        }
    }

    /// Coordinates of every site owned by `cell_id`, in index order.
    pub fn sites_of(&self, cell_id: CellId) -> Vec<IntPoint> {
        (0..self.site_count())
            .into_par_iter()
            .filter(|&i| self.occupancy[i].cell_id() == cell_id)
            .map(|i| self.position(i))
            .collect()
    }

    /// Rewrites the type bits of every site of `cell_id`, keeping activity ages.
    /// Ownership does not change, so the border set is unaffected.
    pub fn reset_type(&mut self, cell_id: CellId, cell_type: CellType) {
        self.occupancy
            .par_iter_mut()
            .filter(|o| o.cell_id() == cell_id)
            .for_each(|o| *o = Occupant::new(cell_id, cell_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_border_invariant(lattice: &Lattice) {
        for i in 0..lattice.site_count() {
            let p = lattice.position(i);
            assert_eq!(
                lattice.border_contains(i),
                lattice.is_border(p),
                "border mismatch at {:?}",
                p
            );
        }
    }

    #[test]
    fn index_and_position_round_trip_with_wraparound() {
        let lattice = Lattice::new(LatticeTopology::Moore3d, 8).unwrap();
        let p = IntPoint::new(3, 5, 7);
        let i = lattice.index(p);
        assert_eq!(lattice.position(i), p);
        assert_eq!(lattice.index(IntPoint::new(-5, 13, -1)), i);
    }

    #[test]
    fn planar_lattice_ignores_depth() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 16).unwrap();
        let p = IntPoint::new(1, 1, 1);
        assert_eq!(lattice.wrap(p), IntPoint::planar(1, 1));
        assert_eq!(lattice.index(p), lattice.index(IntPoint::planar(1, 1)));
        assert_eq!(lattice.index(IntPoint::new(-15, 17, -3)), 17);
        lattice.set_site(Occupant::new(1, 1), IntPoint::new(3, 4, 9), 0);
        assert_eq!(lattice.site(IntPoint::planar(3, 4)).cell_id, 1);
        assert_border_invariant(&lattice);
    }

    #[test]
    fn rejects_degenerate_dimension() {
        assert_eq!(
            Lattice::new(LatticeTopology::Moore2d, 1).unwrap_err(),
            CpmError::InvalidDimension(1)
        );
    }

    #[test]
    fn single_site_makes_ring_of_border() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 16).unwrap();
        lattice.set_site(Occupant::new(1, 1), IntPoint::planar(0, 0), 0);
        // The site itself plus its 8 medium neighbours.
        assert_eq!(lattice.border_len(), 9);
        assert!(lattice.border_contains(lattice.index(IntPoint::planar(15, 15))));
        assert!(!lattice.is_border(IntPoint::planar(8, 8)));
        assert_border_invariant(&lattice);
    }

    #[test]
    fn neighbor_wraps_around_edges() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 16).unwrap();
        lattice.set_site(Occupant::new(4, 1), IntPoint::planar(15, 0), 0);
        // Offset 0 is (-1, 1).
        let n = lattice.neighbor(IntPoint::planar(0, 15), 0);
        assert_eq!(n.position, IntPoint::planar(15, 0));
        assert_eq!(n.cell_id, 4);
    }

    #[test]
    fn copy_keeps_border_invariant() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 8).unwrap();
        lattice.set_site(Occupant::new(1, 1), IntPoint::planar(2, 2), 0);
        let source = lattice.site(IntPoint::planar(2, 2));
        for x in 3..6 {
            let target = lattice.site(IntPoint::planar(x, 2));
            lattice.copy(&source, &target, 3);
        }
        assert_border_invariant(&lattice);
        // Activity is stamped but hidden until tracking is enabled.
        assert_eq!(lattice.site(IntPoint::planar(4, 2)).act, 0);
        lattice.set_activity_tracking(true);
        assert_eq!(lattice.site(IntPoint::planar(4, 2)).act, 3);
    }

    #[test]
    fn random_border_site_on_empty_lattice_is_none() {
        let lattice = Lattice::new(LatticeTopology::Moore2d, 8).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(lattice.random_border_site(&mut rng).is_none());
    }

    #[test]
    fn random_border_site_comes_from_border() {
        let mut lattice = Lattice::new(LatticeTopology::Moore3d, 8).unwrap();
        lattice.set_site(Occupant::new(1, 1), IntPoint::new(4, 4, 4), 0);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            let site = lattice.random_border_site(&mut rng).unwrap();
            assert!(lattice.is_border(site.position));
        }
        assert_eq!(lattice.border_len(), 27);
    }

    #[test]
    fn field_is_component_major() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 4).unwrap();
        let mut values = vec![0.0; 32];
        let i = lattice.index(IntPoint::planar(1, 2));
        values[i] = 0.5;
        values[i + 16] = -2.0;
        lattice.set_field(&values).unwrap();
        let site = lattice.site(IntPoint::planar(1, 2));
        assert_eq!(lattice.field_at(&site), Point::planar(0.5, -2.0));
        assert!(lattice.set_field(&values[..10]).is_err());
    }

    #[test]
    fn load_occupancy_rebuilds_border() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 8).unwrap();
        let mut grid = vec![0u32; 64];
        for x in 2..5 {
            for y in 2..5 {
                grid[y * 8 + x] = Occupant::new(1, 1).raw();
            }
        }
        lattice.load_occupancy(&grid).unwrap();
        assert_border_invariant(&lattice);
        // 5x5 block around the cell minus its single interior site.
        assert_eq!(lattice.border_len(), 24);
        assert_eq!(lattice.occupancy_raw(), grid);
    }

    #[test]
    fn center_of_mass_sites_of_and_reset_type() {
        let mut lattice = Lattice::new(LatticeTopology::Moore2d, 8).unwrap();
        for p in [IntPoint::planar(1, 1), IntPoint::planar(3, 1), IntPoint::planar(2, 4)] {
            lattice.set_site(Occupant::new(2, 1), p, 0);
        }
        assert_eq!(lattice.center_of_mass(2), Some(Point::planar(2.0, 2.0)));
        assert_eq!(lattice.center_of_mass(3), None);
        assert_eq!(lattice.sites_of(2).len(), 3);
        lattice.reset_type(2, 3);
        assert!(lattice.sites_of(2).iter().all(|p| lattice.site(*p).cell_type == 3));
    }
}
