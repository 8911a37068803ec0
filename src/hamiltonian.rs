use crate::cell_book::{CellBook, PerimeterDelta};
use crate::centroids::CentroidTracker;
use crate::error::{CpmError, Result};
use crate::lattice::Lattice;
use crate::site::{CellType, Site};

/// Which of the optional energy terms take part in a run.
///
/// Adhesion and area are always evaluated. The rest are switched on when at
/// least one type carries a non-zero λ for them, recomputed at run start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnabledTerms {
    pub perimeter: bool,
    pub activity: bool,
    pub connectivity: bool,
    pub persistence: bool,
    pub chemotaxis: bool,
}

/// Read-only view of the model state an energy evaluation looks at.
#[derive(Clone, Copy)]
pub struct ModelView<'a> {
    pub lattice: &'a Lattice,
    pub cells: &'a CellBook,
    pub centroids: &'a CentroidTracker,
    pub time: u32,
}

/// Per-type constraint parameters and the energy deltas built from them.
///
/// Every delta answers the same question: how much does the energy change if
/// `target`'s site is handed from its current owner to `source`'s owner.
#[derive(Debug, Clone)]
pub struct Hamiltonian {
    number_of_types: usize,
    temperature: f64,
    /// Symmetric, row-major `number_of_types²`.
    adhesion: Vec<f64>,
    lambda_area: Vec<f64>,
    target_area: Vec<f64>,
    lambda_perimeter: Vec<f64>,
    target_perimeter: Vec<f64>,
    lambda_act: Vec<f64>,
    max_act: Vec<u32>,
    lambda_connectivity: Vec<f64>,
    lambda_persistence: Vec<f64>,
    lambda_chemotaxis: Vec<f64>,
    fixed: Vec<bool>,
}

impl Hamiltonian {
    pub fn new(number_of_types: usize, temperature: f64) -> Result<Self> {
        if number_of_types == 0 || number_of_types > 256 {
            return Err(CpmError::InvalidTypeCount(number_of_types));
        }
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(CpmError::InvalidTemperature(temperature));
        }
        let n = number_of_types;
        Ok(Self {
            number_of_types: n,
            temperature,
            adhesion: vec![0.0; n * n],
            lambda_area: vec![0.0; n],
            target_area: vec![0.0; n],
            lambda_perimeter: vec![0.0; n],
            target_perimeter: vec![0.0; n],
            lambda_act: vec![0.0; n],
            max_act: vec![0; n],
            lambda_connectivity: vec![0.0; n],
            lambda_persistence: vec![0.0; n],
            lambda_chemotaxis: vec![0.0; n],
            fixed: vec![false; n],
        })
    }

    pub fn number_of_types(&self) -> usize {
        self.number_of_types
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(CpmError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }

    /// Index of `cell_type` into the per-type tables, or an error if the model
    /// was not built with that many types.
    pub fn check_type(&self, cell_type: CellType) -> Result<usize> {
        let t = usize::from(cell_type);
        if t >= self.number_of_types {
            return Err(CpmError::UnknownCellType {
                cell_type,
                number_of_types: self.number_of_types,
            });
        }
        Ok(t)
    }

    // --- Configuration ---

    pub fn set_adhesion(&mut self, a: CellType, b: CellType, value: f64) -> Result<()> {
        let (a, b) = (self.check_type(a)?, self.check_type(b)?);
        let n = self.number_of_types;
        self.adhesion[a * n + b] = value;
        self.adhesion[b * n + a] = value;
        Ok(())
    }

    pub fn set_area(&mut self, cell_type: CellType, lambda: f64, target: f64) -> Result<()> {
        let t = self.check_type(cell_type)?;
        self.lambda_area[t] = lambda;
        self.target_area[t] = target;
        Ok(())
    }

    pub fn set_perimeter(&mut self, cell_type: CellType, lambda: f64, target: f64) -> Result<()> {
        let t = self.check_type(cell_type)?;
        self.lambda_perimeter[t] = lambda;
        self.target_perimeter[t] = target;
        Ok(())
    }

    pub fn set_act(&mut self, cell_type: CellType, lambda: f64, max_act: u32) -> Result<()> {
        let t = self.check_type(cell_type)?;
        self.lambda_act[t] = lambda;
        self.max_act[t] = max_act;
        Ok(())
    }

    pub fn set_connectivity(&mut self, cell_type: CellType, lambda: f64) -> Result<()> {
        let t = self.check_type(cell_type)?;
        self.lambda_connectivity[t] = lambda;
        Ok(())
    }

    pub fn set_persistence(&mut self, cell_type: CellType, lambda: f64) -> Result<()> {
        let t = self.check_type(cell_type)?;
        self.lambda_persistence[t] = lambda;
        Ok(())
    }

    pub fn set_chemotaxis(&mut self, cell_type: CellType, lambda: f64) -> Result<()> {
        let t = self.check_type(cell_type)?;
        self.lambda_chemotaxis[t] = lambda;
        Ok(())
    }

    pub fn set_fixed(&mut self, cell_type: CellType, fixed: bool) -> Result<()> {
        let t = self.check_type(cell_type)?;
        self.fixed[t] = fixed;
        Ok(())
    }

    pub fn adhesion(&self, a: CellType, b: CellType) -> f64 {
        self.adhesion[usize::from(a) * self.number_of_types + usize::from(b)]
    }

    /// Sites of a fixed type never change owner.
    pub fn is_fixed(&self, cell_type: CellType) -> bool {
        self.fixed[usize::from(cell_type)]
    }

    pub fn enabled_terms(&self) -> EnabledTerms {
        let any = |lambdas: &[f64]| lambdas.iter().any(|l| *l != 0.0);
        EnabledTerms {
            perimeter: any(&self.lambda_perimeter),
            activity: any(&self.lambda_act),
            connectivity: any(&self.lambda_connectivity),
            persistence: any(&self.lambda_persistence),
            chemotaxis: any(&self.lambda_chemotaxis),
        }
    }

    // --- Energy ---

    /// Total energy change of the copy `source -> target` over the enabled terms.
    pub fn energy_delta(&self, source: &Site, target: &Site, view: &ModelView<'_>, terms: &EnabledTerms) -> f64 {
        let mut delta = self.adhesion_delta(source, target, view.lattice);
        delta += self.area_delta(source, target, view.cells);
        if terms.perimeter {
            delta += self.perimeter_delta(source, target, view.lattice, view.cells);
        }
        if terms.activity {
            delta += self.act_delta(source, target, view.lattice, view.time);
        }
        if terms.connectivity {
            delta += self.connectivity_delta(target, view.lattice);
        }
        if terms.persistence {
            delta += self.persistence_delta(source, target, view.lattice, view.centroids);
        }
        if terms.chemotaxis {
            delta += self.chemotaxis_delta(source, target, view.lattice);
        }
        delta
    }

    /// Boltzmann factor `exp(-ΔE / T)`. At zero temperature only non-positive
    /// changes are accepted.
    pub fn acceptance_probability(&self, delta: f64) -> f64 {
        if self.temperature == 0.0 {
            return if delta <= 0.0 { 1.0 } else { 0.0 };
        }
        (-delta / self.temperature).exp()
    }

    pub fn adhesion_delta(&self, source: &Site, target: &Site, lattice: &Lattice) -> f64 {
        let mut previous = 0.0;
        let mut next = 0.0;
        for neighbor in lattice.neighbors(target.position) {
            if neighbor.cell_id != target.cell_id {
                previous += self.adhesion(target.cell_type, neighbor.cell_type);
            }
            if neighbor.cell_id != source.cell_id {
                next += self.adhesion(source.cell_type, neighbor.cell_type);
            }
        }
        next - previous
    }

    pub fn area_delta(&self, source: &Site, target: &Site, cells: &CellBook) -> f64 {
        let mut delta = 0.0;
        if !source.is_medium() {
            let t = usize::from(source.cell_type);
            let area = cells.area(source.cell_id) as f64;
            delta += quadratic_change(self.lambda_area[t], self.target_area[t], area, area + 1.0);
        }
        if !target.is_medium() {
            let t = usize::from(target.cell_type);
            let area = cells.area(target.cell_id) as f64;
            delta += quadratic_change(self.lambda_area[t], self.target_area[t], area, area - 1.0);
        }
        delta
    }

    pub fn perimeter_delta(&self, source: &Site, target: &Site, lattice: &Lattice, cells: &CellBook) -> f64 {
        let change = PerimeterDelta::scan(source, target, lattice);
        let mut delta = 0.0;
        if !source.is_medium() {
            let t = usize::from(source.cell_type);
            let p = cells.perimeter(source.cell_id) as f64;
            delta += quadratic_change(
                self.lambda_perimeter[t],
                self.target_perimeter[t],
                p,
                p + change.source as f64,
            );
        }
        if !target.is_medium() {
            let t = usize::from(target.cell_type);
            let p = cells.perimeter(target.cell_id) as f64;
            delta += quadratic_change(
                self.lambda_perimeter[t],
                self.target_perimeter[t],
                p,
                p + change.target as f64,
            );
        }
        delta
    }

    /// Rewards copies out of recently extended regions into older ones.
    pub fn act_delta(&self, source: &Site, target: &Site, lattice: &Lattice, time: u32) -> f64 {
        let owner = if source.cell_type != 0 { source.cell_type } else { target.cell_type };
        let t = usize::from(owner);
        let lambda = self.lambda_act[t];
        if lambda == 0.0 {
            return 0.0;
        }
        let max_act = self.max_act[t];
        if max_act == 0 {
            return 0.0;
        }
        let source_act = self.local_activity(source, lattice, time);
        let target_act = self.local_activity(target, lattice, time);
        -lambda / f64::from(max_act) * (source_act - target_act)
    }

    /// Geometric mean of remaining activity over `site` and its same-cell
    /// neighbours. Medium has none.
    fn local_activity(&self, site: &Site, lattice: &Lattice, time: u32) -> f64 {
        if site.is_medium() {
            return 0.0;
        }
        let remaining = |s: &Site| -> f64 {
            let max_act = i64::from(self.max_act[usize::from(s.cell_type)]);
            (max_act + i64::from(s.act) - i64::from(time)).max(0) as f64
        };
        let mut product = remaining(site);
        let mut count = 1;
        for neighbor in lattice.neighbors(site.position) {
            if neighbor.cell_id == site.cell_id {
                product *= remaining(&neighbor);
                count += 1;
            }
        }
        product.powf(1.0 / f64::from(count))
    }

    /// Flat penalty when `target`'s owner changes more than twice around the
    /// neighbour ring, i.e. removing the site may split the cell.
    pub fn connectivity_delta(&self, target: &Site, lattice: &Lattice) -> f64 {
        let lambda = self.lambda_connectivity[usize::from(target.cell_type)];
        if lambda == 0.0 {
            return 0.0;
        }
        let n = lattice.neighbor_count();
        let owned: Vec<bool> = lattice
            .neighbors(target.position)
            .map(|s| s.cell_id == target.cell_id)
            .collect();
        let transitions = (0..n).filter(|&i| owned[i] != owned[(i + 1) % n]).count();
        if transitions < 3 {
            0.0
        } else {
            lambda
        }
    }

    pub fn persistence_delta(&self, source: &Site, target: &Site, lattice: &Lattice, centroids: &CentroidTracker) -> f64 {
        if source.is_medium() {
            return 0.0;
        }
        let lambda = self.lambda_persistence[usize::from(source.cell_type)];
        if lambda == 0.0 {
            return 0.0;
        }
        let direction = move_direction(source, target, lattice);
        -direction.dot(centroids.preferred_direction(source.cell_id)) * lambda
    }

    pub fn chemotaxis_delta(&self, source: &Site, target: &Site, lattice: &Lattice) -> f64 {
        let owner = if source.cell_type != 0 { source.cell_type } else { target.cell_type };
        let lambda = self.lambda_chemotaxis[usize::from(owner)];
        if lambda == 0.0 {
            return 0.0;
        }
        let direction = move_direction(source, target, lattice);
        -lambda * direction.dot(lattice.field_at(source))
    }
}

/// `λ((new - target)² - (old - target)²)`
#[inline(always)]
fn quadratic_change(lambda: f64, target: f64, old: f64, new: f64) -> f64 {
    lambda * ((new - target).powi(2) - (old - target).powi(2))
}

/// Unit vector from `source` to `target` across the periodic boundary.
fn move_direction(source: &Site, target: &Site, lattice: &Lattice) -> cpm_common::Point {
    (target.position - source.position)
        .to_point()
        .wrap(lattice.dimension() as i64)
        .normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Occupant;
    use cpm_common::{IntPoint, LatticeTopology, Point};

    fn lattice_2d(dimension: usize) -> Lattice {
        Lattice::new(LatticeTopology::Moore2d, dimension).unwrap()
    }

    #[test]
    fn rejects_bad_construction_and_unknown_types() {
        assert_eq!(Hamiltonian::new(0, 1.0).unwrap_err(), CpmError::InvalidTypeCount(0));
        assert_eq!(Hamiltonian::new(257, 1.0).unwrap_err(), CpmError::InvalidTypeCount(257));
        assert!(matches!(Hamiltonian::new(2, -1.0), Err(CpmError::InvalidTemperature(_))));
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        assert!(matches!(h.set_area(2, 1.0, 10.0), Err(CpmError::UnknownCellType { cell_type: 2, .. })));
        assert!(Hamiltonian::new(256, 1.0).unwrap().check_type(255).is_ok());
    }

    #[test]
    fn adhesion_matrix_is_symmetric() {
        let mut h = Hamiltonian::new(3, 1.0).unwrap();
        h.set_adhesion(1, 2, 4.5).unwrap();
        assert_eq!(h.adhesion(2, 1), 4.5);
        h.set_adhesion(2, 1, -1.0).unwrap();
        assert_eq!(h.adhesion(1, 2), -1.0);
    }

    #[test]
    fn acceptance_probability_follows_boltzmann() {
        let h = Hamiltonian::new(2, 2.0).unwrap();
        assert!((h.acceptance_probability(2.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!(h.acceptance_probability(-3.0) > 1.0);
        let cold = Hamiltonian::new(2, 0.0).unwrap();
        assert_eq!(cold.acceptance_probability(0.0), 1.0);
        assert_eq!(cold.acceptance_probability(1e-9), 0.0);
        assert_eq!(cold.acceptance_probability(-5.0), 1.0);
    }

    #[test]
    fn enabled_terms_track_nonzero_lambdas() {
        let mut h = Hamiltonian::new(3, 1.0).unwrap();
        assert_eq!(h.enabled_terms(), EnabledTerms::default());
        h.set_perimeter(2, 0.5, 20.0).unwrap();
        h.set_chemotaxis(1, -1.0).unwrap();
        let terms = h.enabled_terms();
        assert!(terms.perimeter && terms.chemotaxis);
        assert!(!terms.activity && !terms.connectivity && !terms.persistence);
        h.set_perimeter(2, 0.0, 20.0).unwrap();
        assert!(!h.enabled_terms().perimeter);
    }

    #[test]
    fn adhesion_delta_counts_foreign_contacts() {
        let mut lattice = lattice_2d(8);
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        h.set_adhesion(0, 1, 2.0).unwrap();
        lattice.set_site(Occupant::new(1, 1), IntPoint::planar(3, 3), 0);
        let source = lattice.site(IntPoint::planar(3, 3));
        let target = lattice.site(IntPoint::planar(4, 3));
        // Before: target (medium) touches cell 1 once -> 2.0.
        // After: target (cell 1) touches 7 medium sites -> 14.0.
        assert_eq!(h.adhesion_delta(&source, &target, &lattice), 12.0);
    }

    #[test]
    fn area_delta_pulls_toward_target() {
        let mut cells = CellBook::new();
        cells.add_cell(10, 0, 1);
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        h.set_area(1, 1.0, 12.0).unwrap();
        let grow = Site { cell_id: 1, cell_type: 1, position: IntPoint::zero(), act: 0 };
        let medium = grow.as_medium();
        // (11-12)² - (10-12)² = -3
        assert_eq!(h.area_delta(&grow, &medium, &cells), -3.0);
        // (9-12)² - (10-12)² = 5
        assert_eq!(h.area_delta(&medium, &grow, &cells), 5.0);
    }

    #[test]
    fn perimeter_delta_uses_incremental_scan() {
        let mut lattice = lattice_2d(8);
        lattice.set_site(Occupant::new(1, 1), IntPoint::planar(3, 3), 0);
        let mut cells = CellBook::new();
        cells.add_cell(1, 8, 1);
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        h.set_perimeter(1, 1.0, 8.0).unwrap();
        let source = lattice.site(IntPoint::planar(3, 3));
        let target = lattice.site(IntPoint::planar(4, 3));
        // Two adjacent sites have perimeter 14, i.e. +6 -> 36.
        assert_eq!(h.perimeter_delta(&source, &target, &lattice, &cells), 36.0);
    }

    #[test]
    fn connectivity_penalizes_splitting_moves() {
        let mut lattice = lattice_2d(8);
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        h.set_connectivity(1, 7.0).unwrap();
        // A horizontal bar; removing its middle site would cut it in two.
        for x in 2..5 {
            lattice.set_site(Occupant::new(1, 1), IntPoint::planar(x, 3), 0);
        }
        let middle = lattice.site(IntPoint::planar(3, 3));
        assert_eq!(h.connectivity_delta(&middle, &lattice), 7.0);
        let end = lattice.site(IntPoint::planar(4, 3));
        assert_eq!(h.connectivity_delta(&end, &lattice), 0.0);
    }

    #[test]
    fn persistence_rewards_moves_along_preferred_direction() {
        let lattice = lattice_2d(8);
        let mut centroids = CentroidTracker::new(8, 2, 2);
        centroids.add_centroid(IntPoint::zero(), 0, Point::planar(1.0, 0.0));
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        h.set_persistence(1, 2.0).unwrap();
        let source = Site { cell_id: 1, cell_type: 1, position: IntPoint::planar(7, 0), act: 0 };
        // Across the boundary: 7 -> 0 is a step of +1 in x.
        let ahead = Site { cell_id: 0, cell_type: 0, position: IntPoint::planar(0, 0), act: 0 };
        assert!((h.persistence_delta(&source, &ahead, &lattice, &centroids) + 2.0).abs() < 1e-12);
        let behind = Site { position: IntPoint::planar(6, 0), ..ahead };
        assert!((h.persistence_delta(&source, &behind, &lattice, &centroids) - 2.0).abs() < 1e-12);
        assert_eq!(h.persistence_delta(&ahead, &source, &lattice, &centroids), 0.0);
    }

    #[test]
    fn chemotaxis_reads_field_at_source() {
        let mut lattice = lattice_2d(4);
        let source_position = IntPoint::planar(1, 1);
        let mut values = vec![0.0; 32];
        values[lattice.index(source_position) + 16] = 3.0;
        lattice.set_field(&values).unwrap();
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        h.set_chemotaxis(1, 1.0).unwrap();
        let source = Site { cell_id: 1, cell_type: 1, position: source_position, act: 0 };
        let up = Site { cell_id: 0, cell_type: 0, position: IntPoint::planar(1, 2), act: 0 };
        assert!((h.chemotaxis_delta(&source, &up, &lattice) + 3.0).abs() < 1e-12);
    }

    #[test]
    fn act_prefers_copies_from_active_regions() {
        let mut lattice = lattice_2d(8);
        lattice.set_activity_tracking(true);
        lattice.set_site(Occupant::new(1, 1), IntPoint::planar(3, 3), 10);
        let mut h = Hamiltonian::new(2, 1.0).unwrap();
        h.set_act(1, 4.0, 20).unwrap();
        let source = lattice.site(IntPoint::planar(3, 3));
        let target = lattice.site(IntPoint::planar(4, 3));
        // Single-site cell at age 10, time 12: remaining = 20 + 10 - 12 = 18.
        let delta = h.act_delta(&source, &target, &lattice, 12);
        assert!((delta + 4.0 / 20.0 * 18.0).abs() < 1e-9);
        h.set_act(1, 4.0, 0).unwrap();
        assert_eq!(h.act_delta(&source, &target, &lattice, 12), 0.0);
    }
}
