use std::collections::VecDeque;

use cpm_common::{IntPoint, Point};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::cell_book::CellBook;
use crate::lattice::Lattice;
use crate::site::{CellId, CellType, Site};

/// Running centroids, centroid history and preferred directions per cell.
///
/// A centroid is kept as an integer coordinate sum together with the site
/// count. The sum holds unwrapped coordinates of a representative image of
/// the cell and is folded into `[0, count * dimension)` after every update,
/// so `sum / count` always lies on the lattice and the sum stays bounded
/// however long the cell lives.
#[derive(Debug, Clone)]
pub struct CentroidTracker {
    dimension: i64,
    dimensionality: usize,
    centers: Vec<IntPoint>,
    counts: Vec<i64>,
    history: Vec<VecDeque<Point>>,
    preferred_directions: Vec<Point>,
    history_lengths: Vec<usize>,
    persistence: Vec<f64>,
}

impl CentroidTracker {
    pub fn new(dimension: usize, dimensionality: usize, number_of_types: usize) -> Self {
        Self {
            dimension: dimension as i64,
            dimensionality,
            centers: Vec::new(),
            counts: Vec::new(),
            history: Vec::new(),
            preferred_directions: Vec::new(),
            history_lengths: vec![1; number_of_types],
            persistence: vec![0.0; number_of_types],
        }
    }

    /// History capacity for cells of `cell_type`; at least one entry is kept.
    pub fn set_history_length(&mut self, cell_type: CellType, history_length: usize) {
        self.history_lengths[usize::from(cell_type)] = history_length.max(1);
    }

    pub fn set_persistence(&mut self, cell_type: CellType, persistence: f64) {
        self.persistence[usize::from(cell_type)] = persistence;
    }

    /// Appends a tracker entry with an initial sum, count and direction.
    pub fn add_centroid(&mut self, center: IntPoint, count: i64, direction: Point) {
        self.centers.push(center);
        self.counts.push(count);
        self.preferred_directions.push(direction);
        self.history.push(VecDeque::new());
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, cell_id: CellId) -> i64 {
        self.counts[slot(cell_id)]
    }

    pub fn preferred_direction(&self, cell_id: CellId) -> Point {
        self.preferred_directions[slot(cell_id)]
    }

    pub fn history(&self, cell_id: CellId) -> &VecDeque<Point> {
        &self.history[slot(cell_id)]
    }

    /// `target`'s site moves from its current owner to `source`'s.
    pub fn update(&mut self, source: &Site, target: &Site) {
        let d = self.dimension;
        if !source.is_medium() {
            let s = slot(source.cell_id);
            let count = self.counts[s];
            let offset = self.image_offset(s, target.position);
            self.counts[s] = count + 1;
            self.centers[s] = (self.centers[s] + target.position + offset).rem_euclid(self.counts[s] * d);
        }
        if !target.is_medium() {
            let t = slot(target.cell_id);
            let offset = self.image_offset(t, target.position);
            self.counts[t] -= 1;
            let center = self.centers[t] - target.position - offset;
            self.centers[t] = if self.counts[t] > 0 {
                center.rem_euclid(self.counts[t] * d)
            } else {
                center
            };
        }
    }

    /// Period shift that puts `position` into the same image as the cell's
    /// current mean: `dimension` per axis where they are more than half a
    /// period apart, zero otherwise.
    fn image_offset(&self, s: usize, position: IntPoint) -> IntPoint {
        let count = self.counts[s];
        let offset = self.centers[s] - position.scale(count);
        if count > 0 {
            offset.div_trunc(self.dimension / 2 * count).scale(self.dimension)
        } else {
            offset
        }
    }

    /// Mean position of `cell_id`; `None` while it has no sites.
    pub fn centroid(&self, cell_id: CellId) -> Option<Point> {
        let s = slot(cell_id);
        (self.counts[s] > 0).then(|| self.centers[s].divide(self.counts[s] as f64))
    }

    /// Centroid per allocated id, in id order.
    pub fn centroids(&self) -> Vec<Option<Point>> {
        (1..=self.len() as CellId).map(|id| self.centroid(id)).collect()
    }

    /// Pushes every live cell's centroid into its bounded history.
    pub fn add_checkpoint(&mut self, cells: &CellBook) {
        for s in 0..self.len() {
            let id = s as CellId + 1;
            let Some(current) = self.centroid(id) else {
                continue;
            };
            let capacity = self.history_lengths[usize::from(cells.cell_type(id))];
            let history = &mut self.history[s];
            while history.len() >= capacity {
                history.pop_front();
            }
            history.push_back(current);
        }
    }

    /// Blends each cell's displacement since its oldest retained checkpoint
    /// into its preferred direction:
    /// `normalize(displacement * (1 - p) + previous * p)`.
    pub fn update_preferential_direction(&mut self, cells: &CellBook) {
        for s in 0..self.len() {
            let id = s as CellId + 1;
            let (Some(current), Some(oldest)) = (self.centroid(id), self.history[s].front().copied()) else {
                continue;
            };
            let displacement = current - oldest;
            if displacement.length() == 0.0 {
                continue;
            }
            let direction = displacement.wrap(self.dimension).normalize_or_zero();
            let p = self.persistence[usize::from(cells.cell_type(id))];
            let previous = self.preferred_directions[s];
            self.preferred_directions[s] = (direction * (1.0 - p) + previous * p).normalize_or_zero();
        }
    }

    /// Resets the tracker to `cell_count` cells and derives sums and counts
    /// from the lattice in one pass. Directions are drawn fresh.
    pub fn initialize_from_grid<R: Rng + ?Sized>(&mut self, lattice: &Lattice, cell_count: usize, rng: &mut R) {
        self.centers = vec![IntPoint::zero(); cell_count];
        self.counts = vec![0; cell_count];
        self.history = vec![VecDeque::new(); cell_count];
        self.preferred_directions = (0..cell_count)
            .map(|_| random_unit(self.dimensionality, rng))
            .collect();
        // Claim sites one by one so each sum is built in a consistent image.
        for i in 0..lattice.site_count() {
            let site = lattice.site_at(i);
            if site.is_medium() {
                continue;
            }
            let medium = site.as_medium();
            self.update(&site, &medium);
        }
    }

    /// Clears the tracked state of a removed cell.
    pub fn clear(&mut self, cell_id: CellId) {
        let s = slot(cell_id);
        self.centers[s] = IntPoint::zero();
        self.counts[s] = 0;
        self.history[s].clear();
    }
}

#[inline(always)]
fn slot(cell_id: CellId) -> usize {
    cell_id as usize - 1
}

/// Isotropic random unit vector in the first `dimensionality` axes.
pub fn random_unit<R: Rng + ?Sized>(dimensionality: usize, rng: &mut R) -> Point {
    loop {
        let x: f64 = rng.sample(StandardNormal);
        let y: f64 = rng.sample(StandardNormal);
        let z: f64 = if dimensionality == 2 { 0.0 } else { rng.sample(StandardNormal) };
        let p = Point::new(x, y, z);
        if p.length_squared() > 0.0 {
            return p.normalize_or_zero();
        }
    }
}
