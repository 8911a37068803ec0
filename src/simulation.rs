use std::sync::atomic::{AtomicBool, Ordering};

use cpm_common::{CellRecord, IntPoint, ModelParams, Point, Snapshot, TypeConstraints};
use log::{debug, info, trace};
use rand::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use crate::cell_book::CellBook;
use crate::centroids::{random_unit, CentroidTracker};
use crate::error::{CpmError, Result};
use crate::hamiltonian::{EnabledTerms, Hamiltonian, ModelView};
use crate::lattice::Lattice;
use crate::site::{CellId, CellType, Occupant, Site, MAX_CELL_ID};

/// Counters of one Monte Carlo Step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    /// Tick number the step completed.
    pub tick: u32,
    /// Trials that reached an energy evaluation.
    pub attempted: u64,
    /// Trials whose copy was committed.
    pub accepted: u64,
    /// Border set size at the end of the step.
    pub border_sites: usize,
}

/// One Cellular Potts model instance: lattice, per-cell bookkeeping, energy
/// parameters and the random stream that drives the Metropolis dynamics.
///
/// All mutation goes through methods that keep the lattice, the cell ledger
/// and the centroid tracker consistent with each other.
pub struct Simulation {
    params: ModelParams,
    lattice: Lattice,
    cells: CellBook,
    centroids: CentroidTracker,
    hamiltonian: Hamiltonian,
    rng: StdRng,
    /// Number of completed ticks.
    time: u32,
    terms: EnabledTerms,
    last_step: StepStats,
}

impl Simulation {
    /// Creates an all-medium model with no cells.
    pub fn new(params: ModelParams) -> Result<Self> {
        let lattice = Lattice::new(params.topology, params.dimension)?;
        let hamiltonian = Hamiltonian::new(params.number_of_types, params.temperature)?;
        let centroids = CentroidTracker::new(params.dimension, lattice.dimensionality(), params.number_of_types);
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        info!(
            "Created {}D lattice of {} sites ({} types, T = {}).",
            lattice.dimensionality(),
            lattice.site_count(),
            params.number_of_types,
            params.temperature
        );
        Ok(Self {
            params,
            lattice,
            cells: CellBook::new(),
            centroids,
            hamiltonian,
            rng,
            time: 0,
            terms: EnabledTerms::default(),
            last_step: StepStats::default(),
        })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn cells(&self) -> &CellBook {
        &self.cells
    }

    pub fn centroid_tracker(&self) -> &CentroidTracker {
        &self.centroids
    }

    pub fn hamiltonian(&self) -> &Hamiltonian {
        &self.hamiltonian
    }

    /// Direct access to the energy parameters. Per-term setters on the
    /// facade are preferred; this exists for tuning temperature mid-run.
    pub fn hamiltonian_mut(&mut self) -> &mut Hamiltonian {
        &mut self.hamiltonian
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn enabled_terms(&self) -> EnabledTerms {
        self.terms
    }

    pub fn last_step(&self) -> StepStats {
        self.last_step
    }

    // --- Configuration ---

    /// Persistence needs the energy λ plus the tracker's history length and
    /// smoothing coefficient for the type.
    pub fn set_persistence(&mut self, cell_type: CellType, lambda: f64, history_length: usize, persistence: f64) -> Result<()> {
        self.hamiltonian.set_persistence(cell_type, lambda)?;
        self.centroids.set_history_length(cell_type, history_length);
        self.centroids.set_persistence(cell_type, persistence);
        Ok(())
    }

    /// Applies every complete term of a keyword-style constraint block.
    pub fn apply_constraints(&mut self, block: &TypeConstraints) -> Result<()> {
        let t = block.cell_type;
        self.hamiltonian.check_type(t)?;
        if let (Some(other), Some(value)) = (block.other_cell_type, block.adhesion) {
            self.hamiltonian.set_adhesion(t, other, value)?;
        }
        if let (Some(lambda), Some(target)) = (block.lambda_area, block.target_area) {
            self.hamiltonian.set_area(t, lambda, target)?;
        }
        if let (Some(lambda), Some(target)) = (block.lambda_perimeter, block.target_perimeter) {
            self.hamiltonian.set_perimeter(t, lambda, target)?;
        }
        if let (Some(lambda), Some(max_act)) = (block.lambda_act, block.max_act) {
            self.hamiltonian.set_act(t, lambda, max_act)?;
        }
        if let Some(lambda) = block.lambda_connectivity {
            self.hamiltonian.set_connectivity(t, lambda)?;
        }
        if let Some(lambda) = block.lambda_chemotaxis {
            self.hamiltonian.set_chemotaxis(t, lambda)?;
        }
        if let (Some(lambda), Some(history), Some(p)) =
            (block.lambda_persistence, block.persistence_time, block.persistence_diffusion)
        {
            self.set_persistence(t, lambda, history, p)?;
        }
        if let Some(fixed) = block.fixed {
            self.hamiltonian.set_fixed(t, fixed)?;
        }
        debug!("Applied constraints for type {}: {:?}", t, block);
        Ok(())
    }

    pub fn set_field(&mut self, values: &[f64]) -> Result<()> {
        self.lattice.set_field(values)
    }

    // --- Cell lifecycle ---

    /// Allocates the next sequential id with no sites.
    pub fn add_cell(&mut self, cell_type: CellType) -> Result<CellId> {
        self.hamiltonian.check_type(cell_type)?;
        let requested = self.cells.next_id();
        if requested > u64::from(MAX_CELL_ID) {
            return Err(CpmError::CapacityExceeded { requested });
        }
        let direction = random_unit(self.lattice.dimensionality(), &mut self.rng);
        let id = self.cells.add_cell(0, 0, cell_type);
        self.centroids.add_centroid(IntPoint::zero(), 0, direction);
        Ok(id)
    }

    /// Allocates a cell and claims the site at `p` for it.
    pub fn add_cell_at(&mut self, p: IntPoint, cell_type: CellType) -> Result<CellId> {
        let id = self.add_cell(cell_type)?;
        self.claim(p, id, cell_type);
        Ok(id)
    }

    /// Allocates a cell and claims every listed site; previous owners lose them.
    pub fn overwrite_cell(&mut self, points: &[IntPoint], cell_type: CellType) -> Result<CellId> {
        let id = self.add_cell(cell_type)?;
        for p in points {
            self.claim(*p, id, cell_type);
        }
        Ok(id)
    }

    /// Hands the site at `p` to an existing cell (or to the medium with id 0).
    ///
    /// `cell_type` must match the cell's ledger type, and be 0 for the medium;
    /// use [`Simulation::update_type`] to retype a cell.
    pub fn set_point(&mut self, p: IntPoint, cell_id: CellId, cell_type: CellType) -> Result<()> {
        self.hamiltonian.check_type(cell_type)?;
        if cell_id == 0 {
            if cell_type != 0 {
                return Err(CpmError::TypedMedium { cell_type });
            }
        } else if !self.cells.contains(cell_id) {
            return Err(CpmError::UnknownCell { cell_id });
        } else if self.cells.cell_type(cell_id) != cell_type {
            return Err(CpmError::CellTypeMismatch {
                cell_id,
                expected: self.cells.cell_type(cell_id),
                actual: cell_type,
            });
        }
        self.claim(p, cell_id, cell_type);
        Ok(())
    }

    fn claim(&mut self, p: IntPoint, cell_id: CellId, cell_type: CellType) {
        let target = self.lattice.site(p);
        if target.cell_id == cell_id {
            return;
        }
        let source = Site { cell_id, cell_type, ..target };
        self.apply_copy(&source, &target);
    }

    /// Returns every site of `cell_id` to the medium and zeroes its ledger
    /// entry. The id stays allocated.
    pub fn kill_cell(&mut self, cell_id: CellId) -> Result<()> {
        if !self.cells.contains(cell_id) {
            return Err(CpmError::UnknownCell { cell_id });
        }
        let sites = self.lattice.sites_of(cell_id);
        for p in &sites {
            let target = self.lattice.site(*p);
            let source = target.as_medium();
            self.apply_copy(&source, &target);
        }
        self.cells.kill(cell_id);
        self.centroids.clear(cell_id);
        info!("Killed cell {} ({} sites released).", cell_id, sites.len());
        Ok(())
    }

    /// Changes a cell's type in the ledger and on every one of its sites.
    pub fn update_type(&mut self, cell_id: CellId, cell_type: CellType) -> Result<()> {
        self.hamiltonian.check_type(cell_type)?;
        if !self.cells.contains(cell_id) {
            return Err(CpmError::UnknownCell { cell_id });
        }
        self.cells.update_type(cell_id, cell_type);
        self.lattice.reset_type(cell_id, cell_type);
        Ok(())
    }

    /// Replaces the whole state with a packed occupancy grid holding cells
    /// `1..=cell_count`, then derives areas, perimeters and centroids from it.
    pub fn initialize_from_grid(&mut self, grid: &[u32], cell_count: u32) -> Result<()> {
        if grid.len() != self.lattice.site_count() {
            return Err(CpmError::GridSizeMismatch {
                expected: self.lattice.site_count(),
                actual: grid.len(),
            });
        }
        if cell_count > MAX_CELL_ID {
            return Err(CpmError::CapacityExceeded { requested: u64::from(cell_count) });
        }
        if let Some(bad) = grid.par_iter().map(|raw| Occupant::from_raw(*raw)).find_any(|o| o.cell_id() > cell_count) {
            return Err(CpmError::GridCellOutOfRange { cell_id: bad.cell_id(), cell_count });
        }
        if let Some(bad) = grid
            .par_iter()
            .map(|raw| Occupant::from_raw(*raw).cell_type())
            .find_any(|t| usize::from(*t) >= self.hamiltonian.number_of_types())
        {
            return Err(CpmError::UnknownCellType {
                cell_type: bad,
                number_of_types: self.hamiltonian.number_of_types(),
            });
        }
        // Every site of a cell carries the same type; the medium carries 0.
        let mut types: Vec<Option<CellType>> = vec![None; cell_count as usize];
        for occupant in grid.iter().map(|raw| Occupant::from_raw(*raw)) {
            let (cell_id, cell_type) = (occupant.cell_id(), occupant.cell_type());
            if cell_id == 0 {
                if cell_type != 0 {
                    return Err(CpmError::TypedMedium { cell_type });
                }
                continue;
            }
            let slot = &mut types[cell_id as usize - 1];
            match *slot {
                None => *slot = Some(cell_type),
                Some(expected) if expected != cell_type => {
                    return Err(CpmError::CellTypeMismatch { cell_id, expected, actual: cell_type });
                }
                Some(_) => {}
            }
        }

        self.lattice.load_occupancy(grid)?;
        self.cells.initialize_from_grid(&self.lattice, cell_count as usize);
        self.centroids.initialize_from_grid(&self.lattice, cell_count as usize, &mut self.rng);
        info!(
            "Initialized {} cells from grid ({} border sites).",
            cell_count,
            self.lattice.border_len()
        );
        Ok(())
    }

    /// Replaces the stored perimeter of a cell with a full recount.
    pub fn recalc_perimeter(&mut self, cell_id: CellId) {
        self.cells.recalc_perimeter(&self.lattice, cell_id);
    }

    // --- Stepping ---

    /// Recomputes which optional energy terms are active. Runs once per run.
    pub fn prepare_run(&mut self) {
        self.terms = self.hamiltonian.enabled_terms();
        self.lattice.set_activity_tracking(self.terms.activity);
        debug!("Enabled energy terms: {:?}", self.terms);
    }

    /// Runs `ticks` Monte Carlo Steps to completion.
    pub fn run(&mut self, ticks: u32) {
        self.run_cancellable(ticks, &AtomicBool::new(false));
    }

    /// Runs up to `ticks` steps, checking `cancel` before each one. Returns
    /// the number of steps completed.
    pub fn run_cancellable(&mut self, ticks: u32, cancel: &AtomicBool) -> u32 {
        self.prepare_run();
        info!("Starting run of {} ticks at tick {}.", ticks, self.time);
        let mut completed = 0;
        while completed < ticks {
            if cancel.load(Ordering::Relaxed) {
                info!("Run cancelled after {} of {} ticks.", completed, ticks);
                break;
            }
            self.monte_carlo_step();
            completed += 1;
        }
        info!("Run finished at tick {} ({} live cells).", self.time, self.cells.live_cells().len());
        completed
    }

    /// One Monte Carlo Step: trial copies until the border set has been
    /// covered once on average, then a centroid checkpoint.
    pub fn monte_carlo_step(&mut self) -> StepStats {
        self.time += 1;
        let mut stats = StepStats { tick: self.time, ..Default::default() };
        let mut coverage = 0.0;
        while coverage < 1.0 {
            let Some(picked) = self.lattice.random_border_site(&mut self.rng) else {
                debug!("Tick {}: border set is empty, no legal moves.", self.time);
                break;
            };
            coverage += 1.0 / self.lattice.border_len() as f64;
            let target = self.lattice.random_neighbor(&picked, &mut self.rng);
            // A fixed cell cannot donate, but its neighbour may still flow
            // into the medium it is treated as.
            let source = if self.hamiltonian.is_fixed(picked.cell_type) {
                picked.as_medium()
            } else {
                picked
            };
            if source.cell_id == target.cell_id || self.hamiltonian.is_fixed(target.cell_type) {
                continue;
            }
            stats.attempted += 1;
            if self.copy_attempt(&source, &target) {
                stats.accepted += 1;
            }
        }
        self.centroids.add_checkpoint(&self.cells);
        self.centroids.update_preferential_direction(&self.cells);

        stats.border_sites = self.lattice.border_len();
        debug!(
            "Tick {}: {} attempts, {} accepted, {} border sites.",
            stats.tick, stats.attempted, stats.accepted, stats.border_sites
        );
        self.last_step = stats;
        stats
    }

    /// Metropolis decision for one trial; commits the copy when accepted.
    fn copy_attempt(&mut self, source: &Site, target: &Site) -> bool {
        let view = ModelView {
            lattice: &self.lattice,
            cells: &self.cells,
            centroids: &self.centroids,
            time: self.time,
        };
        let delta = self.hamiltonian.energy_delta(source, target, &view, &self.terms);
        let accept = delta < 0.0 || self.hamiltonian.acceptance_probability(delta) > self.rng.random::<f64>();
        if accept {
            trace!(
                "Copy {} -> {} at {:?} (dE = {:.4})",
                source.cell_id,
                target.cell_id,
                target.position,
                delta
            );
            self.apply_copy(source, target);
        }
        accept
    }

    /// Commits `target <- source` to the lattice, the ledger and the
    /// centroid tracker together.
    fn apply_copy(&mut self, source: &Site, target: &Site) {
        self.lattice.copy(source, target, self.time);
        self.cells.update_areas(source, target);
        self.cells.update_perimeters(source, target, &self.lattice);
        self.centroids.update(source, target);
    }

    // --- Readouts ---

    /// Centroid of every live cell, ordered by id.
    pub fn centroids(&self) -> Vec<(CellId, Point)> {
        self.cells
            .live_cells()
            .into_iter()
            .filter_map(|id| self.centroids.centroid(id).map(|c| (id, c)))
            .collect()
    }

    /// Owned copy of the per-cell state at the current tick boundary.
    pub fn snapshot(&self) -> Snapshot {
        let cells: Vec<CellRecord> = self
            .centroids()
            .into_iter()
            .map(|(id, c)| CellRecord {
                tick: self.time,
                cell_id: id,
                cell_type: self.cells.cell_type(id),
                area: self.cells.area(id),
                perimeter: self.cells.perimeter(id),
                x: c.x,
                y: c.y,
                z: c.z,
            })
            .collect();
        Snapshot {
            tick: self.time,
            live_cells: cells.len(),
            border_sites: self.lattice.border_len(),
            attempted_moves: self.last_step.attempted,
            accepted_moves: self.last_step.accepted,
            cells,
        }
    }
}
