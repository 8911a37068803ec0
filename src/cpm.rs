use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpm_common::{IntPoint, ModelParams, Point, SimulationConfig, Snapshot, TypeConstraints};
use log::{error, info};
use serde::Serialize;

use crate::error::{CpmError, Result};
use crate::simulation::{Simulation, StepStats};
use crate::site::{CellId, CellType};

/// Outcome of a background run once it has been joined or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ticks_requested: u32,
    pub ticks_completed: u32,
    /// Model time after the run.
    pub tick: u32,
}

enum RunState {
    Idle(Box<Simulation>),
    Running {
        handle: JoinHandle<(Box<Simulation>, u32)>,
        cancel: Arc<AtomicBool>,
        ticks: u32,
    },
    /// The background thread panicked and took the model with it.
    Failed,
}

/// Public entry point of the engine.
///
/// Owns one [`Simulation`] and moves it onto a worker thread for background
/// runs. While a run is outstanding every other call fails with
/// [`CpmError::RunInProgress`]; readouts are owned copies taken between runs.
pub struct Cpm {
    dimension: usize,
    dimensionality: usize,
    state: RunState,
}

impl Cpm {
    pub fn new(params: ModelParams) -> Result<Self> {
        let sim = Simulation::new(params)?;
        Ok(Self {
            dimension: sim.lattice().dimension(),
            dimensionality: sim.lattice().dimensionality(),
            state: RunState::Idle(Box::new(sim)),
        })
    }

    /// Builds a model from a loaded configuration and applies its constraint blocks.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let mut cpm = Self::new(config.model_params())?;
        for block in &config.constraints {
            cpm.apply_constraints(block)?;
        }
        Ok(cpm)
    }

    /// Axis length.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }

    /// The model, while no background run is outstanding.
    pub fn simulation(&self) -> Result<&Simulation> {
        match &self.state {
            RunState::Idle(sim) => Ok(sim.as_ref()),
            RunState::Running { .. } => Err(CpmError::RunInProgress),
            RunState::Failed => Err(CpmError::WorkerPanicked),
        }
    }

    fn simulation_mut(&mut self) -> Result<&mut Simulation> {
        match &mut self.state {
            RunState::Idle(sim) => Ok(sim.as_mut()),
            RunState::Running { .. } => Err(CpmError::RunInProgress),
            RunState::Failed => Err(CpmError::WorkerPanicked),
        }
    }

    // --- Configuration ---

    pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_temperature(temperature)
    }

    pub fn set_adhesion(&mut self, a: CellType, b: CellType, value: f64) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_adhesion(a, b, value)
    }

    pub fn set_area(&mut self, cell_type: CellType, lambda: f64, target: f64) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_area(cell_type, lambda, target)
    }

    pub fn set_perimeter(&mut self, cell_type: CellType, lambda: f64, target: f64) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_perimeter(cell_type, lambda, target)
    }

    pub fn set_act(&mut self, cell_type: CellType, lambda: f64, max_act: u32) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_act(cell_type, lambda, max_act)
    }

    pub fn set_connectivity(&mut self, cell_type: CellType, lambda: f64) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_connectivity(cell_type, lambda)
    }

    pub fn set_chemotaxis(&mut self, cell_type: CellType, lambda: f64) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_chemotaxis(cell_type, lambda)
    }

    pub fn set_persistence(&mut self, cell_type: CellType, lambda: f64, history_length: usize, persistence: f64) -> Result<()> {
        self.simulation_mut()?
            .set_persistence(cell_type, lambda, history_length, persistence)
    }

    pub fn set_fixed(&mut self, cell_type: CellType, fixed: bool) -> Result<()> {
        self.simulation_mut()?.hamiltonian_mut().set_fixed(cell_type, fixed)
    }

    pub fn apply_constraints(&mut self, block: &TypeConstraints) -> Result<()> {
        self.simulation_mut()?.apply_constraints(block)
    }

    /// Installs the external vector field, component-major.
    pub fn set_field(&mut self, values: &[f64]) -> Result<()> {
        self.simulation_mut()?.set_field(values)
    }

    // --- Cell lifecycle ---

    pub fn add_cell(&mut self, cell_type: CellType) -> Result<CellId> {
        self.simulation_mut()?.add_cell(cell_type)
    }

    pub fn add_cell_at(&mut self, p: IntPoint, cell_type: CellType) -> Result<CellId> {
        self.simulation_mut()?.add_cell_at(p, cell_type)
    }

    pub fn overwrite_cell(&mut self, points: &[IntPoint], cell_type: CellType) -> Result<CellId> {
        self.simulation_mut()?.overwrite_cell(points, cell_type)
    }

    pub fn set_point(&mut self, p: IntPoint, cell_id: CellId, cell_type: CellType) -> Result<()> {
        self.simulation_mut()?.set_point(p, cell_id, cell_type)
    }

    pub fn update_type(&mut self, cell_id: CellId, cell_type: CellType) -> Result<()> {
        self.simulation_mut()?.update_type(cell_id, cell_type)
    }

    pub fn kill_cell(&mut self, cell_id: CellId) -> Result<()> {
        self.simulation_mut()?.kill_cell(cell_id)
    }

    pub fn initialize_from_grid(&mut self, grid: &[u32], cell_count: u32) -> Result<()> {
        self.simulation_mut()?.initialize_from_grid(grid, cell_count)
    }

    /// Brute-force perimeter recount for one cell.
    pub fn recalc_perimeter(&mut self, cell_id: CellId) -> Result<()> {
        let sim = self.simulation_mut()?;
        if !sim.cells().contains(cell_id) {
            return Err(CpmError::UnknownCell { cell_id });
        }
        sim.recalc_perimeter(cell_id);
        Ok(())
    }

    // --- Stepping ---

    /// Runs `ticks` steps on the calling thread.
    pub fn run(&mut self, ticks: u32) -> Result<StepStats> {
        let sim = self.simulation_mut()?;
        sim.run(ticks);
        Ok(sim.last_step())
    }

    /// Moves the model onto a worker thread and runs `ticks` steps there.
    /// Must be followed by [`Cpm::join`] or [`Cpm::cancel`].
    pub fn run_async(&mut self, ticks: u32) -> Result<()> {
        let mut sim = match mem::replace(&mut self.state, RunState::Failed) {
            RunState::Idle(sim) => sim,
            other => {
                let err = match other {
                    RunState::Running { .. } => CpmError::RunInProgress,
                    _ => CpmError::WorkerPanicked,
                };
                self.state = other;
                return Err(err);
            }
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let handle = thread::spawn(move || {
            let completed = sim.run_cancellable(ticks, &flag);
            (sim, completed)
        });
        info!("Background run of {} ticks started.", ticks);
        self.state = RunState::Running { handle, cancel, ticks };
        Ok(())
    }

    /// Blocks until the outstanding background run finishes.
    pub fn join(&mut self) -> Result<RunSummary> {
        match mem::replace(&mut self.state, RunState::Failed) {
            RunState::Running { handle, ticks, .. } => match handle.join() {
                Ok((sim, completed)) => {
                    let summary = RunSummary {
                        ticks_requested: ticks,
                        ticks_completed: completed,
                        tick: sim.time(),
                    };
                    self.state = RunState::Idle(sim);
                    Ok(summary)
                }
                Err(_) => {
                    error!("Background run panicked; the model is lost.");
                    Err(CpmError::WorkerPanicked)
                }
            },
            RunState::Idle(sim) => {
                self.state = RunState::Idle(sim);
                Err(CpmError::NotRunning)
            }
            RunState::Failed => Err(CpmError::WorkerPanicked),
        }
    }

    /// Asks the background run to stop at the next tick boundary and joins it.
    pub fn cancel(&mut self) -> Result<RunSummary> {
        match &self.state {
            RunState::Running { cancel, .. } => cancel.store(true, Ordering::Relaxed),
            RunState::Idle(_) => return Err(CpmError::NotRunning),
            RunState::Failed => return Err(CpmError::WorkerPanicked),
        }
        self.join()
    }

    // --- Readouts ---

    pub fn time(&self) -> Result<u32> {
        Ok(self.simulation()?.time())
    }

    pub fn last_step(&self) -> Result<StepStats> {
        Ok(self.simulation()?.last_step())
    }

    /// Packed `cell_id | type << 24` words in linear index order.
    pub fn occupancy(&self) -> Result<Vec<u32>> {
        Ok(self.simulation()?.lattice().occupancy_raw())
    }

    /// Tick each site was last taken over.
    pub fn activity(&self) -> Result<Vec<u32>> {
        Ok(self.simulation()?.lattice().activity().to_vec())
    }

    pub fn field(&self) -> Result<Vec<f64>> {
        Ok(self.simulation()?.lattice().field().to_vec())
    }

    /// Centroid of every live cell, ordered by id.
    pub fn centroids(&self) -> Result<Vec<(CellId, Point)>> {
        Ok(self.simulation()?.centroids())
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.simulation()?.snapshot())
    }

    pub fn area(&self, cell_id: CellId) -> Result<i64> {
        let sim = self.known_cell(cell_id)?;
        Ok(sim.cells().area(cell_id))
    }

    pub fn perimeter(&self, cell_id: CellId) -> Result<i64> {
        let sim = self.known_cell(cell_id)?;
        Ok(sim.cells().perimeter(cell_id))
    }

    pub fn cell_type(&self, cell_id: CellId) -> Result<CellType> {
        let sim = self.known_cell(cell_id)?;
        Ok(sim.cells().cell_type(cell_id))
    }

    pub fn count_type(&self, cell_type: CellType) -> Result<usize> {
        Ok(self.simulation()?.cells().count_type(cell_type))
    }

    pub fn cell_ids(&self, cell_type: CellType) -> Result<Vec<CellId>> {
        Ok(self.simulation()?.cells().cell_ids(cell_type))
    }

    pub fn sites_of(&self, cell_id: CellId) -> Result<Vec<IntPoint>> {
        Ok(self.simulation()?.lattice().sites_of(cell_id))
    }

    /// Plain mean of the wrapped coordinates of a cell, by full scan.
    pub fn center_of_mass(&self, cell_id: CellId) -> Result<Option<Point>> {
        Ok(self.simulation()?.lattice().center_of_mass(cell_id))
    }

    fn known_cell(&self, cell_id: CellId) -> Result<&Simulation> {
        let sim = self.simulation()?;
        if !sim.cells().contains(cell_id) {
            return Err(CpmError::UnknownCell { cell_id });
        }
        Ok(sim)
    }
}

impl Drop for Cpm {
    fn drop(&mut self) {
        if let RunState::Running { cancel, .. } = &self.state {
            cancel.store(true, Ordering::Relaxed);
            let _ = self.join();
        }
    }
}
