use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::prelude::*;
use std::time::Instant;

use cpm_engine::{Cpm, IntPoint, LatticeTopology, SimulationConfig, Snapshot};

/// Attempts per requested cell before placement gives up.
const PLACEMENT_ATTEMPTS_PER_CELL: u32 = 100;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting CPM Engine...");

    // --- Load Configuration ---
    let config = SimulationConfig::load("config.toml")?;
    debug!("Configuration: {:#?}", config);
    info!("Using {} Rayon threads for full-grid scans.", rayon::current_num_threads());

    // --- Initialize Model ---
    let mut cpm = Cpm::from_config(&config).context("Failed to build model from config")?;
    let placed = seed_cells(&mut cpm, &config)?;
    info!("Seeded {} of {} cells of type {}.", placed, config.initial_conditions.num_cells, config.initial_conditions.cell_type);

    // --- Simulation Loop ---
    let total_ticks = config.timing.total_ticks;
    let interval = config.timing.record_interval_ticks;
    let mut snapshots: Vec<Snapshot> = vec![cpm.snapshot()?];

    info!("Starting simulation loop for {} ticks (snapshot every {}).", total_ticks, interval);
    let start_time = Instant::now();
    let mut done = 0;
    while done < total_ticks {
        let chunk = interval.min(total_ticks - done);
        let chunk_start = Instant::now();
        cpm.run_async(chunk)?;
        let summary = cpm.join()?;
        done += summary.ticks_completed;

        let snapshot = cpm.snapshot()?;
        info!(
            "Tick [{}/{}] | Live cells: {} | Border: {} | Last tick: {}/{} accepted | Chunk: {:.2} ms | Elapsed: {:.2} s",
            summary.tick,
            total_ticks,
            snapshot.live_cells,
            snapshot.border_sites,
            snapshot.accepted_moves,
            snapshot.attempted_moves,
            chunk_start.elapsed().as_secs_f64() * 1000.0,
            start_time.elapsed().as_secs_f64()
        );
        snapshots.push(snapshot);
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.1} ticks/s).",
        total_duration.as_secs_f64(),
        f64::from(total_ticks) / total_duration.as_secs_f64().max(f64::EPSILON)
    );

    // --- Save Tracks ---
    if config.output.save_tracks {
        let filename = format!("{}_tracks.csv", config.output.base_filename);
        write_tracks(&filename, &snapshots)?;
        info!("Centroid tracks saved to {}", filename);
    } else {
        info!("Skipping saving tracks as per config (save_tracks is false).");
    }

    info!("Simulation Complete.");
    Ok(())
}

/// Places single-site cells at random medium sites.
fn seed_cells(cpm: &mut Cpm, config: &SimulationConfig) -> Result<u32> {
    let init = &config.initial_conditions;
    let mut rng = StdRng::seed_from_u64(init.placement_seed);
    let d = cpm.dimension() as i64;
    let mut placed = 0;
    let mut attempts = 0;
    let max_attempts = init.num_cells.saturating_mul(PLACEMENT_ATTEMPTS_PER_CELL);
    while placed < init.num_cells {
        if attempts >= max_attempts {
            warn!(
                "Could only place {} of {} cells after {} attempts.",
                placed, init.num_cells, attempts
            );
            break;
        }
        attempts += 1;
        let x = rng.random_range(0..d);
        let y = rng.random_range(0..d);
        let p = match config.lattice.topology {
            LatticeTopology::Moore2d => IntPoint::planar(x, y),
            LatticeTopology::Moore3d => IntPoint::new(x, y, rng.random_range(0..d)),
        };
        if !cpm.simulation()?.lattice().site(p).is_medium() {
            continue;
        }
        cpm.add_cell_at(p, init.cell_type)?;
        placed += 1;
    }
    Ok(placed)
}

fn write_tracks(filename: &str, snapshots: &[Snapshot]) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)
        .with_context(|| format!("Error creating track file '{}'", filename))?;
    for record in snapshots.iter().flat_map(|s| s.cells.iter()) {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
