use cpm_engine::cell_book::CellBook;
use cpm_engine::{Cpm, IntPoint, LatticeTopology, ModelParams, Point, Simulation, TypeConstraints};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn params(topology: LatticeTopology, dimension: usize, seed: u64) -> ModelParams {
    ModelParams {
        topology,
        dimension,
        number_of_types: 3,
        temperature: 20.0,
        seed: Some(seed),
    }
}

/// Border membership, area/count/site conservation, perimeter against a
/// recount and centroid against a wraparound-aware mean.
fn assert_consistent(sim: &Simulation) {
    let lattice = sim.lattice();
    for i in 0..lattice.site_count() {
        assert_eq!(
            lattice.border_contains(i),
            lattice.is_border(lattice.position(i)),
            "border mismatch at {:?}",
            lattice.position(i)
        );
    }
    let d = lattice.dimension() as i64;
    for id in 1..=sim.cells().len() as u32 {
        let sites = lattice.sites_of(id);
        let n = sites.len() as i64;
        assert_eq!(sim.cells().area(id), n, "area of cell {}", id);
        assert_eq!(sim.centroid_tracker().count(id), n, "count of cell {}", id);
        assert_eq!(sim.cells().perimeter(id), CellBook::count_perimeter(lattice, id), "perimeter of cell {}", id);
        if n == 0 {
            continue;
        }
        // Unwrap around the first site; only meaningful for cells well under
        // half the lattice across (the wall spans a whole axis).
        let reference = sites[0];
        let offsets: Vec<Point> = sites.iter().map(|p| (*p - reference).to_point().wrap(d)).collect();
        let limit = (d / 2 - 1) as f64;
        if offsets.iter().any(|o| o.x.abs().max(o.y.abs()).max(o.z.abs()) >= limit) {
            continue;
        }
        let sum = offsets.iter().fold(Point::zero(), |acc, o| acc + *o);
        let mean = reference.to_point() + sum / n as f64;
        let tracked = sim.centroid_tracker().centroid(id).unwrap();
        assert!((tracked - mean).wrap(d).length() < 1e-9, "centroid of cell {}: {:?} vs {:?}", id, tracked, mean);
    }
}

fn motile_constraints() -> Vec<TypeConstraints> {
    let mut cells = TypeConstraints::for_type(1);
    cells.other_cell_type = Some(1);
    cells.adhesion = Some(10.0);
    cells.lambda_area = Some(5.0);
    cells.target_area = Some(20.0);
    cells.lambda_perimeter = Some(0.5);
    cells.target_perimeter = Some(60.0);
    cells.lambda_act = Some(50.0);
    cells.max_act = Some(20);
    cells.lambda_connectivity = Some(100.0);
    cells.lambda_chemotaxis = Some(5.0);
    cells.lambda_persistence = Some(20.0);
    cells.persistence_time = Some(5);
    cells.persistence_diffusion = Some(0.6);
    let mut medium = TypeConstraints::for_type(0);
    medium.other_cell_type = Some(1);
    medium.adhesion = Some(5.0);
    let mut wall = TypeConstraints::for_type(2);
    wall.fixed = Some(true);
    vec![cells, medium, wall]
}

fn build_2d(seed: u64) -> Cpm {
    let mut cpm = Cpm::new(params(LatticeTopology::Moore2d, 32, seed)).unwrap();
    for block in motile_constraints() {
        cpm.apply_constraints(&block).unwrap();
    }
    let mut field = vec![0.0; 2 * 32 * 32];
    field[..32 * 32].iter_mut().for_each(|v| *v = 1.0);
    cpm.set_field(&field).unwrap();
    // Cells near the seam so they cross it while moving.
    for (x, y) in [(0, 0), (31, 16), (10, 10), (20, 25)] {
        let block: Vec<IntPoint> = (0..3)
            .flat_map(|dx| (0..3).map(move |dy| IntPoint::planar(x + dx, y + dy)))
            .collect();
        cpm.overwrite_cell(&block, 1).unwrap();
    }
    let wall: Vec<IntPoint> = (0..32).map(|y| IntPoint::planar(16, y)).collect();
    cpm.overwrite_cell(&wall, 2).unwrap();
    cpm
}

#[test]
fn bookkeeping_stays_exact_with_every_term_enabled() {
    init_logger();
    let mut cpm = build_2d(17);
    assert_consistent(cpm.simulation().unwrap());
    for _ in 0..4 {
        cpm.run(10).unwrap();
        let sim = cpm.simulation().unwrap();
        let terms = sim.enabled_terms();
        assert!(terms.perimeter && terms.activity && terms.connectivity && terms.persistence && terms.chemotaxis);
        assert_consistent(sim);
    }
}

#[test]
fn bookkeeping_stays_exact_in_3d() {
    init_logger();
    let mut cpm = Cpm::new(params(LatticeTopology::Moore3d, 12, 3)).unwrap();
    cpm.set_area(1, 2.0, 30.0).unwrap();
    cpm.set_perimeter(1, 0.1, 200.0).unwrap();
    cpm.set_adhesion(0, 1, 4.0).unwrap();
    cpm.set_persistence(1, 5.0, 3, 0.5).unwrap();
    for corner in [IntPoint::new(0, 0, 0), IntPoint::new(6, 6, 11)] {
        let block: Vec<IntPoint> = (0..8)
            .map(|i| corner + IntPoint::new(i & 1, (i >> 1) & 1, (i >> 2) & 1))
            .collect();
        cpm.overwrite_cell(&block, 1).unwrap();
    }
    cpm.run(8).unwrap();
    assert_consistent(cpm.simulation().unwrap());
}

#[test]
fn fixed_sites_never_change() {
    init_logger();
    let mut cpm = build_2d(5);
    let wall_id = 5;
    let before = cpm.sites_of(wall_id).unwrap();
    cpm.run(30).unwrap();
    assert_eq!(cpm.sites_of(wall_id).unwrap(), before);
    let occupancy = cpm.occupancy().unwrap();
    let sim = cpm.simulation().unwrap();
    for p in &before {
        let raw = occupancy[sim.lattice().index(*p)];
        assert_eq!(raw, wall_id | (2 << 24));
    }
}

#[test]
fn identical_seeds_give_identical_grids() {
    init_logger();
    let mut a = build_2d(99);
    let mut b = build_2d(99);
    a.run(25).unwrap();
    b.run(25).unwrap();
    assert_eq!(a.occupancy().unwrap(), b.occupancy().unwrap());
    assert_eq!(a.activity().unwrap(), b.activity().unwrap());
    assert_eq!(a.centroids().unwrap(), b.centroids().unwrap());
}

#[test]
fn background_run_matches_blocking_run() {
    init_logger();
    let mut blocking = build_2d(8);
    let mut background = build_2d(8);
    blocking.run(12).unwrap();
    background.run_async(7).unwrap();
    background.join().unwrap();
    background.run_async(5).unwrap();
    let summary = background.join().unwrap();
    assert_eq!(summary.tick, 12);
    assert_eq!(blocking.occupancy().unwrap(), background.occupancy().unwrap());
}

#[test]
fn grid_ingestion_derives_full_state() {
    init_logger();
    let mut source = build_2d(21);
    source.run(5).unwrap();
    let grid = source.occupancy().unwrap();
    let cell_count = source.simulation().unwrap().cells().len() as u32;

    let mut copy = Cpm::new(params(LatticeTopology::Moore2d, 32, 1)).unwrap();
    copy.initialize_from_grid(&grid, cell_count).unwrap();
    let sim = copy.simulation().unwrap();
    assert_consistent(sim);
    for id in 1..=cell_count {
        assert_eq!(copy.area(id).unwrap(), source.area(id).unwrap());
        assert_eq!(copy.perimeter(id).unwrap(), source.perimeter(id).unwrap());
    }
    assert_eq!(copy.cell_type(5).unwrap(), 2);
}

#[test]
fn killed_cells_drop_out_of_queries() {
    init_logger();
    let mut cpm = Cpm::new(params(LatticeTopology::Moore2d, 16, 4)).unwrap();
    for x in [2, 6, 10] {
        cpm.add_cell_at(IntPoint::planar(x, 4), 1).unwrap();
    }
    cpm.kill_cell(2).unwrap();
    assert_eq!(cpm.count_type(1).unwrap(), 2);
    assert_eq!(cpm.cell_ids(1).unwrap(), vec![1, 3]);
    let snapshot = cpm.snapshot().unwrap();
    assert_eq!(snapshot.cells.iter().map(|c| c.cell_id).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(cpm.centroids().unwrap()[1], (3, Point::planar(10.0, 4.0)));
    assert_consistent(cpm.simulation().unwrap());
}
