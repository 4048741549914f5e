//! Fixed-capacity uniform collision grid.
//!
//! Cells are one world unit wide (the particle radius) and stored column-major
//! in a flat array, `index = x * height + y`, so a run of whole columns is a
//! contiguous index range. The outermost ring of cells never receives a
//! particle: only particles strictly inside the 1-unit interior margin are
//! inserted. That empty border is what lets the collision stencil step one
//! cell in every direction without bounds checks.

use serde::{Deserialize, Serialize};

use crate::particle::Particle;

/// Maximum number of particle ids a single cell holds.
pub const CELL_CAPACITY: usize = 4;

/// What a full cell does with a further insertion.
///
/// Either way the cell's count stays at [`CELL_CAPACITY`], so some broad-phase
/// pairs are dropped in crowded regions. See [`overflow_probability`] for how
/// often that happens at a given density.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellOverflow {
    /// Keep the first four ids and ignore the rest.
    Discard,
    /// Replace the id in the last slot with the newest one.
    #[default]
    OverwriteLast,
}

/// A bucket of at most [`CELL_CAPACITY`] particle ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    count: u32,
    ids: [u32; CELL_CAPACITY],
}

impl Cell {
    /// Insert `id`. Returns `false` when the cell was already full.
    #[inline]
    pub fn insert(&mut self, id: u32, policy: CellOverflow) -> bool {
        let count = self.count as usize;
        if count < CELL_CAPACITY {
            self.ids[count] = id;
            self.count += 1;
            return true;
        }
        if policy == CellOverflow::OverwriteLast {
            self.ids[CELL_CAPACITY - 1] = id;
        }
        false
    }

    /// Forget every id.
    #[inline]
    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Number of ids currently held, never above [`CELL_CAPACITY`].
    #[inline]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// `true` when the cell holds no ids.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The live ids of this cell.
    #[inline]
    pub fn ids(&self) -> &[u32] {
        &self.ids[..self.count as usize]
    }
}

/// Occupancy figures from the most recent rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    /// Cells holding at least one particle.
    pub occupied_cells: usize,
    /// Largest cell count seen.
    pub max_count: usize,
    /// Cells holding exactly [`CELL_CAPACITY`] particles.
    pub saturated_cells: usize,
    /// Insertions that found their cell already full.
    pub overflowed_inserts: usize,
    /// Particles outside the interior margin, left out of the grid.
    pub excluded_particles: usize,
}

/// Dense grid of [`Cell`]s covering the world.
#[derive(Debug, Clone)]
pub struct CollisionGrid {
    width: usize,
    height: usize,
    policy: CellOverflow,
    cells: Vec<Cell>,
    stats: GridStats,
    /// Length of the particle slice of the last rebuild; every id is below it.
    source_len: usize,
}

impl CollisionGrid {
    /// Create an empty `width x height` grid.
    pub fn new(width: usize, height: usize, policy: CellOverflow) -> Self {
        assert!(width >= 3 && height >= 3, "grid must be at least 3x3 cells");
        Self {
            width,
            height,
            policy,
            cells: vec![Cell::default(); width * height],
            stats: GridStats::default(),
            source_len: 0,
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of cells per column.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Overflow policy applied to full cells.
    pub fn policy(&self) -> CellOverflow {
        self.policy
    }

    /// All cells, column-major.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Flat index of cell `(x, y)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        x * self.height + y
    }

    /// Cell at `(x, y)`.
    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        &self.cells[self.index(x, y)]
    }

    /// Number of particles the grid was last rebuilt from. Every stored id
    /// is below this.
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Occupancy of the most recent rebuild.
    pub fn stats(&self) -> GridStats {
        self.stats
    }

    /// Grid coordinates of `particle`, or `None` if it lies outside the
    /// interior margin.
    #[inline]
    pub fn cell_coords(&self, particle: &Particle) -> Option<(usize, usize)> {
        let p = particle.position;
        let inside = p.x > 1.0
            && p.x < (self.width - 1) as f32
            && p.y > 1.0
            && p.y < (self.height - 1) as f32;
        // Truncation; both components are > 1 here.
        inside.then(|| (p.x as usize, p.y as usize))
    }

    /// Clear every cell and re-insert all particles from their current
    /// positions.
    ///
    /// Runs on a single thread: cell membership decides which worker owns
    /// which particles, so it has to be settled before any worker starts.
    pub fn rebuild(&mut self, particles: &[Particle]) {
        for cell in &mut self.cells {
            cell.clear();
        }

        let mut overflowed = 0;
        let mut excluded = 0;
        for (id, particle) in particles.iter().enumerate() {
            match self.cell_coords(particle) {
                Some((x, y)) => {
                    let index = self.index(x, y);
                    if !self.cells[index].insert(id as u32, self.policy) {
                        overflowed += 1;
                    }
                }
                None => excluded += 1,
            }
        }

        let mut stats = GridStats {
            overflowed_inserts: overflowed,
            excluded_particles: excluded,
            ..GridStats::default()
        };
        for cell in &self.cells {
            let n = cell.len();
            if n > 0 {
                stats.occupied_cells += 1;
                stats.max_count = stats.max_count.max(n);
                if n == CELL_CAPACITY {
                    stats.saturated_cells += 1;
                }
            }
        }
        self.stats = stats;
        self.source_len = particles.len();

        tracing::trace!(
            occupied = stats.occupied_cells,
            saturated = stats.saturated_cells,
            overflowed = stats.overflowed_inserts,
            excluded = stats.excluded_particles,
            "grid rebuilt"
        );
    }
}

/// Probability that a cell receives more than [`CELL_CAPACITY`] particles
/// when occupancy is Poisson distributed with `density` particles per cell.
///
/// Unit-radius particles packed hexagonally sit at about 1.15 per cell, which
/// gives roughly 0.7%; a loosely settled pile near 1.0 per cell gives 0.4%.
pub fn overflow_probability(density: f64) -> f64 {
    if density <= 0.0 {
        return 0.0;
    }
    let mut term = (-density).exp();
    let mut at_most_capacity = term;
    for k in 1..=CELL_CAPACITY {
        term *= density / k as f64;
        at_most_capacity += term;
    }
    (1.0 - at_most_capacity).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn at(x: f32, y: f32) -> Particle {
        Particle::new(Vec2::new(x, y))
    }

    #[test]
    fn column_major_index() {
        let grid = CollisionGrid::new(10, 7, CellOverflow::Discard);
        assert_eq!(grid.index(0, 0), 0);
        assert_eq!(grid.index(0, 6), 6);
        assert_eq!(grid.index(1, 0), 7);
        assert_eq!(grid.index(3, 2), 23);
        assert_eq!(grid.cells().len(), 70);
    }

    #[test]
    fn particles_land_in_truncated_cell() {
        let mut grid = CollisionGrid::new(10, 10, CellOverflow::Discard);
        let particles = [at(3.7, 5.2), at(3.1, 5.9), at(8.5, 1.5)];
        grid.rebuild(&particles);
        assert_eq!(grid.cell(3, 5).ids(), &[0, 1]);
        assert_eq!(grid.cell(8, 1).ids(), &[2]);
        assert_eq!(grid.stats().occupied_cells, 2);
    }

    #[test]
    fn margin_particles_are_excluded() {
        let mut grid = CollisionGrid::new(10, 10, CellOverflow::Discard);
        let particles = [at(1.0, 5.0), at(0.5, 5.0), at(9.0, 5.0), at(5.0, 9.5), at(5.0, 5.0)];
        grid.rebuild(&particles);
        let total: usize = grid.cells().iter().map(Cell::len).sum();
        assert_eq!(total, 1);
        assert_eq!(grid.stats().excluded_particles, 4);
        // Border ring stays empty.
        for x in 0..10 {
            assert!(grid.cell(x, 0).is_empty());
            assert!(grid.cell(x, 9).is_empty());
        }
        for y in 0..10 {
            assert!(grid.cell(0, y).is_empty());
            assert!(grid.cell(9, y).is_empty());
        }
    }

    #[test]
    fn discard_keeps_first_four() {
        let mut cell = Cell::default();
        for id in 0..6 {
            let accepted = cell.insert(id, CellOverflow::Discard);
            assert_eq!(accepted, id < 4);
        }
        assert_eq!(cell.len(), CELL_CAPACITY);
        assert_eq!(cell.ids(), &[0, 1, 2, 3]);
    }

    #[test]
    fn overwrite_last_replaces_final_slot() {
        let mut cell = Cell::default();
        for id in 0..6 {
            cell.insert(id, CellOverflow::OverwriteLast);
        }
        assert_eq!(cell.len(), CELL_CAPACITY);
        assert_eq!(cell.ids(), &[0, 1, 2, 5]);
    }

    #[test]
    fn crowded_cell_never_exceeds_capacity() {
        let mut grid = CollisionGrid::new(8, 8, CellOverflow::OverwriteLast);
        let particles: Vec<Particle> = (0..9).map(|i| at(4.1 + 0.05 * i as f32, 4.5)).collect();
        grid.rebuild(&particles);
        assert_eq!(grid.cell(4, 4).len(), CELL_CAPACITY);
        let stats = grid.stats();
        assert_eq!(stats.max_count, CELL_CAPACITY);
        assert_eq!(stats.saturated_cells, 1);
        assert_eq!(stats.overflowed_inserts, 5);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let mut grid = CollisionGrid::new(20, 20, CellOverflow::OverwriteLast);
        let particles: Vec<Particle> = (0..60)
            .map(|i| at(2.0 + (i % 7) as f32 * 0.6, 2.0 + (i / 7) as f32 * 0.9))
            .collect();
        grid.rebuild(&particles);
        let first = grid.cells().to_vec();
        let first_stats = grid.stats();
        grid.rebuild(&particles);
        assert_eq!(grid.cells(), first.as_slice());
        assert_eq!(grid.stats(), first_stats);
    }

    #[test]
    fn rebuild_records_source_len() {
        let mut grid = CollisionGrid::new(10, 10, CellOverflow::Discard);
        assert_eq!(grid.source_len(), 0);
        grid.rebuild(&[at(5.5, 5.5), at(0.5, 0.5), at(3.5, 3.5)]);
        assert_eq!(grid.source_len(), 3);
        grid.rebuild(&[]);
        assert_eq!(grid.source_len(), 0);
    }

    #[test]
    fn rebuild_clears_previous_contents() {
        let mut grid = CollisionGrid::new(10, 10, CellOverflow::Discard);
        grid.rebuild(&[at(5.5, 5.5)]);
        assert_eq!(grid.cell(5, 5).len(), 1);
        grid.rebuild(&[at(2.5, 2.5)]);
        assert!(grid.cell(5, 5).is_empty());
        assert_eq!(grid.cell(2, 2).ids(), &[0]);
    }

    #[test]
    fn overflow_probability_grows_with_density() {
        assert_eq!(overflow_probability(0.0), 0.0);
        let sparse = overflow_probability(0.5);
        let packed = overflow_probability(1.15);
        let crowded = overflow_probability(3.0);
        assert!(sparse < 2e-4, "sparse = {sparse}");
        assert!(packed > 0.005 && packed < 0.01, "packed = {packed}");
        assert!(crowded > 0.15, "crowded = {crowded}");
        assert!(sparse < packed && packed < crowded);
    }
}
