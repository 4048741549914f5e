//! Narrow-phase collision solve over the grid, two parity passes at a time.
//!
//! Every particle is resolved against every particle of its own cell and the
//! eight cells around it. The cells of one pass are split across tasks by
//! [`ParityPlan`]; tasks of the same pass never share a particle, so they
//! mutate the particle array concurrently without locks.

use std::marker::PhantomData;

use crate::contact;
use crate::grid::{Cell, CollisionGrid};
use crate::partition::{ColumnRange, ParityPlan};
use crate::particle::Particle;
use crate::pool::{Task, TaskPool};

/// Particle array shared by the tasks of a single pass.
///
/// Built from an exclusive borrow, so nothing else can observe the particles
/// while a pass runs. Tasks reach particles only through
/// [`resolve_pair`](Self::resolve_pair), whose safety contract is the
/// disjointness guaranteed by [`ParityPlan::is_race_free`].
struct SharedParticles<'a> {
    ptr: *mut Particle,
    len: usize,
    _borrow: PhantomData<&'a mut [Particle]>,
}

// SAFETY: the pointer comes from a `&mut [Particle]` held for `'a`, and
// concurrent access is restricted to disjoint particles (see `resolve_pair`).
unsafe impl Send for SharedParticles<'_> {}
unsafe impl Sync for SharedParticles<'_> {}

impl<'a> SharedParticles<'a> {
    fn new(particles: &'a mut [Particle]) -> Self {
        Self {
            ptr: particles.as_mut_ptr(),
            len: particles.len(),
            _borrow: PhantomData,
        }
    }

    /// Resolve the contact between particles `a` and `b`.
    ///
    /// # Safety
    ///
    /// `a` and `b` must be below the slice length; [`solve`] checks that the
    /// grid was built from a slice of this length. No other thread may access
    /// particle `a` or `b` during this call. The
    /// solver upholds this by only calling it for particles registered in the
    /// 3x3 neighbourhood of a cell owned by the calling task, and the parity
    /// plan keeps those neighbourhoods disjoint across concurrent tasks.
    #[inline]
    unsafe fn resolve_pair(&self, a: usize, b: usize) {
        debug_assert!(a < self.len && b < self.len && a != b);
        let pa = &mut *self.ptr.add(a);
        let pb = &mut *self.ptr.add(b);
        contact::resolve(pa, pb);
    }
}

/// Relative flat offsets of the 3x3 stencil for a column-major grid.
fn stencil(height: usize) -> [isize; 9] {
    let h = height as isize;
    [-h - 1, -h, -h + 1, -1, 0, 1, h - 1, h, h + 1]
}

/// Resolve every contact of the cells in `columns`.
fn solve_columns(
    grid_cells: &[Cell],
    height: usize,
    columns: ColumnRange,
    particles: &SharedParticles<'_>,
) {
    let offsets = stencil(height);
    let range = columns.cells(height);
    // Remainder slices end exactly at the last cell.
    debug_assert!(range.end <= grid_cells.len());

    for index in range {
        let cell = &grid_cells[index];
        if cell.is_empty() {
            continue;
        }
        for &atom in cell.ids() {
            for &offset in &offsets {
                let neighbour_index = index as isize + offset;
                debug_assert!(
                    neighbour_index >= 0 && (neighbour_index as usize) < grid_cells.len(),
                    "stencil left the grid at cell {index}"
                );
                let neighbour = &grid_cells[neighbour_index as usize];
                for &other in neighbour.ids() {
                    if other != atom {
                        // SAFETY: ids are below `source_len`, checked in
                        // `solve`. `atom` lives in a cell of `columns` and
                        // `other` in the stencil around it; see `ParityPlan`.
                        unsafe { particles.resolve_pair(atom as usize, other as usize) };
                    }
                }
            }
        }
    }
}

/// Run both parity passes over `grid` on `pool`.
///
/// The grid must have been rebuilt from `particles` beforehand. Returns once
/// the second pass has completed.
///
/// # Panics
///
/// If `plan` was made for a different number of columns than `grid`, or if
/// `grid` was last rebuilt from a particle slice of another length.
pub fn solve(
    grid: &CollisionGrid,
    plan: &ParityPlan,
    particles: &mut [Particle],
    pool: &dyn TaskPool,
) {
    // Both checks are load-bearing for the unchecked particle access below.
    assert_eq!(
        plan.width(),
        grid.width(),
        "parity plan covers {} columns, grid has {}",
        plan.width(),
        grid.width()
    );
    assert_eq!(
        grid.source_len(),
        particles.len(),
        "grid was rebuilt from {} particles, solve got {}",
        grid.source_len(),
        particles.len()
    );
    let height = grid.height();
    let cells = grid.cells();
    let shared = SharedParticles::new(particles);
    let shared = &shared;

    for pass in plan.passes() {
        if pass.is_empty() {
            continue;
        }
        let tasks: Vec<Task<'_>> = pass
            .iter()
            .map(|&columns| {
                Box::new(move || solve_columns(cells, height, columns, shared)) as Task<'_>
            })
            .collect();
        pool.run_batch(tasks);
    }
}
