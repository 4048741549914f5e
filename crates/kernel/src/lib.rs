//! Verlet Particle Kernel
//!
//! Real-time simulation of unit-radius point masses under gravity with soft
//! pairwise collision response. Broad phase is a fixed-capacity uniform grid;
//! narrow phase runs on a worker pool, split into two barrier-separated passes
//! of column slices so that no two concurrent tasks ever touch the same
//! particle.
//!
//! # Modules
//! - [`particle`] -- Particle state and position-Verlet integration.
//! - [`grid`] -- Column-major collision grid with 4-slot cells.
//! - [`contact`] -- Pairwise overlap response.
//! - [`partition`] -- Even/odd column-slice plan for the concurrent solve.
//! - [`collision`] -- Two-pass narrow-phase solve over the grid.
//! - [`pool`] -- Task-dispatch capability the kernel runs its batches on.

#![warn(missing_docs)]

pub mod collision;
pub mod contact;
pub mod grid;
pub mod partition;
pub mod particle;
pub mod pool;

use std::sync::Arc;

use glam::Vec2;

pub use grid::{CellOverflow, CollisionGrid, GridStats, CELL_CAPACITY};
pub use partition::{ColumnRange, ParityPlan};
pub use particle::{Particle, WORLD_MARGIN};
pub use pool::{RayonPool, SerialPool, TaskPool};

/// Errors raised while setting up a kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// World must leave room for the margin and the empty grid border.
    #[error("world size {width}x{height} is too small (minimum {min}x{min})")]
    WorldTooSmall {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Smallest accepted side.
        min: u32,
    },
    /// At least one sub-step per frame is required.
    #[error("sub_steps must be at least 1")]
    ZeroSubSteps,
    /// A worker pool needs at least one thread.
    #[error("worker count must be at least 1")]
    NoWorkers,
    /// Gravity components must be finite.
    #[error("gravity must be finite, got {0:?}")]
    InvalidGravity([f32; 2]),
    /// The rayon thread pool could not be created.
    #[error("failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// Smallest world side accepted by [`KernelParams::validate`].
pub const MIN_WORLD_SIDE: u32 = 8;

/// Construction-time parameters of a [`VerletKernel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    /// World size in whole units; also the grid dimensions.
    pub world_size: [u32; 2],
    /// Gravitational acceleration (world units / s^2, +y is down).
    pub gravity: [f32; 2],
    /// Sub-steps per frame.
    pub sub_steps: u32,
    /// What full grid cells do with further particles.
    pub cell_overflow: CellOverflow,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            world_size: [300, 300],
            gravity: [0.0, 20.0],
            sub_steps: 8,
            cell_overflow: CellOverflow::OverwriteLast,
        }
    }
}

impl KernelParams {
    /// Check the parameters describe a usable simulation.
    pub fn validate(&self) -> Result<(), KernelError> {
        let [width, height] = self.world_size;
        if width < MIN_WORLD_SIDE || height < MIN_WORLD_SIDE {
            return Err(KernelError::WorldTooSmall {
                width,
                height,
                min: MIN_WORLD_SIDE,
            });
        }
        if self.sub_steps == 0 {
            return Err(KernelError::ZeroSubSteps);
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(KernelError::InvalidGravity(self.gravity));
        }
        Ok(())
    }
}

/// Trait for anything that advances a particle population frame by frame.
///
/// Each call to [`step`](Self::step) runs the configured number of sub-steps:
///
/// 1. Grid rebuild
/// 2. Two-pass collision solve
/// 3. Gravity, integration and boundary clamp
pub trait SimulationKernel {
    /// Advance the simulation by one frame of `dt` seconds.
    fn step(&mut self, dt: f32);

    /// Read-only view of the particles, valid between steps.
    fn particles(&self) -> &[Particle];

    /// Number of particles in the simulation.
    fn particle_count(&self) -> usize;

    /// Append a particle and return its index.
    fn add_particle(&mut self, particle: Particle) -> usize;

    /// Grid occupancy from the last sub-step.
    fn grid_stats(&self) -> GridStats;
}

/// CPU kernel running the collision solve and integration on a [`TaskPool`].
pub struct VerletKernel {
    /// Particle state, indexed densely.
    particles: Vec<Particle>,
    /// Broad-phase grid, rebuilt every sub-step.
    grid: CollisionGrid,
    /// Column slices for the two collision passes.
    plan: ParityPlan,
    /// Injected worker pool; shared across frames, never owned exclusively.
    pool: Arc<dyn TaskPool>,
    /// World extent as floats for clamping.
    world: Vec2,
    /// Gravitational acceleration.
    gravity: Vec2,
    /// Sub-steps per frame.
    sub_steps: u32,
}

impl VerletKernel {
    /// Create an empty kernel.
    pub fn new(params: KernelParams, pool: Arc<dyn TaskPool>) -> Result<Self, KernelError> {
        params.validate()?;
        let [width, height] = params.world_size;
        let grid = CollisionGrid::new(width as usize, height as usize, params.cell_overflow);
        let plan = ParityPlan::new(grid.width(), pool.worker_count());

        tracing::info!(
            "Verlet kernel: {}x{} world, {} sub-steps, {} workers, {} slices of {} columns",
            width,
            height,
            params.sub_steps,
            pool.worker_count(),
            plan.even_pass().len() + plan.odd_pass().len(),
            plan.slice_columns(),
        );

        Ok(Self {
            particles: Vec::new(),
            grid,
            plan,
            pool,
            world: Vec2::new(width as f32, height as f32),
            gravity: Vec2::from(params.gravity),
            sub_steps: params.sub_steps,
        })
    }

    /// Create a kernel already holding `particles`.
    pub fn with_particles(
        params: KernelParams,
        pool: Arc<dyn TaskPool>,
        particles: Vec<Particle>,
    ) -> Result<Self, KernelError> {
        let mut kernel = Self::new(params, pool)?;
        kernel.particles = particles;
        Ok(kernel)
    }

    /// The broad-phase grid as of the last rebuild.
    pub fn grid(&self) -> &CollisionGrid {
        &self.grid
    }

    /// The parity plan used by the collision solve.
    pub fn plan(&self) -> &ParityPlan {
        &self.plan
    }

    /// World extent.
    pub fn world_size(&self) -> Vec2 {
        self.world
    }

    /// Rebuild the grid from the current positions without stepping.
    pub fn rebuild_grid(&mut self) {
        self.grid.rebuild(&self.particles);
    }

    /// Rebuild the grid and run both collision passes once, without
    /// integrating.
    pub fn solve_collisions(&mut self) {
        self.grid.rebuild(&self.particles);
        collision::solve(&self.grid, &self.plan, &mut self.particles, self.pool.as_ref());
    }

    /// Apply gravity, integrate and clamp every particle, split across the pool.
    fn integrate(&mut self, dt: f32) {
        let gravity = self.gravity;
        let world = self.world;
        pool::parallel_for(self.pool.as_ref(), &mut self.particles, |_, chunk| {
            for particle in chunk {
                particle.accelerate(gravity);
                particle.integrate(dt);
                particle.clamp_to(world, WORLD_MARGIN);
            }
        });
    }
}

impl SimulationKernel for VerletKernel {
    fn step(&mut self, dt: f32) {
        let sub_dt = dt / self.sub_steps as f32;
        for _ in 0..self.sub_steps {
            self.solve_collisions();
            self.integrate(sub_dt);
        }
    }

    fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn particle_count(&self) -> usize {
        self.particles.len()
    }

    fn add_particle(&mut self, particle: Particle) -> usize {
        self.particles.push(particle);
        self.particles.len() - 1
    }

    fn grid_stats(&self) -> GridStats {
        self.grid.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial(workers: usize) -> Arc<dyn TaskPool> {
        Arc::new(SerialPool::new(workers))
    }

    #[test]
    fn default_params_are_valid() {
        assert!(KernelParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_small_world() {
        let params = KernelParams {
            world_size: [4, 300],
            ..KernelParams::default()
        };
        assert!(matches!(
            VerletKernel::new(params, serial(1)),
            Err(KernelError::WorldTooSmall { width: 4, .. })
        ));
    }

    #[test]
    fn rejects_zero_sub_steps() {
        let params = KernelParams {
            sub_steps: 0,
            ..KernelParams::default()
        };
        assert!(matches!(params.validate(), Err(KernelError::ZeroSubSteps)));
    }

    #[test]
    fn rejects_nan_gravity() {
        let params = KernelParams {
            gravity: [0.0, f32::NAN],
            ..KernelParams::default()
        };
        assert!(matches!(params.validate(), Err(KernelError::InvalidGravity(_))));
    }

    #[test]
    fn plan_follows_worker_count() {
        let kernel = VerletKernel::new(KernelParams::default(), serial(8)).unwrap();
        assert_eq!(kernel.plan().even_pass().len(), 9);
        assert_eq!(kernel.plan().odd_pass().len(), 8);
    }

    #[test]
    fn add_particle_returns_dense_ids() {
        let mut kernel = VerletKernel::new(KernelParams::default(), serial(1)).unwrap();
        assert_eq!(kernel.add_particle(Particle::new(Vec2::new(10.0, 10.0))), 0);
        assert_eq!(kernel.add_particle(Particle::new(Vec2::new(20.0, 10.0))), 1);
        assert_eq!(kernel.particle_count(), 2);
    }

    #[test]
    fn empty_kernel_steps() {
        let mut kernel = VerletKernel::new(KernelParams::default(), serial(4)).unwrap();
        kernel.step(1.0 / 50.0);
        assert_eq!(kernel.particle_count(), 0);
        assert_eq!(kernel.grid_stats(), GridStats::default());
    }
}
