//! Particle emitter: drops a column of particles into the pit every frame.

use glam::Vec2;
use verlet_kernel::{Particle, SimulationKernel};

use crate::config::EmitterConfig;

/// Spawns a vertical column of particles per frame until the population cap
/// is reached or emission is halted.
#[derive(Debug, Clone)]
pub struct Emitter {
    origin: Vec2,
    per_frame: u32,
    spacing: f32,
    velocity: Vec2,
    max_particles: usize,
    color: [u8; 4],
    halted: bool,
}

impl Emitter {
    /// Create an emitter from its configuration.
    pub fn new(config: &EmitterConfig) -> Self {
        Self {
            origin: Vec2::from(config.origin),
            per_frame: config.per_frame,
            spacing: config.spacing,
            velocity: Vec2::from(config.initial_velocity),
            max_particles: config.max_particles,
            color: config.color,
            halted: false,
        }
    }

    /// Whether this emitter will spawn anything on the next call.
    pub fn is_active(&self, population: usize) -> bool {
        !self.halted && population < self.max_particles
    }

    /// Stop emitting for good.
    pub fn halt(&mut self) {
        if !self.halted {
            tracing::info!("Emitter halted");
        }
        self.halted = true;
    }

    /// Whether [`halt`](Self::halt) has been called.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Emit one frame's column into `kernel`; returns the number spawned.
    ///
    /// The column is cut short rather than overshooting `max_particles`.
    pub fn emit(&mut self, kernel: &mut dyn SimulationKernel) -> usize {
        let population = kernel.particle_count();
        if !self.is_active(population) {
            return 0;
        }
        let count = (self.per_frame as usize).min(self.max_particles - population);
        for i in 0..count {
            let position = self.origin + Vec2::new(0.0, self.spacing * i as f32);
            let mut particle = Particle::with_velocity(position, self.velocity);
            particle.color = self.color;
            kernel.add_particle(particle);
        }
        count
    }
}
