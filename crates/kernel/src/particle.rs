//! Particle state and the position-Verlet integration rule.

use glam::Vec2;

/// Distance kept between every particle and the world edge after integration.
pub const WORLD_MARGIN: f32 = 2.0;

/// A unit-radius point mass.
///
/// Velocity is never stored: it is the difference between `position` and
/// `last_position`, so pushing a particle during collision resolution changes
/// its velocity on the next integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Current position (world units).
    pub position: Vec2,
    /// Position before the most recent integration.
    pub last_position: Vec2,
    /// Acceleration accumulated since the last integration.
    pub acceleration: Vec2,
    /// Opaque RGBA attribute for presentation; the kernel never reads it.
    pub color: [u8; 4],
}

impl Particle {
    /// Create a particle at rest at `position`.
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            last_position: position,
            acceleration: Vec2::ZERO,
            color: [255, 255, 255, 255],
        }
    }

    /// Create a particle that moves by `displacement` per integration step.
    pub fn with_velocity(position: Vec2, displacement: Vec2) -> Self {
        Self {
            last_position: position - displacement,
            ..Self::new(position)
        }
    }

    /// Implicit velocity (displacement per step).
    #[inline]
    pub fn velocity(&self) -> Vec2 {
        self.position - self.last_position
    }

    /// Add to the acceleration accumulator.
    #[inline]
    pub fn accelerate(&mut self, a: Vec2) {
        self.acceleration += a;
    }

    /// Advance one step of `dt` seconds and consume the accumulated acceleration.
    #[inline]
    pub fn integrate(&mut self, dt: f32) {
        let velocity = self.velocity();
        self.last_position = self.position;
        self.position += velocity + self.acceleration * (dt * dt);
        self.acceleration = Vec2::ZERO;
    }

    /// Clamp the position into `[margin, world - margin]` on each axis.
    ///
    /// `last_position` is left alone, so the snap shows up as velocity on the
    /// next step.
    #[inline]
    pub fn clamp_to(&mut self, world: Vec2, margin: f32) {
        let lo = Vec2::splat(margin);
        let hi = world - lo;
        self.position = self.position.clamp(lo, hi);
    }
}
