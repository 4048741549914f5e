//! Single-particle free fall and boundary clamp.

use std::sync::Arc;

use glam::Vec2;
use verlet_kernel::{
    KernelParams, Particle, RayonPool, SimulationKernel, VerletKernel, WORLD_MARGIN,
};

const DT: f32 = 1.0 / 50.0;

fn drop_kernel(start: Vec2) -> VerletKernel {
    let params = KernelParams {
        world_size: [300, 300],
        gravity: [0.0, 20.0],
        sub_steps: 8,
        ..KernelParams::default()
    };
    let pool = Arc::new(RayonPool::new(4).unwrap());
    VerletKernel::with_particles(params, pool, vec![Particle::new(start)]).unwrap()
}

#[test]
fn one_frame_of_gravity() {
    let mut kernel = drop_kernel(Vec2::new(150.0, 10.0));
    kernel.step(DT);

    // Sub-step k adds k * g * sub_dt^2, so eight sub-steps fall
    // g * sub_dt^2 * (1 + 2 + ... + 8).
    let sub_dt = DT / 8.0;
    let expected = 20.0 * sub_dt * sub_dt * 36.0;

    let p = kernel.particles()[0];
    let fallen = p.position.y - 10.0;
    assert!(fallen > 0.0, "particle did not fall");
    assert!(
        (fallen - expected).abs() < 1.0e-4,
        "fell {fallen}, expected {expected}"
    );
    assert_eq!(p.position.x, 150.0);
    assert!(p.position.y >= WORLD_MARGIN && p.position.y <= 298.0);
}

#[test]
fn falls_faster_each_frame() {
    let mut kernel = drop_kernel(Vec2::new(150.0, 10.0));
    let mut last_y = 10.0;
    let mut last_fall = 0.0;
    for _ in 0..5 {
        kernel.step(DT);
        let y = kernel.particles()[0].position.y;
        let fall = y - last_y;
        assert!(fall > last_fall, "fall did not accelerate: {last_fall} -> {fall}");
        last_fall = fall;
        last_y = y;
    }
}

#[test]
fn particle_comes_to_rest_on_floor() {
    let mut kernel = drop_kernel(Vec2::new(150.0, 290.0));
    for _ in 0..200 {
        kernel.step(DT);
        let p = kernel.particles()[0].position;
        assert!(p.y <= 300.0 - WORLD_MARGIN, "y = {}", p.y);
        assert!(p.y >= WORLD_MARGIN);
    }
    assert_eq!(kernel.particles()[0].position.y, 300.0 - WORLD_MARGIN);
}

#[test]
fn fast_particles_are_clamped_on_every_side() {
    let params = KernelParams {
        gravity: [0.0, 0.0],
        ..KernelParams::default()
    };
    let particles = vec![
        Particle::with_velocity(Vec2::new(10.0, 150.0), Vec2::new(-30.0, 0.0)),
        Particle::with_velocity(Vec2::new(290.0, 150.0), Vec2::new(30.0, 0.0)),
        Particle::with_velocity(Vec2::new(150.0, 10.0), Vec2::new(0.0, -30.0)),
        Particle::with_velocity(Vec2::new(150.0, 290.0), Vec2::new(0.0, 30.0)),
    ];
    let pool = Arc::new(RayonPool::new(2).unwrap());
    let mut kernel = VerletKernel::with_particles(params, pool, particles).unwrap();

    kernel.step(DT);

    for p in kernel.particles() {
        assert!(p.position.x >= WORLD_MARGIN && p.position.x <= 300.0 - WORLD_MARGIN);
        assert!(p.position.y >= WORLD_MARGIN && p.position.y <= 300.0 - WORLD_MARGIN);
    }
}
