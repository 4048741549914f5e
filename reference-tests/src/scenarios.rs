//! Reference scenarios, sized by the caller.

use glam::Vec2;
use verlet_kernel::Particle;
use verlet_orchestrator::SimulationConfig;

use crate::{
    verlet_drop, ExpectedResult, FallCheck, PositionBoundsCheck, ReferenceTest, SeparationCheck,
};

fn quiet_config(name: &str, workers: usize) -> SimulationConfig {
    let mut config = SimulationConfig::named(name);
    config.workers = Some(workers);
    config.emitter.max_particles = 0;
    config.frame_budget.enabled = false;
    config
}

/// A lone particle released from rest falls by the closed-form Verlet drop.
pub fn free_fall(frames: u64, workers: usize) -> ReferenceTest {
    let config = quiet_config("free-fall", workers);
    let sub_dt = config.frame_dt() / config.sub_steps as f32;
    let expected_drop = verlet_drop(config.gravity[1], sub_dt, config.sub_steps * frames as u32);

    ReferenceTest {
        name: "Free Fall".to_string(),
        initial: vec![Particle::new(Vec2::new(150.5, 50.5))],
        frames,
        expected: ExpectedResult {
            position_bounds: Some(PositionBoundsCheck {
                min: [2.0, 2.0],
                max: [298.0, 298.0],
            }),
            fall: Some(FallCheck {
                index: 0,
                expected_drop,
                tolerance: 1e-3,
            }),
            population: Some(1),
            ..ExpectedResult::default()
        },
        config,
    }
}

/// Two particles half a unit apart are pushed to contact distance without
/// moving their midpoint.
pub fn overlapping_pair(workers: usize) -> ReferenceTest {
    let mut config = quiet_config("overlapping-pair", workers);
    config.gravity = [0.0, 0.0];

    ReferenceTest {
        name: "Overlapping Pair".to_string(),
        initial: vec![
            Particle::new(Vec2::new(150.25, 100.5)),
            Particle::new(Vec2::new(150.75, 100.5)),
        ],
        frames: 1,
        expected: ExpectedResult {
            separation: Some(SeparationCheck {
                a: 0,
                b: 1,
                min_distance: 0.999,
                midpoint: [150.5, 100.5],
                tolerance: 1e-4,
            }),
            population: Some(2),
            ..ExpectedResult::default()
        },
        config,
    }
}

/// The emitter fills the pit to `target`; every particle stays inside the
/// margin and no cell ever exceeds its capacity.
pub fn stress_fill(target: usize, workers: usize) -> ReferenceTest {
    let mut config = SimulationConfig::named("stress-fill");
    config.workers = Some(workers);
    config.emitter.max_particles = target;
    config.frame_budget.enabled = false;
    let per_frame = config.emitter.per_frame as usize;
    let frames = (target.div_ceil(per_frame) + 50) as u64;

    ReferenceTest {
        name: format!("Stress Fill ({} particles, {} workers)", target, workers),
        initial: Vec::new(),
        frames,
        expected: ExpectedResult {
            position_bounds: Some(PositionBoundsCheck {
                min: [2.0, 2.0],
                max: [298.0, 298.0],
            }),
            cell_capacity: true,
            population: Some(target),
            ..ExpectedResult::default()
        },
        config,
    }
}
