//! Reference test framework for Verlet particle pit validation
//!
//! Each reference test runs a small scenario on the real kernel and worker
//! pool, then validates the final state against closed-form expectations:
//! free fall under position Verlet, symmetric separation of an overlapping
//! pair, and the structural limits of a densely filled pit.

pub mod scenarios;


use std::sync::Arc;

use glam::Vec2;
use verlet_kernel::{
    GridStats, Particle, RayonPool, SimulationKernel, VerletKernel, CELL_CAPACITY,
};
use verlet_orchestrator::{Emitter, SimulationConfig};

/// Expected result criteria for a reference test
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Particle position bounds validation
    pub position_bounds: Option<PositionBoundsCheck>,
    /// Grid cells never exceed their capacity
    pub cell_capacity: bool,
    /// Displacement of a single falling particle
    pub fall: Option<FallCheck>,
    /// Separation of an initially overlapping pair
    pub separation: Option<SeparationCheck>,
    /// Final particle population
    pub population: Option<usize>,
}

/// Check that particles remain within specified bounds
#[derive(Debug, Clone)]
pub struct PositionBoundsCheck {
    /// Minimum allowed position [x, y]
    pub min: [f32; 2],
    /// Maximum allowed position [x, y]
    pub max: [f32; 2],
}

/// Check the vertical drop of one particle released from rest
#[derive(Debug, Clone)]
pub struct FallCheck {
    /// Index of the tracked particle
    pub index: usize,
    /// Expected downward displacement
    pub expected_drop: f32,
    /// Absolute tolerance
    pub tolerance: f32,
}

/// Check that two particles ended up apart with their midpoint unchanged
#[derive(Debug, Clone)]
pub struct SeparationCheck {
    /// Index of the first particle
    pub a: usize,
    /// Index of the second particle
    pub b: usize,
    /// Smallest acceptable final distance
    pub min_distance: f32,
    /// Midpoint of the pair before the run
    pub midpoint: [f32; 2],
    /// Allowed midpoint drift
    pub tolerance: f32,
}

/// Drop of a particle released from rest after `sub_steps` position-Verlet
/// sub-steps of `sub_dt` under constant `gravity`.
pub fn verlet_drop(gravity: f32, sub_dt: f32, sub_steps: u32) -> f32 {
    let k = sub_steps as f32;
    gravity * sub_dt * sub_dt * k * (k + 1.0) * 0.5
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Number of frames executed
    pub frames: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
    /// Final particle population
    pub particle_count: usize,
    /// Worst grid occupancy seen over the run
    pub peak_grid: GridStats,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

/// A reference test case
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// World, kernel and emitter settings
    pub config: SimulationConfig,
    /// Particles present before the first frame
    pub initial: Vec<Particle>,
    /// Number of frames to run
    pub frames: u64,
    /// Expected results to validate
    pub expected: ExpectedResult,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> Result<TestResult, String> {
        tracing::info!("Running reference test: {}", self.name);

        self.config.validate().map_err(|e| e.to_string())?;
        let pool = RayonPool::new(self.config.worker_count()).map_err(|e| e.to_string())?;
        let mut kernel = VerletKernel::with_particles(
            self.config.kernel_params(),
            Arc::new(pool),
            self.initial.clone(),
        )
        .map_err(|e| e.to_string())?;
        let mut emitter = Emitter::new(&self.config.emitter);

        tracing::info!(
            "Initialized: {} particles, {} workers",
            kernel.particle_count(),
            self.config.worker_count(),
        );

        let dt = self.config.frame_dt();
        let mut sim_time = 0.0_f64;
        let mut peak = GridStats::default();
        for frame in 0..self.frames {
            emitter.emit(&mut kernel);
            kernel.step(dt);
            sim_time += dt as f64;

            let stats = kernel.grid_stats();
            peak.occupied_cells = peak.occupied_cells.max(stats.occupied_cells);
            peak.max_count = peak.max_count.max(stats.max_count);
            peak.saturated_cells = peak.saturated_cells.max(stats.saturated_cells);
            peak.overflowed_inserts = peak.overflowed_inserts.max(stats.overflowed_inserts);
            peak.excluded_particles = peak.excluded_particles.max(stats.excluded_particles);

            // Log progress every 10% of frames
            if (frame + 1) % (self.frames / 10).max(1) == 0 {
                let progress = ((frame + 1) as f32 / self.frames as f32) * 100.0;
                tracing::info!(
                    "Progress: {:.0}% ({}/{}), {} particles",
                    progress,
                    frame + 1,
                    self.frames,
                    kernel.particle_count()
                );
            }
        }
        tracing::info!("Simulation complete: {} frames, {:.3}s simulated", self.frames, sim_time);

        let particles = kernel.particles();
        let mut checks = Vec::new();

        if let Some(ref bounds) = self.expected.position_bounds {
            checks.push(validate_position_bounds(particles, bounds));
        }
        if self.expected.cell_capacity {
            checks.push(validate_cell_capacity(&peak));
        }
        if let Some(ref fall) = self.expected.fall {
            let start = self.initial.get(fall.index).map(|p| p.position);
            checks.push(validate_fall(particles, start, fall));
        }
        if let Some(ref separation) = self.expected.separation {
            checks.push(validate_separation(particles, separation));
        }
        if let Some(expected) = self.expected.population {
            checks.push(validate_population(particles.len(), expected));
        }

        Ok(TestResult {
            name: self.name.clone(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            frames: self.frames,
            sim_time,
            particle_count: particles.len(),
            peak_grid: peak,
        })
    }
}

/// Validate that particles remain within specified bounds and finite
fn validate_position_bounds(particles: &[Particle], bounds: &PositionBoundsCheck) -> CheckResult {
    let min = Vec2::from(bounds.min);
    let max = Vec2::from(bounds.max);
    let mut violations = 0;
    let mut max_violation = 0.0_f32;

    for p in particles {
        if !p.position.is_finite() {
            violations += 1;
            max_violation = f32::INFINITY;
            continue;
        }
        let below = (min - p.position).max(Vec2::ZERO);
        let above = (p.position - max).max(Vec2::ZERO);
        let worst = below.max_element().max(above.max_element());
        if worst > 0.0 {
            violations += 1;
            max_violation = max_violation.max(worst);
        }
    }

    if violations == 0 {
        CheckResult {
            name: "Position Bounds".to_string(),
            passed: true,
            message: None,
        }
    } else {
        CheckResult {
            name: "Position Bounds".to_string(),
            passed: false,
            message: Some(format!(
                "{} particles out of bounds (max violation: {:.4})",
                violations, max_violation
            )),
        }
    }
}

fn validate_cell_capacity(peak: &GridStats) -> CheckResult {
    CheckResult {
        name: "Cell Capacity".to_string(),
        passed: peak.max_count <= CELL_CAPACITY,
        message: Some(format!(
            "max cell count {} (capacity {}), {} full cells, {} overflowed inserts",
            peak.max_count, CELL_CAPACITY, peak.saturated_cells, peak.overflowed_inserts
        )),
    }
}

fn validate_fall(particles: &[Particle], start: Option<Vec2>, check: &FallCheck) -> CheckResult {
    let name = "Free Fall".to_string();
    let (Some(start), Some(end)) = (start, particles.get(check.index)) else {
        return CheckResult {
            name,
            passed: false,
            message: Some(format!("particle {} not found", check.index)),
        };
    };
    let drop = end.position.y - start.y;
    let drift = (end.position.x - start.x).abs();
    let error = (drop - check.expected_drop).abs();
    CheckResult {
        name,
        passed: error <= check.tolerance && drift <= check.tolerance,
        message: Some(format!(
            "Expected drop: {:.5}, Got: {:.5} (error: {:.2e}, horizontal drift: {:.2e})",
            check.expected_drop, drop, error, drift
        )),
    }
}

fn validate_separation(particles: &[Particle], check: &SeparationCheck) -> CheckResult {
    let name = "Pair Separation".to_string();
    let (Some(a), Some(b)) = (particles.get(check.a), particles.get(check.b)) else {
        return CheckResult {
            name,
            passed: false,
            message: Some("pair not found".to_string()),
        };
    };
    let distance = a.position.distance(b.position);
    let midpoint = (a.position + b.position) * 0.5;
    let drift = midpoint.distance(Vec2::from(check.midpoint));
    CheckResult {
        name,
        passed: distance >= check.min_distance && drift <= check.tolerance,
        message: Some(format!(
            "distance {:.4} (min {:.4}), midpoint drift {:.2e}",
            distance, check.min_distance, drift
        )),
    }
}

fn validate_population(actual: usize, expected: usize) -> CheckResult {
    CheckResult {
        name: "Population".to_string(),
        passed: actual == expected,
        message: (actual != expected)
            .then(|| format!("Expected {} particles, Got {}", expected, actual)),
    }
}

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Frames: {}", self.frames);
        println!("Simulated time: {:.3} s", self.sim_time);
        println!("Particles: {}", self.particle_count);
        println!("\nGrid Occupancy (peak):");
        println!("  Occupied cells: {}", self.peak_grid.occupied_cells);
        println!("  Max cell count: {}", self.peak_grid.max_count);
        println!("  Overflowed inserts: {}", self.peak_grid.overflowed_inserts);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
