//! Orchestration Layer
//!
//! This crate drives the Verlet kernel as a running simulation:
//! - JSON configuration loading and validation
//! - Particle emission into the pit
//! - Background frame runner with lifecycle management and a frame-budget probe

#![warn(missing_docs)]

pub mod config;
pub mod emitter;
pub mod runner;

pub use config::{ConfigError, SimulationConfig};
pub use emitter::Emitter;
pub use runner::{RunnerSettings, RunnerState, SimulationRunner};

use std::sync::Arc;
use verlet_kernel::{KernelError, RayonPool, VerletKernel};

/// Create a complete simulation from a configuration file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the configuration
/// 2. Build the worker pool and the kernel
/// 3. Wrap kernel and emitter in a SimulationRunner for lifecycle management
///
/// # Arguments
/// * `config_path` - Path to the JSON configuration file
///
/// # Returns
/// A `SimulationRunner` ready to be started, or an error if setup fails
///
/// # Example
/// ```no_run
/// use verlet_orchestrator::create_simulation;
///
/// let runner = create_simulation("configs/pit-300.json")?;
/// runner.start();
/// // ... query status, pause, resume, etc.
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation(config_path: &str) -> Result<SimulationRunner, Box<dyn std::error::Error>> {
    tracing::info!("Creating simulation from config: {}", config_path);

    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    Ok(create_runner(&config)?)
}

/// Build a runner for an already validated configuration.
pub fn create_runner(config: &SimulationConfig) -> Result<SimulationRunner, KernelError> {
    let kernel = create_kernel(config)?;
    let emitter = Emitter::new(&config.emitter);

    tracing::info!("Creating simulation runner...");
    let runner = SimulationRunner::new(
        Box::new(kernel),
        emitter,
        RunnerSettings::from_config(config),
    );

    tracing::info!("Simulation ready to start");
    Ok(runner)
}

/// Create a kernel on a fresh rayon pool sized by the configuration.
pub fn create_kernel(config: &SimulationConfig) -> Result<VerletKernel, KernelError> {
    let pool = RayonPool::new(config.worker_count())?;
    VerletKernel::new(config.kernel_params(), Arc::new(pool))
}
