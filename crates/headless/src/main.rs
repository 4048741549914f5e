//! Headless frame driver
//!
//! Runs a particle pit from a JSON configuration without any presentation,
//! logging progress once a second and the sustained capacity at the end.
//!
//! Usage: `verlet-headless [config.json]` (falls back to `VERLET_CONFIG`, then
//! `configs/pit-300.json`).

use std::error::Error;
use std::thread;
use std::time::{Duration, Instant};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use verlet_orchestrator::{create_simulation, RunnerState};

const DEFAULT_CONFIG: &str = "configs/pit-300.json";
const DEFAULT_LOG_FILTER: &str = "verlet_headless=info,verlet_orchestrator=info,verlet_kernel=info";

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VERLET_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    tracing::info!("Starting headless particle pit");
    let runner = create_simulation(&config_path)?;

    let started = Instant::now();
    runner.start();

    loop {
        thread::sleep(Duration::from_secs(1));
        match runner.state() {
            RunnerState::Finished | RunnerState::Error => break,
            _ => {
                let stats = runner.grid_stats();
                tracing::info!(
                    "frame {} | {} particles | {} occupied cells, {} full",
                    runner.frame_count(),
                    runner.particle_count(),
                    stats.occupied_cells,
                    stats.saturated_cells,
                );
            }
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let frames = runner.frame_count();
    tracing::info!(
        "Ran {} frames ({:.1}s simulated) in {:.1}s: {:.1} frames/s",
        frames,
        runner.sim_time(),
        elapsed,
        frames as f64 / elapsed.max(1e-9),
    );
    match runner.capacity_at_budget() {
        Some(capacity) => tracing::info!("Sustained capacity: {} particles", capacity),
        None => tracing::info!(
            "Frame budget never exceeded; final population {}",
            runner.particle_count()
        ),
    }

    runner.join()?;
    Ok(())
}
