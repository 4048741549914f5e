//! Configuration parsing and validation for particle pit simulations

use serde::{Deserialize, Serialize};
use std::fs;
use verlet_kernel::{CellOverflow, KernelParams};

/// Errors raised while loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was requested.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON.
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configuration parsed but describes an unusable simulation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    pub name: String,
    /// World size in whole units [width, height]; also the grid size
    #[serde(default = "default_world_size")]
    pub world_size: [u32; 2],
    /// Gravity vector (+y points down)
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 2],
    /// Collision/integration sub-steps per frame
    #[serde(default = "default_sub_steps")]
    pub sub_steps: u32,
    /// Worker threads; defaults to the available parallelism
    #[serde(default)]
    pub workers: Option<usize>,
    /// Behaviour of full grid cells
    #[serde(default)]
    pub cell_overflow: CellOverflow,
    /// Target frames per second; each frame advances 1 / frame_rate seconds
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
    /// Particle source
    #[serde(default)]
    pub emitter: EmitterConfig,
    /// Emission cut-off when frames run over budget
    #[serde(default)]
    pub frame_budget: FrameBudgetConfig,
}

/// Particle source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Position of the lowest particle of each emitted column
    #[serde(default = "default_emitter_origin")]
    pub origin: [f32; 2],
    /// Particles emitted per frame
    #[serde(default = "default_per_frame")]
    pub per_frame: u32,
    /// Vertical distance between particles of one column
    #[serde(default = "default_spacing")]
    pub spacing: f32,
    /// Initial displacement per sub-step
    #[serde(default = "default_initial_velocity")]
    pub initial_velocity: [f32; 2],
    /// Stop emitting at this population
    #[serde(default = "default_max_particles")]
    pub max_particles: usize,
    /// RGBA colour given to emitted particles
    #[serde(default = "default_color")]
    pub color: [u8; 4],
}

/// Frame budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameBudgetConfig {
    /// Whether slow frames stop the emitter
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Consecutive over-budget frames before emission stops
    #[serde(default = "default_strikes")]
    pub strikes: u32,
}

// Default values
fn default_world_size() -> [u32; 2] {
    [300, 300]
}

fn default_gravity() -> [f32; 2] {
    [0.0, 20.0]
}

fn default_sub_steps() -> u32 {
    8
}

fn default_frame_rate() -> f32 {
    50.0
}

fn default_emitter_origin() -> [f32; 2] {
    [2.0, 10.0]
}

fn default_per_frame() -> u32 {
    25
}

fn default_spacing() -> f32 {
    1.1
}

fn default_initial_velocity() -> [f32; 2] {
    [0.2, 0.0]
}

fn default_max_particles() -> usize {
    100_000
}

fn default_color() -> [u8; 4] {
    [255, 255, 255, 255]
}

fn default_true() -> bool {
    true
}

fn default_strikes() -> u32 {
    10
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            origin: default_emitter_origin(),
            per_frame: default_per_frame(),
            spacing: default_spacing(),
            initial_velocity: default_initial_velocity(),
            max_particles: default_max_particles(),
            color: default_color(),
        }
    }
}

impl Default for FrameBudgetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strikes: default_strikes(),
        }
    }
}

impl SimulationConfig {
    /// Configuration with every default and the given name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            world_size: default_world_size(),
            gravity: default_gravity(),
            sub_steps: default_sub_steps(),
            workers: None,
            cell_overflow: CellOverflow::default(),
            frame_rate: default_frame_rate(),
            max_frames: None,
            emitter: EmitterConfig::default(),
            frame_budget: FrameBudgetConfig::default(),
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        // Kernel-level checks (world size, sub-steps, gravity)
        self.kernel_params()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if let Some(workers) = self.workers {
            if workers == 0 {
                return invalid("workers must be at least 1");
            }
        }

        if !(self.frame_rate > 0.0 && self.frame_rate.is_finite()) {
            return invalid("frame_rate must be positive");
        }

        if let Some(max_frames) = self.max_frames {
            if max_frames == 0 {
                return invalid("max_frames must be at least 1");
            }
        }

        // Emitter must spawn inside the world
        let [width, height] = self.world_size;
        let [ox, oy] = self.emitter.origin;
        let top = oy + self.emitter.spacing * self.emitter.per_frame.saturating_sub(1) as f32;
        if ox < 0.0 || ox > width as f32 || oy < 0.0 || top > height as f32 {
            return invalid("emitter column must lie inside the world");
        }
        if self.emitter.spacing <= 0.0 {
            return invalid("emitter spacing must be positive");
        }
        if !self.emitter.initial_velocity.iter().all(|v| v.is_finite()) {
            return invalid("emitter initial_velocity must be finite");
        }

        if self.frame_budget.enabled && self.frame_budget.strikes == 0 {
            return invalid("frame_budget strikes must be at least 1");
        }

        Ok(())
    }

    /// Frame duration in seconds
    pub fn frame_dt(&self) -> f32 {
        1.0 / self.frame_rate
    }

    /// Worker count, falling back to the available parallelism
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Kernel parameters described by this configuration
    pub fn kernel_params(&self) -> KernelParams {
        KernelParams {
            world_size: self.world_size,
            gravity: self.gravity,
            sub_steps: self.sub_steps,
            cell_overflow: self.cell_overflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verlet_kernel::MIN_WORLD_SIDE as MIN_WORLD;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = SimulationConfig::from_json(r#"{ "name": "pit" }"#).unwrap();
        assert_eq!(config.world_size, [300, 300]);
        assert_eq!(config.gravity, [0.0, 20.0]);
        assert_eq!(config.sub_steps, 8);
        assert_eq!(config.cell_overflow, CellOverflow::OverwriteLast);
        assert_eq!(config.emitter.per_frame, 25);
        assert_eq!(config.emitter.max_particles, 100_000);
        assert!((config.frame_dt() - 0.02).abs() < 1e-7);
        assert!(config.frame_budget.enabled);
    }

    #[test]
    fn test_overflow_policy_parses() {
        let config = SimulationConfig::from_json(
            r#"{ "name": "pit", "cell_overflow": "Discard", "workers": 3 }"#,
        )
        .unwrap();
        assert_eq!(config.cell_overflow, CellOverflow::Discard);
        assert_eq!(config.worker_count(), 3);
    }

    #[test]
    fn test_validation_world_size() {
        let mut config = SimulationConfig::named("test");
        config.world_size = [MIN_WORLD - 1, 300];
        assert!(config.validate().is_err());

        config.world_size = [MIN_WORLD, MIN_WORLD];
        config.emitter.origin = [2.0, 2.0];
        config.emitter.per_frame = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_sub_steps_and_workers() {
        let mut config = SimulationConfig::named("test");
        config.sub_steps = 0;
        assert!(config.validate().is_err());

        config.sub_steps = 4;
        config.workers = Some(0);
        assert!(config.validate().is_err());

        config.workers = Some(2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_emitter_outside_world() {
        let mut config = SimulationConfig::named("test");
        config.emitter.origin = [2.0, 290.0];
        // 25 particles at 1.1 spacing reach y = 316.4
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = SimulationConfig::from_json("{ name: pit").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = SimulationConfig::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
