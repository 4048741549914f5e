//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which drives the kernel frame
//! by frame in a background thread, including start, pause, resume and stop,
//! the particle emitter, the frame-budget probe and a particle snapshot for
//! presentation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use verlet_kernel::{GridStats, Particle, SimulationKernel};

use crate::config::SimulationConfig;
use crate::emitter::Emitter;

/// Runner state enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (stopped or reached max_frames)
    Finished,
    /// A frame panicked; the kernel state is no longer trusted
    Error,
}

/// Frame-loop settings taken from the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerSettings {
    /// Simulated seconds per frame; also the wall-clock budget of a frame
    pub frame_dt: f32,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
    /// Consecutive slow frames that halt the emitter, if enabled
    pub budget_strikes: Option<u32>,
}

impl RunnerSettings {
    /// Settings described by `config`
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            frame_dt: config.frame_dt(),
            max_frames: config.max_frames,
            budget_strikes: config
                .frame_budget
                .enabled
                .then_some(config.frame_budget.strikes),
        }
    }
}

/// Tracks consecutive frames that ran over their wall-clock budget.
#[derive(Debug, Clone)]
pub struct FrameBudget {
    budget: Duration,
    strikes: u32,
    over: u32,
}

impl FrameBudget {
    /// Budget of `budget` per frame, tripping after `strikes` slow frames in a row.
    pub fn new(budget: Duration, strikes: u32) -> Self {
        Self {
            budget,
            strikes: strikes.max(1),
            over: 0,
        }
    }

    /// Record a frame; returns `true` once `strikes` consecutive frames ran over.
    pub fn record(&mut self, elapsed: Duration) -> bool {
        if elapsed > self.budget {
            self.over += 1;
        } else {
            self.over = 0;
        }
        self.over >= self.strikes
    }
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Current simulation time (seconds)
    sim_time: f64,
    /// Number of frames executed
    frame_count: u64,
    /// Particle population after the last frame
    particle_count: usize,
    /// Grid occupancy after the last frame
    grid_stats: GridStats,
    /// Population sustained when the frame budget tripped
    capacity_at_budget: Option<usize>,
    /// Most recent error message (if state is Error)
    error_message: Option<String>,
    /// Particles as of the last completed frame
    snapshot: Arc<Vec<Particle>>,
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    // The runner thread never panics while holding the lock.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Arc<Mutex<SharedState>>,
    /// Handle to the background thread
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl SimulationRunner {
    /// Create a new simulation runner with the given kernel
    ///
    /// The background thread waits in `Created` until [`start`](Self::start).
    pub fn new(
        mut kernel: Box<dyn SimulationKernel + Send>,
        emitter: Emitter,
        settings: RunnerSettings,
    ) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            sim_time: 0.0,
            frame_count: 0,
            particle_count: kernel.particle_count(),
            grid_stats: GridStats::default(),
            capacity_at_budget: None,
            error_message: None,
            snapshot: Arc::new(kernel.particles().to_vec()),
        }));

        let shared_clone = Arc::clone(&shared);

        // Spawn background thread
        let thread_handle = thread::spawn(move || {
            run_frame_loop(kernel.as_mut(), emitter, shared_clone, settings);
        });

        Self {
            shared,
            thread_handle: Some(thread_handle),
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state.clone()
    }

    /// Get current simulation time (seconds)
    pub fn sim_time(&self) -> f64 {
        lock(&self.shared).sim_time
    }

    /// Get current frame count
    pub fn frame_count(&self) -> u64 {
        lock(&self.shared).frame_count
    }

    /// Particle population after the last completed frame
    pub fn particle_count(&self) -> usize {
        lock(&self.shared).particle_count
    }

    /// Grid occupancy after the last completed frame
    pub fn grid_stats(&self) -> GridStats {
        lock(&self.shared).grid_stats
    }

    /// Population at which frames started missing their budget, if they have
    pub fn capacity_at_budget(&self) -> Option<usize> {
        lock(&self.shared).capacity_at_budget
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Particles as of the last completed frame
    pub fn particles_snapshot(&self) -> Arc<Vec<Particle>> {
        Arc::clone(&lock(&self.shared).snapshot)
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
        }
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
        }
    }

    /// Ask the frame thread to finish after the current frame
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if state.state != RunnerState::Error {
            state.state = RunnerState::Finished;
        }
    }

    /// Wait for the simulation thread to complete
    pub fn join(mut self) -> Result<(), String> {
        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| "Thread panicked".to_string())?;
        }
        match self.error_message() {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Set state to Finished to signal thread to exit
        if let Ok(mut state) = self.shared.lock() {
            if matches!(
                state.state,
                RunnerState::Created | RunnerState::Running | RunnerState::Paused
            ) {
                state.state = RunnerState::Finished;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Main frame loop executed in background thread
fn run_frame_loop(
    kernel: &mut dyn SimulationKernel,
    mut emitter: Emitter,
    shared: Arc<Mutex<SharedState>>,
    settings: RunnerSettings,
) {
    // Wait for start signal
    loop {
        let state = lock(&shared).state.clone();
        match state {
            RunnerState::Created => thread::sleep(Duration::from_millis(10)),
            RunnerState::Running => break,
            _ => return, // Exit if finished or error
        }
    }

    let dt = settings.frame_dt;
    let mut budget = settings
        .budget_strikes
        .map(|strikes| FrameBudget::new(Duration::from_secs_f32(dt), strikes));
    let start_wall_time = Instant::now();
    let mut sim_time = 0.0_f64;
    let mut frame_count = 0_u64;

    loop {
        let current_state = lock(&shared).state.clone();

        match current_state {
            RunnerState::Running => {
                emitter.emit(kernel);

                let frame_start = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| kernel.step(dt)));
                let frame_time = frame_start.elapsed();

                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    tracing::error!("Frame {} failed: {}", frame_count + 1, message);
                    let mut guard = lock(&shared);
                    guard.state = RunnerState::Error;
                    guard.error_message = Some(message);
                    break;
                }

                sim_time += dt as f64;
                frame_count += 1;

                let mut capacity = None;
                if let Some(budget) = budget.as_mut() {
                    if !emitter.is_halted() && budget.record(frame_time) {
                        capacity = Some(kernel.particle_count());
                        tracing::info!(
                            "Particles at {:.0} fps: {}",
                            1.0 / dt,
                            kernel.particle_count()
                        );
                        emitter.halt();
                    }
                }

                // Update shared state
                {
                    let snapshot = Arc::new(kernel.particles().to_vec());
                    let mut guard = lock(&shared);
                    guard.sim_time = sim_time;
                    guard.frame_count = frame_count;
                    guard.particle_count = kernel.particle_count();
                    guard.grid_stats = kernel.grid_stats();
                    guard.snapshot = snapshot;
                    if capacity.is_some() {
                        guard.capacity_at_budget = capacity;
                    }
                }

                // Check stopping conditions
                if let Some(max_frames) = settings.max_frames {
                    if frame_count >= max_frames {
                        tracing::info!("Simulation finished: reached max_frames = {}", max_frames);
                        let mut guard = lock(&shared);
                        if guard.state == RunnerState::Running {
                            guard.state = RunnerState::Finished;
                        }
                        break;
                    }
                }

                // Log progress periodically
                if frame_count % 100 == 0 {
                    tracing::debug!(
                        "Frame {}: sim_time={:.2}s, particles={}, frame={:.2}ms, wall_time={:.2}s",
                        frame_count,
                        sim_time,
                        kernel.particle_count(),
                        frame_time.as_secs_f64() * 1000.0,
                        start_wall_time.elapsed().as_secs_f64(),
                    );
                }
            }
            RunnerState::Paused => {
                // Wait while paused
                thread::sleep(Duration::from_millis(20));
            }
            RunnerState::Finished | RunnerState::Error | RunnerState::Created => {
                // Exit loop
                break;
            }
        }
    }

    tracing::info!(
        "Frame thread exiting: {} frames, {:.2}s simulated, {} particles",
        frame_count,
        sim_time,
        kernel.particle_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmitterConfig;
    use verlet_kernel::{KernelParams, RayonPool, SerialPool, VerletKernel};

    fn settings(max_frames: Option<u64>) -> RunnerSettings {
        RunnerSettings {
            frame_dt: 1.0 / 50.0,
            max_frames,
            budget_strikes: None,
        }
    }

    fn small_kernel() -> Box<dyn SimulationKernel + Send> {
        let params = KernelParams {
            world_size: [64, 64],
            ..KernelParams::default()
        };
        Box::new(VerletKernel::new(params, Arc::new(SerialPool::new(2))).unwrap())
    }

    fn small_emitter(max_particles: usize) -> Emitter {
        Emitter::new(&EmitterConfig {
            per_frame: 5,
            max_particles,
            ..EmitterConfig::default()
        })
    }

    #[test]
    fn test_runner_lifecycle() {
        let runner = SimulationRunner::new(small_kernel(), small_emitter(20), settings(Some(10)));

        // Initially Created
        assert_eq!(runner.state(), RunnerState::Created);
        assert_eq!(runner.frame_count(), 0);

        // Start
        runner.start();
        assert!(matches!(
            runner.state(),
            RunnerState::Running | RunnerState::Finished
        ));

        // Wait a bit for it to run
        thread::sleep(Duration::from_millis(100));
        assert!(runner.frame_count() <= 10);

        let shared = Arc::clone(&runner.shared);
        runner.join().unwrap();
        let guard = lock(&shared);
        assert_eq!(guard.state, RunnerState::Finished);
        assert_eq!(guard.frame_count, 10);
        // Emitter stops at its cap.
        assert_eq!(guard.particle_count, 20);
        assert_eq!(guard.snapshot.len(), 20);
        assert!((guard.sim_time - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_runner_pause_resume() {
        let runner = SimulationRunner::new(small_kernel(), small_emitter(50), settings(None));

        runner.start();
        thread::sleep(Duration::from_millis(30));

        // Pause
        runner.pause();

        // Wait for pause to take effect
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runner.state(), RunnerState::Paused);

        let frames_paused = runner.frame_count();
        thread::sleep(Duration::from_millis(100));

        // Should not advance while paused (allow for 1 frame race condition)
        let frames_after_pause = runner.frame_count();
        assert!(
            frames_after_pause <= frames_paused + 1,
            "Frames should not advance while paused: before={}, after={}",
            frames_paused,
            frames_after_pause
        );

        // Resume, then stop early
        runner.resume();
        assert_eq!(runner.state(), RunnerState::Running);
        thread::sleep(Duration::from_millis(20));
        runner.stop();
        runner.join().unwrap();
    }

    #[test]
    fn test_snapshot_tracks_frames() {
        let kernel = Box::new(
            VerletKernel::new(KernelParams::default(), Arc::new(RayonPool::new(2).unwrap()))
                .unwrap(),
        );
        let runner = SimulationRunner::new(kernel, small_emitter(5), settings(Some(3)));
        assert!(runner.particles_snapshot().is_empty());

        runner.start();
        let shared = Arc::clone(&runner.shared);
        runner.join().unwrap();

        let snapshot = Arc::clone(&lock(&shared).snapshot);
        assert_eq!(snapshot.len(), 5);
        // Emitted with +x velocity, so every particle moved right.
        assert!(snapshot.iter().all(|p| p.position.x > 2.0));
    }

    struct FailingKernel {
        particles: Vec<Particle>,
    }

    impl SimulationKernel for FailingKernel {
        fn step(&mut self, _dt: f32) {
            panic!("worker task failed");
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
            GridStats::default()
        }
    }

    #[test]
    fn test_panicking_frame_moves_to_error() {
        let kernel = Box::new(FailingKernel {
            particles: Vec::new(),
        });
        let runner = SimulationRunner::new(kernel, small_emitter(10), settings(None));
        runner.start();

        let shared = Arc::clone(&runner.shared);
        let err = runner.join().unwrap_err();
        assert!(err.contains("worker task failed"), "{err}");
        let guard = lock(&shared);
        assert_eq!(guard.state, RunnerState::Error);
        assert_eq!(guard.frame_count, 0);
    }

    #[test]
    fn test_frame_budget_needs_consecutive_strikes() {
        let mut budget = FrameBudget::new(Duration::from_millis(20), 3);
        let slow = Duration::from_millis(25);
        let fast = Duration::from_millis(5);
        assert!(!budget.record(slow));
        assert!(!budget.record(slow));
        assert!(!budget.record(fast));
        assert!(!budget.record(slow));
        assert!(!budget.record(slow));
        assert!(budget.record(slow));
    }

    #[test]
    fn test_missed_budget_halts_emitter() {
        // A one-microsecond frame budget is missed by every frame.
        let settings = RunnerSettings {
            frame_dt: 1e-6,
            max_frames: Some(6),
            budget_strikes: Some(2),
        };
        let runner = SimulationRunner::new(small_kernel(), small_emitter(1_000), settings);
        runner.start();

        let shared = Arc::clone(&runner.shared);
        runner.join().unwrap();
        let guard = lock(&shared);
        assert_eq!(guard.frame_count, 6);
        // Two frames of five particles, then nothing more.
        assert_eq!(guard.capacity_at_budget, Some(10));
        assert_eq!(guard.particle_count, 10);
    }
}
