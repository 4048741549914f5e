//! Task-dispatch capability injected into the kernel.
//!
//! The kernel never spawns threads itself. It hands batches of independent
//! tasks to a [`TaskPool`] and blocks until the whole batch has finished,
//! which is the barrier between solver phases.

use crate::KernelError;

/// A unit of work borrowed for the duration of one batch.
pub type Task<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Fixed set of workers that runs batches of independent tasks.
pub trait TaskPool: Send + Sync {
    /// Number of workers; the solver sizes its partitions from this.
    fn worker_count(&self) -> usize;

    /// Submit every task and block until all of them have completed.
    ///
    /// Tasks have no ordering guarantee relative to each other. A panic in
    /// any task is re-raised on the calling thread once the batch is done.
    fn run_batch<'a>(&self, tasks: Vec<Task<'a>>);
}

/// Worker pool backed by a dedicated rayon thread pool.
pub struct RayonPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl RayonPool {
    /// Build a pool of `workers` named threads.
    pub fn new(workers: usize) -> Result<Self, KernelError> {
        if workers == 0 {
            return Err(KernelError::NoWorkers);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("verlet-worker-{i}"))
            .build()?;
        tracing::info!("Worker pool started with {} threads", workers);
        Ok(Self { pool, workers })
    }
}

impl TaskPool for RayonPool {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn run_batch<'a>(&self, tasks: Vec<Task<'a>>) {
        self.pool.scope(|scope| {
            for task in tasks {
                scope.spawn(move |_| task());
            }
        });
    }
}

/// Runs every task inline, in submission order, on the calling thread.
///
/// Reports `workers` so the solver partitions exactly as it would for a real
/// pool of that size; useful for checking that results do not depend on
/// scheduling.
#[derive(Debug, Clone, Copy)]
pub struct SerialPool {
    workers: usize,
}

impl SerialPool {
    /// Serial stand-in for a pool of `workers` threads.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl TaskPool for SerialPool {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn run_batch<'a>(&self, tasks: Vec<Task<'a>>) {
        for task in tasks {
            task();
        }
    }
}

/// Split `[0, len)` into `parts` contiguous ranges; the last absorbs the
/// remainder.
pub fn split_range(len: usize, parts: usize) -> Vec<(usize, usize)> {
    let parts = parts.max(1).min(len.max(1));
    let chunk = len / parts;
    (0..parts)
        .map(|i| {
            let start = i * chunk;
            let end = if i + 1 == parts { len } else { start + chunk };
            (start, end)
        })
        .collect()
}

/// Run `f(start, &mut data[start..end])` once per worker over disjoint
/// contiguous ranges covering `data`, returning after all ranges are done.
pub fn parallel_for<T, F>(pool: &dyn TaskPool, data: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    let len = data.len();
    if len == 0 {
        return;
    }
    let f = &f;
    let mut rest = data;
    let mut tasks: Vec<Task<'_>> = Vec::with_capacity(pool.worker_count());
    for (start, end) in split_range(len, pool.worker_count()) {
        let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(end - start);
        rest = tail;
        tasks.push(Box::new(move || f(start, chunk)));
    }
    pool.run_batch(tasks);
}
