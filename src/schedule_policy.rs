//! Pluggable strategies for dispatching tasks across workers.

use std::sync::atomic::{AtomicUsize, Ordering};

use scoped_threadpool::Pool;

use crate::platform;

/// Drives tasks pulled from a shared source through a worker function.
///
/// `run` blocks until `source` is drained and every worker has finished,
/// then reports the achieved parallelism: `min(pool size, tasks started)`,
/// so a run with no tasks reports zero. `ideal_tasks` is the requested
/// parallelism; 0 means auto. Error handling belongs to the worker
/// function: a task that fails must not unwind, so one failing task
/// never terminates its peers.
pub trait SchedulePolicy {
    fn run<T, S, W>(&self, ideal_tasks: usize, source: S, worker: W) -> usize
    where
        T: Send,
        S: Fn() -> Option<T> + Sync,
        W: Fn(T) + Sync;
}

/// Runs every task on the calling worker, in source order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sequential;

impl SchedulePolicy for Sequential {
    fn run<T, S, W>(&self, _ideal_tasks: usize, source: S, worker: W) -> usize
    where
        T: Send,
        S: Fn() -> Option<T> + Sync,
        W: Fn(T) + Sync,
    {
        let mut started = 0;
        while let Some(task) = source() {
            started += 1;
            worker(task);
        }
        started.min(1)
    }
}

/// Runs tasks on a bounded pool of OS threads sized at
/// `min(ideal_tasks, hardware cores)`; each worker loops pulling the next
/// task from the source. The pool joins all workers before returning.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuParallel;

impl SchedulePolicy for CpuParallel {
    fn run<T, S, W>(&self, ideal_tasks: usize, source: S, worker: W) -> usize
    where
        T: Send,
        S: Fn() -> Option<T> + Sync,
        W: Fn(T) + Sync,
    {
        let cores = platform::hardware_concurrency();
        let workers = if ideal_tasks == 0 {
            cores
        } else {
            ideal_tasks.min(cores)
        }
        .max(1);

        let started = AtomicUsize::new(0);
        let mut pool = Pool::new(workers as u32);
        pool.scoped(|scope| {
            for _ in 0..workers {
                let source = &source;
                let worker = &worker;
                let started = &started;
                scope.execute(move || {
                    while let Some(task) = source() {
                        started.fetch_add(1, Ordering::Relaxed);
                        worker(task);
                    }
                });
            }
        });
        workers.min(started.load(Ordering::Relaxed))
    }
}
