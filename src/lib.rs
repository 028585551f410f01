//! An in-process mapreduce engine: runs a user-supplied pair of map and
//! reduce functions (plus an optional combiner) over a file-backed input
//! corpus on a bounded worker pool, and writes partitioned result files.
//!
//! Everything happens on one host. Input files are enumerated once and
//! cut into record-aligned splits; map workers emit intermediate pairs
//! into a partitioned store (in memory or spilled to disk and externally
//! sorted); after the shuffle barrier, reduce workers fold each
//! partition's key groups into a result file. The job is generic over
//! six roles: [`MapTask`], [`ReduceTask`], [`Combiner`], [`DataSource`],
//! [`IntermediateStore`] and [`SchedulePolicy`].

pub mod closure_mr;
pub mod datasource;
pub mod error;
pub mod formats;
pub mod intermediates;
pub mod job;
pub mod mapreducer;
pub mod mergesort;
pub mod parameters;
pub mod platform;
pub mod record_types;
pub mod results;
pub mod schedule_policy;
pub mod sort;

pub use crate::closure_mr::{ClosureMapTask, ClosureReduceTask};
pub use crate::datasource::{DataSource, DirectorySource, Split};
pub use crate::error::{Error, Result};
pub use crate::intermediates::{InMemory, IntermediateStore, LocalDisk};
pub use crate::job::{Job, ResultsIter, State};
pub use crate::mapreducer::{
    hash_partition, Combiner, MapKey, MapTask, MapValue, NullCombiner, ReduceKey, ReduceTask,
    ReduceValue,
};
pub use crate::parameters::Specification;
pub use crate::record_types::{MapEmitter, MultiRecord, Record, ReduceEmitter};
pub use crate::results::{Counters, Results, TimeStats};
pub use crate::schedule_policy::{CpuParallel, SchedulePolicy, Sequential};
pub use crate::sort::CaselessKey;

/// Builds a [`DirectorySource`] and a [`Job`] with the default combiner
/// and store for `spec`, runs it on the CPU-parallel policy, and returns
/// the finished job for result iteration.
pub fn run<M, R>(
    map_task: M,
    reduce_task: R,
    spec: Specification,
    results: &mut Results,
) -> Result<Job<M, R>>
where
    M: MapTask,
    R: ReduceTask<M::Key, M::Value>,
{
    let datasource = DirectorySource::new(&spec)?;
    let mut job = Job::new(map_task, reduce_task, NullCombiner, datasource, spec)?;
    job.run::<CpuParallel>(results)?;
    Ok(job)
}
