//! The job driver: sequences the map, shuffle and reduce phases over a
//! schedule policy, contains user task failures, and surfaces systemic
//! ones.

use std::io;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::datasource::{DataSource, DirectorySource, Split};
use crate::error::{Error, Result};
use crate::formats::lines::{LineSink, LineSource};
use crate::intermediates::{InMemory, IntermediateStore};
use crate::mapreducer::{
    hash_partition, Combiner, MapTask, NullCombiner, ReduceKey, ReduceTask, ReduceValue,
};
use crate::parameters::Specification;
use crate::record_types::{MapEmitter, Record, ReduceEmitter};
use crate::results::{Counters, Results};
use crate::schedule_policy::SchedulePolicy;

/// Lifecycle of a job. `Failed` is reached only through systemic store or
/// I/O errors; user task failures leave the job running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Constructed,
    MapRunning,
    Shuffling,
    ReduceRunning,
    Done,
    Failed,
}

/// A mapreduce job over a map task, a reduce task, an optional combiner,
/// a data source and an intermediate store.
///
/// ```no_run
/// # use hostmr::*;
/// # fn main() -> hostmr::Result<()> {
/// # #[derive(Clone)] struct WcMap;
/// # impl MapTask for WcMap {
/// #     type Key = CaselessKey; type Value = u64;
/// #     fn map(&self, em: &mut MapEmitter<CaselessKey, u64>, _s: &Split, data: &[u8]) -> Result<()> {
/// #         for w in data.split(|b| b.is_ascii_whitespace()).filter(|w| !w.is_empty()) {
/// #             em.emit(CaselessKey::from_bytes(w), 1);
/// #         }
/// #         Ok(())
/// #     }
/// # }
/// # #[derive(Clone)] struct WcReduce;
/// # impl ReduceTask<CaselessKey, u64> for WcReduce {
/// #     type OutputKey = CaselessKey; type OutputValue = u64;
/// #     fn reduce(&self, em: &mut ReduceEmitter<CaselessKey, u64>, group: MultiRecord<CaselessKey, u64>) -> Result<()> {
/// #         let (key, values) = group.into_parts();
/// #         em.emit(key, values.iter().sum());
/// #         Ok(())
/// #     }
/// # }
/// let spec = Specification::new("data/in").set_concurrency(0, 2);
/// let source = DirectorySource::new(&spec)?;
/// let mut job: Job<WcMap, WcReduce> = Job::new(WcMap, WcReduce, NullCombiner, source, spec)?;
/// let mut results = Results::default();
/// job.run::<CpuParallel>(&mut results)?;
/// for pair in job.results_iter()? {
///     let pair = pair?;
///     println!("{}\t{}", pair.key, pair.value);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Job<
    M: MapTask,
    R,
    C = NullCombiner,
    D = DirectorySource,
    S = InMemory<<M as MapTask>::Key, <M as MapTask>::Value>,
> {
    map_task: M,
    reduce_task: R,
    combiner: C,
    datasource: D,
    store: S,
    spec: Specification,
    state: State,
}

#[derive(Default)]
struct PhaseCounters {
    map_keys_executed: AtomicUsize,
    map_key_errors: AtomicUsize,
    map_keys_completed: AtomicUsize,
    reduce_keys_executed: AtomicUsize,
    reduce_key_errors: AtomicUsize,
    reduce_keys_completed: AtomicUsize,
    result_files: AtomicUsize,
}

/// Holds the first fatal error; the task sources drain once it is set so
/// workers wind down without starting new tasks.
#[derive(Default)]
struct FatalCell(Mutex<Option<Error>>);

impl FatalCell {
    fn set(&self, e: Error) {
        let mut slot = self.0.lock().unwrap();
        if slot.is_none() {
            *slot = Some(e);
        } else {
            debug!("further fatal error after the first: {e}");
        }
    }

    fn is_set(&self) -> bool {
        self.0.lock().unwrap().is_some()
    }

    fn take(&self) -> Option<Error> {
        self.0.lock().unwrap().take()
    }
}

#[derive(Default)]
struct PhaseCtx {
    counters: PhaseCounters,
    fatal: FatalCell,
    map_times: Mutex<Vec<Duration>>,
    shuffle_times: Mutex<Vec<Duration>>,
    reduce_times: Mutex<Vec<Duration>>,
    actual_map_tasks: AtomicUsize,
    actual_reduce_tasks: AtomicUsize,
}

impl PhaseCtx {
    fn snapshot(self, results: &mut Results) {
        let c = self.counters;
        results.counters = Counters {
            actual_map_tasks: self.actual_map_tasks.into_inner(),
            actual_reduce_tasks: self.actual_reduce_tasks.into_inner(),
            map_keys_executed: c.map_keys_executed.into_inner(),
            map_key_errors: c.map_key_errors.into_inner(),
            map_keys_completed: c.map_keys_completed.into_inner(),
            reduce_keys_executed: c.reduce_keys_executed.into_inner(),
            reduce_key_errors: c.reduce_key_errors.into_inner(),
            reduce_keys_completed: c.reduce_keys_completed.into_inner(),
            num_result_files: c.result_files.into_inner(),
        };
        results.map_times = self.map_times.into_inner().unwrap();
        results.shuffle_times = self.shuffle_times.into_inner().unwrap();
        results.reduce_times = self.reduce_times.into_inner().unwrap();
    }
}

/// Hands out `0..n` once, draining early if a fatal error lands.
fn partition_source(n: usize, fatal: &FatalCell) -> impl Fn() -> Option<usize> + Sync + '_ {
    let next = AtomicUsize::new(0);
    move || {
        if fatal.is_set() {
            return None;
        }
        let i = next.fetch_add(1, Ordering::Relaxed);
        if i < n {
            Some(i)
        } else {
            None
        }
    }
}

fn result_file_path(spec: &Specification, partition: usize) -> PathBuf {
    PathBuf::from(format!("{}{}", spec.output_filespec, partition))
}

impl<M, R, C, D, S> Job<M, R, C, D, S>
where
    M: MapTask,
    R: ReduceTask<M::Key, M::Value>,
    C: Combiner<M::Key, M::Value>,
    D: DataSource,
    S: IntermediateStore<M::Key, M::Value>,
{
    /// Validates the specification and builds the intermediate store.
    pub fn new(
        map_task: M,
        reduce_task: R,
        combiner: C,
        datasource: D,
        spec: Specification,
    ) -> Result<Self> {
        spec.validate()?;
        let store = S::new(&spec)?;
        Ok(Job {
            map_task,
            reduce_task,
            combiner,
            datasource,
            store,
            spec,
            state: State::Constructed,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn specification(&self) -> &Specification {
        &self.spec
    }

    /// Runs the job to completion under a default-constructed policy.
    pub fn run<P: SchedulePolicy + Default>(&mut self, results: &mut Results) -> Result<()> {
        self.run_with(&P::default(), results)
    }

    /// Runs the job to completion. Counters and timings are stamped into
    /// `results` whether the job finishes or fails.
    pub fn run_with<P: SchedulePolicy>(
        &mut self,
        policy: &P,
        results: &mut Results,
    ) -> Result<()> {
        if self.state != State::Constructed {
            return Err(Error::InvalidState("job already ran"));
        }
        let ctx = PhaseCtx::default();
        let start = Instant::now();
        let outcome = self.run_phases(policy, &ctx, results);
        results.job_runtime = start.elapsed();
        ctx.snapshot(results);
        match outcome {
            Ok(()) => {
                self.state = State::Done;
                info!(
                    "job done: {} map keys, {} reduce keys, {} result files in {:?}",
                    results.counters.map_keys_executed,
                    results.counters.reduce_keys_executed,
                    results.counters.num_result_files,
                    results.job_runtime
                );
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                error!("job failed: {e}");
                Err(e)
            }
        }
    }

    fn run_phases<P: SchedulePolicy>(
        &mut self,
        policy: &P,
        ctx: &PhaseCtx,
        results: &mut Results,
    ) -> Result<()> {
        let partitions = self.store.partitions();
        let datasource = &self.datasource;
        let store = &self.store;
        let map_task = &self.map_task;
        let reduce_task = &self.reduce_task;
        let combiner = &self.combiner;
        let spec = &self.spec;
        let counters = &ctx.counters;
        let fatal = &ctx.fatal;

        // ------ map ------
        self.state = State::MapRunning;
        let phase_start = Instant::now();
        let split_source = || {
            if fatal.is_set() {
                None
            } else {
                datasource.next_split()
            }
        };
        let actual_map = policy.run(spec.map_tasks, split_source, |split: Split| {
            counters.map_keys_executed.fetch_add(1, Ordering::Relaxed);
            let key_start = Instant::now();
            match Self::map_one(map_task, datasource, &split) {
                Err(e) => {
                    warn!(
                        "map task failed on {} at offset {}: {}",
                        split.path.display(),
                        split.offset,
                        e
                    );
                    counters.map_key_errors.fetch_add(1, Ordering::Relaxed);
                }
                Ok(records) => {
                    let mut stored = true;
                    for rec in records {
                        let p = hash_partition(&rec.key, partitions);
                        if let Err(e) = store.insert(p, rec.key, rec.value, combiner) {
                            fatal.set(e);
                            stored = false;
                            break;
                        }
                    }
                    if stored {
                        counters.map_keys_completed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            ctx.map_times.lock().unwrap().push(key_start.elapsed());
        });
        ctx.actual_map_tasks.store(actual_map, Ordering::Relaxed);

        // finalize each partition with the combiner before the shuffle
        policy.run(spec.map_tasks, partition_source(partitions, fatal), |p| {
            if let Err(e) = store.combine(p, combiner) {
                fatal.set(e);
            }
        });
        results.map_runtime = phase_start.elapsed();
        if let Some(e) = fatal.take() {
            return Err(e);
        }
        debug!(
            "map phase done: {} splits in {:?}",
            counters.map_keys_executed.load(Ordering::Relaxed),
            results.map_runtime
        );

        // ------ shuffle ------
        self.state = State::Shuffling;
        let phase_start = Instant::now();
        policy.run(spec.reduce_tasks, partition_source(partitions, fatal), |p| {
            let key_start = Instant::now();
            if let Err(e) = store.shuffle(p) {
                fatal.set(e);
            }
            ctx.shuffle_times.lock().unwrap().push(key_start.elapsed());
        });
        results.shuffle_runtime = phase_start.elapsed();
        if let Some(e) = fatal.take() {
            return Err(e);
        }
        debug!("shuffle done in {:?}", results.shuffle_runtime);

        // ------ reduce ------
        self.state = State::ReduceRunning;
        let phase_start = Instant::now();
        let actual_reduce =
            policy.run(spec.reduce_tasks, partition_source(partitions, fatal), |p| {
                if let Err(e) =
                    Self::reduce_partition(reduce_task, store, spec, p, ctx)
                {
                    fatal.set(e);
                }
            });
        ctx.actual_reduce_tasks.store(actual_reduce, Ordering::Relaxed);
        results.reduce_runtime = phase_start.elapsed();
        if let Some(e) = fatal.take() {
            return Err(e);
        }
        debug!("reduce done in {:?}", results.reduce_runtime);
        Ok(())
    }

    fn map_one(
        map_task: &M,
        datasource: &D,
        split: &Split,
    ) -> Result<Vec<Record<M::Key, M::Value>>> {
        let data = datasource.read_split(split)?;
        let mut em = MapEmitter::new();
        map_task.map(&mut em, split, &data)?;
        Ok(em.into_records())
    }

    fn reduce_partition(
        reduce_task: &R,
        store: &S,
        spec: &Specification,
        partition: usize,
        ctx: &PhaseCtx,
    ) -> Result<()> {
        let counters = &ctx.counters;
        // The result file is created lazily so partitions (and jobs) that
        // emit nothing leave no file behind.
        let mut sink: Option<LineSink> = None;
        for group in store.iterate(partition)? {
            if ctx.fatal.is_set() {
                break;
            }
            let group = group?;
            counters.reduce_keys_executed.fetch_add(1, Ordering::Relaxed);
            let key_start = Instant::now();
            let mut em = ReduceEmitter::new();
            match reduce_task.reduce(&mut em, group) {
                Err(e) => {
                    warn!("reduce task failed in partition {partition}: {e}");
                    counters.reduce_key_errors.fetch_add(1, Ordering::Relaxed);
                }
                Ok(()) => {
                    for rec in em.into_records() {
                        if sink.is_none() {
                            let path = result_file_path(spec, partition);
                            sink = Some(LineSink::create(&path)?);
                            counters.result_files.fetch_add(1, Ordering::Relaxed);
                        }
                        if let Some(sink) = &mut sink {
                            sink.write_pair(&rec.key, &rec.value)?;
                        }
                    }
                    counters.reduce_keys_completed.fetch_add(1, Ordering::Relaxed);
                }
            }
            ctx.reduce_times.lock().unwrap().push(key_start.elapsed());
        }
        if let Some(sink) = &mut sink {
            sink.flush()?;
        }
        Ok(())
    }

    /// A fresh forward-only iterator over the result files, in partition
    /// order and per-partition key order. Only available once the job is
    /// done; call again to restart from the beginning.
    pub fn results_iter(&self) -> Result<ResultsIter<R::OutputKey, R::OutputValue>> {
        if self.state != State::Done {
            return Err(Error::InvalidState(
                "results are only available after a successful run",
            ));
        }
        Ok(ResultsIter {
            output_filespec: self.spec.output_filespec.clone(),
            partitions: self.spec.reduce_tasks,
            next_partition: 0,
            current: None,
            _marker: PhantomData,
        })
    }
}

/// Concatenates the result files partition by partition, parsing each
/// `key\tvalue` line back into typed pairs. Partitions that produced no
/// file are skipped.
pub struct ResultsIter<K, V> {
    output_filespec: String,
    partitions: usize,
    next_partition: usize,
    current: Option<LineSource>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: ReduceKey, V: ReduceValue> Iterator for ResultsIter<K, V> {
    type Item = Result<Record<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.current {
                Some(source) => match source.next() {
                    Some(Ok((k, v))) => {
                        let key = match k.parse::<K>() {
                            Ok(key) => key,
                            Err(_) => return Some(Err(Error::InvalidRecord(k))),
                        };
                        let value = match v.parse::<V>() {
                            Ok(value) => value,
                            Err(_) => return Some(Err(Error::InvalidRecord(v))),
                        };
                        return Some(Ok(Record { key, value }));
                    }
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => self.current = None,
                },
                None => {
                    if self.next_partition >= self.partitions {
                        return None;
                    }
                    let path = PathBuf::from(format!(
                        "{}{}",
                        self.output_filespec, self.next_partition
                    ));
                    self.next_partition += 1;
                    match LineSource::open(&path) {
                        Ok(source) => self.current = Some(source),
                        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                        Err(e) => return Some(Err(e.into())),
                    }
                }
            }
        }
    }
}
