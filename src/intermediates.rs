//! Intermediate key/value stores connecting the map and reduce phases.
//!
//! Both variants present the same contract: pairs are inserted per
//! partition during the map phase, each partition is finalized with the
//! user combiner, shuffled into a single sorted stream, and iterated as
//! key groups in ascending order. `InMemory` holds everything in ordered
//! maps; `LocalDisk` spills to length-prefixed record files and sorts
//! them externally.

use std::collections::BTreeMap;
use std::fs;
use std::io::BufReader;
use std::iter;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{debug, warn};
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::formats::writelog::{RecordReader, RecordWriter};
use crate::mapreducer::{Combiner, MapKey, MapValue};
use crate::mergesort;
use crate::parameters::Specification;
use crate::platform;
use crate::record_types::MultiRecord;

/// Grouped, key-ascending iteration over one partition.
pub type GroupIter<K, V> = Box<dyn Iterator<Item = Result<MultiRecord<K, V>>> + Send>;

/// The partitioned buffer between map and reduce.
///
/// Partition indices run in `[0, partitions())`. `insert` is safe to call
/// concurrently; `combine`, `shuffle` and `iterate` are driven once per
/// partition, after all inserts, in that order. `iterate` consumes the
/// partition's data.
pub trait IntermediateStore<K: MapKey, V: MapValue>: Send + Sync {
    fn new(spec: &Specification) -> Result<Self>
    where
        Self: Sized;

    fn partitions(&self) -> usize;

    /// Appends one pair. The store may run `combiner` over the partition's
    /// buffered groups when it crosses its flush threshold.
    fn insert(&self, partition: usize, key: K, value: V, combiner: &dyn Combiner<K, V>)
        -> Result<()>;

    /// Finalizes a partition: group by key, run the combiner over each
    /// group, and (for spilling stores) sort the spilled data into runs.
    fn combine(&self, partition: usize, combiner: &dyn Combiner<K, V>) -> Result<()>;

    /// Coalesces a finalized partition into a single sorted stream.
    fn shuffle(&self, partition: usize) -> Result<()>;

    /// Iterates the partition's key groups in ascending order.
    fn iterate(&self, partition: usize) -> Result<GroupIter<K, V>>;
}

struct MemoryPartition<K, V> {
    groups: BTreeMap<K, Vec<V>>,
    // values inserted since the last combiner sweep
    pending: usize,
}

/// Keeps every partition in an ordered map in memory.
pub struct InMemory<K: MapKey, V: MapValue> {
    parts: Vec<Mutex<MemoryPartition<K, V>>>,
    combine_threshold: usize,
}

impl<K: MapKey, V: MapValue> InMemory<K, V> {
    fn sweep(part: &mut MemoryPartition<K, V>, combiner: &dyn Combiner<K, V>) {
        for (key, values) in part.groups.iter_mut() {
            combiner.combine(key, values);
        }
        part.pending = 0;
    }
}

impl<K: MapKey, V: MapValue> IntermediateStore<K, V> for InMemory<K, V> {
    fn new(spec: &Specification) -> Result<Self> {
        let parts = (0..spec.reduce_tasks)
            .map(|_| {
                Mutex::new(MemoryPartition {
                    groups: BTreeMap::new(),
                    pending: 0,
                })
            })
            .collect();
        Ok(InMemory {
            parts,
            combine_threshold: spec.combine_threshold,
        })
    }

    fn partitions(&self) -> usize {
        self.parts.len()
    }

    fn insert(
        &self,
        partition: usize,
        key: K,
        value: V,
        combiner: &dyn Combiner<K, V>,
    ) -> Result<()> {
        let mut part = self.parts[partition].lock().unwrap();
        part.groups.entry(key).or_default().push(value);
        part.pending += 1;
        if self.combine_threshold > 0 && part.pending >= self.combine_threshold {
            InMemory::sweep(&mut part, combiner);
        }
        Ok(())
    }

    fn combine(&self, partition: usize, combiner: &dyn Combiner<K, V>) -> Result<()> {
        let mut part = self.parts[partition].lock().unwrap();
        InMemory::sweep(&mut part, combiner);
        Ok(())
    }

    fn shuffle(&self, _partition: usize) -> Result<()> {
        // ordered maps are already sorted and coalesced
        Ok(())
    }

    fn iterate(&self, partition: usize) -> Result<GroupIter<K, V>> {
        let groups = std::mem::take(&mut self.parts[partition].lock().unwrap().groups);
        Ok(Box::new(
            groups
                .into_iter()
                .map(|(key, values)| Ok(MultiRecord::new(key, values))),
        ))
    }
}

struct DiskPartition {
    spill_path: PathBuf,
    writer: Option<RecordWriter<std::io::BufWriter<fs::File>>>,
    runs: Vec<PathBuf>,
    sorted_path: Option<PathBuf>,
}

/// Spills each partition to an append-only file of length-prefixed
/// bincode records under a scratch directory; `combine` externally sorts
/// the spill into combiner-collapsed runs and `shuffle` merges them.
pub struct LocalDisk<K: MapKey, V: MapValue> {
    parts: Vec<Mutex<DiskPartition>>,
    scratch: Option<TempDir>,
    sort_run_size: usize,
    keep_temporaries: bool,
    failed: AtomicBool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: MapKey, V: MapValue> LocalDisk<K, V> {
    fn scratch_path(&self) -> &std::path::Path {
        // scratch is Some until drop
        self.scratch.as_ref().unwrap().path()
    }

    fn fatal<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.failed.store(true, Ordering::Relaxed);
        }
        result
    }
}

impl<K: MapKey, V: MapValue> IntermediateStore<K, V> for LocalDisk<K, V> {
    fn new(spec: &Specification) -> Result<Self> {
        let scratch = platform::scratch_dir()?;
        debug!("disk store scratch at {}", scratch.path().display());
        let parts = (0..spec.reduce_tasks)
            .map(|p| {
                Mutex::new(DiskPartition {
                    spill_path: scratch.path().join(format!("part{p}.spill")),
                    writer: None,
                    runs: Vec::new(),
                    sorted_path: None,
                })
            })
            .collect();
        Ok(LocalDisk {
            parts,
            scratch: Some(scratch),
            sort_run_size: spec.sort_run_size,
            keep_temporaries: spec.keep_temporaries,
            failed: AtomicBool::new(false),
            _marker: PhantomData,
        })
    }

    fn partitions(&self) -> usize {
        self.parts.len()
    }

    fn insert(
        &self,
        partition: usize,
        key: K,
        value: V,
        _combiner: &dyn Combiner<K, V>,
    ) -> Result<()> {
        // The spill is append-only; the combiner runs during run
        // generation instead of at insert time.
        let mut part = self.parts[partition].lock().unwrap();
        if part.writer.is_none() {
            let writer = self.fatal(RecordWriter::create(&part.spill_path).map_err(Error::from))?;
            part.writer = Some(writer);
        }
        let record = self.fatal(bincode::serialize(&(&key, &value)).map_err(Error::from))?;
        let write = part
            .writer
            .as_mut()
            .unwrap()
            .write_record(&record)
            .map_err(Error::from);
        self.fatal(write)
    }

    fn combine(&self, partition: usize, combiner: &dyn Combiner<K, V>) -> Result<()> {
        let mut part = self.parts[partition].lock().unwrap();
        let mut writer = match part.writer.take() {
            None => return Ok(()), // nothing was spilled
            Some(w) => w,
        };
        self.fatal(writer.flush().map_err(Error::from))?;
        drop(writer);

        let runs = self.fatal(mergesort::generate_runs::<K, V, _>(
            &part.spill_path,
            self.scratch_path(),
            partition,
            self.sort_run_size,
            |key, values| combiner.combine(key, values),
        ))?;
        self.fatal(fs::remove_file(&part.spill_path).map_err(Error::from))?;
        part.runs = runs;
        Ok(())
    }

    fn shuffle(&self, partition: usize) -> Result<()> {
        let mut part = self.parts[partition].lock().unwrap();
        if part.runs.is_empty() {
            return Ok(());
        }
        let sorted = self.scratch_path().join(format!("part{partition}.sorted"));
        let runs = std::mem::take(&mut part.runs);
        self.fatal(mergesort::merge_runs::<K, V>(&runs, &sorted))?;
        part.sorted_path = Some(sorted);
        Ok(())
    }

    fn iterate(&self, partition: usize) -> Result<GroupIter<K, V>> {
        let sorted = self.parts[partition].lock().unwrap().sorted_path.take();
        match sorted {
            None => Ok(Box::new(iter::empty())),
            Some(path) => {
                let reader = self.fatal(RecordReader::open(&path).map_err(Error::from))?;
                Ok(Box::new(DiskGroupIter::<K, V> {
                    reader,
                    peeked: None,
                    done: false,
                }))
            }
        }
    }
}

impl<K: MapKey, V: MapValue> Drop for LocalDisk<K, V> {
    fn drop(&mut self) {
        if self.keep_temporaries && self.failed.load(Ordering::Relaxed) {
            if let Some(scratch) = self.scratch.take() {
                let path = scratch.keep();
                warn!("retaining intermediate files at {}", path.display());
            }
        }
    }
}

/// Streams a sorted record file as key groups by coalescing adjacent
/// records with equal keys.
struct DiskGroupIter<K, V> {
    reader: RecordReader<BufReader<fs::File>>,
    peeked: Option<(K, V)>,
    done: bool,
}

impl<K: MapKey, V: MapValue> DiskGroupIter<K, V> {
    fn read_pair(&mut self) -> Result<Option<(K, V)>> {
        match self.reader.read_record()? {
            None => Ok(None),
            Some(buf) => Ok(Some(bincode::deserialize(&buf)?)),
        }
    }
}

impl<K: MapKey, V: MapValue> Iterator for DiskGroupIter<K, V> {
    type Item = Result<MultiRecord<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let (key, first) = match self.peeked.take() {
            Some(pair) => pair,
            None => match self.read_pair() {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Ok(Some(pair)) => pair,
            },
        };
        let mut values = vec![first];
        loop {
            match self.read_pair() {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Ok(Some((next_key, value))) => {
                    if next_key == key {
                        values.push(value);
                    } else {
                        self.peeked = Some((next_key, value));
                        break;
                    }
                }
            }
        }
        Some(Ok(MultiRecord::new(key, values)))
    }
}
