//! The task traits a mapreduce job is parameterized over, and the
//! default key partitioner.

use std::collections::hash_map::DefaultHasher;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::record_types::{MapEmitter, MultiRecord, ReduceEmitter};
use crate::datasource::Split;

/// Capabilities the engine needs of an intermediate key: ordering for the
/// shuffle, hashing for partition assignment, serde for disk spills.
pub trait MapKey: Ord + Hash + Clone + Send + Serialize + DeserializeOwned + 'static {}
impl<T: Ord + Hash + Clone + Send + Serialize + DeserializeOwned + 'static> MapKey for T {}

/// Capabilities the engine needs of an intermediate value.
pub trait MapValue: Send + Serialize + DeserializeOwned + 'static {}
impl<T: Send + Serialize + DeserializeOwned + 'static> MapValue for T {}

/// Capabilities of a final key: result files are text, written through
/// `Display` and parsed back through `FromStr`.
pub trait ReduceKey: Display + FromStr + Send + 'static {}
impl<T: Display + FromStr + Send + 'static> ReduceKey for T {}

/// Capabilities of a final value.
pub trait ReduceValue: Display + FromStr + Send + 'static {}
impl<T: Display + FromStr + Send + 'static> ReduceValue for T {}

/// Assigns a key to a partition: `hash(key) % partitions`. Deterministic
/// within a process run; every pair with the same key lands in the same
/// partition.
pub fn hash_partition<K: Hash>(key: &K, partitions: usize) -> usize {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    (h.finish() % partitions as u64) as usize
}

/// A user map function. Shared by reference across map workers.
///
/// The engine materializes each split as a contiguous read-only buffer and
/// calls `map` once per split. Returning `Err` marks the split as a failed
/// map key; the job counts it and continues.
pub trait MapTask: Send + Sync {
    type Key: MapKey;
    type Value: MapValue;

    fn map(
        &self,
        em: &mut MapEmitter<Self::Key, Self::Value>,
        split: &Split,
        data: &[u8],
    ) -> Result<()>;
}

/// A user reduce function over one key group. Shared by reference across
/// reduce workers. Returning `Err` marks the key as a failed reduce key;
/// the job counts it and continues.
pub trait ReduceTask<K: MapKey, V: MapValue>: Send + Sync {
    type OutputKey: ReduceKey;
    type OutputValue: ReduceValue;

    fn reduce(
        &self,
        em: &mut ReduceEmitter<Self::OutputKey, Self::OutputValue>,
        group: MultiRecord<K, V>,
    ) -> Result<()>;
}

/// A user combine function: collapses the values of one key group in
/// place on the map side. Must be associative and commutative with
/// respect to the reduce task; the engine may call it zero or more times
/// for any group.
pub trait Combiner<K, V>: Send + Sync {
    fn combine(&self, key: &K, values: &mut Vec<V>);
}

/// The identity combiner.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCombiner;

impl<K, V> Combiner<K, V> for NullCombiner {
    fn combine(&self, _key: &K, _values: &mut Vec<V>) {}
}
