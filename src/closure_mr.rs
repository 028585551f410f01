//! Fn-pointer adapters for the task traits, for jobs small enough that a
//! dedicated task type is not worth writing.

use crate::datasource::Split;
use crate::error::Result;
use crate::mapreducer::{MapKey, MapTask, MapValue, ReduceKey, ReduceTask, ReduceValue};
use crate::record_types::{MapEmitter, MultiRecord, ReduceEmitter};

/// Map function type adapted by [`ClosureMapTask`].
pub type MapperF<K, V> = fn(&mut MapEmitter<K, V>, &Split, &[u8]) -> Result<()>;
/// Reduce function type adapted by [`ClosureReduceTask`].
pub type ReducerF<K, V, OK, OV> = fn(&mut ReduceEmitter<OK, OV>, MultiRecord<K, V>) -> Result<()>;

/// Wraps a plain function as a [`MapTask`].
pub struct ClosureMapTask<K, V> {
    mapper: MapperF<K, V>,
}

impl<K, V> Clone for ClosureMapTask<K, V> {
    fn clone(&self) -> ClosureMapTask<K, V> {
        ClosureMapTask {
            mapper: self.mapper,
        }
    }
}

impl<K, V> ClosureMapTask<K, V> {
    pub fn new(mapper: MapperF<K, V>) -> ClosureMapTask<K, V> {
        ClosureMapTask { mapper }
    }
}

impl<K: MapKey, V: MapValue> MapTask for ClosureMapTask<K, V> {
    type Key = K;
    type Value = V;

    fn map(&self, em: &mut MapEmitter<K, V>, split: &Split, data: &[u8]) -> Result<()> {
        (self.mapper)(em, split, data)
    }
}

/// Wraps a plain function as a [`ReduceTask`].
pub struct ClosureReduceTask<K, V, OK, OV> {
    reducer: ReducerF<K, V, OK, OV>,
}

impl<K, V, OK, OV> Clone for ClosureReduceTask<K, V, OK, OV> {
    fn clone(&self) -> ClosureReduceTask<K, V, OK, OV> {
        ClosureReduceTask {
            reducer: self.reducer,
        }
    }
}

impl<K, V, OK, OV> ClosureReduceTask<K, V, OK, OV> {
    pub fn new(reducer: ReducerF<K, V, OK, OV>) -> ClosureReduceTask<K, V, OK, OV> {
        ClosureReduceTask { reducer }
    }
}

impl<K, V, OK, OV> ReduceTask<K, V> for ClosureReduceTask<K, V, OK, OV>
where
    K: MapKey,
    V: MapValue,
    OK: ReduceKey,
    OV: ReduceValue,
{
    type OutputKey = OK;
    type OutputValue = OV;

    fn reduce(&self, em: &mut ReduceEmitter<OK, OV>, group: MultiRecord<K, V>) -> Result<()> {
        (self.reducer)(em, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_words(em: &mut MapEmitter<String, u64>, _split: &Split, data: &[u8]) -> Result<()> {
        for word in String::from_utf8_lossy(data).split_whitespace() {
            em.emit(word.to_string(), 1);
        }
        Ok(())
    }

    fn sum_counts(
        em: &mut ReduceEmitter<String, u64>,
        group: MultiRecord<String, u64>,
    ) -> Result<()> {
        let (key, values) = group.into_parts();
        em.emit(key, values.iter().sum());
        Ok(())
    }

    #[test]
    fn adapters_forward_to_the_functions() {
        let split = Split {
            path: "in.txt".into(),
            offset: 0,
            length: 5,
        };

        let map_task = ClosureMapTask::new(count_words);
        let mut em = MapEmitter::new();
        map_task.map(&mut em, &split, b"a b a").unwrap();
        assert_eq!(em.into_records().len(), 3);

        let reduce_task: ClosureReduceTask<String, u64, String, u64> =
            ClosureReduceTask::new(sum_counts);
        let mut em = ReduceEmitter::new();
        reduce_task
            .reduce(&mut em, MultiRecord::new("a".to_string(), vec![1, 1]))
            .unwrap();
        let records = em.into_records();
        assert_eq!(records[0].key, "a");
        assert_eq!(records[0].value, 2);
    }
}

