//! External merge-sort over length-prefixed record files: run generation
//! in bounded memory, then a k-way heap merge.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Result;
use crate::formats::writelog::{RecordReader, RecordWriter};
use crate::mapreducer::{MapKey, MapValue};

fn read_pair<K: MapKey, V: MapValue, R: Read>(
    reader: &mut RecordReader<R>,
) -> Result<Option<(K, V)>> {
    match reader.read_record()? {
        None => Ok(None),
        Some(buf) => Ok(Some(bincode::deserialize(&buf)?)),
    }
}

fn write_pair<K: MapKey, V: MapValue, W: std::io::Write>(
    writer: &mut RecordWriter<W>,
    key: &K,
    value: &V,
) -> Result<()> {
    writer.write_record(&bincode::serialize(&(key, value))?)?;
    Ok(())
}

/// Sorts `input` into run files of at most `run_size` records each,
/// written under `dir` and named with `tag`. Within a run, records are
/// stable-sorted by key, adjacent equal keys are grouped and handed to
/// `rewrite_group` (the combiner hook) before being written back out.
/// Returns the run paths in input-read order.
pub fn generate_runs<K, V, F>(
    input: &Path,
    dir: &Path,
    tag: usize,
    run_size: usize,
    mut rewrite_group: F,
) -> Result<Vec<PathBuf>>
where
    K: MapKey,
    V: MapValue,
    F: FnMut(&K, &mut Vec<V>),
{
    let run_size = run_size.max(1);
    let mut reader = RecordReader::open(input)?;
    let mut runs = Vec::new();
    loop {
        let mut records: Vec<(K, V)> = Vec::new();
        while records.len() < run_size {
            match read_pair(&mut reader)? {
                None => break,
                Some(pair) => records.push(pair),
            }
        }
        if records.is_empty() {
            break;
        }
        let exhausted = records.len() < run_size;
        records.sort_by(|a, b| a.0.cmp(&b.0));

        let path = dir.join(format!("part{}-run{}.wlg", tag, runs.len()));
        let mut writer = RecordWriter::create(&path)?;
        let mut current: Option<(K, Vec<V>)> = None;
        for (key, value) in records {
            match &mut current {
                Some((k, values)) if *k == key => values.push(value),
                _ => {
                    if let Some((k, mut values)) = current.take() {
                        rewrite_group(&k, &mut values);
                        for v in &values {
                            write_pair(&mut writer, &k, v)?;
                        }
                    }
                    current = Some((key, vec![value]));
                }
            }
        }
        if let Some((k, mut values)) = current.take() {
            rewrite_group(&k, &mut values);
            for v in &values {
                write_pair(&mut writer, &k, v)?;
            }
        }
        writer.flush()?;
        runs.push(path);

        if exhausted {
            break;
        }
    }
    debug!("generated {} runs from {}", runs.len(), input.display());
    Ok(runs)
}

/// An entry of the merge heap; ordered by (key, run index) only, so equal
/// keys drain in run-generation order and the merge stays stable.
struct HeapEntry<K, V> {
    key: K,
    value: V,
    run: usize,
}

impl<K: Ord, V> PartialEq for HeapEntry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.run == other.run
    }
}

impl<K: Ord, V> Eq for HeapEntry<K, V> {}

impl<K: Ord, V> PartialOrd for HeapEntry<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for HeapEntry<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.run.cmp(&other.run))
    }
}

/// K-way merges sorted run files into `output`. Run files are deleted on
/// success. Returns the number of records written.
pub fn merge_runs<K, V>(runs: &[PathBuf], output: &Path) -> Result<u64>
where
    K: MapKey,
    V: MapValue,
{
    debug!("merging {} runs into {}", runs.len(), output.display());
    let mut readers: Vec<RecordReader<BufReader<fs::File>>> = Vec::with_capacity(runs.len());
    for run in runs {
        readers.push(RecordReader::open(run)?);
    }

    let mut heap: BinaryHeap<Reverse<HeapEntry<K, V>>> = BinaryHeap::with_capacity(readers.len());
    for (run, reader) in readers.iter_mut().enumerate() {
        if let Some((key, value)) = read_pair(reader)? {
            heap.push(Reverse(HeapEntry { key, value, run }));
        }
    }

    let mut writer = RecordWriter::create(output)?;
    while let Some(Reverse(entry)) = heap.pop() {
        write_pair(&mut writer, &entry.key, &entry.value)?;
        if let Some((key, value)) = read_pair(&mut readers[entry.run])? {
            heap.push(Reverse(HeapEntry {
                key,
                value,
                run: entry.run,
            }));
        }
    }
    writer.flush()?;
    let written = writer.records_written();
    drop(readers);
    for run in runs {
        fs::remove_file(run)?;
    }
    Ok(written)
}
