//! End-to-end word count scenarios exercising the whole engine: splits,
//! both intermediate stores, the combiner, partitioning, counters and the
//! results iterator.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use hostmr::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy)]
struct WordCountMap;

impl MapTask for WordCountMap {
    type Key = CaselessKey;
    type Value = u64;

    fn map(&self, em: &mut MapEmitter<CaselessKey, u64>, _split: &Split, data: &[u8]) -> Result<()> {
        for word in data
            .split(|b| !b.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            em.emit(CaselessKey::from_bytes(word), 1);
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct WordCountReduce;

impl ReduceTask<CaselessKey, u64> for WordCountReduce {
    type OutputKey = CaselessKey;
    type OutputValue = u64;

    fn reduce(
        &self,
        em: &mut ReduceEmitter<CaselessKey, u64>,
        group: MultiRecord<CaselessKey, u64>,
    ) -> Result<()> {
        let (key, values) = group.into_parts();
        em.emit(key, values.iter().sum());
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct SumCombiner;

impl Combiner<CaselessKey, u64> for SumCombiner {
    fn combine(&self, _key: &CaselessKey, values: &mut Vec<u64>) {
        let total = values.iter().sum();
        values.clear();
        values.push(total);
    }
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::File::create(&path)
        .unwrap()
        .write_all(contents.as_bytes())
        .unwrap();
    path
}

fn filespec(out: &TempDir) -> String {
    format!("{}/wc_", out.path().display())
}

fn collect_totals(job_pairs: impl Iterator<Item = Result<Record<CaselessKey, u64>>>) -> HashMap<String, u64> {
    let mut totals = HashMap::new();
    for pair in job_pairs {
        let pair = pair.unwrap();
        *totals.entry(pair.key.to_string()).or_insert(0) += pair.value;
    }
    totals
}

fn expected_totals(text: &str) -> HashMap<String, u64> {
    let mut totals = HashMap::new();
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        *totals.entry(word.to_ascii_lowercase()).or_insert(0) += 1;
    }
    totals
}

#[test]
fn single_file_single_partition() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_file(input.path(), "fox.txt", "the quick brown fox\nthe lazy dog\n");

    let spec = Specification::new(input.path())
        .set_concurrency(1, 1)
        .set_output_filespec(filespec(&output));
    let mut results = Results::default();
    let job = run(WordCountMap, WordCountReduce, spec, &mut results).unwrap();

    assert_eq!(job.state(), State::Done);
    assert_eq!(results.counters.map_keys_executed, 1);
    assert_eq!(results.counters.map_keys_completed, 1);
    assert_eq!(results.counters.map_key_errors, 0);
    assert_eq!(results.counters.reduce_keys_executed, 6);
    assert_eq!(results.counters.num_result_files, 1);
    assert_eq!(results.counters.actual_map_tasks, 1);
    assert_eq!(results.map_times.len(), 1);
    assert_eq!(results.reduce_times.len(), 6);

    // a single partition yields one globally sorted result file
    let pairs: Vec<(String, u64)> = job
        .results_iter()
        .unwrap()
        .map(|p| {
            let p = p.unwrap();
            (p.key.to_string(), p.value)
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("brown".to_string(), 1),
            ("dog".to_string(), 1),
            ("fox".to_string(), 1),
            ("lazy".to_string(), 1),
            ("quick".to_string(), 1),
            ("the".to_string(), 2)
        ]
    );

    // the iterator restarts from the beginning
    assert_eq!(job.results_iter().unwrap().count(), 6);
}

#[test]
fn case_insensitive_totals_across_two_partitions() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_file(input.path(), "one.txt", "a a b");
    write_file(input.path(), "two.txt", "B c");

    let spec = Specification::new(input.path())
        .set_concurrency(2, 2)
        .set_output_filespec(filespec(&output));
    let mut results = Results::default();
    let job = run(WordCountMap, WordCountReduce, spec, &mut results).unwrap();

    let totals = collect_totals(job.results_iter().unwrap());
    let expected: HashMap<String, u64> =
        [("a".to_string(), 2), ("b".to_string(), 2), ("c".to_string(), 1)]
            .into_iter()
            .collect();
    assert_eq!(totals, expected);

    // every key sits in the partition its hash assigns
    for partition in 0..2 {
        let path = PathBuf::from(format!("{}{}", job.specification().output_filespec, partition));
        if !path.exists() {
            continue;
        }
        for line in fs::read_to_string(&path).unwrap().lines() {
            let key = line.split('\t').next().unwrap();
            assert_eq!(hash_partition(&CaselessKey::from(key), 2), partition);
        }
    }
}

#[test]
fn multi_split_disk_store_job() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    const VOCAB: &[&str] = &[
        "alpha", "Beta", "gamma", "DELTA", "epsilon", "zeta", "Eta", "theta",
    ];
    let mut rng = StdRng::seed_from_u64(42);
    let mut text = String::new();
    while text.len() < 3 * 1024 * 1024 {
        for _ in 0..10 {
            text.push_str(VOCAB[rng.gen_range(0..VOCAB.len())]);
            text.push(' ');
        }
        text.push('\n');
    }
    write_file(input.path(), "big.txt", &text);

    let spec = Specification::new(input.path())
        .set_concurrency(0, 2)
        .set_max_file_segment_size(256 * 1024)
        .set_sort_run_size(10_000)
        .set_output_filespec(filespec(&output));
    let datasource = DirectorySource::new(&spec).unwrap();
    let mut job: Job<WordCountMap, WordCountReduce, NullCombiner, DirectorySource, LocalDisk<CaselessKey, u64>> =
        Job::new(WordCountMap, WordCountReduce, NullCombiner, datasource, spec).unwrap();
    let mut results = Results::default();
    job.run::<CpuParallel>(&mut results).unwrap();

    assert!(results.counters.map_keys_executed >= 10);
    assert_eq!(
        results.counters.map_keys_executed,
        results.counters.map_keys_completed + results.counters.map_key_errors
    );
    assert_eq!(results.counters.map_key_errors, 0);

    assert_eq!(collect_totals(job.results_iter().unwrap()), expected_totals(&text));

    // keys ascend within each partition's result file
    for partition in 0..2 {
        let path = PathBuf::from(format!("{}{}", job.specification().output_filespec, partition));
        let contents = fs::read_to_string(&path).unwrap();
        let keys: Vec<CaselessKey> = contents
            .lines()
            .map(|l| CaselessKey::from(l.split('\t').next().unwrap()))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn final_record_without_newline_is_counted() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_file(input.path(), "f.txt", "one two\nthree");

    let spec = Specification::new(input.path()).set_output_filespec(filespec(&output));
    let mut results = Results::default();
    let job = run(WordCountMap, WordCountReduce, spec, &mut results).unwrap();

    let totals = collect_totals(job.results_iter().unwrap());
    assert_eq!(totals.get("three"), Some(&1));
}

#[test]
fn shrunken_file_counts_a_map_error_but_the_job_succeeds() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_file(input.path(), "good.txt", "safe words here\n");
    let victim = write_file(input.path(), "bad.txt", "doomed words in this file\n");

    let spec = Specification::new(input.path())
        .set_concurrency(1, 1)
        .set_output_filespec(filespec(&output));
    let datasource = DirectorySource::new(&spec).unwrap();
    // shrink after enumeration so the split outlives its bytes
    fs::File::create(&victim).unwrap().write_all(b"d\n").unwrap();

    let mut job: Job<WordCountMap, WordCountReduce> =
        Job::new(WordCountMap, WordCountReduce, NullCombiner, datasource, spec).unwrap();
    let mut results = Results::default();
    job.run::<CpuParallel>(&mut results).unwrap();

    assert_eq!(job.state(), State::Done);
    assert!(results.counters.map_key_errors >= 1);
    assert!(results.counters.map_keys_completed >= 1);
    assert_eq!(
        results.counters.map_keys_executed,
        results.counters.map_keys_completed + results.counters.map_key_errors
    );

    let totals = collect_totals(job.results_iter().unwrap());
    assert_eq!(totals.get("safe"), Some(&1));
    assert_eq!(totals.get("doomed"), None);
}

#[test]
fn combiner_and_null_combiner_agree() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    write_file(
        input.path(),
        "f.txt",
        "to be or not to be that is the question\nwhether tis nobler to suffer\n",
    );

    let mut outputs = Vec::new();
    for combined in [false, true] {
        let output = tempfile::tempdir().unwrap();
        let spec = Specification::new(input.path())
            .set_concurrency(2, 2)
            .set_combine_threshold(4)
            .set_sort_run_size(8)
            .set_output_filespec(filespec(&output));
        let datasource = DirectorySource::new(&spec).unwrap();
        let mut results = Results::default();
        let filespec = spec.output_filespec.clone();
        if combined {
            let mut job: Job<WordCountMap, WordCountReduce, SumCombiner, DirectorySource, LocalDisk<CaselessKey, u64>> =
                Job::new(WordCountMap, WordCountReduce, SumCombiner, datasource, spec).unwrap();
            job.run::<CpuParallel>(&mut results).unwrap();
        } else {
            let mut job: Job<WordCountMap, WordCountReduce, NullCombiner, DirectorySource, LocalDisk<CaselessKey, u64>> =
                Job::new(WordCountMap, WordCountReduce, NullCombiner, datasource, spec).unwrap();
            job.run::<CpuParallel>(&mut results).unwrap();
        }
        let mut files = Vec::new();
        for partition in 0..2 {
            let path = PathBuf::from(format!("{filespec}{partition}"));
            files.push(fs::read(&path).unwrap_or_default());
        }
        outputs.push(files);
    }
    assert_eq!(outputs[0], outputs[1]);
}

/// Fails every group whose key is exactly "bad"; sums the rest.
#[derive(Clone, Copy)]
struct FlakyReduce;

impl ReduceTask<CaselessKey, u64> for FlakyReduce {
    type OutputKey = CaselessKey;
    type OutputValue = u64;

    fn reduce(
        &self,
        em: &mut ReduceEmitter<CaselessKey, u64>,
        group: MultiRecord<CaselessKey, u64>,
    ) -> Result<()> {
        let (key, values) = group.into_parts();
        if key.as_bytes().eq_ignore_ascii_case(b"bad") {
            return Err(Error::task("cannot reduce this key"));
        }
        em.emit(key, values.iter().sum());
        Ok(())
    }
}

#[test]
fn failing_reduce_key_is_counted_and_skipped() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_file(input.path(), "f.txt", "good bad good\n");

    let spec = Specification::new(input.path()).set_output_filespec(filespec(&output));
    let mut results = Results::default();
    let job = run(WordCountMap, FlakyReduce, spec, &mut results).unwrap();

    assert_eq!(job.state(), State::Done);
    assert_eq!(results.counters.reduce_keys_executed, 2);
    assert_eq!(results.counters.reduce_key_errors, 1);
    assert_eq!(results.counters.reduce_keys_completed, 1);

    let totals = collect_totals(job.results_iter().unwrap());
    assert_eq!(totals.get("good"), Some(&2));
    assert_eq!(totals.get("bad"), None);
}

#[test]
fn empty_input_directory_completes_with_zero_counters() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let spec = Specification::new(input.path()).set_output_filespec(filespec(&output));
    let mut results = Results::default();
    let job = run(WordCountMap, WordCountReduce, spec, &mut results).unwrap();

    assert_eq!(job.state(), State::Done);
    assert_eq!(results.counters, Counters::default());
    assert_eq!(job.results_iter().unwrap().count(), 0);
}

#[test]
fn sequential_policy_reports_one_worker() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_file(input.path(), "f.txt", "one two three\n");

    let spec = Specification::new(input.path()).set_output_filespec(filespec(&output));
    let datasource = DirectorySource::new(&spec).unwrap();
    let mut job: Job<WordCountMap, WordCountReduce> =
        Job::new(WordCountMap, WordCountReduce, NullCombiner, datasource, spec).unwrap();
    let mut results = Results::default();
    job.run::<Sequential>(&mut results).unwrap();

    assert_eq!(results.counters.actual_map_tasks, 1);
    assert_eq!(results.counters.actual_reduce_tasks, 1);
    assert_eq!(collect_totals(job.results_iter().unwrap()).len(), 3);
}

#[test]
fn job_lifecycle_is_guarded() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_file(input.path(), "f.txt", "word\n");

    let spec = Specification::new(input.path()).set_output_filespec(filespec(&output));
    let datasource = DirectorySource::new(&spec).unwrap();
    let mut job: Job<WordCountMap, WordCountReduce> =
        Job::new(WordCountMap, WordCountReduce, NullCombiner, datasource, spec).unwrap();

    // no results before the job ran
    assert!(matches!(job.results_iter(), Err(Error::InvalidState(_))));

    let mut results = Results::default();
    job.run::<CpuParallel>(&mut results).unwrap();
    assert!(job.results_iter().is_ok());

    // a job runs once
    assert!(matches!(
        job.run::<CpuParallel>(&mut Results::default()),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn invalid_specifications_fail_at_construction() {
    init_logging();
    let input = tempfile::tempdir().unwrap();
    let spec = Specification::new(input.path()).set_concurrency(1, 0);
    let datasource = DirectorySource::new(&spec).unwrap();
    let job: Result<Job<WordCountMap, WordCountReduce>> =
        Job::new(WordCountMap, WordCountReduce, NullCombiner, datasource, spec);
    assert!(matches!(job, Err(Error::InvalidSpecification(_))));
}
