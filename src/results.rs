//! Counters and timings collected while a job runs.

use std::time::Duration;

/// Task and key counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Map workers actually used (bounded by tasks available).
    pub actual_map_tasks: usize,
    /// Reduce workers actually used.
    pub actual_reduce_tasks: usize,

    pub map_keys_executed: usize,
    pub map_key_errors: usize,
    pub map_keys_completed: usize,

    pub reduce_keys_executed: usize,
    pub reduce_key_errors: usize,
    pub reduce_keys_completed: usize,

    /// Result files created (partitions that produced at least one pair).
    pub num_result_files: usize,
}

/// Everything a finished (or failed) run reports: counters, wall-clock
/// phase runtimes, and per-key durations for each phase.
#[derive(Clone, Debug, Default)]
pub struct Results {
    pub counters: Counters,
    pub job_runtime: Duration,
    pub map_runtime: Duration,
    pub shuffle_runtime: Duration,
    pub reduce_runtime: Duration,
    pub map_times: Vec<Duration>,
    pub shuffle_times: Vec<Duration>,
    pub reduce_times: Vec<Duration>,
}

/// Fastest/slowest/average over one phase's per-key durations. The
/// average is the sum divided by the count of the same vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeStats {
    pub fastest: Duration,
    pub slowest: Duration,
    pub average: Duration,
}

fn stats(times: &[Duration]) -> Option<TimeStats> {
    if times.is_empty() {
        return None;
    }
    let sum: Duration = times.iter().sum();
    Some(TimeStats {
        fastest: *times.iter().min().unwrap(),
        slowest: *times.iter().max().unwrap(),
        average: sum / times.len() as u32,
    })
}

impl Results {
    pub fn map_time_stats(&self) -> Option<TimeStats> {
        stats(&self.map_times)
    }

    pub fn shuffle_time_stats(&self) -> Option<TimeStats> {
        stats(&self.shuffle_times)
    }

    pub fn reduce_time_stats(&self) -> Option<TimeStats> {
        stats(&self.reduce_times)
    }
}
