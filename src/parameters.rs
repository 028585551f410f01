//! Parameters for a mapreduce job.

use std::path::PathBuf;

/// User-supplied configuration for a [`Job`](crate::job::Job).
///
/// Built with chainable setters:
///
/// ```no_run
/// use hostmr::Specification;
///
/// let spec = Specification::new("data/in")
///     .set_concurrency(4, 2)
///     .set_max_file_segment_size(4 * 1024 * 1024)
///     .set_output_filespec("data/out/wc_");
/// ```
#[derive(Clone, Debug)]
pub struct Specification {
    /// Ideal map-phase parallelism. 0 means auto (hardware cores).
    pub map_tasks: usize,
    /// Number of output partitions; must be at least 1.
    pub reduce_tasks: usize,
    /// Target split size in bytes. A soft upper bound: a split is extended
    /// past it to the next record boundary.
    pub max_file_segment_size: u64,
    /// Directory enumerated for input files.
    pub input_directory: PathBuf,
    /// Prefix (possibly a directory path) for result files; the partition
    /// index is appended.
    pub output_filespec: String,
    /// Descend into subdirectories of `input_directory`.
    pub recursive: bool,
    /// Buffered values per partition before the combiner runs
    /// opportunistically during the map phase. 0 disables the early pass;
    /// the combiner still runs when each partition is finalized.
    pub combine_threshold: usize,
    /// Records held in memory per run while externally sorting a spilled
    /// partition.
    pub sort_run_size: usize,
    /// Retain spill/run files when the job fails, for inspection.
    pub keep_temporaries: bool,
}

impl Specification {
    pub fn new(input_directory: impl Into<PathBuf>) -> Specification {
        Specification {
            map_tasks: 0,
            reduce_tasks: 1,
            max_file_segment_size: 1024 * 1024,
            input_directory: input_directory.into(),
            output_filespec: String::from("mapreduce_"),
            recursive: false,
            combine_threshold: 64 * 1024,
            sort_run_size: 128 * 1024,
            keep_temporaries: false,
        }
    }

    /// Sets the ideal number of map and reduce tasks. Map parallelism is
    /// capped at the hardware concurrency; the number of reduce tasks also
    /// determines the partitioning of intermediate data.
    pub fn set_concurrency(mut self, map_tasks: usize, reduce_tasks: usize) -> Specification {
        self.map_tasks = map_tasks;
        self.reduce_tasks = reduce_tasks;
        self
    }

    pub fn set_max_file_segment_size(mut self, bytes: u64) -> Specification {
        self.max_file_segment_size = bytes;
        self
    }

    pub fn set_output_filespec(mut self, filespec: impl Into<String>) -> Specification {
        self.output_filespec = filespec.into();
        self
    }

    pub fn set_recursive(mut self, recursive: bool) -> Specification {
        self.recursive = recursive;
        self
    }

    pub fn set_combine_threshold(mut self, values: usize) -> Specification {
        self.combine_threshold = values;
        self
    }

    pub fn set_sort_run_size(mut self, records: usize) -> Specification {
        self.sort_run_size = records;
        self
    }

    pub fn set_keep_temporaries(mut self, keep: bool) -> Specification {
        self.keep_temporaries = keep;
        self
    }

    /// Validates the fields a job cannot run without.
    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.reduce_tasks == 0 {
            return Err(crate::error::Error::InvalidSpecification(String::from(
                "reduce_tasks must be at least 1",
            )));
        }
        if self.input_directory.as_os_str().is_empty() {
            return Err(crate::error::Error::InvalidSpecification(String::from(
                "input_directory is empty",
            )));
        }
        Ok(())
    }
}
