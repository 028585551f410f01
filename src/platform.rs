//! Small platform probes: file sizes, scratch directories, core counts.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::TempDir;

/// Size of a regular file in bytes.
pub fn file_size(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

/// A fresh scratch directory under the platform temp dir. Deleted when the
/// returned handle is dropped.
pub fn scratch_dir() -> io::Result<TempDir> {
    tempfile::Builder::new().prefix("hostmr-").tempdir()
}

/// Number of logical CPU cores, at least 1.
pub fn hardware_concurrency() -> usize {
    num_cpus::get().max(1)
}
