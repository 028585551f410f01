//! Input enumeration and splitting.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};

use crate::error::Result;
use crate::parameters::Specification;
use crate::platform;

/// A byte range of one input file, ending at a record boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub path: PathBuf,
    pub offset: u64,
    pub length: u64,
}

/// Supplies input splits to map workers and materializes their bytes.
///
/// `next_split` may be called concurrently from every map worker;
/// implementations serialize internally. An exhausted source keeps
/// returning `None`.
pub trait DataSource: Send + Sync {
    fn next_split(&self) -> Option<Split>;

    /// Reads the split as one contiguous buffer.
    fn read_split(&self, split: &Split) -> Result<Vec<u8>>;
}

/// Enumerates the regular files of a directory once and splits each into
/// regions of at most `max_file_segment_size` bytes, extended forward to
/// the next LF (or end of file) so no split cuts a record.
pub struct DirectorySource {
    splits: Mutex<VecDeque<Split>>,
}

impl DirectorySource {
    pub fn new(spec: &Specification) -> Result<DirectorySource> {
        let mut splits = VecDeque::new();
        let mut dirs = vec![spec.input_directory.clone()];
        while let Some(dir) = dirs.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("skipping unreadable entry in {}: {}", dir.display(), e);
                        continue;
                    }
                };
                let path = entry.path();
                let meta = match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                if meta.is_dir() {
                    if spec.recursive {
                        dirs.push(path);
                    }
                    continue;
                }
                if !meta.is_file() || meta.len() == 0 {
                    continue;
                }
                match split_file(&path, spec.max_file_segment_size) {
                    Ok(file_splits) => splits.extend(file_splits),
                    Err(e) => {
                        // The file stats but cannot be scanned; hand it to the
                        // map phase whole so the failure is counted there.
                        warn!("cannot scan {} for boundaries: {}", path.display(), e);
                        splits.push_back(Split {
                            path,
                            offset: 0,
                            length: meta.len(),
                        });
                    }
                }
            }
        }
        debug!("enumerated {} splits", splits.len());
        Ok(DirectorySource {
            splits: Mutex::new(splits),
        })
    }

    /// Number of splits not yet handed out.
    pub fn remaining(&self) -> usize {
        self.splits.lock().unwrap().len()
    }
}

impl DataSource for DirectorySource {
    fn next_split(&self) -> Option<Split> {
        self.splits.lock().unwrap().pop_front()
    }

    fn read_split(&self, split: &Split) -> Result<Vec<u8>> {
        let mut file = fs::File::open(&split.path)?;
        file.seek(SeekFrom::Start(split.offset))?;
        let mut data = Vec::with_capacity(split.length as usize);
        file.take(split.length).read_to_end(&mut data)?;
        if (data.len() as u64) < split.length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("input file shrank: {}", split.path.display()),
            )
            .into());
        }
        Ok(data)
    }
}

/// Splits one file. Each split ends just after an LF, except the last,
/// which ends at end of file.
fn split_file(path: &Path, segment: u64) -> io::Result<Vec<Split>> {
    let file_len = platform::file_size(path)?;
    let segment = segment.max(1);
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut splits = Vec::new();
    let mut start = 0;
    while start < file_len {
        let mut end = (start + segment).min(file_len);
        if end < file_len {
            reader.seek(SeekFrom::Start(end))?;
            let mut tail = Vec::new();
            end += reader.read_until(b'\n', &mut tail)? as u64;
        }
        splits.push(Split {
            path: path.to_path_buf(),
            offset: start,
            length: end - start,
        });
        start = end;
    }
    Ok(splits)
}
