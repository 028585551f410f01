//! Tab-separated text result files: one `key\tvalue` pair per line.

use std::fmt::Display;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

/// Writes result pairs as `key\tvalue\n`.
pub struct LineSink {
    dest: BufWriter<fs::File>,
}

impl LineSink {
    /// Creates (or truncates) the result file at `path`.
    pub fn create(path: &Path) -> io::Result<LineSink> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(LineSink {
            dest: BufWriter::new(file),
        })
    }

    pub fn write_pair(&mut self, key: &impl Display, value: &impl Display) -> io::Result<()> {
        writeln!(self.dest, "{key}\t{value}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }
}

/// Reads result pairs back from a file written by [`LineSink`].
pub struct LineSource {
    lines: Lines<BufReader<fs::File>>,
}

impl LineSource {
    pub fn open(path: &Path) -> io::Result<LineSource> {
        let file = fs::OpenOptions::new().read(true).open(path)?;
        Ok(LineSource {
            lines: BufReader::new(file).lines(),
        })
    }
}

impl Iterator for LineSource {
    type Item = io::Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lines.next()? {
            Err(e) => Some(Err(e)),
            Ok(line) => match line.split_once('\t') {
                Some((k, v)) => Some(Ok((k.to_string(), v.to_string()))),
                None => Some(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("result line without tab separator: {line:?}"),
                ))),
            },
        }
    }
}
