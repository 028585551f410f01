//! Length-prefixed record files: the on-disk format for spill and run
//! files. A file is a sequence of records, each prefixed by a 4-byte
//! big-endian length: `llllbbbbllllbbbbbb...`

use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Writes length-prefixed records to a sink.
pub struct RecordWriter<W: Write> {
    dest: W,
    records_written: u64,
}

impl RecordWriter<BufWriter<fs::File>> {
    /// Creates (or truncates) `path` for writing.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(RecordWriter::new(BufWriter::new(file)))
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(dest: W) -> RecordWriter<W> {
        RecordWriter {
            dest,
            records_written: 0,
        }
    }

    pub fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.dest.write_all(&(record.len() as u32).to_be_bytes())?;
        self.dest.write_all(record)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }
}

/// Reads back records written by [`RecordWriter`].
pub struct RecordReader<R: Read> {
    src: R,
}

impl RecordReader<BufReader<fs::File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = fs::OpenOptions::new().read(true).open(path)?;
        Ok(RecordReader::new(BufReader::with_capacity(
            1024 * 1024,
            file,
        )))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(src: R) -> RecordReader<R> {
        RecordReader { src }
    }

    /// Returns the next record, or `None` at a clean end of file. A file
    /// that ends mid-record is an `UnexpectedEof` error.
    pub fn read_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        let mut off = 0;
        while off < len_buf.len() {
            let n = self.src.read(&mut len_buf[off..])?;
            if n == 0 {
                if off == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated record length",
                ));
            }
            off += n;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut record = vec![0u8; len];
        self.src.read_exact(&mut record)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = RecordWriter::new(&mut buf);
            w.write_record(b"abc").unwrap();
            w.write_record(b"").unwrap();
            w.write_record(b"defgh").unwrap();
            assert_eq!(w.records_written(), 3);
        }
        let mut r = RecordReader::new(&buf[..]);
        assert_eq!(r.read_record().unwrap().unwrap(), b"abc");
        assert_eq!(r.read_record().unwrap().unwrap(), b"");
        assert_eq!(r.read_record().unwrap().unwrap(), b"defgh");
        assert!(r.read_record().unwrap().is_none());
        // reading past the end stays at the end
        assert!(r.read_record().unwrap().is_none());
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut w = RecordWriter::new(&mut buf);
            w.write_record(b"abcdef").unwrap();
        }
        buf.truncate(7);
        let mut r = RecordReader::new(&buf[..]);
        assert!(r.read_record().is_err());
    }

    #[test]
    fn truncated_length_prefix_is_an_error() {
        let buf = [0u8, 0];
        let mut r = RecordReader::new(&buf[..]);
        assert!(r.read_record().is_err());
    }
}
