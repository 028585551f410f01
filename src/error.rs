//! Error types for the engine.

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::result;

/// Result type alias for engine operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors surfaced by the engine.
///
/// User task failures (`Task`) are contained by the job driver: they are
/// counted and the job continues. The remaining variants are systemic and
/// move a running job into the failed state.
#[derive(Debug)]
pub enum Error {
    /// The specification is unusable (zero reduce tasks, empty input path).
    InvalidSpecification(String),
    /// The job was driven out of order (run twice, results before completion).
    InvalidState(&'static str),
    /// A user map/reduce/combine function signaled failure.
    Task(String),
    /// I/O failure reading splits or writing spill/result files.
    Io(io::Error),
    /// Intermediate record (de)serialization failure.
    Codec(bincode::Error),
    /// A result file line did not parse as a key/value pair.
    InvalidRecord(String),
}

impl Error {
    /// Shorthand for a user task failure.
    pub fn task(msg: impl Into<String>) -> Self {
        Error::Task(msg.into())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSpecification(msg) => write!(f, "invalid specification: {msg}"),
            Error::InvalidState(msg) => write!(f, "invalid job state: {msg}"),
            Error::Task(msg) => write!(f, "task failed: {msg}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Codec(e) => write!(f, "record codec error: {e}"),
            Error::InvalidRecord(line) => write!(f, "malformed result record: {line:?}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e)
    }
}
