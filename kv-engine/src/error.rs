use std::io;

use derive_more::From;

/// Errors surfaced by the engine.
///
/// Mirrors the `derive_more::From`-based enum style already used in this codebase: each
/// underlying failure mode gets its own variant and an automatic `From` conversion, so call
/// sites can keep using `?` without a manual `map_err`.
#[derive(Debug, From)]
pub enum Error {
    /// The key is not present in any segment, or its newest value is the tombstone sentinel.
    NotFound,

    /// The filesystem rejected an open, read, write, or stat.
    Io(io::Error),

    /// Decode observed a size prefix inconsistent with the buffer length.
    CorruptRecord,

    /// Rollover or merge tried to create a segment file at an ordinal that already exists.
    SegmentExists,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "key not found"),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::CorruptRecord => write!(f, "corrupt record"),
            Error::SegmentExists => write!(f, "segment file already exists"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
