pub mod index;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::record::{self, Record, SMALL_RECORD_BUF};
use index::Index;

/// Prefix shared by every segment file: `current-data<ordinal>`.
pub const FILE_PREFIX: &str = "current-data";

pub fn file_name(ordinal: u64) -> String {
    format!("{}{}", FILE_PREFIX, ordinal)
}

/// Parse a directory entry's file name back into its ordinal, if it matches `current-data<n>`.
pub fn parse_ordinal(file_name: &str) -> Option<u64> {
    file_name.strip_prefix(FILE_PREFIX)?.parse().ok()
}

/// Segment
///
/// A high-level wrapper for writing/reading records to/from one `current-data<ordinal>` file,
/// plus the in-memory [`Index`] built either as writes land (the active segment) or by a full
/// replay on open (every segment, active or not — see [`Segment::replay`]).
///
/// The active segment keeps its write handle open for the lifetime of the segment; every other
/// segment only ever opens its file transiently, once per [`Segment::fetch`] call, so readers
/// never contend with the writer over a file descriptor.
pub struct Segment {
    path: PathBuf,
    ordinal: u64,
    index: Index,
    writer: Option<File>,
}

impl Segment {
    /// Create a brand new, empty segment file. Fails with [`Error::SegmentExists`] if a file
    /// already occupies this ordinal, so a stale leftover is never silently appended onto with a
    /// mismatched offset base.
    pub fn create(dir: &Path, ordinal: u64) -> Result<Self, Error> {
        let path = dir.join(file_name(ordinal));
        let writer = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(Error::SegmentExists),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            path,
            ordinal,
            index: Index::new(),
            writer: Some(writer),
        })
    }

    /// Open a pre-existing segment file and rebuild its index by replaying every record in it.
    /// Used for every segment found on disk when the database is opened, not only the newest —
    /// see the recovery notes in `SPEC_FULL.md` §4.6/§9.
    pub fn open_existing(path: PathBuf, ordinal: u64) -> Result<Self, Error> {
        let mut index = Index::new();
        {
            let mut file = File::open(&path)?;
            replay(&mut file, &mut index)?;
        }
        Ok(Self {
            path,
            ordinal,
            index,
            writer: None,
        })
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Current on-disk size of the segment file, always re-stated from the filesystem so that
    /// rollover decisions and recovered state agree on the same notion of "how big is this file".
    pub fn on_disk_size(&self) -> Result<u64, Error> {
        let len = match &self.writer {
            Some(file) => file.metadata()?.len(),
            None => std::fs::metadata(&self.path)?.len(),
        };
        Ok(len)
    }

    /// Append `record` to this segment's file and index it at the offset it was written to.
    /// Only valid for a segment still holding its write handle.
    pub fn append(&mut self, record: &Record) -> Result<u64, Error> {
        let writer = self.writer.as_mut().expect("append on a closed segment");
        let offset = writer.metadata()?.len();
        writer.write_all(&record.encode())?;
        self.index.insert(record.key.clone(), offset);
        Ok(offset)
    }

    /// Fetch the value stored at `offset`. Opens the file fresh for every call.
    pub fn fetch(&self, offset: u64) -> Result<String, Error> {
        fetch_value(&self.path, offset)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, Error> {
        match self.index.get(key) {
            Some(offset) => Ok(Some(self.fetch(offset)?)),
            None => Ok(None),
        }
    }

    /// Release the write handle, turning an active segment into an immutable one. A no-op if
    /// already closed.
    pub fn close(&mut self) {
        self.writer.take();
    }
}

/// Fetch the value stored at `offset` in the segment file at `path`, without needing a
/// constructed [`Segment`]. Used by the background merger to read out of segments it only holds
/// a lightweight snapshot of.
pub fn fetch_value(path: &Path, offset: u64) -> Result<String, Error> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    record::read_value_from(&mut file)
}

/// Replay every record in `reader` from its current position, inserting `(key, offset)` pairs
/// into `index` as they're found. Returns the number of bytes consumed, i.e. the offset just
/// past the last record read — used both to rebuild a segment's index and to determine where the
/// active segment's write cursor should resume.
pub fn replay<R: Read>(reader: &mut R, index: &mut Index) -> Result<u64, Error> {
    let mut stack_buf = [0u8; SMALL_RECORD_BUF];
    let mut offset: u64 = 0;

    loop {
        let mut size_buf = [0u8; 4];
        if !read_or_clean_eof(reader, &mut size_buf)? {
            break;
        }
        let total_size = u32::from_le_bytes(size_buf) as usize;
        let rest_len = total_size.checked_sub(4).ok_or(Error::CorruptRecord)?;

        let mut heap_buf;
        let rest: &mut [u8] = if rest_len <= stack_buf.len() {
            &mut stack_buf[..rest_len]
        } else {
            heap_buf = vec![0u8; rest_len];
            &mut heap_buf[..]
        };
        reader.read_exact(rest)?;

        let mut full = Vec::with_capacity(total_size);
        full.extend_from_slice(&size_buf);
        full.extend_from_slice(rest);
        let decoded = Record::decode(&full)?;

        index.insert(decoded.key, offset);
        offset += total_size as u64;
    }

    Ok(offset)
}

/// Read exactly `buf.len()` bytes, distinguishing a clean end-of-file (nothing left to read,
/// `Ok(false)`) from an actual record (`Ok(true)`). A short read that stops partway through the
/// 4-byte size prefix is treated the same as a clean end-of-file — a truncated trailing write,
/// tolerated rather than rejected, matching the recovery behavior described in `SPEC_FULL.md` §9.
fn read_or_clean_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }
    Ok(true)
}
