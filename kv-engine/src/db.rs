use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use crate::error::Error;
use crate::merge;
use crate::record::{self, Record};
use crate::segment::{self, Segment};

/// Db
///
/// An ordered sequence of segments `[s0, s1, ..., sn]` where `sn` is the active (writable)
/// segment and all earlier ones are immutable. `Db` is a thin handle around a shared, reference
/// counted [`Inner`] — cheap to clone, safe to share across threads, which is what lets the
/// background merger keep working on the same state after `Db::put` has returned.
pub struct Db(pub(crate) Arc<Inner>);

pub(crate) struct Inner {
    pub(crate) dir: PathBuf,
    pub(crate) segment_size_max: u64,
    pub(crate) segments: RwLock<Vec<Segment>>,
    pub(crate) next_ordinal: AtomicU64,
    write_lock: Mutex<()>,
    pub(crate) merge_in_flight: AtomicBool,
    merge_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Db {
    /// Open a database rooted at `dir`, rolling over to a new active segment whenever a pending
    /// write would push the active segment past `segment_size_max` bytes.
    ///
    /// Every `current-data<n>` file already present in `dir` is replayed to rebuild its index
    /// (see `SPEC_FULL.md` §4.6/§9 — this repository rebuilds every segment, not only the
    /// newest), then a fresh active segment is created one ordinal past the highest one found.
    pub fn open(dir: impl AsRef<Path>, segment_size_max: u64) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();

        let mut ordinals: Vec<u64> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(ordinal) = segment::parse_ordinal(name) {
                    ordinals.push(ordinal);
                }
            }
        }
        ordinals.sort_unstable();

        let mut segments = Vec::with_capacity(ordinals.len() + 1);
        for ordinal in &ordinals {
            let path = dir.join(segment::file_name(*ordinal));
            log::debug!("replaying segment {:?}", path);
            segments.push(Segment::open_existing(path, *ordinal)?);
        }

        let active_ordinal = ordinals.last().map(|o| o + 1).unwrap_or(0);
        log::debug!("opening {:?} with fresh active segment {}", dir, active_ordinal);
        segments.push(Segment::create(&dir, active_ordinal)?);

        let inner = Arc::new(Inner {
            dir,
            segment_size_max,
            segments: RwLock::new(segments),
            next_ordinal: AtomicU64::new(active_ordinal + 1),
            write_lock: Mutex::new(()),
            merge_in_flight: AtomicBool::new(false),
            merge_handle: Mutex::new(None),
        });

        let db = Db(inner);
        // Recovery alone may already have produced three or more segments; the rollover path's
        // merge trigger applies here too.
        db.maybe_spawn_merge();
        Ok(db)
    }

    /// Store `value` under `key`, superseding any earlier value for the same key.
    pub fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        let _write_guard = self.0.write_lock.lock();
        let record = Record::new(key, value);
        let size = record.encoded_len() as u64;

        let mut rolled_over = false;
        {
            let mut segments = self.0.segments.write();
            let current_size = segments
                .last()
                .expect("segment list is never empty")
                .on_disk_size()?;

            if current_size + size > self.0.segment_size_max {
                let ordinal = self.0.next_ordinal.fetch_add(1, Ordering::SeqCst);
                let new_active = Segment::create(&self.0.dir, ordinal)?;
                segments
                    .last_mut()
                    .expect("segment list is never empty")
                    .close();
                segments.push(new_active);
                rolled_over = true;
                log::debug!("rolled over to segment {}", ordinal);
            }

            segments
                .last_mut()
                .expect("segment list is never empty")
                .append(&record)?;
        }

        if rolled_over {
            self.maybe_spawn_merge();
        }
        Ok(())
    }

    /// Look up the most recent value for `key`, newest segment first.
    pub fn get(&self, key: &str) -> Result<String, Error> {
        let segments = self.0.segments.read();
        for segment in segments.iter().rev() {
            if let Some(value) = segment.get(key)? {
                return if value == record::DELETED {
                    Err(Error::NotFound)
                } else {
                    Ok(value)
                };
            }
        }
        Err(Error::NotFound)
    }

    /// Write the tombstone sentinel for `key`. Equivalent to `put(key, "DELETED")`.
    pub fn delete(&self, key: &str) -> Result<(), Error> {
        self.put(key, record::DELETED)
    }

    /// Release the active segment's file handle and join the most recently spawned merge
    /// thread, so shutdown is deterministic rather than leaving a detached background task.
    pub fn close(self) -> Result<(), Error> {
        if let Some(handle) = self.0.merge_handle.lock().take() {
            let _ = handle.join();
        }
        let mut segments = self.0.segments.write();
        if let Some(active) = segments.last_mut() {
            active.close();
        }
        Ok(())
    }

    /// Block until any in-flight background merge has completed. Not part of the engine's
    /// public contract in the sense of being required for correctness — `Get`/`Put` are correct
    /// regardless — but useful to tests and callers that want to observe post-merge segment
    /// counts deterministically instead of polling.
    pub fn wait_for_merge(&self) {
        loop {
            if !self.0.merge_in_flight.load(Ordering::SeqCst) {
                return;
            }
            std::thread::yield_now();
        }
    }

    pub fn segment_count(&self) -> usize {
        self.0.segments.read().len()
    }

    fn maybe_spawn_merge(&self) {
        if self.0.segments.read().len() < 3 {
            return;
        }
        if self
            .0
            .merge_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A merge is already running; it will re-trigger another one on its own rollover
            // path if the segment count still warrants it once it finishes.
            return;
        }

        let inner = Arc::clone(&self.0);
        let handle = std::thread::spawn(move || {
            merge::run(&inner);
            inner.merge_in_flight.store(false, Ordering::SeqCst);
        });
        *self.0.merge_handle.lock() = Some(handle);
    }
}
