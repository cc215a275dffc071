//! Embedded, single-writer, log-structured key/value store for short UTF-8 string values.
//!
//! A [`Db`] is a sequence of append-only segment files on disk: one active segment accepts all
//! writes until it crosses a configured byte threshold, at which point it is closed and a new
//! active segment takes over. Once three or more segments accumulate, a background thread merges
//! every segment but the active one down to a single one, keeping only each key's most recent
//! value. Reopening a directory replays every segment file found in it to rebuild the in-memory
//! index before resuming writes.
//!
//! See `SPEC_FULL.md` for the full design.

mod db;
mod error;
mod merge;
mod record;
mod segment;

pub use db::Db;
pub use error::{Error, Result};
