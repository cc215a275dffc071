use std::path::PathBuf;
use std::sync::atomic::Ordering;

use crate::db::Inner;
use crate::record::Record;
use crate::segment::{self, Segment};

/// A point-in-time copy of one immutable segment's identity and index, taken under `Inner`'s
/// segment read lock and then used for the rest of the merge without holding that lock — the
/// actual file I/O below can be slow, and the top-level write lock must stay free for `Db::put`
/// the whole time.
struct OldSegment {
    ordinal: u64,
    path: PathBuf,
    index: std::collections::HashMap<String, u64>,
}

/// Run one background merge pass to completion.
///
/// Collapses every segment older than the newest immutable one into a single new segment,
/// keeping only each key's most recent value among the segments being merged (tombstones
/// included — see `SPEC_FULL.md` §4.5, which treats tombstone retention through merge as
/// load-bearing, not an optimization opportunity). Never touches the active segment. Installs
/// its result by recomputing `[merged] + segments newer than the last one it merged` under the
/// write lock at swap time, rather than assuming the list hasn't grown since the snapshot was
/// taken — a concurrent `Put` may have rolled over one or more additional segments while this
/// merge was running.
pub(crate) fn run(inner: &Inner) {
    let old_segments = {
        let segments = inner.segments.read();
        if segments.len() < 3 {
            return;
        }
        // Every segment except the active one (last) and except the one merge trigger always
        // leaves untouched is eligible; concretely that's everything up to, and including, the
        // newest immutable segment.
        let last_old = segments.len() - 2;
        segments[..=last_old]
            .iter()
            .map(|s| OldSegment {
                ordinal: s.ordinal(),
                path: s.path().to_path_buf(),
                index: s.index().snapshot(),
            })
            .collect::<Vec<_>>()
    };

    let merged = match build_merged_segment(inner, &old_segments) {
        Ok(segment) => segment,
        Err(e) => {
            log::warn!("background merge aborted: {}", e);
            return;
        }
    };

    let last_old_ordinal = old_segments
        .last()
        .expect("merge only runs with at least one old segment")
        .ordinal;

    let mut segments = inner.segments.write();
    let tail_start = segments
        .iter()
        .position(|s| s.ordinal() > last_old_ordinal)
        .unwrap_or(segments.len());

    let mut previous = std::mem::take(&mut *segments);
    let mut new_list = Vec::with_capacity(1 + (previous.len() - tail_start));
    new_list.push(merged);
    new_list.extend(previous.drain(tail_start..));
    *segments = new_list;
    // `previous` still holds the now-superseded segments (indices before `tail_start`); they're
    // dropped here. Their files are left on disk — nothing in this engine ever unlinks a
    // segment file once written.

    log::debug!(
        "merge complete, {} segment(s) collapsed into ordinal {}",
        old_segments.len(),
        last_old_ordinal
    );
}

fn build_merged_segment(
    inner: &Inner,
    old_segments: &[OldSegment],
) -> Result<Segment, crate::error::Error> {
    let ordinal = inner.next_ordinal.fetch_add(1, Ordering::SeqCst);
    let mut merged = Segment::create(&inner.dir, ordinal)?;

    let last_index = old_segments.len() - 1;
    for (i, old) in old_segments.iter().enumerate() {
        for (key, offset) in &old.index {
            if i < last_index {
                let superseded = old_segments[i + 1..]
                    .iter()
                    .any(|later| later.index.contains_key(key));
                if superseded {
                    continue;
                }
            }
            let value = segment::fetch_value(&old.path, *offset)?;
            merged.append(&Record::new(key.clone(), value))?;
        }
    }

    merged.close();
    Ok(merged)
}
