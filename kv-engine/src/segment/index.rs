use std::collections::HashMap;

/// Index
///
/// The in-memory `key -> byte offset` mapping for one segment's log file.
///
/// Unlike a position-addressed index, this index is keyed on the record's own key: each write
/// overwrites the previous offset for that key within the same segment, so a segment's index
/// always holds exactly one offset per key ever written to it (the newest one, since segments
/// are append-only and a key's entry is updated in place in memory on every write).
///
/// Entries are never removed from a live segment's index; stale entries only disappear when a
/// segment itself is replaced wholesale by merge.
#[derive(Debug, Default)]
pub struct Index {
    offsets: HashMap<String, u64>,
}

impl Index {
    pub fn new() -> Self {
        Self {
            offsets: HashMap::new(),
        }
    }

    /// Record that `key`'s record starts at `offset` in the owning segment's file.
    pub fn insert(&mut self, key: String, offset: u64) {
        self.offsets.insert(key, offset);
    }

    /// Look up the offset of `key`'s record, if this segment has one.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.offsets.iter()
    }

    /// Clone the full `key -> offset` map. Used by the background merger to take a cheap,
    /// lock-free-to-read snapshot of an immutable segment's index before doing its (potentially
    /// slow) file I/O.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.offsets.clone()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }
}
