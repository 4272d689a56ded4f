//! The bounded, drop-newest audit tape (§3, §4.5 step 8, §6).

use detjs_core::{tape_hash_hex, HostTapeRecord};

/// Once `capacity` records have been collected, further `push` calls are
/// no-ops: existing entries are never evicted or reordered, and the
/// overflowing record is simply discarded (drop-newest, not
/// drop-oldest — chosen so a long-running program's early tape entries,
/// which golden vectors pin against, never shift under it).
#[derive(Debug, Clone)]
pub struct TapeBuffer {
    capacity: usize,
    records: Vec<HostTapeRecord>,
}

impl TapeBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Vec::with_capacity(capacity.min(1024)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn push(&mut self, record: HostTapeRecord) {
        if self.records.len() < self.capacity {
            self.records.push(record);
        }
    }

    pub fn records(&self) -> &[HostTapeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn hash_hex(&self) -> String {
        tape_hash_hex(&self.records)
    }
}
