//! Staged writes of one store instance, plus what later operations
//! superseded while a flush was in flight.

use std::mem;

use super::backend::{PendingWrite, WriteBatch};

/// Immediate operation that invalidates staged writes for some keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Supersede {
    Key(String),
    Prefix(String),
    All,
}

impl Supersede {
    fn covers(&self, key: &str) -> bool {
        match self {
            Self::Key(superseded) => superseded == key,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::All => true,
        }
    }
}

/// A batch taken out for flushing, tagged with the epoch it was taken at.
#[derive(Debug)]
pub(crate) struct TakenBatch {
    pub(crate) writes: WriteBatch,
    epoch: u64,
}

/// Staged writes and the supersede log.
///
/// Every immediate operation advances the epoch. Supersede records are kept
/// only while at least one flush is in flight, so the log stays bounded by
/// the operations issued during flushes.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    writes: WriteBatch,
    epoch: u64,
    flushing: usize,
    superseded: Vec<(u64, Supersede)>,
}

impl StagedWrites {
    pub(crate) fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&PendingWrite> {
        self.writes.get(key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &PendingWrite)> {
        self.writes.iter()
    }

    pub(crate) fn stage(&mut self, key: String, write: PendingWrite) {
        self.writes.insert(key, write);
    }

    /// Drop staged writes covered by an immediate operation and remember it
    /// for any flush still in flight.
    pub(crate) fn supersede(&mut self, operation: Supersede) {
        self.writes.retain(|key, _| !operation.covers(key));
        self.epoch += 1;
        if self.flushing > 0 {
            self.superseded.push((self.epoch, operation));
        }
    }

    /// Take every staged write for flushing. `None` when nothing is staged.
    pub(crate) fn take(&mut self) -> Option<TakenBatch> {
        if self.writes.is_empty() {
            return None;
        }
        self.flushing += 1;
        Some(TakenBatch {
            writes: mem::take(&mut self.writes),
            epoch: self.epoch,
        })
    }

    /// Stage a failed batch again, except keys that were re-staged or
    /// superseded after the batch was taken.
    pub(crate) fn restore(&mut self, batch: TakenBatch) {
        let TakenBatch { writes, epoch } = batch;
        for (key, write) in writes {
            let superseded = self
                .superseded
                .iter()
                .any(|(at, operation)| *at > epoch && operation.covers(&key));
            if !superseded {
                self.writes.entry(key).or_insert(write);
            }
        }
    }

    /// Mark one flush finished, successful or not.
    pub(crate) fn finish_flush(&mut self) {
        self.flushing = self.flushing.saturating_sub(1);
        if self.flushing == 0 {
            self.superseded.clear();
        }
    }
}
