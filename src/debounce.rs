//! Per-path event coalescing
//!
//! Each root owns one debouncer: a map from absolute path to an open
//! window. Repeats of the same kind reset the window; a kind flip releases
//! the old entry immediately so that an update observed before a remove is
//! also emitted before it. Time is passed in by the dispatcher, which keeps
//! the windows deterministic under test.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::event::ChangeKind;

#[derive(Debug)]
struct Pending {
    kind: ChangeKind,
    deadline: Instant,
    seq: u64,
}

/// An entry released from its window, ordered by `(at, seq)` when flushes
/// from several roots are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Flush {
    pub at: Instant,
    pub seq: u64,
    pub path: PathBuf,
    pub kind: ChangeKind,
}

pub(crate) struct Debouncer {
    delay: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Record a classified event. Returns an entry to deliver immediately
    /// when the kind changed under an open window.
    pub fn note(
        &mut self,
        path: PathBuf,
        kind: ChangeKind,
        now: Instant,
        seq: u64,
    ) -> Option<Flush> {
        let deadline = now + self.delay;
        match self.pending.get_mut(&path) {
            None => {
                self.pending.insert(path, Pending { kind, deadline, seq });
                None
            }
            Some(entry) if entry.kind == kind => {
                // coalesce: suppress the repeat, extend the window
                entry.deadline = deadline;
                entry.seq = seq;
                None
            }
            Some(_) => {
                let old = self
                    .pending
                    .insert(path.clone(), Pending { kind, deadline, seq });
                old.map(|old| Flush {
                    at: now,
                    seq: old.seq,
                    path,
                    kind: old.kind,
                })
            }
        }
    }

    /// Earliest open window, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every entry whose window has elapsed, ordered by
    /// `(deadline, seq)`.
    pub fn take_due(&mut self, now: Instant) -> Vec<Flush> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut flushed: Vec<Flush> = due
            .into_iter()
            .filter_map(|path| {
                self.pending.remove(&path).map(|entry| Flush {
                    at: entry.deadline,
                    seq: entry.seq,
                    path,
                    kind: entry.kind,
                })
            })
            .collect();
        flushed.sort_by(|a, b| (a.at, a.seq).cmp(&(b.at, b.seq)));
        flushed
    }

    /// Drop every open window without flushing. Used on close.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
