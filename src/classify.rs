//! Event classification: raw notifications become update/remove events
//!
//! The raw kind reported by the driver is advisory at best; platforms
//! disagree on what a rename means. Classification therefore probes the
//! current file-system state: a path that exists is an `update`, a path
//! that does not is a `remove`. The two sides of a rename classify
//! independently, one probe each.

use std::fs;
use std::path::PathBuf;

use crate::driver::RawEvent;
use crate::event::ChangeKind;

/// A classified event, ready for filtering and debouncing
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Classified {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Whether the path is currently a directory. Always false for
    /// removals; there is nothing left to probe.
    pub is_dir: bool,
}

/// Classify a raw notification by probing the current file-system state.
/// Symbolic links are probed, not followed.
pub(crate) fn classify(raw: &RawEvent) -> Classified {
    let path = raw.path();
    match fs::symlink_metadata(&path) {
        Ok(meta) => Classified {
            kind: ChangeKind::Update,
            is_dir: meta.is_dir(),
            path,
        },
        Err(_) => Classified {
            kind: ChangeKind::Remove,
            is_dir: false,
            path,
        },
    }
}
