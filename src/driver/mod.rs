//! Platform driver seam
//!
//! The driver is the thin adapter over the OS notification primitive. It
//! reports raw, unclassified events for the directories it was asked to
//! observe; deciding update vs. remove belongs to the classifier, and
//! recursion emulation to the subtree manager.

mod notify_backend;

pub use notify_backend::{native_recursive_default, NotifyDriver};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Raw notification kind, as reported by the primitive. Opaque to the
/// pipeline; classification relies on the existence probe instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    /// Entry appeared, disappeared, or changed name
    Rename,
    /// Entry content or metadata changed
    Change,
}

/// Unclassified notification: the directory the event was observed in plus
/// an optional entry name within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub dir: PathBuf,
    pub name: Option<OsString>,
    pub kind: RawKind,
}

impl RawEvent {
    /// Split an affected absolute path into its `(dir, name)` form
    pub fn for_path(path: &Path, kind: RawKind) -> Self {
        match (path.parent(), path.file_name()) {
            (Some(dir), Some(name)) => Self {
                dir: dir.to_path_buf(),
                name: Some(name.to_os_string()),
                kind,
            },
            _ => Self {
                dir: path.to_path_buf(),
                name: None,
                kind,
            },
        }
    }

    /// Absolute path the event refers to; the directory itself when no
    /// entry name was reported.
    pub fn path(&self) -> PathBuf {
        match &self.name {
            Some(name) => self.dir.join(name),
            None => self.dir.clone(),
        }
    }
}

/// What a driver posts into the dispatcher: a raw event, or a fatal loss
/// of the backend stream.
pub type DriverPayload = Result<RawEvent>;

/// Sink through which a driver posts payloads. Posting must be cheap; the
/// dispatcher serializes processing on its own thread.
pub type DriverSink = Box<dyn Fn(DriverPayload) + Send>;

/// Handle to one bound directory observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHandle {
    pub(crate) dir: PathBuf,
}

impl WatchHandle {
    /// Directory this handle observes
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Adapter over a native change-notification primitive
pub trait Driver: Send {
    /// Whether one subscription observes all descendants of its directory
    fn native_recursive(&self) -> bool;

    /// Begin observing a single directory. Fails when the directory does
    /// not exist or is inaccessible.
    fn subscribe(&mut self, dir: &Path) -> Result<WatchHandle>;

    /// Stop observing. Unsubscribing a watch the OS already dropped is not
    /// an error.
    fn unsubscribe(&mut self, handle: &WatchHandle) -> Result<()>;
}
