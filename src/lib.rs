//! treewatch - normalized file-system watching
//!
//! Watches files and directories across platforms and reports a single
//! consistent stream of `update` and `remove` events, smoothing over the
//! differences between native notification facilities: recursion is
//! emulated per directory where the OS lacks it, bursts are debounced per
//! path, and multiple roots compose into one deduplicated watcher.
//!
//! ```no_run
//! use treewatch::{watch_with, WatchOptions};
//!
//! let watcher = watch_with(
//!     "/some/dir",
//!     WatchOptions::new().with_recursive(true),
//!     |kind, path| println!("{kind} {path}"),
//! )?;
//! // ... later
//! watcher.close();
//! # Ok::<(), treewatch::WatchError>(())
//! ```

pub mod driver;
pub mod error;
pub mod event;
pub mod filter;
pub mod options;
pub mod watcher;

mod classify;
mod compose;
mod debounce;
mod router;
mod subtree;

pub use error::{Result, WatchError};
pub use event::{ChangeKind, EventPath, PathEncoding};
pub use filter::{Filter, Skip, Verdict};
pub use options::{IntoTargets, WatchOptions};
pub use watcher::{watch, watch_with, Watcher};
