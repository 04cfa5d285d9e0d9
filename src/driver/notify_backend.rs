//! notify-backed platform driver

use std::env;
use std::path::Path;
use std::sync::LazyLock;

use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tracing::{debug, warn};

use super::{Driver, DriverSink, RawEvent, RawKind, WatchHandle};
use crate::error::{Result, WatchError};

static FORCED_MODE: LazyLock<Option<bool>> = LazyLock::new(|| {
    match env::var("TREEWATCH_FORCE_WATCH_MODE").as_deref() {
        Ok("recursive") => Some(true),
        Ok("nonrecursive") => Some(false),
        Ok(other) => {
            warn!(
                "unsupported TREEWATCH_FORCE_WATCH_MODE {:?}, must be recursive or nonrecursive",
                other
            );
            None
        }
        Err(_) => None,
    }
});

/// Platform default for native recursion, overridable with
/// `TREEWATCH_FORCE_WATCH_MODE=recursive|nonrecursive`.
///
/// macOS and Windows ship efficient recursive watchers; inotify on Linux
/// does not, so descendants are tracked per directory there.
pub fn native_recursive_default() -> bool {
    FORCED_MODE.unwrap_or(cfg!(any(target_os = "macos", target_os = "windows")))
}

/// Driver over `notify::RecommendedWatcher`
pub struct NotifyDriver {
    watcher: RecommendedWatcher,
    recursive: bool,
}

impl NotifyDriver {
    /// Create a driver posting into `sink`. `recursive` selects whether
    /// subscriptions use the backend's native recursive mode.
    pub fn new(recursive: bool, sink: DriverSink) -> Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => forward(&sink, event),
                Err(error) => sink(Err(WatchError::driver(error.to_string()))),
            },
            // Symlink chains are probed, never followed.
            Config::default().with_follow_symlinks(false),
        )
        .map_err(|e| WatchError::driver(e.to_string()))?;
        Ok(Self { watcher, recursive })
    }
}

fn forward(sink: &DriverSink, event: notify::Event) {
    if event.need_rescan() {
        // The backend overflowed and asks for a rescan; there is no single
        // path to map this onto. The stream self-heals on the next real
        // notification.
        warn!("watch backend requested rescan, some events may have been lost");
    }
    let Some(kind) = raw_kind(&event.kind) else {
        return;
    };
    for path in &event.paths {
        sink(Ok(RawEvent::for_path(path, kind)));
    }
}

/// Collapse notify's event taxonomy into the raw rename/change split.
/// Access events never enter the pipeline.
fn raw_kind(kind: &EventKind) -> Option<RawKind> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            Some(RawKind::Rename)
        }
        EventKind::Modify(_) | EventKind::Any => Some(RawKind::Change),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

impl Driver for NotifyDriver {
    fn native_recursive(&self) -> bool {
        self.recursive
    }

    fn subscribe(&mut self, dir: &Path) -> Result<WatchHandle> {
        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher
            .watch(dir, mode)
            .map_err(|e| WatchError::subscription(dir, e.to_string()))?;
        debug!("subscribed {} ({:?})", dir.display(), mode);
        Ok(WatchHandle {
            dir: dir.to_path_buf(),
        })
    }

    fn unsubscribe(&mut self, handle: &WatchHandle) -> Result<()> {
        match self.watcher.unwatch(&handle.dir) {
            Ok(()) => Ok(()),
            // Racing the OS: the directory may be gone and its watch with it.
            Err(notify::Error {
                kind: notify::ErrorKind::WatchNotFound,
                ..
            }) => Ok(()),
            Err(e) => Err(WatchError::subscription(&handle.dir, e.to_string())),
        }
    }
}
