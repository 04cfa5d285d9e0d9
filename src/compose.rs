//! Cross-root event composition
//!
//! Overlapping roots (one target an ancestor of another) would report one
//! file-system change once per root. The composer keeps short-lived
//! per-path tokens, sized to the debounce window, and admits only the first
//! arrival. It also drops a parent-directory event arriving in the same
//! window as an already-admitted event for one of its children, which some
//! platforms emit alongside a new file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::event::ChangeKind;

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: ChangeKind,
    at: Instant,
}

pub(crate) struct Composer {
    window: Duration,
    recent: HashMap<PathBuf, Token>,
}

impl Composer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            recent: HashMap::new(),
        }
    }

    /// Decide whether a flushed event reaches the subscribers. Admitted
    /// events leave a token behind for the rest of the window.
    ///
    /// `overlapping` is whether more than one root covers the path; exact
    /// duplicates are only suppressed across such roots.
    pub fn admit(
        &mut self,
        path: &Path,
        kind: ChangeKind,
        is_dir: bool,
        overlapping: bool,
        now: Instant,
    ) -> bool {
        self.recent
            .retain(|_, token| now.duration_since(token.at) <= self.window);

        if overlapping {
            if let Some(token) = self.recent.get(path) {
                if token.kind == kind {
                    trace!("suppressed duplicate {} for {}", kind, path.display());
                    return false;
                }
            }
        }

        if is_dir && kind == ChangeKind::Update {
            let redundant = self
                .recent
                .keys()
                .any(|emitted| emitted.parent() == Some(path));
            if redundant {
                trace!("suppressed parent echo for {}", path.display());
                return false;
            }
        }

        self.recent.insert(path.to_path_buf(), Token { kind, at: now });
        true
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }
}
