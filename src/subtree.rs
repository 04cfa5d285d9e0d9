//! Watched-set maintenance: recursion emulation over per-directory watches
//!
//! When the driver is natively recursive this tracks exactly the base
//! directory. Otherwise it mirrors the extant directory tree minus
//! skip-subtree prunes, enlisting newly created subdirectories and retiring
//! watches when directories disappear. Watches are owned here; the driver
//! only hands out handles.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::driver::{Driver, WatchHandle};
use crate::error::{Result, WatchError};
use crate::filter::{Filter, Verdict};

pub(crate) struct SubtreeManager {
    base: PathBuf,
    /// Whether descendants are tracked per directory (no native recursion)
    emulate: bool,
    watched: BTreeMap<PathBuf, WatchHandle>,
}

impl SubtreeManager {
    pub fn new(base: PathBuf, emulate: bool) -> Self {
        Self {
            base,
            emulate,
            watched: BTreeMap::new(),
        }
    }

    /// Subscribe the base directory and, when emulating recursion, every
    /// unfiltered descendant directory. Per-directory failures below the
    /// base are collected for reporting; failing on the base itself is
    /// fatal.
    pub fn start(&mut self, driver: &mut dyn Driver, filter: &Filter) -> Result<Vec<WatchError>> {
        let base = self.base.clone();
        let handle = driver.subscribe(&base)?;
        self.watched.insert(base.clone(), handle);
        let mut soft = Vec::new();
        if self.emulate {
            self.enlist_children(&base, driver, filter, &mut soft);
        }
        Ok(soft)
    }

    /// Enlist a directory discovered after start, along with everything
    /// beneath it. No-op unless recursion is being emulated.
    pub fn enlist(
        &mut self,
        dir: &Path,
        driver: &mut dyn Driver,
        filter: &Filter,
    ) -> Vec<WatchError> {
        let mut soft = Vec::new();
        if !self.emulate || self.watched.contains_key(dir) {
            return soft;
        }
        match driver.subscribe(dir) {
            Ok(handle) => {
                debug!("enlisted {}", dir.display());
                self.watched.insert(dir.to_path_buf(), handle);
                self.enlist_children(dir, driver, filter, &mut soft);
            }
            Err(e) => soft.push(e),
        }
        soft
    }

    fn enlist_children(
        &mut self,
        dir: &Path,
        driver: &mut dyn Driver,
        filter: &Filter,
        soft: &mut Vec<WatchError>,
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                // The directory may have vanished between the notification
                // and the walk; its parent watch reports the removal.
                trace!("cannot enumerate {}: {}", dir.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || self.watched.contains_key(&path) {
                continue;
            }
            match filter.checked(&path) {
                Ok(Verdict::SkipSubtree) => {
                    trace!("skipping subtree {}", path.display());
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    // a broken predicate skips the directory and surfaces
                    soft.push(e);
                    continue;
                }
            }
            match driver.subscribe(&path) {
                Ok(handle) => {
                    self.watched.insert(path.clone(), handle);
                    self.enlist_children(&path, driver, filter, soft);
                }
                Err(e) => soft.push(e),
            }
        }
    }

    /// Retire a directory and every watch beneath it. Late driver events
    /// for retired directories fail the relevance check and are dropped.
    pub fn retire(&mut self, dir: &Path, driver: &mut dyn Driver) {
        let doomed: Vec<PathBuf> = self
            .watched
            .range(dir.to_path_buf()..)
            .take_while(|(path, _)| path.starts_with(dir))
            .map(|(path, _)| path.clone())
            .collect();
        for path in doomed {
            if let Some(handle) = self.watched.remove(&path) {
                if let Err(e) = driver.unsubscribe(&handle) {
                    trace!("unsubscribe {}: {}", path.display(), e);
                }
                debug!("retired {}", path.display());
            }
        }
    }

    /// Drop every watch. Used on close.
    pub fn retire_all(&mut self, driver: &mut dyn Driver) {
        for (path, handle) in std::mem::take(&mut self.watched) {
            if let Err(e) = driver.unsubscribe(&handle) {
                trace!("unsubscribe {}: {}", path.display(), e);
            }
        }
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains_key(dir)
    }

    /// Whether an event path can still originate from a live watch. Only
    /// meaningful under emulation; a natively recursive driver has no
    /// retired watches to race against.
    pub fn is_relevant(&self, path: &Path) -> bool {
        if !self.emulate {
            return true;
        }
        self.watched.contains_key(path)
            || path
                .parent()
                .is_some_and(|parent| self.watched.contains_key(parent))
    }

    pub fn watched_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.watched.keys()
    }
}
