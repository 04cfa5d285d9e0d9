//! Watch configuration and target normalization

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::event::PathEncoding;
use crate::filter::Filter;

/// Default debounce window in milliseconds
pub const DEFAULT_DELAY_MS: u64 = 200;

/// Configuration for a watch call
///
/// Fields are public and the struct is `Default`, matching a plain
/// configuration-object style; the `with_*` helpers exist for call-site
/// chaining.
#[derive(Debug)]
pub struct WatchOptions {
    /// Watch subdirectories
    pub recursive: bool,
    /// Debounce window; events for the same path and kind within the
    /// window collapse to one
    pub delay: Duration,
    /// Textual form of paths handed to callbacks
    pub encoding: PathEncoding,
    /// Path filter, evaluated below each root target
    pub filter: Filter,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            encoding: PathEncoding::Utf8,
            filter: Filter::accept_all(),
        }
    }
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Debounce window in milliseconds. Delays are unsigned, so a negative
    /// delay is unrepresentable rather than rejected at run time.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn with_encoding(mut self, encoding: PathEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Parse and set an encoding by name, failing fast on unknown names
    pub fn with_encoding_name(mut self, name: &str) -> Result<Self> {
        self.encoding = name.parse()?;
        Ok(self)
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// Normalization of user-supplied targets into an ordered path list
///
/// A single path becomes a one-element collection internally; byte inputs
/// are decoded with the host path encoding.
pub trait IntoTargets {
    fn into_targets(self) -> Result<Vec<PathBuf>>;
}

impl IntoTargets for PathBuf {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(vec![self])
    }
}

impl IntoTargets for &Path {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(vec![self.to_path_buf()])
    }
}

impl IntoTargets for &str {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(vec![PathBuf::from(self)])
    }
}

impl IntoTargets for String {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(vec![PathBuf::from(self)])
    }
}

impl IntoTargets for &[u8] {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(vec![path_from_bytes(self)?])
    }
}

impl IntoTargets for Vec<u8> {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(vec![path_from_bytes(&self)?])
    }
}

impl IntoTargets for Vec<PathBuf> {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(self)
    }
}

impl IntoTargets for &[PathBuf] {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(self.to_vec())
    }
}

impl IntoTargets for Vec<String> {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(self.into_iter().map(PathBuf::from).collect())
    }
}

impl IntoTargets for Vec<&str> {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(self.into_iter().map(PathBuf::from).collect())
    }
}

impl<const N: usize> IntoTargets for [&str; N] {
    fn into_targets(self) -> Result<Vec<PathBuf>> {
        Ok(self.into_iter().map(PathBuf::from).collect())
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> Result<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    Ok(PathBuf::from(OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> Result<PathBuf> {
    // Non-unix hosts have no raw-byte path form; require valid UTF-8.
    let s = std::str::from_utf8(bytes)
        .map_err(|_| crate::error::WatchError::invalid("byte target is not valid UTF-8"))?;
    Ok(PathBuf::from(s))
}
