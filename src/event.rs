//! Public event vocabulary: change kinds, path encodings, and the rendered
//! path views handed to callbacks.
//!
//! Paths travel through the pipeline in their canonical byte form
//! (`PathBuf`); conversion to the configured view happens once, at emission.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Kind of a classified change event.
///
/// Create and modify are intentionally not distinguished; both surface as
/// `Update`. A path that no longer exists surfaces as `Remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Update,
    Remove,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Remove => write!(f, "remove"),
        }
    }
}

/// Textual form paths take when handed to the change callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathEncoding {
    /// Lossy UTF-8 text (default)
    #[default]
    Utf8,
    /// Raw path bytes
    Buffer,
    /// Base64 text over the raw bytes
    Base64,
    /// Hex text over the raw bytes
    Hex,
}

impl FromStr for PathEncoding {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "utf8" => Ok(Self::Utf8),
            "buffer" => Ok(Self::Buffer),
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            other => Err(WatchError::invalid(format!(
                "unknown encoding '{other}' (expected utf8, buffer, base64, or hex)"
            ))),
        }
    }
}

/// A path rendered per the watcher's configured encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPath {
    /// Textual rendering (`utf8`, `base64`, `hex`)
    Text(String),
    /// Raw path bytes (`buffer`)
    Bytes(Vec<u8>),
}

impl EventPath {
    /// Render a pipeline path into the configured view
    pub(crate) fn render(path: &Path, encoding: PathEncoding) -> Self {
        let bytes = path.as_os_str().as_encoded_bytes();
        match encoding {
            PathEncoding::Utf8 => Self::Text(path.to_string_lossy().into_owned()),
            PathEncoding::Buffer => Self::Bytes(bytes.to_vec()),
            PathEncoding::Base64 => {
                Self::Text(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            PathEncoding::Hex => Self::Text(hex::encode(bytes)),
        }
    }

    /// Textual form, if this view has one
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bytes(_) => None,
        }
    }

    /// Underlying bytes of the view
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

impl fmt::Display for EventPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}
