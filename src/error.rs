//! Unified error types for treewatch
//!
//! Provides a consistent error handling approach across all modules.

use std::path::PathBuf;

/// Unified error type for watcher operations
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Malformed options or targets, reported synchronously from `watch`
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A supplied target path was absent when the watcher started
    #[error("{}: path does not exist", .path.display())]
    TargetMissing { path: PathBuf },

    /// Enlisting a directory with the platform driver failed
    #[error("failed to watch {}: {reason}", .path.display())]
    Subscription { path: PathBuf, reason: String },

    /// The platform driver was lost and cannot recover
    #[error("watch backend failed: {0}")]
    Driver(String),

    /// A user-supplied filter or callback panicked
    #[error("callback error: {0}")]
    Callback(String),

    /// I/O errors (path resolution, metadata probes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using WatchError
pub type Result<T> = std::result::Result<T, WatchError>;

impl WatchError {
    /// Create an InvalidArgument error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a TargetMissing error
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::TargetMissing { path: path.into() }
    }

    /// Create a Subscription error
    pub fn subscription(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Subscription {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a Driver error
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    /// Create a Callback error from a panic payload
    pub fn callback_panic(context: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Callback(format!("{context} panicked: {detail}"))
    }

    /// Whether this error tears the watcher down when it surfaces mid-life
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Driver(_) | Self::TargetMissing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_missing_message() {
        // Callers match on the substring "does not exist"; keep it stable.
        let err = WatchError::missing("/no/such/dir");
        let msg = format!("{}", err);
        assert!(msg.contains("does not exist"), "got: {msg}");
        assert!(msg.contains("/no/such/dir"));
    }

    #[test]
    fn test_subscription_message() {
        let err = WatchError::subscription("/tmp/a", "permission denied");
        assert_eq!(
            format!("{}", err),
            "failed to watch /tmp/a: permission denied"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(WatchError::driver("gone").is_fatal());
        assert!(WatchError::missing("/x").is_fatal());
        assert!(!WatchError::subscription("/x", "busy").is_fatal());
        assert!(!WatchError::invalid("bad encoding").is_fatal());
    }

    #[test]
    fn test_callback_panic_payloads() {
        let err = WatchError::callback_panic("filter predicate", Box::new("boom"));
        assert_eq!(
            format!("{}", err),
            "callback error: filter predicate panicked: boom"
        );

        let err = WatchError::callback_panic("change callback", Box::new(String::from("oops")));
        assert!(format!("{}", err).contains("oops"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WatchError = io_err.into();
        assert!(matches!(err, WatchError::Io(_)));
    }
}
