//! Filter protocol: accept, reject, or skip a whole subtree
//!
//! The pattern and predicate forms are normalized into one shape at
//! construction; the pipeline only ever sees `evaluate`. `skip-subtree` is
//! the one verdict with side effects beyond emission: it also keeps the
//! subtree manager from enlisting the directory.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use regex::Regex;

use crate::error::{Result, WatchError};

/// Outcome of evaluating a filter against a candidate path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Emit events for the path; enlist it when it is a directory
    Accept,
    /// Suppress events for the path; children stay eligible
    Reject,
    /// Suppress the path and everything below it, including enlistment
    SkipSubtree,
}

impl From<bool> for Verdict {
    fn from(accept: bool) -> Self {
        if accept {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

/// Token handed to every predicate invocation; the only way to produce a
/// skip-subtree verdict.
#[derive(Debug, Clone, Copy)]
pub struct Skip(());

impl Skip {
    /// Exclude this directory and all of its descendants
    pub fn subtree(self) -> Verdict {
        Verdict::SkipSubtree
    }
}

type Predicate = Box<dyn Fn(&Path, Skip) -> Verdict + Send>;

/// Path filter attached to a root
pub struct Filter(Inner);

enum Inner {
    AcceptAll,
    Pattern(Regex),
    Predicate(Predicate),
}

impl Filter {
    /// Filter that accepts every path
    pub fn accept_all() -> Self {
        Self(Inner::AcceptAll)
    }

    /// Accept paths whose lossy UTF-8 form matches the pattern
    pub fn pattern(pattern: Regex) -> Self {
        Self(Inner::Pattern(pattern))
    }

    /// Custom predicate. Return `Verdict::from(bool)` to accept or reject,
    /// or `skip.subtree()` to prune a directory tree.
    pub fn predicate(f: impl Fn(&Path, Skip) -> Verdict + Send + 'static) -> Self {
        Self(Inner::Predicate(Box::new(f)))
    }

    pub(crate) fn evaluate(&self, path: &Path) -> Verdict {
        match &self.0 {
            Inner::AcceptAll => Verdict::Accept,
            Inner::Pattern(re) => Verdict::from(re.is_match(&path.to_string_lossy())),
            Inner::Predicate(f) => f(path, Skip(())),
        }
    }

    /// Evaluate with panic isolation. A panicking predicate aborts the
    /// current event instead of tearing the dispatcher down.
    pub(crate) fn checked(&self, path: &Path) -> Result<Verdict> {
        catch_unwind(AssertUnwindSafe(|| self.evaluate(path)))
            .map_err(|payload| WatchError::callback_panic("filter predicate", payload))
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl From<Regex> for Filter {
    fn from(pattern: Regex) -> Self {
        Self::pattern(pattern)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Inner::AcceptAll => write!(f, "Filter::AcceptAll"),
            Inner::Pattern(re) => write!(f, "Filter::Pattern({re})"),
            Inner::Predicate(_) => write!(f, "Filter::Predicate"),
        }
    }
}
