//! Typed event router
//!
//! A mapping from event kind to an ordered subscriber list with a single
//! emit path. Ready and close subscribers fire once and are consumed;
//! change and error subscribers persist. Subscriber panics are contained
//! here so one broken callback cannot take the dispatcher down.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::error::WatchError;
use crate::event::{ChangeKind, EventPath};

pub(crate) type ReadyFn = Box<dyn FnOnce() + Send>;
pub(crate) type ChangeFn = Box<dyn FnMut(ChangeKind, &EventPath) + Send>;
pub(crate) type ErrorFn = Box<dyn FnMut(&WatchError) + Send>;
pub(crate) type CloseFn = Box<dyn FnOnce() + Send>;

/// A lifecycle or change event flowing to subscribers
pub(crate) enum Emitted {
    Ready,
    Change(ChangeKind, EventPath),
    Error(WatchError),
    Close,
}

#[derive(Default)]
pub(crate) struct EventRouter {
    ready: Vec<ReadyFn>,
    change: Vec<ChangeFn>,
    error: Vec<ErrorFn>,
    close: Vec<CloseFn>,
}

impl EventRouter {
    pub fn subscribe_ready(&mut self, f: ReadyFn) {
        self.ready.push(f);
    }

    pub fn subscribe_change(&mut self, f: ChangeFn) {
        self.change.push(f);
    }

    pub fn subscribe_error(&mut self, f: ErrorFn) {
        self.error.push(f);
    }

    pub fn subscribe_close(&mut self, f: CloseFn) {
        self.close.push(f);
    }

    pub fn has_error_subscribers(&self) -> bool {
        !self.error.is_empty()
    }

    /// Dispatch one event to its subscriber list. A panic from a ready or
    /// change subscriber is returned for reporting; panics from error and
    /// close subscribers are only logged, emitting again from there would
    /// loop.
    pub fn emit(&mut self, event: Emitted) -> Option<WatchError> {
        let mut contained = None;
        match event {
            Emitted::Ready => {
                for f in self.ready.drain(..) {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
                        contained = Some(WatchError::callback_panic("ready callback", payload));
                    }
                }
            }
            Emitted::Change(kind, path) => {
                for f in self.change.iter_mut() {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(kind, &path))) {
                        contained = Some(WatchError::callback_panic("change callback", payload));
                    }
                }
            }
            Emitted::Error(error) => {
                for f in self.error.iter_mut() {
                    if catch_unwind(AssertUnwindSafe(|| f(&error))).is_err() {
                        warn!("error callback panicked");
                    }
                }
            }
            Emitted::Close => {
                for f in self.close.drain(..) {
                    if catch_unwind(AssertUnwindSafe(f)).is_err() {
                        warn!("close callback panicked");
                    }
                }
            }
        }
        contained
    }
}
