//! Watcher facade: lifecycle, subscriptions, and the public entry points
//!
//! `watch` resolves targets, spawns the dispatcher thread, and hands back a
//! `Watcher` handle. Every user callback runs on the dispatcher thread, one
//! at a time; the handle only posts commands across the channel. Lifecycle
//! events (`ready`, `close`, pre-subscription errors) are replayed to
//! subscribers that attach after the fact, so subscription order across the
//! thread boundary cannot lose a transition.

mod dispatch;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::driver::{native_recursive_default, Driver, NotifyDriver};
use crate::error::{Result, WatchError};
use crate::event::{ChangeKind, EventPath};
use crate::options::{IntoTargets, WatchOptions};
use crate::router::ChangeFn;

use dispatch::{Command, Dispatcher, DriverFactory, Msg};

/// Handle to a running watcher
///
/// Dropping the handle closes the watcher (best effort, without waiting for
/// acknowledgement).
#[derive(Debug)]
pub struct Watcher {
    tx: Sender<Msg>,
    closed: Arc<AtomicBool>,
    dispatcher: ThreadId,
}

/// Watch one or more targets
///
/// Returns synchronously with an `InvalidArgument` error for malformed
/// options or targets. A target missing on disk is not a synchronous
/// failure; it surfaces as an `error` event and the watcher closes.
pub fn watch<T: IntoTargets>(target: T, options: WatchOptions) -> Result<Watcher> {
    spawn(target.into_targets()?, options, None)
}

/// Watch one or more targets and receive change events through `on_change`
pub fn watch_with<T, F>(target: T, options: WatchOptions, on_change: F) -> Result<Watcher>
where
    T: IntoTargets,
    F: FnMut(ChangeKind, &EventPath) + Send + 'static,
{
    spawn(target.into_targets()?, options, Some(Box::new(on_change)))
}

fn spawn(targets: Vec<PathBuf>, options: WatchOptions, on_change: Option<ChangeFn>) -> Result<Watcher> {
    let factory: DriverFactory = Box::new(|recursive, sink| {
        let native = recursive && native_recursive_default();
        NotifyDriver::new(native, sink).map(|driver| Box::new(driver) as Box<dyn Driver>)
    });
    spawn_with(targets, options, on_change, factory)
}

pub(crate) fn spawn_with(
    targets: Vec<PathBuf>,
    options: WatchOptions,
    on_change: Option<ChangeFn>,
    factory: DriverFactory,
) -> Result<Watcher> {
    if targets.is_empty() {
        return Err(WatchError::invalid("no targets supplied"));
    }
    let mut resolved = Vec::with_capacity(targets.len());
    for target in targets {
        resolved.push(std::path::absolute(&target)?);
    }

    let (tx, rx) = mpsc::channel();
    let closed = Arc::new(AtomicBool::new(false));
    let dispatcher = Dispatcher::new(
        rx,
        tx.clone(),
        resolved,
        options,
        on_change,
        Arc::clone(&closed),
        factory,
    );
    let handle = thread::Builder::new()
        .name("treewatch-dispatch".into())
        .spawn(move || dispatcher.run())?;

    Ok(Watcher {
        tx,
        closed,
        dispatcher: handle.thread().id(),
    })
}

impl Watcher {
    /// Run `f` once initial enumeration has completed. Replayed immediately
    /// when the watcher is already past that point.
    pub fn on_ready(&self, f: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Msg::Control(Command::OnReady(Box::new(f))));
    }

    /// Subscribe to change events
    pub fn on_change(&self, f: impl FnMut(ChangeKind, &EventPath) + Send + 'static) {
        let _ = self.tx.send(Msg::Control(Command::OnChange(Box::new(f))));
    }

    /// Subscribe to error events. Errors that fired before the first error
    /// subscriber attached are replayed to it.
    pub fn on_error(&self, f: impl FnMut(&WatchError) + Send + 'static) {
        let _ = self.tx.send(Msg::Control(Command::OnError(Box::new(f))));
    }

    /// Run `f` when the watcher closes; immediately if it already has
    pub fn on_close(&self, f: impl FnOnce() + Send + 'static) {
        if let Err(mpsc::SendError(Msg::Control(Command::OnClose(f)))) = self
            .tx
            .send(Msg::Control(Command::OnClose(Box::new(f))))
        {
            // dispatcher gone, so the close event already fired
            f();
        }
    }

    /// Invoke `f` with the deduplicated union of currently watched
    /// directories. Safe to call before ready; the callback runs after
    /// initial enumeration. After close it observes the empty set.
    pub fn watched_paths(&self, f: impl FnOnce(Vec<PathBuf>) + Send + 'static) {
        if let Err(mpsc::SendError(Msg::Control(Command::WatchedPaths(f)))) = self
            .tx
            .send(Msg::Control(Command::WatchedPaths(Box::new(f))))
        {
            f(Vec::new());
        }
    }

    /// Tear down every watch and cancel pending debounce windows. After
    /// `close` returns no further change event fires; the `close` event is
    /// emitted exactly once however many times this is called.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if thread::current().id() == self.dispatcher {
            // closing from inside a callback: don't wait on ourselves
            let _ = self.tx.send(Msg::Control(Command::Close { ack: None }));
            return;
        }
        let (ack_tx, ack_rx) = mpsc::channel();
        if self
            .tx
            .send(Msg::Control(Command::Close { ack: Some(ack_tx) }))
            .is_ok()
        {
            let _ = ack_rx.recv();
        }
    }

    /// Whether the watcher reached its terminal state
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn raw_sender(&self) -> Sender<Msg> {
        self.tx.clone()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Msg::Control(Command::Close { ack: None }));
        }
    }
}
