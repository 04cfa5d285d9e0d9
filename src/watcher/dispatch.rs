//! Dispatcher: the single serial owner of every root
//!
//! One thread receives driver payloads and control commands over one
//! channel, runs the classify, filter, debounce, compose pipeline, and
//! invokes every user callback. Debounce timers double as the channel
//! receive deadline; there is no second timing thread and no lock is held
//! across a callback.

use std::collections::BTreeSet;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::classify::classify;
use crate::compose::Composer;
use crate::debounce::{Debouncer, Flush};
use crate::driver::{Driver, DriverPayload, DriverSink, RawEvent};
use crate::error::{Result, WatchError};
use crate::event::{ChangeKind, EventPath, PathEncoding};
use crate::filter::{Filter, Verdict};
use crate::options::WatchOptions;
use crate::router::{ChangeFn, CloseFn, Emitted, ErrorFn, EventRouter, ReadyFn};
use crate::subtree::SubtreeManager;

/// Everything that reaches the dispatcher travels through one channel
pub(crate) enum Msg {
    Driver { root: usize, payload: DriverPayload },
    Control(Command),
}

pub(crate) enum Command {
    OnReady(ReadyFn),
    OnChange(ChangeFn),
    OnError(ErrorFn),
    OnClose(CloseFn),
    WatchedPaths(Box<dyn FnOnce(Vec<PathBuf>) + Send>),
    Close { ack: Option<Sender<()>> },
}

/// Builds one driver per root; the flag is the user's recursion request
pub(crate) type DriverFactory =
    Box<dyn FnMut(bool, DriverSink) -> Result<Box<dyn Driver>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Ready,
    Closed,
}

struct Root {
    target: PathBuf,
    is_file: bool,
    driver: Box<dyn Driver>,
    subtree: SubtreeManager,
    debounce: Debouncer,
}

enum Wait {
    Msg(Msg),
    TimerDue,
    Disconnected,
}

pub(crate) struct Dispatcher {
    rx: Receiver<Msg>,
    /// Cloned into driver sinks during initialization, then dropped so the
    /// channel disconnects once every handle is gone
    tx: Option<Sender<Msg>>,
    factory: DriverFactory,
    targets: Vec<PathBuf>,
    recursive: bool,
    delay: Duration,
    encoding: PathEncoding,
    filter: Filter,
    roots: Vec<Root>,
    router: EventRouter,
    composer: Composer,
    closed: Arc<AtomicBool>,
    phase: Phase,
    ready_emitted: bool,
    close_emitted: bool,
    /// Errors emitted before any error subscriber attached, replayed to the
    /// first one
    unseen_errors: Vec<WatchError>,
    seq: u64,
}

impl Dispatcher {
    pub fn new(
        rx: Receiver<Msg>,
        tx: Sender<Msg>,
        targets: Vec<PathBuf>,
        options: WatchOptions,
        on_change: Option<ChangeFn>,
        closed: Arc<AtomicBool>,
        factory: DriverFactory,
    ) -> Self {
        let mut router = EventRouter::default();
        if let Some(f) = on_change {
            router.subscribe_change(f);
        }
        let delay = options.delay;
        Self {
            rx,
            tx: Some(tx),
            factory,
            targets,
            recursive: options.recursive,
            delay,
            encoding: options.encoding,
            filter: options.filter,
            roots: Vec::new(),
            router,
            composer: Composer::new(delay),
            closed,
            phase: Phase::Initializing,
            ready_emitted: false,
            close_emitted: false,
            unseen_errors: Vec::new(),
            seq: 0,
        }
    }

    pub fn run(mut self) {
        if let Some(tx) = self.tx.take() {
            self.initialize(&tx);
        }
        while self.phase != Phase::Closed {
            match self.wait_next() {
                Wait::Msg(msg) => {
                    self.handle(msg);
                    self.drain();
                }
                Wait::TimerDue => {}
                Wait::Disconnected => {
                    // every handle is gone, tear down silently
                    self.close_now(None);
                    break;
                }
            }
            if self.phase != Phase::Closed {
                self.flush_due();
            }
        }
        self.serve_after_close();
    }

    /// Resolve and start every root, then emit `ready`. A failing root
    /// closes the watcher after surfacing its error.
    fn initialize(&mut self, tx: &Sender<Msg>) {
        let targets = std::mem::take(&mut self.targets);
        for target in targets {
            let idx = self.roots.len();
            match self.start_root(idx, target, tx) {
                Ok(soft) => {
                    for error in soft {
                        self.report(error);
                    }
                }
                Err(error) => {
                    self.report(error);
                    self.close_now(None);
                    return;
                }
            }
            if self.phase == Phase::Closed {
                return;
            }
        }
        self.phase = Phase::Ready;
        self.ready_emitted = true;
        debug!("watcher ready, {} root(s)", self.roots.len());
        if let Some(error) = self.router.emit(Emitted::Ready) {
            self.report(error);
        }
    }

    fn start_root(
        &mut self,
        idx: usize,
        target: PathBuf,
        tx: &Sender<Msg>,
    ) -> Result<Vec<WatchError>> {
        let meta = fs::symlink_metadata(&target).map_err(|_| WatchError::missing(&target))?;
        let is_file = !meta.is_dir();
        let base = if is_file {
            target
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| target.clone())
        } else {
            target.clone()
        };

        let sink: DriverSink = {
            let tx = tx.clone();
            Box::new(move |payload| {
                let _ = tx.send(Msg::Driver { root: idx, payload });
            })
        };
        let mut driver = (self.factory)(self.recursive, sink)?;
        let emulate = self.recursive && !driver.native_recursive() && !is_file;
        let mut subtree = SubtreeManager::new(base, emulate);
        let soft = subtree.start(driver.as_mut(), &self.filter)?;
        debug!("root {} watching {}", idx, target.display());
        self.roots.push(Root {
            target,
            is_file,
            driver,
            subtree,
            debounce: Debouncer::new(self.delay),
        });
        Ok(soft)
    }

    fn wait_next(&mut self) -> Wait {
        match self.next_deadline() {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    match self.rx.try_recv() {
                        Ok(msg) => Wait::Msg(msg),
                        Err(TryRecvError::Empty) => Wait::TimerDue,
                        Err(TryRecvError::Disconnected) => Wait::Disconnected,
                    }
                } else {
                    match self.rx.recv_timeout(deadline - now) {
                        Ok(msg) => Wait::Msg(msg),
                        Err(RecvTimeoutError::Timeout) => Wait::TimerDue,
                        Err(RecvTimeoutError::Disconnected) => Wait::Disconnected,
                    }
                }
            }
            None => match self.rx.recv() {
                Ok(msg) => Wait::Msg(msg),
                Err(_) => Wait::Disconnected,
            },
        }
    }

    /// Exhaust whatever is already queued. One drain is one dispatch turn;
    /// zero-delay windows collapse within it.
    fn drain(&mut self) {
        while self.phase != Phase::Closed {
            match self.rx.try_recv() {
                Ok(msg) => self.handle(msg),
                Err(_) => break,
            }
        }
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Driver { root, payload } => match payload {
                Ok(raw) => self.process_raw(root, raw),
                // stream loss is fatal; report() closes on fatal errors
                Err(error) => self.report(error),
            },
            Msg::Control(cmd) => self.handle_command(cmd),
        }
    }

    fn process_raw(&mut self, idx: usize, raw: RawEvent) {
        if self.phase == Phase::Closed || self.closed.load(Ordering::SeqCst) {
            return;
        }
        if idx >= self.roots.len() {
            return;
        }
        let classified = classify(&raw);
        {
            let root = &self.roots[idx];
            if !root.subtree.is_relevant(&classified.path) {
                trace!("dropping stale event for {}", classified.path.display());
                return;
            }
            if !in_scope(root.is_file, &root.target, self.recursive, &classified.path) {
                return;
            }
        }

        // The filter never applies to the target itself; asking to watch a
        // path is taken as intent to observe it.
        let verdict = if classified.path == self.roots[idx].target {
            Verdict::Accept
        } else {
            match self.filter.checked(&classified.path) {
                Ok(verdict) => verdict,
                Err(error) => {
                    self.report(error);
                    return;
                }
            }
        };

        // recursion emulation reacts before the event debounces
        match classified.kind {
            ChangeKind::Update if classified.is_dir => {
                if verdict != Verdict::SkipSubtree {
                    let filter = &self.filter;
                    let root = &mut self.roots[idx];
                    let soft =
                        root.subtree
                            .enlist(&classified.path, root.driver.as_mut(), filter);
                    for error in soft {
                        self.report(error);
                    }
                }
            }
            ChangeKind::Remove => {
                let root = &mut self.roots[idx];
                if root.subtree.is_watched(&classified.path) {
                    root.subtree.retire(&classified.path, root.driver.as_mut());
                }
            }
            _ => {}
        }

        if verdict != Verdict::Accept {
            return;
        }
        self.seq += 1;
        let seq = self.seq;
        let now = Instant::now();
        if let Some(flush) =
            self.roots[idx]
                .debounce
                .note(classified.path, classified.kind, now, seq)
        {
            // kind flipped under an open window: the old entry goes first
            self.deliver(flush, now);
        }
    }

    fn deliver(&mut self, flush: Flush, now: Instant) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let covering = self
            .roots
            .iter()
            .filter(|root| flush.path.starts_with(&root.target))
            .count();
        let is_dir = flush.path.is_dir();
        if !self
            .composer
            .admit(&flush.path, flush.kind, is_dir, covering > 1, now)
        {
            return;
        }
        let view = EventPath::render(&flush.path, self.encoding);
        trace!("change {} {}", flush.kind, flush.path.display());
        if let Some(error) = self.router.emit(Emitted::Change(flush.kind, view)) {
            self.report(error);
        }
    }

    fn flush_due(&mut self) {
        let now = Instant::now();
        let mut due: Vec<Flush> = Vec::new();
        for root in self.roots.iter_mut() {
            due.extend(root.debounce.take_due(now));
        }
        due.sort_by(|a, b| (a.at, a.seq).cmp(&(b.at, b.seq)));
        for flush in due {
            self.deliver(flush, now);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.roots
            .iter()
            .filter_map(|root| root.debounce.next_deadline())
            .min()
    }

    fn report(&mut self, error: WatchError) {
        warn!("watch error: {error}");
        let fatal = error.is_fatal();
        if self.router.has_error_subscribers() {
            self.router.emit(Emitted::Error(error));
        } else {
            self.unseen_errors.push(error);
        }
        if fatal && self.phase != Phase::Closed {
            self.close_now(None);
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::OnReady(f) => {
                if self.ready_emitted {
                    if catch_unwind(AssertUnwindSafe(f)).is_err() {
                        warn!("ready callback panicked");
                    }
                } else {
                    self.router.subscribe_ready(f);
                }
            }
            Command::OnChange(f) => self.router.subscribe_change(f),
            Command::OnError(mut f) => {
                for error in self.unseen_errors.drain(..) {
                    if catch_unwind(AssertUnwindSafe(|| f(&error))).is_err() {
                        warn!("error callback panicked");
                    }
                }
                self.router.subscribe_error(f);
            }
            Command::OnClose(f) => {
                if self.close_emitted {
                    if catch_unwind(AssertUnwindSafe(f)).is_err() {
                        warn!("close callback panicked");
                    }
                } else {
                    self.router.subscribe_close(f);
                }
            }
            Command::WatchedPaths(f) => {
                // commands queue behind initialization, so this always
                // observes a post-enumeration watched set
                let paths = self.watched_union();
                if catch_unwind(AssertUnwindSafe(move || f(paths))).is_err() {
                    warn!("watched-paths callback panicked");
                }
            }
            Command::Close { ack } => self.close_now(ack),
        }
    }

    fn watched_union(&self) -> Vec<PathBuf> {
        let mut union = BTreeSet::new();
        for root in &self.roots {
            union.extend(root.subtree.watched_dirs().cloned());
        }
        union.into_iter().collect()
    }

    fn close_now(&mut self, ack: Option<Sender<()>>) {
        if self.phase != Phase::Closed {
            self.phase = Phase::Closed;
            self.closed.store(true, Ordering::SeqCst);
            for root in &mut self.roots {
                // in-flight windows are cancelled, not flushed
                root.debounce.clear();
                root.subtree.retire_all(root.driver.as_mut());
            }
            // drops the drivers and with them their sink senders
            self.roots.clear();
            self.composer.clear();
            if !self.close_emitted {
                self.close_emitted = true;
                self.router.emit(Emitted::Close);
            }
            debug!("watcher closed");
        }
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Keep answering control commands (lifecycle replay, watched-paths,
    /// repeat closes) until every handle is dropped.
    fn serve_after_close(&mut self) {
        while let Ok(msg) = self.rx.recv() {
            if let Msg::Control(cmd) = msg {
                self.handle_command(cmd);
            }
        }
    }
}

/// Whether a classified path belongs to a root's reporting scope
fn in_scope(is_file: bool, target: &Path, recursive: bool, path: &Path) -> bool {
    if is_file {
        return path == target;
    }
    if path == target {
        return true;
    }
    if recursive {
        path.starts_with(target)
    } else {
        path.parent() == Some(target)
    }
}
