//! Integration tests for treewatch
//!
//! These drive the real notify backend against temporary directories, so
//! they assert the timing-robust forms of the event guarantees; the exact
//! timing properties are covered by the deterministic in-crate tests.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use treewatch::{watch, watch_with, ChangeKind, Filter, Verdict, WatchOptions, Watcher};

// =============================================================================
// Helpers
// =============================================================================

type Event = (ChangeKind, String);

fn watch_collecting(
    target: PathBuf,
    options: WatchOptions,
) -> (Watcher, Receiver<Event>) {
    let (tx, rx) = mpsc::channel();
    let watcher = watch_with(target, options, move |kind, path| {
        let _ = tx.send((kind, path.to_string()));
    })
    .expect("watcher starts");
    wait_ready(&watcher);
    (watcher, rx)
}

fn wait_ready(watcher: &Watcher) {
    let (tx, rx) = mpsc::channel();
    watcher.on_ready(move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(10)).expect("ready event");
}

/// Wait for an event matching the predicate, skipping unrelated noise
/// (parent-directory updates and the like).
fn expect_event(
    rx: &Receiver<Event>,
    secs: u64,
    mut matches: impl FnMut(&ChangeKind, &str) -> bool,
) -> Event {
    let deadline = Instant::now() + Duration::from_secs(secs);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((kind, path)) => {
                if matches(&kind, path.as_str()) {
                    return (kind, path);
                }
            }
            Err(_) => panic!("expected event did not arrive within {secs}s"),
        }
    }
}

fn collect_for(rx: &Receiver<Event>, window: Duration) -> Vec<Event> {
    let deadline = Instant::now() + window;
    let mut events = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return events;
        }
        if let Ok(event) = rx.recv_timeout(remaining) {
            events.push(event);
        }
    }
}

fn append(path: &Path, data: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(data).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Directory watching
// =============================================================================

#[test]
fn test_modifying_a_file_reports_update() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("note.txt");
    File::create(&file).unwrap();

    let (_watcher, rx) = watch_collecting(
        tmp.path().to_path_buf(),
        WatchOptions::new().with_delay_ms(50),
    );

    append(&file, b"hello");
    let (kind, path) = expect_event(&rx, 10, |_, p| p.ends_with("note.txt"));
    assert_eq!(kind, ChangeKind::Update);
    assert!(path.ends_with("note.txt"));
}

#[test]
fn test_removing_a_file_reports_remove() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("doomed.txt");
    File::create(&file).unwrap();

    let (_watcher, rx) = watch_collecting(
        tmp.path().to_path_buf(),
        WatchOptions::new().with_delay_ms(50),
    );

    fs::remove_file(&file).unwrap();
    let (kind, _) = expect_event(&rx, 10, |kind, p| {
        p.ends_with("doomed.txt") && *kind == ChangeKind::Remove
    });
    assert_eq!(kind, ChangeKind::Remove);
}

#[test]
fn test_burst_of_writes_coalesces_into_one_event() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("busy.txt");
    File::create(&file).unwrap();

    let (_watcher, rx) = watch_collecting(
        tmp.path().to_path_buf(),
        WatchOptions::new().with_delay_ms(500),
    );

    let started = Instant::now();
    append(&file, b"one");
    thread::sleep(Duration::from_millis(100));
    append(&file, b"two");

    let (kind, _) = expect_event(&rx, 10, |_, p| p.ends_with("busy.txt"));
    assert_eq!(kind, ChangeKind::Update);
    // both writes fall inside one window, so the event waited it out
    assert!(started.elapsed() >= Duration::from_millis(450));

    let extra = collect_for(&rx, Duration::from_millis(700));
    let repeats: Vec<_> = extra
        .iter()
        .filter(|(_, p)| p.ends_with("busy.txt"))
        .collect();
    assert!(repeats.is_empty(), "burst produced repeats: {repeats:?}");
}

// =============================================================================
// File targets
// =============================================================================

#[test]
fn test_watching_a_single_file() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("target.txt");
    let sibling = tmp.path().join("sibling.txt");
    File::create(&file).unwrap();
    File::create(&sibling).unwrap();

    // a small window folds platforms that report a write as several raw
    // notifications into one event per modification
    let (_watcher, rx) =
        watch_collecting(file.clone(), WatchOptions::new().with_delay_ms(50));

    // sibling traffic in the same directory stays invisible
    append(&sibling, b"noise");
    for _ in 0..3 {
        append(&file, b"x");
        thread::sleep(Duration::from_millis(100));
    }

    let events = collect_for(&rx, Duration::from_secs(2));
    assert!(!events.is_empty(), "no events for the watched file");
    assert!(events.len() <= 3, "more events than modifications: {events:?}");
    for (kind, path) in &events {
        assert_eq!(*kind, ChangeKind::Update);
        assert!(path.ends_with("target.txt"), "leaked {path}");
    }
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn test_recursive_watch_follows_new_directories() {
    let tmp = TempDir::new().unwrap();

    let (_watcher, rx) = watch_collecting(
        tmp.path().to_path_buf(),
        WatchOptions::new().with_recursive(true).with_delay_ms(0),
    );

    let fresh = tmp.path().join("fresh");
    fs::create_dir(&fresh).unwrap();
    let inner = fresh.join("f1.txt");
    // give the watcher a beat to enlist the new directory
    thread::sleep(Duration::from_millis(300));
    File::create(&inner).unwrap();
    thread::sleep(Duration::from_millis(100));
    append(&inner, b"data");

    let (kind, _) = expect_event(&rx, 10, |_, p| p.ends_with("f1.txt"));
    assert_eq!(kind, ChangeKind::Update);
}

#[test]
fn test_watched_paths_covers_the_tree() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("keep/deep")).unwrap();
    fs::create_dir_all(tmp.path().join("skipme")).unwrap();

    let options = WatchOptions::new()
        .with_recursive(true)
        .with_filter(Filter::predicate(|path, skip| {
            if path.ends_with("skipme") {
                skip.subtree()
            } else {
                Verdict::Accept
            }
        }));
    let watcher = watch(tmp.path().to_path_buf(), options).unwrap();
    wait_ready(&watcher);

    let (tx, rx) = mpsc::channel();
    watcher.watched_paths(move |paths| {
        let _ = tx.send(paths);
    });
    let watched = rx.recv_timeout(Duration::from_secs(10)).unwrap();

    assert!(watched.iter().any(|p| p.ends_with(tmp.path().file_name().unwrap())));
    // the pruned subtree never shows up, natively recursive or not
    assert!(!watched.iter().any(|p| p.ends_with("skipme")));
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_filtered_subtree_stays_silent() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("ignored")).unwrap();

    let options = WatchOptions::new()
        .with_recursive(true)
        .with_delay_ms(0)
        .with_filter(Filter::predicate(|path, skip| {
            if path.to_string_lossy().contains("ignored") {
                skip.subtree()
            } else {
                Verdict::Accept
            }
        }));
    let (_watcher, rx) = watch_collecting(tmp.path().to_path_buf(), options);

    let inside = tmp.path().join("ignored/file.txt");
    File::create(&inside).unwrap();
    append(&inside, b"quiet");

    let events = collect_for(&rx, Duration::from_millis(500));
    let leaked: Vec<_> = events
        .iter()
        .filter(|(_, p)| p.contains("ignored"))
        .collect();
    assert!(leaked.is_empty(), "filtered paths leaked: {leaked:?}");
}

// =============================================================================
// Errors and teardown
// =============================================================================

#[test]
fn test_watching_a_missing_path_reports_does_not_exist() {
    let tmp = TempDir::new().unwrap();
    let gone = tmp.path().join("never-created");

    let watcher = watch(gone, WatchOptions::new()).unwrap();

    let (tx, rx) = mpsc::channel();
    watcher.on_error(move |error| {
        let _ = tx.send(format!("{error}"));
    });
    let message = rx.recv_timeout(Duration::from_secs(10)).expect("error event");
    assert!(message.contains("does not exist"), "got: {message}");

    let (tx, rx) = mpsc::channel();
    watcher.on_close(move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(10)).expect("close event");
    assert!(watcher.is_closed());
}

#[test]
fn test_close_silences_the_watcher() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("f.txt");
    File::create(&file).unwrap();

    let (watcher, rx) = watch_collecting(
        tmp.path().to_path_buf(),
        WatchOptions::new().with_delay_ms(0),
    );

    watcher.close();
    assert!(watcher.is_closed());
    watcher.close(); // idempotent

    append(&file, b"after close");
    let events = collect_for(&rx, Duration::from_millis(500));
    assert!(events.is_empty(), "events after close: {events:?}");

    let (tx, rx) = mpsc::channel();
    watcher.watched_paths(move |paths| {
        let _ = tx.send(paths);
    });
    assert!(rx.recv_timeout(Duration::from_secs(10)).unwrap().is_empty());
}

#[test]
fn test_dropping_the_handle_stops_events() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("f.txt");
    File::create(&file).unwrap();

    let (watcher, rx) = watch_collecting(
        tmp.path().to_path_buf(),
        WatchOptions::new().with_delay_ms(0),
    );
    drop(watcher);

    append(&file, b"after drop");
    let events = collect_for(&rx, Duration::from_millis(500));
    assert!(events.is_empty(), "events after drop: {events:?}");
}
