//! Debug tool to see the normalized event stream for a directory
//!
//! Run with: cargo run --example watch_events -- [path]
//! Then touch, create, and delete files under the path.
//! Press Enter to quit.

use std::env;
use std::io::stdin;
use std::path::PathBuf;

use treewatch::{watch_with, Filter, Verdict, WatchOptions};

fn main() -> anyhow::Result<()> {
    let root = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or(env::current_dir()?);

    println!("Watching {} recursively.", root.display());
    println!("Touch, create, or delete files to see events. Press Enter to quit.\n");

    let options = WatchOptions::new()
        .with_recursive(true)
        .with_delay_ms(200)
        .with_filter(Filter::predicate(|path, skip| {
            match path.file_name().and_then(|n| n.to_str()) {
                Some(".git") | Some("target") | Some("node_modules") => skip.subtree(),
                _ => Verdict::Accept,
            }
        }));

    let watcher = watch_with(root, options, |kind, path| {
        println!("{kind}: {path}");
    })?;

    watcher.on_ready(|| println!("(ready)"));
    watcher.on_error(|error| println!("error: {error}"));
    watcher.watched_paths(|paths| println!("(watching {} directories)\n", paths.len()));

    let mut line = String::new();
    stdin().read_line(&mut line)?;

    watcher.close();
    println!("closed: {}", watcher.is_closed());

    Ok(())
}
