//! Filesystem watch task keeping the index synchronized with disk.
//!
//! [`spawn`] builds the initial snapshot synchronously, registers every
//! visible directory with the OS notification source, and starts the one
//! background thread that owns write access to the index. Create and write
//! events regenerate a single article; remove and rename events delete the
//! entry. Per-event failures are logged and dropped, the path stays watched.
//!
//! Shutdown is a close-then-join handshake: [`ContentWatcher::close`]
//! signals the thread and waits for it to exit, so no writer is left
//! dangling.

use crate::article::generate_article;
use crate::index::{ContentIndex, IndexError, is_hidden};
use crate::log;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the event loop wakes up to check the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Handle to the running watch task.
pub struct ContentWatcher {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ContentWatcher {
    /// Signal the watch task and wait for it to exit.
    pub fn close(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            log!("watch"; "watch thread panicked");
        }
    }
}

/// Scan the index's content root, register its directories for change
/// notifications, and spawn the watch task.
///
/// The initial snapshot is complete before this returns, so reads are
/// serviceable immediately. Failure to create the watcher or register a
/// directory is fatal: without a working notification source the index
/// would silently go stale.
pub fn spawn(index: ContentIndex) -> Result<ContentWatcher, IndexError> {
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)
        .map_err(|err| IndexError::Watch(index.root().to_path_buf(), err))?;

    let directories = index.scan()?;
    for dir in &directories {
        // Only directories are watched; files report through their parent.
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|err| IndexError::Watch(dir.clone(), err))?;
    }
    log!("watch"; "watching {} directories under {}", directories.len(), index.root().display());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = std::thread::spawn(move || run(watcher, rx, index, flag));

    Ok(ContentWatcher { shutdown, handle })
}

/// Event loop. Sole writer to the index for its whole lifetime.
fn run(
    mut watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    index: ContentIndex,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match rx.recv_timeout(SHUTDOWN_POLL) {
            Ok(Ok(event)) => handle_event(&mut watcher, &index, event),
            Ok(Err(err)) => log!("watch"; "error: {err}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn handle_event(watcher: &mut RecommendedWatcher, index: &ContentIndex, event: Event) {
    match event.kind {
        // A tracked rename carries both names in one event.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            remove_path(index, &event.paths[0]);
            upsert_path(watcher, index, &event.paths[1]);
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                remove_path(index, path);
            }
        }
        EventKind::Create(_) | EventKind::Modify(_) => {
            for path in &event.paths {
                upsert_path(watcher, index, path);
            }
        }
        _ => {}
    }
}

/// Handle a created or written path: register new directories, regenerate
/// articles for files. Disk I/O and rendering happen here, before the map
/// swap inside `install`.
fn upsert_path(watcher: &mut RecommendedWatcher, index: &ContentIndex, path: &Path) {
    if is_hidden(path) {
        return;
    }

    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            log!("watch"; "op=stat status=fail path={} err={err}", path.display());
            return;
        }
    };

    if meta.is_dir() {
        if let Err(err) = watcher.watch(path, RecursiveMode::NonRecursive) {
            log!("watch"; "op=watch status=fail path={} err={err}", path.display());
        }
        return;
    }

    let article = generate_article(index.root(), path);
    match article.err() {
        None => log!("watch"; "op=upsert status=ok route={}", article.route),
        Some(err) => log!("watch"; "op=upsert status=fail route={} err={err}", article.route),
    }
    index.install(article);
}

fn remove_path(index: &ContentIndex, path: &Path) {
    if is_hidden(path) {
        return;
    }

    log!("watch"; "op=delete path={}", path.display());
    index.remove(path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Details;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;

    fn write_file(root: &Path, name: &str, contents: &str) -> PathBuf {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    /// Poll until the predicate holds or a generous timeout expires.
    /// Notification delivery is asynchronous by nature.
    fn eventually(mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn test_watch_observes_create_write_remove() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "initial.md", "Title: Initial\n=== text ===\nx\n");

        let index = ContentIndex::new(dir.path().to_path_buf(), Details::default());
        let watcher = spawn(index.clone()).unwrap();

        // Present from the synchronous startup scan.
        assert_eq!(index.get("/initial.md").unwrap().title, "Initial");

        let created = write_file(dir.path(), "new.md", "Title: New\n=== text ===\nx\n");
        assert!(eventually(|| index.get("/new.md").is_ok()));

        write_file(dir.path(), "new.md", "Title: Edited\n=== text ===\nx\n");
        assert!(eventually(|| {
            index
                .get("/new.md")
                .is_ok_and(|article| article.title == "Edited")
        }));

        fs::remove_file(&created).unwrap();
        assert!(eventually(|| index.get("/new.md").is_err()));

        watcher.close();
    }

    #[test]
    fn test_watch_ignores_hidden_files() {
        let dir = TempDir::new().unwrap();

        let index = ContentIndex::new(dir.path().to_path_buf(), Details::default());
        let watcher = spawn(index.clone()).unwrap();

        write_file(dir.path(), ".hidden.md", "Title: H\n=== text ===\nx\n");
        // A visible sibling written afterwards serves as the fence: once it
        // shows up, the hidden file's event has been processed (and dropped).
        write_file(dir.path(), "visible.md", "Title: V\n=== text ===\nx\n");

        assert!(eventually(|| index.get("/visible.md").is_ok()));
        assert!(index.get("/.hidden.md").is_err());

        watcher.close();
    }

    #[test]
    fn test_watch_picks_up_new_directories() {
        let dir = TempDir::new().unwrap();

        let index = ContentIndex::new(dir.path().to_path_buf(), Details::default());
        let watcher = spawn(index.clone()).unwrap();

        fs::create_dir(dir.path().join("sub")).unwrap();
        // Give the loop a moment to register the new directory before
        // writing into it.
        std::thread::sleep(Duration::from_millis(200));
        write_file(dir.path(), "sub/inner.md", "Title: Inner\n=== text ===\nx\n");

        assert!(eventually(|| index.get("/sub/inner.md").is_ok()));

        watcher.close();
    }

    #[test]
    fn test_close_joins_the_task() {
        let dir = TempDir::new().unwrap();
        let index = ContentIndex::new(dir.path().to_path_buf(), Details::default());

        let watcher = spawn(index).unwrap();
        // Returns only after the thread has exited.
        watcher.close();
    }
}
