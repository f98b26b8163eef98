//! The content index.
//!
//! Owns the authoritative mapping from article path to [`Article`]. The map
//! is held as an atomically swapped immutable snapshot: readers load the
//! current `Arc` and never block, the single writer (the watch task, or
//! [`ContentIndex::scan`] at startup) builds a replacement map away from any
//! critical section and installs it with one pointer swap. Every reader sees
//! a complete snapshot, never a half-mutated map.

use crate::article::{Article, article_path, generate_article};
use crate::document::{Document, DocumentError};
use crate::log;
use arc_swap::ArcSwap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Static site-level metadata, immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct Details {
    pub name: String,
    pub description: String,
    pub style: String,
}

/// Index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no article at `{0}`")]
    NotFound(String),

    #[error("failed to serialize document")]
    Document(#[from] DocumentError),

    #[error("failed to write `{0}`")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("failed to walk content root `{0}`")]
    Walk(PathBuf, #[source] walkdir::Error),

    #[error("failed to watch `{0}`")]
    Watch(PathBuf, #[source] notify::Error),
}

type ArticleMap = BTreeMap<String, Article>;

/// Entries whose base name starts with a dot are reserved and excluded from
/// indexing and watching.
pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// A partially built article is still indexed as long as it carries
/// diagnostics or markup, so failures are never silently dropped.
fn admitted(article: &Article) -> bool {
    !article.errors.is_empty() || !article.html.is_empty()
}

/// Concurrently readable index of articles generated from a directory tree.
///
/// Cheaply cloneable; clones share the same underlying map.
#[derive(Clone)]
pub struct ContentIndex {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    details: Details,
    articles: ArcSwap<ArticleMap>,
}

impl ContentIndex {
    /// Create an empty index over a content root. Call
    /// [`scan`](Self::scan) (or hand the index to the watcher, which scans
    /// on startup) to build the first snapshot.
    pub fn new(root: PathBuf, details: Details) -> Self {
        Self {
            inner: Arc::new(Inner {
                root,
                details,
                articles: ArcSwap::from_pointee(ArticleMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Site metadata. Immutable after construction, so no locking.
    pub fn details(&self) -> &Details {
        &self.inner.details
    }

    /// Look up an article by its path key.
    pub fn get(&self, key: &str) -> Result<Article, IndexError> {
        self.inner
            .articles
            .load()
            .get(key)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(key.to_string()))
    }

    /// Look up an article by its extension-stripped route.
    pub fn get_by_route(&self, route: &str) -> Result<Article, IndexError> {
        self.inner
            .articles
            .load()
            .values()
            .find(|article| article.route == route)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(route.to_string()))
    }

    /// All listed articles whose pinned flag matches, newest first.
    ///
    /// Unlisted articles are excluded. The list is sorted by title and then
    /// stably re-sorted by creation date descending, so the title ordering
    /// survives as the tie-breaker among equal dates. Articles without a
    /// date sort last.
    pub fn get_all(&self, pinned: bool) -> Vec<Article> {
        let snapshot = self.inner.articles.load();

        let mut list: Vec<Article> = snapshot
            .values()
            .filter(|article| article.pinned == pinned && !article.unlisted)
            .cloned()
            .collect();

        list.sort_by(|a, b| a.title.cmp(&b.title));
        list.sort_by(|a, b| b.created.cmp(&a.created));

        list
    }

    /// Overwrite the source document of the article at `key` on disk.
    ///
    /// The in-memory article is deliberately not touched: the watch task
    /// observes the write like any other filesystem change and regenerates
    /// the entry. Until that happens [`get`](Self::get) returns the previous
    /// article, an eventual-consistency window callers must tolerate. Two
    /// racing updates resolve last-writer-wins at the filesystem.
    pub fn update(&self, key: &str, doc: &Document) -> Result<(), IndexError> {
        let article = self.get(key)?;
        let bytes = doc.marshal()?;

        fs::write(&article.file_path, bytes)
            .map_err(|err| IndexError::Write(article.file_path.clone(), err))?;

        Ok(())
    }

    /// Walk the content root, generate an article for every visible file,
    /// and atomically replace the whole snapshot with the result.
    ///
    /// Individual generation failures do not abort the scan; they travel on
    /// their article. Returns the visible directories found, for watch
    /// registration. Dot-prefixed entries are skipped, directories with
    /// their entire subtree.
    pub fn scan(&self) -> Result<Vec<PathBuf>, IndexError> {
        let root = &self.inner.root;

        let mut directories = Vec::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));
        for entry in walker {
            let entry = entry.map_err(|err| IndexError::Walk(root.clone(), err))?;
            if entry.file_type().is_dir() {
                directories.push(entry.into_path());
            } else {
                files.push(entry.into_path());
            }
        }

        // Generation does disk reads and rendering; keep it out of any
        // critical section and off a single core.
        let articles: Vec<Article> = files
            .par_iter()
            .map(|file| generate_article(root, file))
            .collect();

        let mut map = ArticleMap::new();
        for article in articles {
            match article.err() {
                None => log!("scan"; "status=ok route={}", article.route),
                Some(err) => log!("scan"; "status=fail route={} err={err}", article.route),
            }
            if admitted(&article) {
                map.insert(article.path.clone(), article);
            }
        }

        self.inner.articles.store(Arc::new(map));
        Ok(directories)
    }

    /// Install a freshly generated article under its path key.
    ///
    /// Copy-on-write: the current snapshot is cloned, mutated, and swapped
    /// in. Safe because the watch task is the only writer.
    pub(crate) fn install(&self, article: Article) {
        if !admitted(&article) {
            return;
        }

        let mut map = ArticleMap::clone(&self.inner.articles.load());
        map.insert(article.path.clone(), article);
        self.inner.articles.store(Arc::new(map));
    }

    /// Remove the entry for a source file that disappeared.
    pub(crate) fn remove(&self, file_path: &Path) {
        let key = article_path(&self.inner.root, file_path);

        let mut map = ArticleMap::clone(&self.inner.articles.load());
        if map.remove(&key).is_some() {
            self.inner.articles.store(Arc::new(map));
        }
    }
}
