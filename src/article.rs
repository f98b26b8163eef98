//! Articles and the factory that builds them from files on disk.
//!
//! [`generate_article`] never fails: every stage of the pipeline that goes
//! wrong records an error on the article and the stages that can still run,
//! run. Collaborators decide what to do with a partially built article; the
//! diagnostics travel with it.

use crate::document::Document;
use crate::render::render_html;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Article generation errors. These accumulate on [`Article::errors`] in
/// pipeline order rather than overwriting one another.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArticleError {
    #[error("failed to load document: {0}")]
    Load(String),

    #[error("malformed document: {0}")]
    Parse(String),

    #[error("failed to serialize document: {0}")]
    Marshal(String),

    #[error("article property '{property}' must be true or false")]
    Boolean { property: &'static str },

    #[error("could not parse '{property}': {message}")]
    Date {
        property: &'static str,
        message: String,
    },

    #[error("both 'Username' and 'Password' must be set to restrict an article")]
    Credentials,

    #[error("failed to render article: {0}")]
    Render(String),
}

/// Per-article access restriction built from the reserved `Username` and
/// `Password` properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCredentials {
    username: String,
    password: String,
}

impl AccessCredentials {
    pub fn new(username: &str, password: &str) -> Result<Self, ArticleError> {
        if username.is_empty() || password.is_empty() {
            return Err(ArticleError::Credentials);
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

/// One renderable unit of the site: a decoded, rendered representation of a
/// single content file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    /// Absolute location of the source document, used by update writes.
    pub file_path: PathBuf,

    /// Root-relative index key, extension retained (`/foo/bar.md`).
    pub path: String,

    /// URL-facing identifier, extension stripped (`/foo/bar`).
    pub route: String,

    pub title: String,
    pub description: String,
    pub author: String,
    pub pinned: bool,
    pub unlisted: bool,
    pub created: Option<NaiveDate>,
    pub updated: Option<NaiveDate>,

    /// Present when the document carries `Username`/`Password` properties.
    pub access: Option<AccessCredentials>,

    /// Canonical serialized document text.
    pub text: Vec<u8>,

    /// Rendered article markup.
    pub html: String,

    /// Diagnostics collected during generation, in pipeline order. A
    /// non-empty list does not mean the other fields are unusable.
    pub errors: Vec<ArticleError>,
}

impl Article {
    /// The first recorded generation error, for collaborators that report a
    /// single diagnostic.
    pub fn err(&self) -> Option<&ArticleError> {
        self.errors.first()
    }

    /// The creation date formatted as `YYYY-MM-DD`, or `""` when unset.
    pub fn formatted_date(&self) -> String {
        self.created
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

/// Root-relative key for an article, extension retained.
pub fn article_path(root: &Path, file_path: &Path) -> String {
    let rel = file_path.strip_prefix(root).unwrap_or(file_path);
    format!("/{}", rel.display())
}

/// Route to an article, like [`article_path`] but with the file extension
/// stripped.
pub fn article_route(root: &Path, file_path: &Path) -> String {
    let rel = file_path.strip_prefix(root).unwrap_or(file_path);
    format!("/{}", rel.with_extension("").display())
}

/// Read a document from the filesystem and generate an in-memory article.
///
/// Always returns a usable article; failures are recorded on
/// [`Article::errors`]. Read, parse, and marshal failures end the pipeline
/// early since nothing downstream can run without a document.
pub fn generate_article(root: &Path, file_path: &Path) -> Article {
    let mut article = Article {
        file_path: file_path.to_path_buf(),
        path: article_path(root, file_path),
        route: article_route(root, file_path),
        ..Article::default()
    };

    let bytes = match fs::read(file_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            article.errors.push(ArticleError::Load(err.to_string()));
            return article;
        }
    };

    let doc = match Document::parse(&bytes) {
        Ok(doc) => doc,
        Err(err) => {
            article.errors.push(ArticleError::Parse(err.to_string()));
            return article;
        }
    };

    // Marshal here rather than keep the raw bytes so the article carries the
    // canonical form.
    match doc.marshal() {
        Ok(text) => article.text = text,
        Err(err) => {
            article.errors.push(ArticleError::Marshal(err.to_string()));
            return article;
        }
    }

    article.title = doc.properties.value("Title").to_string();
    article.description = doc.properties.value("Description").to_string();
    article.author = doc.properties.value("Author").to_string();

    let username = doc.properties.value("Username");
    let password = doc.properties.value("Password");
    if !username.is_empty() || !password.is_empty() {
        match AccessCredentials::new(username, password) {
            Ok(access) => article.access = Some(access),
            Err(err) => article.errors.push(err),
        }
    }

    article.pinned = parse_flag(&doc, "Pinned", &mut article.errors);
    article.unlisted = parse_flag(&doc, "Unlisted", &mut article.errors);
    article.created = parse_date(&doc, "Created", &mut article.errors);
    article.updated = parse_date(&doc, "Updated", &mut article.errors);

    match render_html(&doc) {
        Ok(html) => article.html = html,
        Err(err) => article.errors.push(ArticleError::Render(err.to_string())),
    }

    article
}

/// Empty means false; anything other than `true`/`false` (case-insensitive)
/// records an error and defaults to false.
fn parse_flag(doc: &Document, property: &'static str, errors: &mut Vec<ArticleError>) -> bool {
    match doc.properties.value(property).to_lowercase().as_str() {
        "" | "false" => false,
        "true" => true,
        _ => {
            errors.push(ArticleError::Boolean { property });
            false
        }
    }
}

fn parse_date(
    doc: &Document,
    property: &'static str,
    errors: &mut Vec<ArticleError>,
) -> Option<NaiveDate> {
    let raw = doc.properties.value(property);
    if raw.is_empty() {
        return None;
    }

    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(err) => {
            errors.push(ArticleError::Date {
                property,
                message: err.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_document(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_path_and_route_derivation() {
        let root = Path::new("/content");
        let file = Path::new("/content/foo/bar.md");

        assert_eq!(article_path(root, file), "/foo/bar.md");
        assert_eq!(article_route(root, file), "/foo/bar");
    }

    #[test]
    fn test_route_without_extension() {
        let root = Path::new("/content");
        let file = Path::new("/content/about");

        assert_eq!(article_path(root, file), "/about");
        assert_eq!(article_route(root, file), "/about");
    }

    #[test]
    fn test_generate_article_happy_path() {
        let dir = TempDir::new().unwrap();
        let file = write_document(
            &dir,
            "posts/hello.md",
            "Title: Hello\nAuthor: Someone\nCreated: 2024-01-15\nPinned: true\n\
             === markdown ===\n# Hi\n",
        );

        let article = generate_article(dir.path(), &file);

        assert!(article.errors.is_empty());
        assert_eq!(article.path, "/posts/hello.md");
        assert_eq!(article.route, "/posts/hello");
        assert_eq!(article.title, "Hello");
        assert_eq!(article.author, "Someone");
        assert!(article.pinned);
        assert!(!article.unlisted);
        assert_eq!(article.created, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(article.formatted_date(), "2024-01-15");
        assert!(article.html.contains("<h1>Hi</h1>"));
        // Canonical text, not the raw input.
        assert!(article.text.starts_with(b"Author: Someone\n"));
    }

    #[test]
    fn test_missing_file_yields_partial_article() {
        let dir = TempDir::new().unwrap();
        let article = generate_article(dir.path(), &dir.path().join("gone.md"));

        assert_eq!(article.path, "/gone.md");
        assert_eq!(article.route, "/gone");
        assert!(matches!(article.err(), Some(ArticleError::Load(_))));
        assert!(article.html.is_empty());
    }

    #[test]
    fn test_malformed_boolean_defaults_false() {
        let dir = TempDir::new().unwrap();
        let file = write_document(&dir, "a.md", "Pinned: maybe\n=== markdown ===\nbody\n");

        let article = generate_article(dir.path(), &file);

        assert!(!article.pinned);
        assert!(matches!(
            article.err(),
            Some(ArticleError::Boolean { property: "Pinned" })
        ));
        // Extraction continued past the failure.
        assert!(article.html.contains("body"));
    }

    #[test]
    fn test_validation_errors_accumulate() {
        let dir = TempDir::new().unwrap();
        let file = write_document(
            &dir,
            "a.md",
            "Pinned: maybe\nUnlisted: kinda\nCreated: not-a-date\n=== text ===\n",
        );

        let article = generate_article(dir.path(), &file);

        assert_eq!(article.errors.len(), 3);
        assert!(matches!(
            article.errors[0],
            ArticleError::Boolean { property: "Pinned" }
        ));
        assert!(matches!(
            article.errors[1],
            ArticleError::Boolean { property: "Unlisted" }
        ));
        assert!(matches!(
            article.errors[2],
            ArticleError::Date {
                property: "Created",
                ..
            }
        ));
    }

    #[test]
    fn test_credentials_require_both_fields() {
        let dir = TempDir::new().unwrap();
        let file = write_document(&dir, "a.md", "Username: admin\n=== text ===\n");

        let article = generate_article(dir.path(), &file);

        assert!(article.access.is_none());
        assert!(matches!(article.err(), Some(ArticleError::Credentials)));
        // The title extraction that already ran is kept.
        assert!(article.html.contains("article-body"));
    }

    #[test]
    fn test_credentials_verify() {
        let dir = TempDir::new().unwrap();
        let file = write_document(
            &dir,
            "a.md",
            "Username: admin\nPassword: hunter2\n=== text ===\nsecret\n",
        );

        let article = generate_article(dir.path(), &file);
        let access = article.access.expect("credentials should be constructed");

        assert!(access.verify("admin", "hunter2"));
        assert!(!access.verify("admin", "wrong"));
        assert!(!access.verify("other", "hunter2"));
        assert!(article.errors.is_empty());
    }

    #[test]
    fn test_unparseable_document_records_error() {
        let dir = TempDir::new().unwrap();
        let file = write_document(&dir, "a.md", "no delimiter here\n");

        let article = generate_article(dir.path(), &file);
        assert!(matches!(article.err(), Some(ArticleError::Parse(_))));
    }
}
