//! HTML rendering for documents.
//!
//! Turns a [`Document`] into the article markup served to browsers: a header
//! block with the title and description, a body rendered according to the
//! document's format tag, and a closing footer. Unknown formats degrade to an
//! empty body rather than failing.

use crate::document::Document;
use pulldown_cmark::{Event, LinkType, Options, Parser, Tag, TagEnd, html};
use pulldown_cmark_escape::escape_html;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// MathJax bootstrap injected when a document carries the `Tag: Math`
/// property.
const MATH_BOOTSTRAP: &str = concat!(
    "<script>MathJax = {tex: {inlineMath: [[\"$\", \"$\"], [\"\\\\(\", \"\\\\)\"]]}};</script>\n",
    "<script id=\"MathJax-script\" async ",
    "src=\"https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js\"></script>\n",
);

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to escape text content")]
    Escape,

    #[error("html content is not valid UTF-8")]
    Content(#[from] std::str::Utf8Error),
}

/// Markdown extensions: tables, strikethrough, GFM extras, heading
/// attributes, and definition lists. Fenced code blocks and `<...>`
/// autolinks are core CommonMark; bare URLs get linkified by [`linkify`].
/// Math notation is enabled only for documents tagged `Math`.
fn markdown_options(math: bool) -> Options {
    let mut options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_GFM
        | Options::ENABLE_HEADING_ATTRIBUTES
        | Options::ENABLE_DEFINITION_LIST;
    if math {
        options |= Options::ENABLE_MATH;
    }
    options
}

/// Matches bare URLs in prose. Trailing punctuation that usually ends a
/// sentence rather than a URL is excluded from the match.
static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:https?://|www\.)[^\s<>]+[^\s<>.,:;!?)\]'"]"#)
        .expect("bare URL pattern is valid")
});

/// Promote bare URLs in text to anchors, the way GitHub-flavored markdown
/// linkifies `https://...` and `www....` runs. Text inside existing links,
/// images, and code blocks is left alone.
fn linkify<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut out = Vec::new();
    let mut verbatim = 0usize;

    for event in events {
        match event {
            Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. } | Tag::CodeBlock(_))) => {
                verbatim += 1;
                out.push(Event::Start(tag));
            }
            Event::End(tag @ (TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock)) => {
                verbatim = verbatim.saturating_sub(1);
                out.push(Event::End(tag));
            }
            Event::Text(text) if verbatim == 0 && BARE_URL.is_match(&text) => {
                let mut last = 0;
                for found in BARE_URL.find_iter(&text) {
                    if found.start() > last {
                        out.push(Event::Text(text[last..found.start()].to_string().into()));
                    }

                    let label = found.as_str();
                    let dest = if label.starts_with("www.") {
                        format!("http://{label}")
                    } else {
                        label.to_string()
                    };
                    out.push(Event::Start(Tag::Link {
                        link_type: LinkType::Autolink,
                        dest_url: dest.into(),
                        title: "".into(),
                        id: "".into(),
                    }));
                    out.push(Event::Text(label.to_string().into()));
                    out.push(Event::End(TagEnd::Link));

                    last = found.end();
                }
                if last < text.len() {
                    out.push(Event::Text(text[last..].to_string().into()));
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Render a document into article HTML.
///
/// Fails only on the escaping step used for titles, descriptions, and `text`
/// bodies, or on non-UTF-8 `html` content; `markdown` rendering is
/// infallible.
pub fn render_html(doc: &Document) -> Result<String, RenderError> {
    let math = doc.properties.has("Tag", "Math");

    let mut out = String::new();
    out.push_str("<article>\n<div class=\"article-header\">\n");

    let title = doc.properties.value("Title");
    if !title.is_empty() {
        out.push_str("<h1 class=\"article-title\">");
        escape_html(&mut out, title).map_err(|_| RenderError::Escape)?;
        out.push_str("</h1>\n");
    }

    let description = doc.properties.value("Description");
    if !description.is_empty() {
        out.push_str("<p class=\"article-description\">");
        escape_html(&mut out, description).map_err(|_| RenderError::Escape)?;
        out.push_str("</p>\n");
    }

    if math {
        out.push_str(MATH_BOOTSTRAP);
    }

    out.push_str("</div>\n<div class=\"article-body\">\n");

    match doc.format.to_lowercase().as_str() {
        "text" => {
            // Escaping keeps the content from being interpreted as markup;
            // <pre> preserves its whitespace.
            out.push_str("<pre>");
            escape_html(&mut out, &String::from_utf8_lossy(&doc.content))
                .map_err(|_| RenderError::Escape)?;
            out.push_str("</pre>\n");
        }
        "html" => {
            // Verbatim passthrough. Lossy decoding would silently rewrite
            // the bytes, so invalid UTF-8 is an error instead.
            out.push_str(std::str::from_utf8(&doc.content)?);
        }
        "markdown" => {
            let body = String::from_utf8_lossy(&doc.content);
            let parser = Parser::new_ext(&body, markdown_options(math));
            html::push_html(&mut out, linkify(parser).into_iter());
        }
        _ => {}
    }

    out.push_str("</div>\n</article>\n");

    Ok(out)
}
