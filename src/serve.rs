//! HTTP front-end over the content index.
//!
//! A lightweight `tiny_http` server that consumes the index's read/update
//! interface:
//!
//! - `GET /` — listing page: pinned navigation plus the timeline
//! - `GET /<route>` — rendered article page
//! - `GET /<path with extension>` — canonical document text
//! - `PUT /<path with extension>` — overwrite the source document
//!
//! Articles carrying access credentials require HTTP Basic auth. Unknown
//! routes return 404; articles whose generation failed return 500 with the
//! diagnostic, so the two cases stay distinguishable.
//!
//! The server blocks until Ctrl+C, then closes the watch task before
//! returning (close-then-join).

use crate::article::Article;
use crate::config::SiteConfig;
use crate::document::Document;
use crate::index::{ContentIndex, Details, IndexError};
use crate::{log, watch};
use anyhow::{Context, Result, anyhow};
use base64::prelude::{BASE64_STANDARD, Engine as _};
use pulldown_cmark_escape::escape_html;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

/// Start the content server.
///
/// Builds the index synchronously, spawns the watch task, and handles
/// requests on the calling thread until Ctrl+C unblocks the listener.
pub fn serve_site(config: &SiteConfig) -> Result<()> {
    let details = Details {
        name: config.site.name.clone(),
        description: config.site.description.clone(),
        style: config.site.style.clone(),
    };
    let index = ContentIndex::new(config.content.root.clone(), details);
    let watcher = watch::spawn(index.clone()).context("failed to start content watcher")?;

    let interface: std::net::IpAddr = config
        .serve
        .interface
        .parse()
        .context("invalid serve interface")?;
    let addr = SocketAddr::new(interface, config.serve.port);
    let server = Server::http(addr).map_err(|err| anyhow!("failed to bind {addr}: {err}"))?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("failed to set Ctrl+C handler")?;

    log!("serve"; "http://{addr}");

    for request in server.incoming_requests() {
        if let Err(err) = handle_request(request, &index) {
            log!("serve"; "request error: {err}");
        }
    }

    watcher.close();
    Ok(())
}

fn handle_request(request: Request, index: &ContentIndex) -> Result<()> {
    // Decode URL-encoded characters (e.g., %20 -> space), then strip any
    // query string before resolving the article.
    let url = urlencoding::decode(request.url())
        .map(Cow::into_owned)
        .unwrap_or_else(|_| request.url().to_string());
    let path = url.split('?').next().unwrap_or(&url).to_string();

    let method = request.method().clone();
    match method {
        Method::Get if path == "/" => serve_listing(request, index),
        Method::Get => serve_article(request, index, &path),
        Method::Put => update_article(request, index, &path),
        _ => respond_text(request, 405, "method not allowed"),
    }
}

// ============================================================================
// Article Responses
// ============================================================================

fn serve_article(request: Request, index: &ContentIndex, path: &str) -> Result<()> {
    // A path with an extension addresses the document source; a bare route
    // addresses the rendered page.
    let raw = Path::new(path).extension().is_some();
    let lookup = if raw {
        index.get(path)
    } else {
        index.get_by_route(path)
    };

    let article = match lookup {
        Ok(article) => article,
        Err(IndexError::NotFound(_)) => {
            return respond_text(request, 404, &format!("no article located at {path}"));
        }
        Err(err) => return Err(err.into()),
    };

    if !authorized(&request, &article) {
        return respond_unauthorized(request);
    }

    if let Some(err) = article.err() {
        return respond_text(request, 500, &format!("article generation failed: {err}"));
    }

    if raw {
        let response = Response::from_data(article.text.clone()).with_header(
            Header::from_bytes("Content-Type", "text/plain; charset=utf-8").unwrap(),
        );
        request.respond(response)?;
        Ok(())
    } else {
        respond_html(request, article_page(index.details(), &article))
    }
}

fn update_article(mut request: Request, index: &ContentIndex, path: &str) -> Result<()> {
    let article = match index.get(path) {
        Ok(article) => article,
        Err(IndexError::NotFound(_)) => {
            return respond_text(request, 404, &format!("no article located at {path}"));
        }
        Err(err) => return Err(err.into()),
    };

    if !authorized(&request, &article) {
        return respond_unauthorized(request);
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body)
        .context("failed to read request body")?;

    let doc = match Document::parse(&body) {
        Ok(doc) => doc,
        Err(err) => return respond_text(request, 400, &format!("malformed document: {err}")),
    };

    match index.update(path, &doc) {
        Ok(()) => respond_text(request, 204, ""),
        Err(IndexError::NotFound(_)) => {
            respond_text(request, 404, &format!("no article located at {path}"))
        }
        Err(err) => respond_text(request, 500, &format!("update failed: {err}")),
    }
}

// ============================================================================
// Listing
// ============================================================================

fn serve_listing(request: Request, index: &ContentIndex) -> Result<()> {
    let details = index.details();
    let pinned = index.get_all(true);
    let timeline = index.get_all(false);

    let mut page = page_head(details, &details.name);
    page.push_str("<header>\n");
    page.push_str(&format!("<h1>{}</h1>\n", escape(&details.name)));
    if !details.description.is_empty() {
        page.push_str(&format!("<p>{}</p>\n", escape(&details.description)));
    }

    if !pinned.is_empty() {
        page.push_str("<nav>\n<ul>\n");
        for article in &pinned {
            page.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                article.route,
                escape(&article.title)
            ));
        }
        page.push_str("</ul>\n</nav>\n");
    }
    page.push_str("</header>\n");

    page.push_str("<main>\n<ul class=\"timeline\">\n");
    for article in &timeline {
        page.push_str(&format!(
            "<li><time>{}</time> <a href=\"{}\">{}</a></li>\n",
            article.formatted_date(),
            article.route,
            escape(&article.title)
        ));
    }
    page.push_str("</ul>\n</main>\n</body>\n</html>\n");

    respond_html(request, page)
}

fn article_page(details: &Details, article: &Article) -> String {
    let title = if article.title.is_empty() {
        &details.name
    } else {
        &article.title
    };

    let mut page = page_head(details, title);
    page.push_str(&article.html);
    page.push_str("</body>\n</html>\n");
    page
}

fn page_head(details: &Details, title: &str) -> String {
    let mut head = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    head.push_str(&format!("<title>{}</title>\n", escape(title)));
    if !details.style.is_empty() {
        head.push_str(&format!(
            "<link rel=\"stylesheet\" href=\"{}\">\n",
            details.style
        ));
    }
    head.push_str("</head>\n<body>\n");
    head
}

fn escape(text: &str) -> String {
    let mut out = String::new();
    escape_html(&mut out, text).ok();
    out
}

// ============================================================================
// Response Helpers
// ============================================================================

fn respond_html(request: Request, content: String) -> Result<()> {
    let response = Response::from_string(content)
        .with_header(Header::from_bytes("Content-Type", "text/html; charset=utf-8").unwrap());
    request.respond(response)?;
    Ok(())
}

fn respond_text(request: Request, status: u16, body: &str) -> Result<()> {
    let response = Response::from_string(body)
        .with_status_code(StatusCode(status))
        .with_header(Header::from_bytes("Content-Type", "text/plain; charset=utf-8").unwrap());
    request.respond(response)?;
    Ok(())
}

fn respond_unauthorized(request: Request) -> Result<()> {
    let response = Response::from_string("unauthorized")
        .with_status_code(StatusCode(401))
        .with_header(Header::from_bytes("WWW-Authenticate", "Basic realm=\"cloister\"").unwrap())
        .with_header(Header::from_bytes("Content-Type", "text/plain; charset=utf-8").unwrap());
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Authorization
// ============================================================================

/// Check HTTP Basic credentials against an article's access restriction.
/// Articles without one are always authorized.
fn authorized(request: &Request, article: &Article) -> bool {
    let Some(access) = &article.access else {
        return true;
    };

    let Some(header) = request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Authorization"))
    else {
        return false;
    };

    let Some(encoded) = header.value.as_str().strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = decoded.split_once(':') else {
        return false;
    };

    access.verify(username, password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Properties;

    fn details() -> Details {
        Details {
            name: "Example".to_string(),
            description: "A site".to_string(),
            style: "/style.css".to_string(),
        }
    }

    #[test]
    fn test_article_page_wraps_rendered_html() {
        let article = Article {
            title: "Hello".to_string(),
            html: "<article>body</article>".to_string(),
            ..Article::default()
        };

        let page = article_page(&details(), &article);
        assert!(page.contains("<title>Hello</title>"));
        assert!(page.contains("<link rel=\"stylesheet\" href=\"/style.css\">"));
        assert!(page.contains("<article>body</article>"));
    }

    #[test]
    fn test_article_page_falls_back_to_site_name() {
        let article = Article::default();
        let page = article_page(&details(), &article);
        assert!(page.contains("<title>Example</title>"));
    }

    #[test]
    fn test_page_head_escapes_title() {
        let page = page_head(&details(), "a < b");
        assert!(page.contains("<title>a &lt; b</title>"));
    }

    #[test]
    fn test_render_page_round_trip_with_renderer() {
        let mut properties = Properties::default();
        properties.add("Title", "T");
        let doc = Document {
            properties,
            format: "markdown".to_string(),
            content: b"*hi*".to_vec(),
        };

        let article = Article {
            title: "T".to_string(),
            html: crate::render::render_html(&doc).unwrap(),
            ..Article::default()
        };

        let page = article_page(&details(), &article);
        assert!(page.contains("<em>hi</em>"));
    }
}
