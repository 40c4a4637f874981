//! Static file serving from a local folder.
//!
//! `ServeDir` handles file lookup, `index.html` resolution, range requests and
//! traversal protection. Directories without an index fall back to an HTML
//! listing.

use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Characters left as-is in listing links. `/` marks subdirectories.
const HREF_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Serves files below a fixed root.
#[derive(Clone)]
pub struct StaticFiles {
    root: PathBuf,
    serve_dir: ServeDir,
}

impl std::fmt::Debug for StaticFiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticFiles").field("root", &self.root).finish()
    }
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let serve_dir = ServeDir::new(&root).append_index_html_on_directories(true);
        Self { root, serve_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve `request` from the root folder.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = match self.serve_dir.clone().oneshot(request).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        };

        if response.status() == StatusCode::NOT_FOUND
            && (method == Method::GET || method == Method::HEAD)
        {
            if let Some(listing) = self.directory_listing(&path).await {
                return listing;
            }
        }
        response
    }

    /// Render an HTML index for a directory that has no `index.html`.
    async fn directory_listing(&self, request_path: &str) -> Option<Response> {
        let dir = resolve_within(&self.root, request_path)?;
        let mut entries = tokio::fs::read_dir(&dir).await.ok()?;

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        let mut html = String::from("<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n");
        for name in &names {
            let href = utf8_percent_encode(name, HREF_SAFE);
            html.push_str(&format!("<a href=\"{href}\">{}</a>\n", escape_html(name)));
        }
        html.push_str("</pre>\n");

        Some(
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                html,
            )
                .into_response(),
        )
    }
}

/// Map a URL path onto a directory under `root`.
///
/// Returns `None` for paths that escape the root, for non-directories and for
/// directory paths lacking a trailing slash (`ServeDir` redirects those).
fn resolve_within(root: &Path, request_path: &str) -> Option<PathBuf> {
    if !request_path.ends_with('/') {
        return None;
    }
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;

    let mut dir = root.to_path_buf();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => dir.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    dir.is_dir().then_some(dir)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
