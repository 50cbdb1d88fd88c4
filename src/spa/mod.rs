//! Single-page-application serving.
//!
//! A frontend build is a tree of static files plus one HTML shell
//! (`index.html`) that owns client-side routing. Deep links such as
//! `/habits/42` exist only in the client router, so the file server 404s
//! on them. [`Intercept404`] catches that 404 before it reaches the client
//! and answers with the shell instead:
//!
//! ```text
//! GET /assets/app.js ─→ FileServer ─→ 200 app.js
//! GET /habits/42     ─→ FileServer ─→ 404 (discarded) ─→ serve_file_contents ─→ 200 index.html
//! ```
//!
//! The shell is only served to clients that accept `text/html`, so a
//! missing `/api/...` call from `fetch` still gets a plain 404.

mod assets;
mod content;
mod range;

use std::io;
use std::sync::Arc;

use http::header::{ACCEPT, HeaderValue, LOCATION};
use http::StatusCode;
use tracing::{debug, error};

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::route::{Route, Routes, register};
use crate::router::Router;

pub use assets::{Asset, AssetSource, DirAssets, MemoryAssets, SubAssets, sub};

/// Where a frontend build lands inside its asset source.
pub const FRONTEND_DIST: &str = "frontend/dist";

// ── Intercept404 ─────────────────────────────────────────────────────────────

/// Re-dispatches to `fallback` whenever `primary` answers `404`.
///
/// The primary's 404 response is dropped whole (status, headers and body)
/// and the fallback gets the original request, so it starts from a clean
/// slate. Any other status passes through and the fallback never runs.
///
/// Only an explicit 404 status triggers the fallback. A handler that
/// produces a body without choosing a status has answered `200 OK`.
pub struct Intercept404 {
    primary: BoxedHandler,
    fallback: BoxedHandler,
}

impl Intercept404 {
    pub fn new(primary: impl Handler, fallback: impl Handler) -> Self {
        Self { primary: primary.boxed(), fallback: fallback.boxed() }
    }
}

impl Handler for Intercept404 {
    fn call(&self, req: Request) -> BoxFuture {
        let primary = self.primary.clone();
        let fallback = self.fallback.clone();

        Box::pin(async move {
            let retained = req.clone();
            let res = primary.call(req).await;
            if res.status_code() != StatusCode::NOT_FOUND {
                return res;
            }
            debug!(path = retained.path(), "primary handler answered 404, serving fallback");
            fallback.call(retained).await
        })
    }
}

// ── Fallback document ────────────────────────────────────────────────────────

/// Serves the single document `file` (typically `index.html`) to HTML
/// clients, whatever the request path.
///
/// - `Accept` without `text/html`: `404` without touching `assets`.
/// - `file` missing or unreadable: `404` naming the file.
/// - Otherwise `text/html; charset=utf-8`, with `Last-Modified`,
///   conditional request and `Range` support.
pub fn serve_file_contents(file: impl Into<String>, assets: Arc<dyn AssetSource>) -> ServeFile {
    ServeFile { file: Arc::from(file.into()), assets }
}

/// Handler returned by [`serve_file_contents`].
pub struct ServeFile {
    file: Arc<str>,
    assets: Arc<dyn AssetSource>,
}

impl Handler for ServeFile {
    fn call(&self, req: Request) -> BoxFuture {
        let file = Arc::clone(&self.file);
        let assets = Arc::clone(&self.assets);

        Box::pin(async move {
            if !req.header(ACCEPT).is_some_and(|accept| accept.contains("text/html")) {
                return Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .text("404 not found");
            }

            match open_asset(assets, file.to_string()).await {
                Ok(asset) => content::serve_content(
                    &req,
                    &asset,
                    Some(HeaderValue::from_static(ContentType::Html.as_str())),
                ),
                Err(e) => {
                    error!(file = %file, error = %e, "cannot open fallback document");
                    Response::builder()
                        .status(StatusCode::NOT_FOUND)
                        .text(format!("{file} not found"))
                }
            }
        })
    }
}

// ── FileServer ───────────────────────────────────────────────────────────────

/// Serves the files of an [`AssetSource`] by request path.
///
/// - `/dir/` serves `dir/index.html`;
/// - `/dir` where `dir` is a directory redirects to `/dir/`;
/// - missing files and paths climbing out of the root answer `404`.
pub struct FileServer {
    assets: Arc<dyn AssetSource>,
    prefix: String,
}

impl FileServer {
    pub fn new(assets: Arc<dyn AssetSource>) -> Self {
        Self { assets, prefix: String::new() }
    }

    /// Removes `prefix` from request paths before looking them up; paths
    /// without it answer `404`.
    pub fn strip_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_end_matches('/').to_owned();
        self
    }
}

impl Handler for FileServer {
    fn call(&self, req: Request) -> BoxFuture {
        let assets = Arc::clone(&self.assets);
        let relative = req.path().strip_prefix(self.prefix.as_str()).map(str::to_owned);

        Box::pin(async move {
            let Some(relative) = relative.filter(|p| p.is_empty() || p.starts_with('/')) else {
                return page_not_found();
            };
            // Decode before cleaning so `%2e%2e` resolves like `..`.
            let Some(relative) = assets::decode_path(&relative) else {
                return page_not_found();
            };
            let Some(clean) = assets::clean(&relative) else {
                return page_not_found();
            };
            let is_dir_path = relative.is_empty() || relative.ends_with('/');
            let lookup = if is_dir_path && !clean.is_empty() {
                format!("{clean}/index.html")
            } else if is_dir_path {
                "index.html".to_owned()
            } else {
                clean.clone()
            };

            let err = match open_asset(Arc::clone(&assets), lookup).await {
                Ok(asset) => return content::serve_content(&req, &asset, None),
                Err(e) => e,
            };
            if err.kind() == io::ErrorKind::NotFound && !is_dir_path && asset_is_dir(assets, clean).await {
                return redirect_to_dir(&req);
            }
            page_not_found()
        })
    }
}

fn page_not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .text("404 page not found\n")
}

fn redirect_to_dir(req: &Request) -> Response {
    let target = match req.query() {
        Some(q) => format!("{}/?{q}", req.path()),
        None => format!("{}/", req.path()),
    };
    let mut res = Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .no_body();
    if let Ok(value) = HeaderValue::from_str(&target) {
        res.headers_mut().insert(LOCATION, value);
    }
    res
}

/// Opens `path` on the blocking pool; sources may touch the disk.
async fn open_asset(assets: Arc<dyn AssetSource>, path: String) -> io::Result<Asset> {
    tokio::task::spawn_blocking(move || assets.open(&path))
        .await
        .map_err(io::Error::other)?
}

async fn asset_is_dir(assets: Arc<dyn AssetSource>, path: String) -> bool {
    tokio::task::spawn_blocking(move || assets.is_dir(&path))
        .await
        .unwrap_or(false)
}

// ── Embedded app ─────────────────────────────────────────────────────────────

/// The route serving a built frontend under `app_root`.
///
/// Files come from the [`FRONTEND_DIST`] subtree of `assets`; any path the
/// tree does not contain falls back to its `index.html` for HTML clients.
/// `app_root` should end in `/` so the route covers the whole subtree.
///
/// Fails with [`Error::MissingAssetRoot`] when `assets` has no
/// `frontend/dist` directory.
pub fn embedded_app(app_root: &str, assets: Arc<dyn AssetSource>) -> Result<Routes, Error> {
    let dist: Arc<dyn AssetSource> = Arc::new(sub(assets, FRONTEND_DIST)?);
    let files = FileServer::new(Arc::clone(&dist)).strip_prefix(app_root);
    let index = serve_file_contents("index.html", dist);
    Ok(Routes::new([Route::new(app_root, Intercept404::new(files, index))]))
}

/// Registers [`embedded_app`] on `router` directly.
pub fn mount_embedded_app(router: &mut Router, app_root: &str, assets: Arc<dyn AssetSource>) -> Result<(), Error> {
    register(router, &[&embedded_app(app_root, assets)?])
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::SystemTime;

    use http::header::CONTENT_TYPE;
    use http::{Method, Uri};

    use super::*;

    fn get(uri: &'static str) -> Request {
        Request::new(Method::GET, Uri::from_static(uri))
    }

    fn html(uri: &'static str) -> Request {
        get(uri).with_header(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"))
    }

    fn files() -> Arc<dyn AssetSource> {
        Arc::new(
            MemoryAssets::new()
                .with_file("index.html", "<html>ok</html>", Some(SystemTime::now()))
                .with_file("assets/app.js", "run()", None)
                .with_file("docs/index.html", "<h1>docs</h1>", None),
        )
    }

    #[tokio::test]
    async fn intercept_404_serves_the_fallback() {
        let primary = |_req: Request| async {
            Response::builder().status(StatusCode::NOT_FOUND).text("missing")
        };
        let fallback = |_req: Request| async { Response::text("index") };

        let res = Intercept404::new(primary, fallback).call(get("/")).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), "index");
    }

    #[tokio::test]
    async fn intercept_404_skips_the_fallback_otherwise() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let fallback = move |_req: Request| {
            flag.store(true, Ordering::SeqCst);
            async { Response::text("index") }
        };

        let ok = Intercept404::new(|_req: Request| async { "ok" }, fallback);
        let res = ok.call(get("/")).await;

        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(res.body(), "ok");
    }

    #[tokio::test]
    async fn intercept_404_passes_other_errors_through() {
        let failing = |_req: Request| async { (StatusCode::INTERNAL_SERVER_ERROR, "broken") };
        let res = Intercept404::new(failing, |_req: Request| async { "index" })
            .call(get("/"))
            .await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), "broken");
    }

    #[tokio::test]
    async fn fallback_sees_the_original_request() {
        let primary = |_req: Request| async { StatusCode::NOT_FOUND };
        let fallback = |req: Request| async move { format!("{} {}", req.path(), req.body().len()) };

        let res = Intercept404::new(primary, fallback)
            .call(get("/deep/link").with_body("abc"))
            .await;

        assert_eq!(res.body(), "/deep/link 3");
    }

    #[tokio::test]
    async fn serve_file_contents_for_html_clients() {
        let res = serve_file_contents("index.html", files()).call(html("/anything")).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(res.body(), "<html>ok</html>");
    }

    #[tokio::test]
    async fn serve_file_contents_rejects_non_html_clients() {
        let handler = serve_file_contents("index.html", files());
        let json = get("/").with_header(ACCEPT, HeaderValue::from_static("application/json"));

        assert_eq!(handler.call(json).await.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(handler.call(get("/")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_file_contents_names_a_missing_file() {
        let res = serve_file_contents("shell.html", files()).call(html("/")).await;

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), "shell.html not found");
    }

    /// Counts `open` calls on the wrapped source.
    struct CountingAssets {
        inner: MemoryAssets,
        opens: Arc<AtomicUsize>,
    }

    impl AssetSource for CountingAssets {
        fn open(&self, path: &str) -> io::Result<Asset> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open(path)
        }

        fn is_dir(&self, path: &str) -> bool {
            self.inner.is_dir(path)
        }
    }

    #[tokio::test]
    async fn non_html_clients_never_touch_the_assets() {
        let opens = Arc::new(AtomicUsize::new(0));
        let assets: Arc<dyn AssetSource> = Arc::new(CountingAssets {
            inner: MemoryAssets::new().with_file("index.html", "<html>ok</html>", None),
            opens: Arc::clone(&opens),
        });
        let json = || get("/").with_header(ACCEPT, HeaderValue::from_static("application/json"));

        for file in ["index.html", "missing.html"] {
            let handler = serve_file_contents(file, Arc::clone(&assets));
            let res = handler.call(get("/")).await;
            assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
            assert_eq!(res.body(), "404 not found");
            assert_eq!(handler.call(json()).await.status_code(), StatusCode::NOT_FOUND);
        }
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        serve_file_contents("index.html", assets).call(html("/")).await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn file_server_serves_by_path() {
        let server = FileServer::new(files());

        let js = server.call(get("/assets/app.js")).await;
        assert_eq!(js.status_code(), StatusCode::OK);
        assert_eq!(js.headers()[CONTENT_TYPE], "text/javascript; charset=utf-8");
        assert_eq!(js.body(), "run()");

        assert_eq!(server.call(get("/")).await.body(), "<html>ok</html>");
        assert_eq!(server.call(get("/docs/")).await.body(), "<h1>docs</h1>");
        assert_eq!(server.call(get("/missing.css")).await.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(server.call(get("/../index.html")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn file_server_decodes_escaped_names() {
        let assets: Arc<dyn AssetSource> = Arc::new(
            MemoryAssets::new()
                .with_file("index.html", "<html>shell</html>", None)
                .with_file("img/my logo.png", "PNG", None),
        );
        let app = Intercept404::new(
            FileServer::new(Arc::clone(&assets)),
            serve_file_contents("index.html", assets),
        );

        let res = app.call(html("/img/my%20logo.png")).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), "PNG");
        assert_eq!(res.headers()[CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn file_server_rejects_escaped_traversal_and_bad_escapes() {
        let server = FileServer::new(files()).strip_prefix("/app");

        for uri in ["/app/%2e%2e/index.html", "/app/%2E%2E/%2e%2e/etc/passwd", "/app/a%00.js", "/app/%zz"] {
            let res = server.call(get(uri)).await;
            assert_eq!(res.status_code(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(res.body(), "404 page not found\n");
        }
        assert_eq!(server.call(get("/app/assets%2Fapp.js")).await.body(), "run()");
    }

    #[tokio::test]
    async fn file_server_redirects_bare_directories() {
        let res = FileServer::new(files()).call(get("/docs?tab=1")).await;

        assert_eq!(res.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.headers()[LOCATION], "/docs/?tab=1");
    }

    #[tokio::test]
    async fn file_server_strips_its_prefix() {
        let server = FileServer::new(files()).strip_prefix("/app/");

        assert_eq!(server.call(get("/app/assets/app.js")).await.body(), "run()");
        assert_eq!(server.call(get("/application")).await.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(server.call(get("/other/assets/app.js")).await.status_code(), StatusCode::NOT_FOUND);
    }
}
