//! Asset sources: where static files come from.
//!
//! [`MemoryAssets`] holds files in memory, which is how a frontend build gets
//! embedded in the binary (`include_bytes!` each file into it).
//! [`DirAssets`] reads from a directory on disk. [`sub`] narrows either to a
//! subtree, e.g. the `frontend/dist` output of a JS build.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::Error;

/// One opened file.
#[derive(Clone, Debug)]
pub struct Asset {
    name: String,
    modified: Option<SystemTime>,
    contents: Bytes,
}

impl Asset {
    pub fn new(name: impl Into<String>, modified: Option<SystemTime>, contents: impl Into<Bytes>) -> Self {
        Self { name: name.into(), modified, contents: contents.into() }
    }

    /// Base name, e.g. `index.html`.
    pub fn name(&self) -> &str { &self.name }
    pub fn modified(&self) -> Option<SystemTime> { self.modified }
    pub fn contents(&self) -> &Bytes { &self.contents }
}

/// A read-only, slash-separated file tree.
///
/// Paths are relative, with no leading slash (`"assets/app.js"`). Calls may
/// block; request handlers run them on tokio's blocking pool.
pub trait AssetSource: Send + Sync + 'static {
    fn open(&self, path: &str) -> io::Result<Asset>;

    /// Whether `path` names a directory. `""` is the root.
    fn is_dir(&self, path: &str) -> bool;
}

/// Files held in memory, keyed by relative path.
#[derive(Clone, Debug, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Asset>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<Bytes>, modified: Option<SystemTime>) {
        let path = path.trim_start_matches('/');
        let name = path.rsplit('/').next().unwrap_or(path);
        self.files.insert(path.to_owned(), Asset::new(name, modified, contents));
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(mut self, path: &str, contents: impl Into<Bytes>, modified: Option<SystemTime>) -> Self {
        self.insert(path, contents, modified);
        self
    }
}

impl AssetSource for MemoryAssets {
    fn open(&self, path: &str) -> io::Result<Asset> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path}: no such file")))
    }

    fn is_dir(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return !self.files.is_empty();
        }
        self.files
            .keys()
            .any(|k| k.strip_prefix(path).is_some_and(|rest| rest.starts_with('/')))
    }
}

/// Files under a directory on disk.
#[derive(Clone, Debug)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let path = clean(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{path}: escapes the asset root"))
        })?;
        Ok(self.root.join(path))
    }
}

impl AssetSource for DirAssets {
    fn open(&self, path: &str) -> io::Result<Asset> {
        let full = self.resolve(path)?;
        let meta = std::fs::metadata(&full)?;
        if meta.is_dir() {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{path}: is a directory")));
        }
        let contents = std::fs::read(&full)?;
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Asset::new(name, meta.modified().ok(), contents))
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_dir())
    }
}

/// A view of `dir` inside another source.
#[derive(Clone)]
pub struct SubAssets {
    inner: Arc<dyn AssetSource>,
    prefix: String,
}

impl AssetSource for SubAssets {
    fn open(&self, path: &str) -> io::Result<Asset> {
        self.inner.open(&format!("{}/{path}", self.prefix))
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        self.inner.is_dir(&format!("{}/{path}", self.prefix))
    }
}

/// Narrows `assets` to the subtree at `dir`.
///
/// Fails with [`Error::MissingAssetRoot`] when `dir` is not a clean relative
/// path or is not a directory in `assets`.
pub fn sub(assets: Arc<dyn AssetSource>, dir: &str) -> Result<SubAssets, Error> {
    let prefix = clean(dir)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::MissingAssetRoot(dir.to_owned()))?;
    if !assets.is_dir(&prefix) {
        return Err(Error::MissingAssetRoot(dir.to_owned()));
    }
    Ok(SubAssets { inner: assets, prefix })
}

/// Normalises a relative slash path: drops empty and `.` segments and
/// resolves `..`. Returns `None` if the path climbs above its root.
pub(crate) fn clean(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    Some(segments.join("/"))
}

/// Percent-decodes a URL path. `None` for a malformed escape, a decoded NUL
/// or bytes that are not UTF-8.
///
/// `+` stays a literal plus: that shorthand only applies to query strings.
pub(crate) fn decode_path(path: &str) -> Option<String> {
    if !path.contains('%') {
        return (!path.contains('\0')).then(|| path.to_owned());
    }
    let mut decoded = Vec::with_capacity(path.len());
    let mut bytes = path.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next().and_then(hex_val)?;
            let lo = bytes.next().and_then(hex_val)?;
            decoded.push(hi << 4 | lo);
        } else {
            decoded.push(b);
        }
    }
    if decoded.contains(&0) {
        return None;
    }
    String::from_utf8(decoded).ok()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist() -> Arc<dyn AssetSource> {
        Arc::new(
            MemoryAssets::new()
                .with_file("frontend/dist/index.html", "<html></html>", None)
                .with_file("frontend/dist/assets/app.js", "run()", None)
                .with_file("README.md", "docs", None),
        )
    }

    #[test]
    fn memory_assets_open_and_list_directories() {
        let assets = dist();
        let index = assets.open("frontend/dist/index.html").unwrap();
        assert_eq!(index.name(), "index.html");
        assert_eq!(index.contents(), "<html></html>");
        assert!(assets.is_dir("frontend"));
        assert!(assets.is_dir("frontend/dist/assets/"));
        assert!(!assets.is_dir("frontend/di"));
        assert!(!assets.is_dir("README.md"));
        assert_eq!(assets.open("nope").unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn sub_narrows_to_a_subtree() {
        let app = sub(dist(), "frontend/dist").unwrap();
        assert_eq!(app.open("assets/app.js").unwrap().contents(), "run()");
        assert!(app.open("README.md").is_err());
        assert!(app.is_dir("") && app.is_dir("assets"));
    }

    #[test]
    fn sub_rejects_missing_or_escaping_roots() {
        assert!(matches!(sub(dist(), "frontend/build"), Err(Error::MissingAssetRoot(_))));
        assert!(matches!(sub(dist(), "../frontend"), Err(Error::MissingAssetRoot(_))));
        assert!(matches!(sub(dist(), ""), Err(Error::MissingAssetRoot(_))));
    }

    #[test]
    fn clean_resolves_dots() {
        assert_eq!(clean("/a/./b//c/").as_deref(), Some("a/b/c"));
        assert_eq!(clean("a/../b").as_deref(), Some("b"));
        assert_eq!(clean("a/../../b"), None);
    }

    #[test]
    fn decode_path_handles_escapes() {
        assert_eq!(decode_path("/img/my%20logo.png").as_deref(), Some("/img/my logo.png"));
        assert_eq!(decode_path("/%2e%2E/secret").as_deref(), Some("/../secret"));
        assert_eq!(decode_path("/caf%C3%A9").as_deref(), Some("/café"));
        assert_eq!(decode_path("/a+b").as_deref(), Some("/a+b"));
        assert_eq!(decode_path("/plain").as_deref(), Some("/plain"));
    }

    #[test]
    fn decode_path_rejects_bad_input() {
        assert_eq!(decode_path("/100%"), None);
        assert_eq!(decode_path("/%zz"), None);
        assert_eq!(decode_path("/a%00b"), None);
        assert_eq!(decode_path("/%ff%fe"), None);
    }

    #[test]
    fn dir_assets_read_from_disk() {
        let root = std::env::temp_dir().join(format!("routekit-assets-{}", std::process::id()));
        std::fs::create_dir_all(root.join("dist")).unwrap();
        std::fs::write(root.join("dist/index.html"), "<p>disk</p>").unwrap();

        let assets = DirAssets::new(&root);
        let index = assets.open("dist/index.html").unwrap();
        assert_eq!(index.contents(), "<p>disk</p>");
        assert!(index.modified().is_some());
        assert!(assets.is_dir("dist"));
        assert_eq!(assets.open("dist").unwrap_err().kind(), io::ErrorKind::NotFound);
        assert!(assets.open("../etc/passwd").is_err());

        std::fs::remove_dir_all(&root).unwrap();
    }
}
