//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Uri};
use hyper::upgrade::OnUpgrade;

/// An incoming HTTP request with its body fully buffered.
///
/// Cloning is cheap: the body is a reference-counted [`Bytes`]. Middleware
/// that needs to re-dispatch a request (the SPA fallback, the panic guard)
/// keeps a clone around instead of reconstructing one.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    upgrade: Option<PendingUpgrade>,
}

/// The connection upgrade hyper hands out for this request, claimable once
/// across all clones.
#[derive(Clone)]
struct PendingUpgrade(Arc<Mutex<Option<OnUpgrade>>>);

impl std::fmt::Debug for PendingUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PendingUpgrade")
    }
}

impl Request {
    /// Builds a request with no headers and an empty body.
    ///
    /// The server constructs requests itself; this is for driving handlers
    /// directly, e.g. in tests.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
            upgrade: None,
        }
    }

    pub(crate) fn from_parts(
        mut parts: http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
    ) -> Self {
        let upgrade = parts
            .extensions
            .remove::<OnUpgrade>()
            .map(|on| PendingUpgrade(Arc::new(Mutex::new(Some(on)))));
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: Some(remote_addr),
            upgrade,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup. Returns `None` for absent or non-UTF-8 values.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `GET /users/{id}`, `req.param("id")` on `/users/42`
    /// returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Claims the connection upgrade, if the client asked for one and no
    /// clone of this request has claimed it yet.
    pub(crate) fn take_upgrade(&self) -> Option<OnUpgrade> {
        let pending = self.upgrade.as_ref()?;
        pending.0.lock().ok()?.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ACCEPT;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::new(Method::GET, Uri::from_static("/a?b=1"))
            .with_header(ACCEPT, HeaderValue::from_static("text/html"));
        assert_eq!(req.header("Accept"), Some("text/html"));
        assert_eq!(req.path(), "/a");
        assert_eq!(req.query(), Some("b=1"));
        assert!(req.take_upgrade().is_none());
    }
}
