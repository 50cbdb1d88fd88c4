//! Radix-tree request multiplexer.
//!
//! One tree per HTTP method plus one for patterns that accept any method.
//! O(path-length) lookup. The router binds patterns to handlers and nothing
//! else; composition lives in [`route`](crate::route) and
//! [`middleware`](crate::middleware).

use std::collections::HashMap;
use std::str::FromStr;

use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// Name of the catch-all parameter bound by slash-terminated patterns.
pub const SUBTREE_PARAM: &str = "subtree";

/// The application multiplexer.
///
/// Patterns have the form `"<METHOD> <path>"` with the method optional:
///
/// - `"GET /users/{id}"` answers `GET` (and `HEAD`) on `/users/42`;
/// - `"/healthz"` answers every method;
/// - `"/app/"` ends in a slash and so also answers the whole subtree below
///   it, e.g. `/app/assets/main.js`. The remainder is available as
///   `req.param("subtree")`.
///
/// Build it once at startup, then hand it to [`Server::serve`](crate::Server::serve).
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    any: MatchitRouter<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` under `pattern`.
    ///
    /// Fails with [`Error::InvalidRoute`] when the method token is invalid or
    /// the path conflicts with a pattern already bound for the same method.
    pub fn handle(&mut self, pattern: &str, handler: impl Handler) -> Result<(), Error> {
        let (method, path) = split_pattern(pattern)?;
        let tree = match method {
            Some(method) => self.routes.entry(method).or_default(),
            None => &mut self.any,
        };
        let handler = handler.boxed();
        let invalid = |e: matchit::InsertError| Error::InvalidRoute {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        };

        tree.insert(path, handler.clone()).map_err(invalid)?;
        if path.ends_with('/') {
            tree.insert(format!("{path}{{*{SUBTREE_PARAM}}}"), handler)
                .map_err(invalid)?;
        }
        Ok(())
    }

    /// Routes one request to its handler.
    ///
    /// Lookup order: the request's method, then `GET` for a `HEAD` request,
    /// then the any-method patterns. A path bound only under other methods
    /// answers `405` with an `Allow` header, anything else `404`.
    pub fn dispatch(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => {
                let allowed = self.allowed_methods(req.path());
                Box::pin(async move { not_routed(allowed) })
            }
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let get = Method::GET;
        let head_as_get = (*method == Method::HEAD).then_some(&get);
        [Some(method), head_as_get]
            .into_iter()
            .flatten()
            .filter_map(|m| self.routes.get(m))
            .chain(std::iter::once(&self.any))
            .find_map(|tree| tree.at(path).ok())
            .map(|matched| {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                (matched.value.clone(), params)
            })
    }

    fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.clone())
            .collect();
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        allowed
    }
}

fn not_routed(allowed: Vec<Method>) -> Response {
    if allowed.is_empty() {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .text("404 page not found\n");
    }
    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    let mut res = Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .text("method not allowed\n");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        res.headers_mut().insert(ALLOW, value);
    }
    res
}

/// Splits `"GET /path"` into its method and path. A pattern starting with
/// `/` has no method.
fn split_pattern(pattern: &str) -> Result<(Option<Method>, &str), Error> {
    let pattern_trimmed = pattern.trim();
    if pattern_trimmed.starts_with('/') {
        return Ok((None, pattern_trimmed));
    }
    let invalid = |reason: &str| Error::InvalidRoute {
        pattern: pattern.to_owned(),
        reason: reason.to_owned(),
    };
    let (method, path) = pattern_trimmed
        .split_once(char::is_whitespace)
        .ok_or_else(|| invalid("expected `<METHOD> <path>` or `<path>`"))?;
    let path = path.trim_start();
    if !path.starts_with('/') {
        return Err(invalid("path must start with `/`"));
    }
    let method = Method::from_str(method).map_err(|_| invalid("invalid method"))?;
    Ok((Some(method), path))
}
