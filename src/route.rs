//! Declarative routes, route sources and registration.
//!
//! A [`Route`] is one `pattern → handler` binding plus the middleware that
//! belongs to it alone. A [`Routable`] produces routes on demand. Groups
//! prefix shared middleware onto every route of another source, and
//! [`register`] flattens everything into the [`Router`]:
//!
//! ```rust
//! use routekit::middleware::{LoggerOptions, logging};
//! use routekit::route::{Route, Routes, group, register, with};
//! use routekit::{Request, Router};
//!
//! async fn list_habits(_req: Request) -> &'static str { "[]" }
//! async fn create_habit(_req: Request) -> &'static str { "{}" }
//!
//! # fn main() -> Result<(), routekit::Error> {
//! let api = Routes::new([
//!     Route::new("GET /api/habits", list_habits),
//!     Route::new("POST /api/habits", create_habit),
//! ]);
//! let logged = with([logging(LoggerOptions::default())]);
//!
//! let mut router = Router::new();
//! register(&mut router, &[&logged.apply(&api)])?;
//! # Ok(())
//! # }
//! ```
//!
//! A route's effective middleware is always outer group → inner group →
//! its own, first element outermost.

use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Middleware, chain};
use crate::router::Router;

/// One binding of a pattern to a handler, plus per-route middleware.
#[derive(Clone, Debug)]
pub struct Route {
    pattern: String,
    handler: BoxedHandler,
    middleware: Vec<Middleware>,
}

impl Route {
    /// `pattern` is passed to [`Router::handle`] verbatim, e.g.
    /// `"POST /api/habits"`.
    pub fn new(pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self { pattern: pattern.into(), handler: handler.boxed(), middleware: Vec::new() }
    }

    /// Appends per-route middleware, innermost so far.
    pub fn layer(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn handler(&self) -> &BoxedHandler { &self.handler }
    pub fn middleware(&self) -> &[Middleware] { &self.middleware }
}

// ── Routable ─────────────────────────────────────────────────────────────────

/// A source of routes, queried on demand.
pub trait Routable: Send + Sync {
    fn routes(&self) -> Vec<Route>;
}

/// A fixed list of routes, replayed on every call.
#[derive(Clone, Debug, Default)]
pub struct Routes(Vec<Route>);

impl Routes {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        Self(routes.into_iter().collect())
    }
}

impl Routable for Routes {
    fn routes(&self) -> Vec<Route> {
        self.0.clone()
    }
}

impl Routable for Vec<Route> {
    fn routes(&self) -> Vec<Route> {
        self.clone()
    }
}

/// Routes computed by a function each time they are asked for.
///
/// Nothing is cached: every [`Routable::routes`] call runs the function
/// again. An absent source is spelled `Option::<RoutableFn<_>>::None` and
/// yields no routes.
pub struct RoutableFn<F>(F);

impl<F> RoutableFn<F>
where
    F: Fn() -> Vec<Route> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Routable for RoutableFn<F>
where
    F: Fn() -> Vec<Route> + Send + Sync,
{
    fn routes(&self) -> Vec<Route> {
        (self.0)()
    }
}

/// An absent source produces nothing.
impl<R: Routable> Routable for Option<R> {
    fn routes(&self) -> Vec<Route> {
        self.as_ref().map(Routable::routes).unwrap_or_default()
    }
}

impl<R: Routable + ?Sized> Routable for &R {
    fn routes(&self) -> Vec<Route> {
        (**self).routes()
    }
}

impl<R: Routable + ?Sized> Routable for Box<R> {
    fn routes(&self) -> Vec<Route> {
        (**self).routes()
    }
}

impl<R: Routable + ?Sized> Routable for Arc<R> {
    fn routes(&self) -> Vec<Route> {
        (**self).routes()
    }
}

// ── Groups ───────────────────────────────────────────────────────────────────

/// Prefixes shared middleware onto every route of a base source.
///
/// The base is never modified: each call builds fresh middleware lists, so
/// two calls return equal but independently allocated routes.
#[derive(Clone, Debug)]
pub struct Group<R> {
    base: R,
    middleware: Vec<Middleware>,
}

impl<R: Routable> Routable for Group<R> {
    fn routes(&self) -> Vec<Route> {
        let routes = self.base.routes();
        if routes.is_empty() || self.middleware.is_empty() {
            return routes;
        }
        routes
            .into_iter()
            .map(|route| {
                let mut middleware = Vec::with_capacity(self.middleware.len() + route.middleware.len());
                middleware.extend_from_slice(&self.middleware);
                middleware.extend_from_slice(&route.middleware);
                Route { middleware, ..route }
            })
            .collect()
    }
}

/// A reusable group constructor returned by [`with`].
#[derive(Clone, Debug)]
pub struct With {
    middleware: Vec<Middleware>,
}

impl With {
    pub fn apply<R: Routable>(&self, base: R) -> Group<R> {
        Group { base, middleware: self.middleware.clone() }
    }
}

/// Captures a middleware prefix to apply to any number of sources later.
pub fn with(middleware: impl IntoIterator<Item = Middleware>) -> With {
    With { middleware: middleware.into_iter().collect() }
}

/// Groups `base` under `middleware` right away.
pub fn group<R: Routable>(base: R, middleware: impl IntoIterator<Item = Middleware>) -> Group<R> {
    with(middleware).apply(base)
}

// ── Registration ─────────────────────────────────────────────────────────────

/// Binds every route of every source on `router`.
///
/// Sources are walked in slice order and routes in the order each source
/// yields them. Each handler is wrapped in its route's middleware via
/// [`chain`]. Conflicting patterns are not deduplicated: the router's
/// [`Error::InvalidRoute`] is returned as is, leaving routes bound before
/// the conflict in place.
pub fn register(router: &mut Router, routables: &[&dyn Routable]) -> Result<(), Error> {
    for routable in routables {
        for route in routable.routes() {
            debug!(pattern = %route.pattern, "registering route");
            let handler = chain(route.handler, &route.middleware);
            router.handle(&route.pattern, handler)?;
        }
    }
    Ok(())
}
