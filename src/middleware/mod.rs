//! Middleware layer.
//!
//! A [`Middleware`] turns the next handler into a new handler. It is the
//! place for cross-cutting concerns: request logging and panic containment
//! ([`logging`]), auth-header inspection, request-id injection, and so on.
//!
//! # Execution order
//!
//! [`chain`] nests middleware in slice order, first element outermost:
//!
//! ```text
//! chain(h, &[m1, m2])  ==  m1(m2(h))
//!
//! Request → m1 → m2 → h → m2 → m1 → Response
//! ```
//!
//! # Writing one
//!
//! ```rust
//! use routekit::middleware::Middleware;
//! use routekit::{BoxedHandler, Handler, Request};
//!
//! let trace = Middleware::new(|next: BoxedHandler| move |req: Request| {
//!     let next = next.clone();
//!     async move {
//!         tracing::debug!(path = req.path(), "before");
//!         let res = next.call(req).await;
//!         tracing::debug!(status = %res.status_code(), "after");
//!         res
//!     }
//! });
//! ```

mod logger;
mod panic;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

pub use logger::{Logger, LoggerOptions, PanicHandler, logging};
pub use panic::Panic;

/// A decorator from one handler to another.
///
/// Cheap to clone; clones share the same wrapping function.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>);

impl Middleware {
    pub fn new<F, H>(wrap: F) -> Self
    where
        F: Fn(BoxedHandler) -> H + Send + Sync + 'static,
        H: Handler,
    {
        Self(Arc::new(move |next| wrap(next).boxed()))
    }

    /// Wraps `next` with this middleware.
    pub fn wrap(&self, next: impl Handler) -> BoxedHandler {
        (self.0)(next.boxed())
    }

    /// Whether both values share the same wrapping function.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// Wraps `handler` in `middleware`, first element outermost.
///
/// An empty slice returns the handler itself, not a wrapper around it.
pub fn chain(handler: impl Handler, middleware: &[Middleware]) -> BoxedHandler {
    middleware
        .iter()
        .rev()
        .fold(handler.boxed(), |next, mw| mw.wrap(next))
}
