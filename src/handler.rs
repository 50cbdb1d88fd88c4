//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! Routes, middleware and the router all need to hold handlers of
//! *different* concrete types in one place. We hide the concrete type behind
//! `dyn Handler` and share it through an `Arc`:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ Route::new("GET /", hello)
//! BoxedHandler::new(hello)                         ← Handler blanket impl
//!        ↓
//! Arc<dyn Handler>                                 ← shared by every request
//!        ↓
//! handler.call(req)  at request time               ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_response() })  ← BoxFuture
//! ```
//!
//! Middleware receives the next handler as a [`BoxedHandler`] and returns a
//! new one, so the wrapping types in this crate ([`Logger`](crate::middleware::Logger),
//! [`Intercept404`](crate::spa::Intercept404), [`DevProxy`](crate::proxy::DevProxy), …)
//! implement [`Handler`] directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// `Send + 'static` lets tokio move the future across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Anything that turns a [`Request`] into a [`Response`].
///
/// Automatically implemented for every function with the shape
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// and for closures returning such a future.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;

    /// Erases the concrete type.
    fn boxed(self) -> BoxedHandler
    where
        Self: Sized,
    {
        BoxedHandler(Arc::new(self))
    }
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// A type-erased handler shared across concurrent requests.
///
/// Cloning costs one atomic increment.
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn Handler>);

impl BoxedHandler {
    pub fn new(handler: impl Handler) -> Self {
        handler.boxed()
    }

    /// Whether both values point at the same handler allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Handler for BoxedHandler {
    fn call(&self, req: Request) -> BoxFuture {
        self.0.call(req)
    }

    fn boxed(self) -> BoxedHandler {
        self
    }
}

impl std::fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxedHandler")
    }
}
