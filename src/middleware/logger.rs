//! Request logging and panic containment.
//!
//! Every request that passes through a [`Logger`] ends in exactly one log
//! event: a completion event carrying the status the client actually
//! receives, or a panic event carrying the recovered payload and backtrace.
//! A panicking handler never takes the connection (or the server) down with
//! it; the client gets the panic handler's response instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use tracing::{Dispatch, error, info, warn};

use super::Middleware;
use super::panic::{CatchPanic, Panic, catch};
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// Builds the response sent when a handler panics. Must produce a complete
/// response on its own.
pub type PanicHandler = Arc<dyn Fn(&Request, &Panic) -> Response + Send + Sync>;

/// Configuration for [`Logger`].
///
/// ```rust
/// use routekit::middleware::LoggerOptions;
/// use routekit::Response;
/// use http::StatusCode;
///
/// let options = LoggerOptions::default()
///     .with_panic_handler(|_req, panic| {
///         Response::builder()
///             .status(StatusCode::SERVICE_UNAVAILABLE)
///             .text(format!("try again later ({})", panic.message()))
///     });
/// ```
#[derive(Clone, Default)]
pub struct LoggerOptions {
    dispatch: Option<Dispatch>,
    panic_handler: Option<PanicHandler>,
}

impl LoggerOptions {
    /// Sends this logger's events to `dispatch` instead of the current
    /// default subscriber.
    pub fn with_logger(mut self, dispatch: impl Into<Dispatch>) -> Self {
        self.dispatch = Some(dispatch.into());
        self
    }

    /// Replaces the default `500 Internal Server Error` panic response.
    pub fn with_panic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request, &Panic) -> Response + Send + Sync + 'static,
    {
        self.panic_handler = Some(Arc::new(handler));
        self
    }

    fn emit(&self, event: impl FnOnce()) {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, event),
            None => event(),
        }
    }

    fn panic_response(&self, req: &Request, panic: &Panic) -> Response {
        let Some(handler) = &self.panic_handler else {
            return internal_error();
        };
        catch(|| handler(req, panic)).unwrap_or_else(internal_error)
    }
}

/// Wraps a handler with request logging and panic containment.
pub struct Logger {
    inner: BoxedHandler,
    options: LoggerOptions,
}

impl Logger {
    pub fn new(inner: impl Handler, options: LoggerOptions) -> Self {
        Self { inner: inner.boxed(), options }
    }
}

impl Handler for Logger {
    fn call(&self, req: Request) -> BoxFuture {
        let inner = self.inner.clone();
        let options = self.options.clone();

        Box::pin(async move {
            let start = Instant::now();
            let retained = req.clone();
            let outcome = CatchPanic::new(Box::pin(async move { inner.call(req).await })).await;
            let elapsed = start.elapsed();

            match outcome {
                Ok(res) => {
                    options.emit(|| log_completion(&retained, res.status_code(), elapsed));
                    res
                }
                Err(panic) => {
                    let res = options.panic_response(&retained, &panic);
                    options.emit(|| log_panic(&retained, res.status_code(), elapsed, &panic));
                    res
                }
            }
        })
    }
}

/// [`Logger`] as a [`Middleware`], for use in route groups.
pub fn logging(options: LoggerOptions) -> Middleware {
    Middleware::new(move |next: BoxedHandler| Logger::new(next, options.clone()))
}

fn internal_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .text("Internal Server Error\n")
}

fn log_completion(req: &Request, status: StatusCode, elapsed: Duration) {
    let method: &Method = req.method();
    let path = req.path();
    let remote = req.remote_addr().map(|a| a.to_string()).unwrap_or_default();
    let code = status.as_u16();

    if status.is_server_error() {
        error!(%method, path, status = code, ?elapsed, remote, "request failed");
    } else if status.is_client_error() {
        warn!(%method, path, status = code, ?elapsed, remote, "request rejected");
    } else {
        info!(%method, path, status = code, ?elapsed, remote, "request served");
    }
}

fn log_panic(req: &Request, status: StatusCode, elapsed: Duration, panic: &Panic) {
    error!(
        method = %req.method(),
        path = req.path(),
        status = status.as_u16(),
        ?elapsed,
        error = panic.message(),
        backtrace = panic.backtrace(),
        "handler panicked",
    );
}
