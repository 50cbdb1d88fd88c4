//! Panic containment for handler futures.
//!
//! A handler panic is caught at the poll that raised it and turned into a
//! [`Panic`] value. The backtrace has to be taken *at the panic site*, before
//! the stack unwinds, so a process panic hook is installed once. It only
//! records anything while a guarded future is being polled on the current
//! thread; every other panic goes to the previously installed hook untouched.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use crate::handler::BoxFuture;
use crate::response::Response;

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A panic recovered from a handler.
#[derive(Debug, Clone)]
pub struct Panic {
    message: String,
    backtrace: String,
}

impl Panic {
    /// The panic payload, when it was a string; `"unknown panic"` otherwise.
    pub fn message(&self) -> &str { &self.message }

    /// Backtrace captured where the panic was raised.
    pub fn backtrace(&self) -> &str { &self.backtrace }

    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        let backtrace = CAPTURED
            .with(|c| c.borrow_mut().take())
            .map(|bt| bt.to_string())
            .unwrap_or_default();
        Self { message, backtrace }
    }
}

impl std::fmt::Display for Panic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler panicked: {}", self.message)
    }
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARDED.with(Cell::get) {
                CAPTURED.with(|c| *c.borrow_mut() = Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `f` with the guard flag raised, restoring the previous value even
/// when `f` unwinds.
fn guarded<T>(f: impl FnOnce() -> T) -> std::thread::Result<T> {
    let was = GUARDED.with(|g| g.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    GUARDED.with(|g| g.set(was));
    result
}

/// Future adapter resolving to `Err(Panic)` if any poll of the inner
/// future panics.
pub(crate) struct CatchPanic {
    inner: BoxFuture,
}

impl CatchPanic {
    pub(crate) fn new(inner: BoxFuture) -> Self {
        install_hook();
        Self { inner }
    }
}

impl Future for CatchPanic {
    type Output = Result<Response, Panic>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        match guarded(|| inner.poll(cx)) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(res)) => Poll::Ready(Ok(res)),
            Err(payload) => Poll::Ready(Err(Panic::from_payload(payload.as_ref()))),
        }
    }
}

/// Calls `f`, returning `None` if it panics.
pub(crate) fn catch<T>(f: impl FnOnce() -> T) -> Option<T> {
    install_hook();
    let result = guarded(f).ok();
    CAPTURED.with(|c| c.borrow_mut().take());
    result
}
