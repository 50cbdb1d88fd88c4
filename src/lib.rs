//! # routekit
//!
//! Route composition, request logging and single-page-app serving on hyper.
//!
//! ## The pieces
//!
//! - **Routes as values.** A [`route::Route`] binds a `"METHOD /path"`
//!   pattern to a handler. [`route::Routable`] sources produce routes on
//!   demand, groups stack shared middleware onto them, and
//!   [`route::register`] flattens everything into a [`Router`].
//! - **Middleware.** A [`middleware::Middleware`] wraps one handler in
//!   another. [`middleware::logging`] records method, path, status and
//!   duration for every request, and turns panics into a response.
//! - **SPA serving.** [`spa::embedded_app`] serves a built frontend and
//!   answers client-side deep links with its `index.html`.
//! - **Dev proxy.** [`proxy::DevProxy`] forwards to the frontend's own dev
//!   server, hot-reload websocket included.
//! - **Serving.** [`Server`] runs the router on HTTP/1.1 and HTTP/2 and
//!   drains in-flight requests on SIGTERM / Ctrl-C.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use routekit::middleware::{LoggerOptions, logging};
//! use routekit::route::{Route, Routes, group, register};
//! use routekit::spa::{DirAssets, mount_embedded_app};
//! use routekit::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), routekit::Error> {
//!     let api = Routes::new([
//!         Route::new("GET /api/habits/{id}", get_habit),
//!         Route::new("POST /api/habits", create_habit),
//!     ]);
//!
//!     let mut router = Router::new();
//!     register(&mut router, &[&group(api, [logging(LoggerOptions::default())])])?;
//!     mount_embedded_app(&mut router, "/", Arc::new(DirAssets::new(".")))?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(router).await
//! }
//!
//! async fn get_habit(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//!
//! async fn create_habit(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(http::StatusCode::BAD_REQUEST);
//!     }
//!     Response::builder()
//!         .status(http::StatusCode::CREATED)
//!         .header("location", "/api/habits/99")
//!         .json(req.body().clone())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod proxy;
pub mod route;
pub mod spa;

pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Router, SUBTREE_PARAM};
pub use server::Server;
