//! A JSON API next to a single-page frontend.
//!
//! Run against a built frontend (`<FRONTEND_DIR>/frontend/dist/index.html`):
//!   FRONTEND_DIR=. RUST_LOG=info cargo run --example spa
//!
//! Or against the frontend's dev server, hot reload included:
//!   FRONTEND_DEV_URL=http://localhost:5173 RUST_LOG=debug cargo run --example spa
//!
//! Try:
//!   curl http://localhost:3000/api/habits/42
//!   curl -X POST http://localhost:3000/api/habits -d '{"name":"read"}'
//!   curl -H 'accept: text/html' http://localhost:3000/habits/42   (index.html)
//!   curl http://localhost:3000/api/boom                           (logged panic, 500)

use std::sync::Arc;

use http::StatusCode;
use routekit::middleware::{LoggerOptions, logging};
use routekit::proxy::DevProxy;
use routekit::route::{Route, Routes, register, with};
use routekit::spa::{DirAssets, mount_embedded_app};
use routekit::{Request, Response, Router, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), routekit::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::var("APP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_owned());

    let api = Routes::new([
        Route::new("GET /api/habits/{id}", get_habit),
        Route::new("POST /api/habits", create_habit),
        Route::new("DELETE /api/habits/{id}", delete_habit),
        Route::new("GET /api/boom", boom),
    ]);
    let logged = with([logging(LoggerOptions::default())]);

    let mut router = Router::new();
    register(&mut router, &[&logged.apply(&api)])?;

    match std::env::var("FRONTEND_DEV_URL") {
        Ok(url) => {
            let proxy = Routes::new([Route::new("/", DevProxy::new(&url)?)]);
            register(&mut router, &[&proxy])?;
        }
        Err(_) => {
            let dir = std::env::var("FRONTEND_DIR").unwrap_or_else(|_| ".".to_owned());
            mount_embedded_app(&mut router, "/", Arc::new(DirAssets::new(dir)))?;
        }
    }

    Server::bind(&addr)?.serve(router).await
}

// GET /api/habits/{id}
async fn get_habit(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"read"}}"#))
}

// POST /api/habits
async fn create_habit(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/api/habits/99")
        .json(r#"{"id":"99","name":"read"}"#)
}

// DELETE /api/habits/{id} → 204 No Content
async fn delete_habit(_req: Request) -> Response {
    Response::status(StatusCode::NO_CONTENT)
}

// GET /api/boom: the logging middleware answers 500 and logs the backtrace.
async fn boom(_req: Request) -> Response {
    panic!("habit store unavailable")
}
