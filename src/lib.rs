//! gee: a minimal HTTP routing and dispatch engine
//!
//! Handlers are registered per exact (method, path) pair on an [`Engine`]
//! and receive a per-request [`Context`] for reading the request and writing
//! the response. Serving runs on hyper and tokio.
//!
//! ```no_run
//! use gee::{Engine, StatusCode};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let mut engine = Engine::new();
//! engine.get("/hello", |c| {
//!     let name = c.query("name");
//!     c.string(StatusCode::OK, format_args!("hello, {name}"));
//! });
//! engine.run("127.0.0.1:9999").await
//! # }
//! ```

pub mod config;
pub mod context;
pub mod engine;
mod http;
pub mod logger;
pub mod router;
mod server;

pub use context::{CommitState, Context, ResponseWriter};
pub use engine::Engine;
pub use hyper::StatusCode;
pub use router::{HandlerFunc, RouteKey, Router};
