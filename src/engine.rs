//! Engine: registration API and dispatch entry point
//!
//! # Data Flow
//! ```text
//! Engine::run(addr)
//!     → server::listener (resolve + bind)
//!     → server::connection (one tokio task per connection, hyper HTTP/1.1)
//!     → Engine::serve_http (collect body, access log)
//!     → Engine::handle (new Context over a fresh ResponseWriter)
//!     → Router::handle (matched handler or 404)
//! ```
//!
//! Registration takes `&mut self` and serving consumes the engine, so the
//! route table is frozen before the first request is accepted.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderName, REFERER, USER_AGENT};
use hyper::http::request::Parts;
use hyper::{Request, Response};
use tokio::net::TcpListener;

use crate::context::{Context, ResponseWriter};
use crate::http;
use crate::logger::{self, AccessFormat, AccessLogEntry};
use crate::router::Router;
use crate::server::{connection, listener};

#[derive(Default)]
pub struct Engine {
    router: Router,
}

impl Engine {
    /// An engine with an empty route table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for an arbitrary method; re-registering a route replaces it
    pub fn add_route<F>(&mut self, method: &str, pattern: &str, handler: F)
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        self.router.add_route(method, pattern, Box::new(handler));
    }

    pub fn get<F>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        self.add_route("GET", pattern, handler);
    }

    pub fn post<F>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        self.add_route("POST", pattern, handler);
    }

    /// Bind `addr` and serve until the listener fails
    ///
    /// `addr` is `host:port`; a bare `:port` listens on all interfaces.
    /// Resolution and bind errors are returned as-is.
    pub async fn run(self, addr: &str) -> io::Result<()> {
        let socket_addr = listener::resolve(addr).await?;
        let listener = listener::create_listener(socket_addr)?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let local_addr = listener.local_addr()?;
        logger::log_server_start(&local_addr, self.router.len());

        let engine = Arc::new(self);
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    connection::serve_connection(stream, peer_addr, Arc::clone(&engine));
                }
                Err(e) => logger::log_accept_error(&e),
            }
        }
    }

    /// Per-request entry point called by the connection service
    pub async fn serve_http<B>(
        &self,
        req: Request<B>,
        peer_addr: SocketAddr,
    ) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let access = logger::access_format().map(|format| (format, access_entry(&parts, peer_addr)));

        // Body size is not capped here; only form decoding is bounded
        let response = match body.collect().await {
            Ok(collected) => self.handle(&Request::from_parts(parts, collected.to_bytes())),
            Err(e) => {
                let e: Box<dyn StdError + Send + Sync> = e.into();
                logger::log_warning(&format!("Failed to read request body from {peer_addr}: {e}"));
                http::build_400_response()
            }
        };

        if let Some((format, entry)) = access {
            log_access(entry, format, &response, started);
        }
        Ok(response)
    }

    /// Dispatch one fully read request
    #[must_use]
    pub fn handle(&self, req: &Request<Bytes>) -> Response<Full<Bytes>> {
        let mut writer = ResponseWriter::new();
        let mut ctx = Context::new(req, &mut writer);
        self.router.handle(&mut ctx);
        writer.into_response()
    }
}

fn access_entry(parts: &Parts, peer_addr: SocketAddr) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.to_string(),
        parts.method.to_string(),
        parts.uri.path().to_string(),
    );
    entry.query = parts.uri.query().map(str::to_string);
    entry.http_version = format!("{:?}", parts.version)
        .trim_start_matches("HTTP/")
        .to_string();
    entry.referer = header_text(&parts.headers, &REFERER);
    entry.user_agent = header_text(&parts.headers, &USER_AGENT);
    entry
}

fn header_text(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn log_access(
    mut entry: AccessLogEntry,
    format: AccessFormat,
    response: &Response<Full<Bytes>>,
    started: Instant,
) {
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    logger::log_access(&entry, format);
}
