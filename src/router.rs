//! Route table and dispatch
//!
//! Routes are keyed by the exact (method, path) pair. Lookup is byte-exact:
//! no trailing-slash normalization, no case folding, no path parameters.
//! Registering a key twice replaces the earlier handler.

use std::collections::HashMap;

use hyper::StatusCode;

use crate::context::Context;
use crate::logger;

/// Handler invoked with the request's context; effects go through the context's writers
pub type HandlerFunc = Box<dyn Fn(&mut Context<'_>) + Send + Sync + 'static>;

/// Composite route identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: String,
    pub path: String,
}

impl RouteKey {
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
        }
    }
}

#[derive(Default)]
pub struct Router {
    handlers: HashMap<RouteKey, HandlerFunc>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to (method, pattern), replacing any previous binding
    pub fn add_route(&mut self, method: &str, pattern: &str, handler: HandlerFunc) {
        logger::log_route_registered(method, pattern);
        self.handlers.insert(RouteKey::new(method, pattern), handler);
    }

    /// Invoke the matching handler, or answer 404 on the context
    pub fn handle(&self, ctx: &mut Context<'_>) {
        let key = RouteKey::new(ctx.method(), ctx.path());
        if let Some(handler) = self.handlers.get(&key) {
            handler(ctx);
        } else {
            ctx.string(StatusCode::NOT_FOUND, format_args!("404 NOT FOUND: {}", key.path));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
