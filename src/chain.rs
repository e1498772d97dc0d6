//! Handler chains: the frozen, ordered handler sequence bound to one route.
//!
//! A [`Chain`] is built exactly once, before the first request is served, by
//! merging middleware from every enclosing scope with the route's own
//! handlers. After the build it is immutable and length-stable; execution
//! walks it through the context's cooperative [`next`](crate::Context::next)
//! cursor.

use crate::context::Context;
use http::Method;
use std::sync::Arc;

/// A unit of request-processing logic. Middleware and terminal handlers
/// share this one shape; a middleware is simply a handler that calls
/// [`Context::next`] somewhere in its body.
pub type Handler = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> Handler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The fully merged, frozen, ordered sequence of handlers bound to one route.
pub struct Chain {
    pattern: String,
    methods: Vec<Method>,
    handlers: Vec<Handler>,
    compressed: bool,
}

impl Chain {
    pub(crate) fn new(pattern: String, methods: Vec<Method>, handlers: Vec<Handler>, compressed: bool) -> Self {
        Self { pattern, methods, handlers, compressed }
    }

    /// The declared path pattern, with all group prefixes applied.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// True when this chain serves `method`. An empty method list accepts
    /// every method.
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    pub(crate) fn handler(&self, index: usize) -> Option<&Handler> {
        self.handlers.get(index)
    }
}

/// Declares one route: pattern, method filter, middleware, and terminal
/// handlers. Consumed at build time, when enclosing scopes contribute their
/// inherited middleware and the result freezes into a [`Chain`].
pub struct Route {
    pattern: String,
    methods: Vec<Method>,
    middleware: Vec<Handler>,
    handlers: Vec<Handler>,
    compressed: bool,
}

impl Route {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), methods: Vec::new(), middleware: Vec::new(), handlers: Vec::new(), compressed: false }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Adds route-level middleware. Runs after inherited middleware and
    /// before the terminal handlers, in declaration order.
    pub fn with(mut self, middleware: Handler) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Adds a terminal handler, in declaration order.
    pub fn handle(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Opts this route into gzip-compressed JSON responses.
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub(crate) fn pattern(&self) -> &str {
        &self.pattern
    }

    pub(crate) fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Freezes this route into a chain: inherited middleware (already in
    /// root-to-leaf order), then route middleware, then terminal handlers.
    pub(crate) fn into_chain(self, prefix: &str, inherited: &[Handler]) -> Chain {
        let pattern = join_paths(prefix, &self.pattern);
        let mut handlers = Vec::with_capacity(inherited.len() + self.middleware.len() + self.handlers.len());
        handlers.extend(inherited.iter().cloned());
        handlers.extend(self.middleware);
        handlers.extend(self.handlers);
        Chain::new(pattern, self.methods, handlers, self.compressed)
    }
}

/// Joins a group prefix and a route pattern into one normalized path.
pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if prefix.is_empty() { String::from("/") } else { prefix.to_string() }
    } else {
        format!("{prefix}/{path}")
    }
}
