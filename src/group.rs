//! Route groups: a tree of scopes contributing path prefixes and inherited
//! middleware to every descendant route.
//!
//! The tree is built with closure-scoped nesting and consumed once, top-down,
//! at build time. A node's effective middleware is the concatenation of every
//! ancestor's middleware (root to leaf) followed by its own; each leaf route
//! receives a freshly collected sequence, so no two chains alias a shared
//! middleware buffer.

use crate::chain::{Chain, Handler, Route, join_paths};
use crate::error::BuildError;
use http::Method;

/// One scope in the route tree: a path-prefix segment, its middleware, and
/// its child groups and routes.
pub struct Group {
    prefix: String,
    middleware: Vec<Handler>,
    groups: Vec<Group>,
    routes: Vec<Route>,
}

impl Group {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), middleware: Vec::new(), groups: Vec::new(), routes: Vec::new() }
    }

    /// Registers middleware on this scope. Applies to every route declared
    /// in this group and in any descendant group.
    pub fn middleware(&mut self, middleware: Handler) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Declares a nested group under `prefix`. The child scope is configured
    /// inside the closure; edges are set exactly once, there is no way to
    /// reach back to the parent.
    pub fn group(&mut self, prefix: impl Into<String>, f: impl FnOnce(&mut Group)) -> &mut Self {
        let mut child = Group::new(prefix);
        f(&mut child);
        self.groups.push(child);
        self
    }

    /// Registers a fully configured route in this scope.
    pub fn route(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    pub fn get(&mut self, pattern: impl Into<String>, handler: Handler) -> &mut Self {
        self.route(Route::new(pattern).method(Method::GET).handle(handler))
    }

    pub fn post(&mut self, pattern: impl Into<String>, handler: Handler) -> &mut Self {
        self.route(Route::new(pattern).method(Method::POST).handle(handler))
    }

    pub fn put(&mut self, pattern: impl Into<String>, handler: Handler) -> &mut Self {
        self.route(Route::new(pattern).method(Method::PUT).handle(handler))
    }

    pub fn delete(&mut self, pattern: impl Into<String>, handler: Handler) -> &mut Self {
        self.route(Route::new(pattern).method(Method::DELETE).handle(handler))
    }

    /// Consumes the subtree, freezing every leaf route into a chain.
    ///
    /// `inherited` already holds the application defaults plus every
    /// ancestor's middleware in root-to-leaf order; this node appends its own
    /// and recurses. Each leaf collects into its own vector. A route declared
    /// without a terminal handler fails the build.
    pub(crate) fn collect(self, prefix: &str, inherited: &[Handler], chains: &mut Vec<Chain>) -> Result<(), BuildError> {
        let prefix = join_paths_keep_root(prefix, &self.prefix);

        let mut effective = Vec::with_capacity(inherited.len() + self.middleware.len());
        effective.extend(inherited.iter().cloned());
        effective.extend(self.middleware);

        for route in self.routes {
            if !route.has_handlers() {
                return Err(BuildError::empty_route(join_paths(&prefix, route.pattern())));
            }
            chains.push(route.into_chain(&prefix, &effective));
        }
        for group in self.groups {
            group.collect(&prefix, &effective, chains)?;
        }
        Ok(())
    }
}

/// Like [`join_paths`] but keeps an empty result for the root scope, so route
/// patterns under it still join cleanly.
fn join_paths_keep_root(parent: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        parent.to_string()
    } else {
        join_paths(parent, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::handler_fn;

    fn noop() -> Handler {
        handler_fn(|_| {})
    }

    #[test]
    fn nested_prefixes_concatenate() {
        let mut root = Group::new("");
        root.group("/api", |api| {
            api.group("/v1", |v1| {
                v1.get("/users/{id}", noop());
            });
        });

        let mut chains = Vec::new();
        root.collect("", &[], &mut chains).unwrap();

        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].pattern(), "/api/v1/users/{id}");
    }

    #[test]
    fn ancestor_middleware_counts_into_leaf_chain() {
        let mut root = Group::new("");
        root.middleware(noop());
        root.group("/api", |api| {
            api.middleware(noop()).middleware(noop());
            api.route(Route::new("/ping").with(noop()).handle(noop()));
        });

        let defaults = vec![noop()];
        let mut chains = Vec::new();
        root.collect("", &defaults, &mut chains).unwrap();

        // defaults + root mw + 2 group mw + route mw + terminal handler
        assert_eq!(chains[0].len(), 6);
    }

    #[test]
    fn sibling_groups_do_not_share_middleware() {
        let mut root = Group::new("");
        root.group("/a", |a| {
            a.middleware(noop());
            a.get("/x", noop());
        });
        root.group("/b", |b| {
            b.get("/y", noop());
        });

        let mut chains = Vec::new();
        root.collect("", &[], &mut chains).unwrap();

        assert_eq!(chains[0].pattern(), "/a/x");
        assert_eq!(chains[0].len(), 2);
        assert_eq!(chains[1].pattern(), "/b/y");
        assert_eq!(chains[1].len(), 1);
    }
}
