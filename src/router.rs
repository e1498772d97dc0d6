//! Route matching over the frozen chain set.
//!
//! Path-pattern matching and parameter extraction are delegated to
//! [`matchit`]; this wrapper layers method filtering across the chains
//! registered on one pattern and models the routing failures as ordinary
//! chains: an unmatched path routes to the not-found chain, a matched path
//! with no accepting method to the method-not-allowed chain. Built once,
//! read-only while serving.

use crate::chain::Chain;
use crate::error::BuildError;
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct Router {
    inner: matchit::Router<Vec<Arc<Chain>>>,
    not_found: Arc<Chain>,
    method_not_allowed: Arc<Chain>,
}

/// The outcome of matching one request: the chain to run and the extracted
/// path parameters. Fallback chains carry no parameters.
pub struct RouteMatch {
    chain: Arc<Chain>,
    params: Vec<(String, String)>,
}

impl RouteMatch {
    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub(crate) fn into_parts(self) -> (Arc<Chain>, Vec<(String, String)>) {
        (self.chain, self.params)
    }
}

impl Router {
    pub(crate) fn build(chains: Vec<Chain>, not_found: Chain, method_not_allowed: Chain) -> Result<Self, BuildError> {
        let mut by_pattern: HashMap<String, Vec<Arc<Chain>>> = HashMap::new();
        for chain in chains {
            by_pattern.entry(chain.pattern().to_string()).or_default().push(Arc::new(chain));
        }

        let mut inner = matchit::Router::new();
        for (pattern, chains) in by_pattern {
            inner
                .insert(pattern.clone(), chains)
                .map_err(|e| BuildError::invalid_pattern(&pattern, &e.to_string()))?;
        }

        Ok(Self { inner, not_found: Arc::new(not_found), method_not_allowed: Arc::new(method_not_allowed) })
    }

    /// Matches `(method, path)` to a chain. Always returns a runnable match;
    /// routing failures resolve to the fallback chains.
    pub fn at(&self, method: &Method, path: &str) -> RouteMatch {
        let matched = match self.inner.at(path) {
            Ok(matched) => matched,
            Err(_) => {
                debug!(%method, path, "no route matched");
                return RouteMatch { chain: Arc::clone(&self.not_found), params: Vec::new() };
            }
        };

        match matched.value.iter().find(|chain| chain.accepts(method)) {
            Some(chain) => {
                let params =
                    matched.params.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect();
                RouteMatch { chain: Arc::clone(chain), params }
            }
            None => {
                debug!(%method, path, "no chain accepts the method");
                RouteMatch { chain: Arc::clone(&self.method_not_allowed), params: Vec::new() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Route, handler_fn};

    fn noop_route(pattern: &str, method: Method) -> Chain {
        Route::new(pattern).method(method).handle(handler_fn(|_| {})).into_chain("", &[])
    }

    fn fallback(pattern: &str) -> Chain {
        Chain::new(String::from(pattern), vec![], vec![handler_fn(|_| {})], false)
    }

    fn router() -> Router {
        let chains = vec![
            noop_route("/users/{id}", Method::GET),
            noop_route("/users/{id}", Method::DELETE),
            noop_route("/health", Method::GET),
        ];
        Router::build(chains, fallback("not-found"), fallback("method-not-allowed")).unwrap()
    }

    #[test]
    fn matches_method_and_extracts_params() {
        let router = router();

        let matched = router.at(&Method::GET, "/users/42");
        assert_eq!(matched.chain().pattern(), "/users/{id}");
        assert_eq!(matched.params(), &[(String::from("id"), String::from("42"))]);

        let matched = router.at(&Method::DELETE, "/users/42");
        assert_eq!(matched.chain().pattern(), "/users/{id}");
    }

    #[test]
    fn unmatched_path_routes_to_not_found() {
        let router = router();
        let matched = router.at(&Method::GET, "/nowhere");
        assert_eq!(matched.chain().pattern(), "not-found");
        assert!(matched.params().is_empty());
    }

    #[test]
    fn unmatched_method_routes_to_method_not_allowed() {
        let router = router();
        let matched = router.at(&Method::POST, "/health");
        assert_eq!(matched.chain().pattern(), "method-not-allowed");
        assert!(matched.params().is_empty());
    }

    #[test]
    fn conflicting_patterns_fail_the_build() {
        let chains = vec![noop_route("/users/{id}", Method::GET), noop_route("/users/{name}", Method::GET)];
        let result = Router::build(chains, fallback("nf"), fallback("mna"));
        assert!(matches!(result, Err(BuildError::InvalidPattern { .. })));
    }
}
