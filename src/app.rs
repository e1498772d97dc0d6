//! The application engine: route registration, exactly-once composition of
//! the group tree into frozen chains, and the pooled per-request dispatch
//! entry point called by the transport collaborator.

use crate::chain::{Chain, Handler, Route, handler_fn};
use crate::context::Context;
use crate::error::BuildError;
use crate::group::Group;
use crate::logger::{default_headers, logger};
use crate::pool::Pool;
use crate::router::Router;
use crate::store::Store;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use serde_json::json;
use std::net::SocketAddr;

/// Builds an [`App`]: collects default middleware, the group tree, and the
/// fallback handlers, then composes and freezes everything in one pass.
pub struct AppBuilder {
    defaults: Vec<Handler>,
    root: Group,
    store: Store,
    not_found: Handler,
    method_not_allowed: Handler,
}

impl AppBuilder {
    /// A builder with the standard default middleware: request logging and
    /// the `Server` header stamp.
    pub fn new() -> Self {
        Self::with_defaults(vec![logger(), default_headers()])
    }

    /// A builder with no default middleware.
    pub fn bare() -> Self {
        Self::with_defaults(Vec::new())
    }

    fn with_defaults(defaults: Vec<Handler>) -> Self {
        Self {
            defaults,
            root: Group::new(""),
            store: Store::new(),
            not_found: handler_fn(|ctx| {
                ctx.json(StatusCode::NOT_FOUND, &json!({"error": "not found"}));
            }),
            method_not_allowed: handler_fn(|ctx| {
                ctx.json(StatusCode::METHOD_NOT_ALLOWED, &json!({"error": "method not allowed"}));
            }),
        }
    }

    /// Registers application-level middleware, prepended to every chain
    /// including the fallbacks. Runs in registration order, outermost first.
    pub fn middleware(mut self, middleware: Handler) -> Self {
        self.defaults.push(middleware);
        self
    }

    /// Declares a route group under `prefix`; the closure configures it.
    pub fn group(mut self, prefix: impl Into<String>, f: impl FnOnce(&mut Group)) -> Self {
        self.root.group(prefix, f);
        self
    }

    /// Registers a fully configured route at application scope.
    pub fn route(mut self, route: Route) -> Self {
        self.root.route(route);
        self
    }

    pub fn get(mut self, pattern: impl Into<String>, handler: Handler) -> Self {
        self.root.get(pattern, handler);
        self
    }

    pub fn post(mut self, pattern: impl Into<String>, handler: Handler) -> Self {
        self.root.post(pattern, handler);
        self
    }

    pub fn put(mut self, pattern: impl Into<String>, handler: Handler) -> Self {
        self.root.put(pattern, handler);
        self
    }

    pub fn delete(mut self, pattern: impl Into<String>, handler: Handler) -> Self {
        self.root.delete(pattern, handler);
        self
    }

    /// Replaces the terminal handler of the not-found fallback chain.
    pub fn not_found(mut self, handler: Handler) -> Self {
        self.not_found = handler;
        self
    }

    /// Replaces the terminal handler of the method-not-allowed fallback
    /// chain.
    pub fn method_not_allowed(mut self, handler: Handler) -> Self {
        self.method_not_allowed = handler;
        self
    }

    /// The process-wide store, for seeding configuration before serving.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Composes the group tree into frozen chains and builds the router.
    /// Happens exactly once; the resulting [`App`] is immutable.
    pub fn build(self) -> Result<App, BuildError> {
        let mut chains = Vec::new();
        self.root.collect("", &self.defaults, &mut chains)?;

        let not_found = fallback_chain("", &self.defaults, self.not_found);
        let method_not_allowed = fallback_chain("", &self.defaults, self.method_not_allowed);
        let router = Router::build(chains, not_found, method_not_allowed)?;

        Ok(App { router, store: self.store, contexts: Pool::new() })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback_chain(pattern: &str, defaults: &[Handler], terminal: Handler) -> Chain {
    let mut handlers = Vec::with_capacity(defaults.len() + 1);
    handlers.extend(defaults.iter().cloned());
    handlers.push(terminal);
    Chain::new(pattern.to_string(), Vec::new(), handlers, false)
}

/// The built application: a read-only route table plus the context pool and
/// shared store. Safe to call from many threads concurrently; each request
/// exclusively owns its pooled context for the duration of one dispatch.
pub struct App {
    router: Router,
    store: Store,
    contexts: Pool<Context>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Handles one request end to end: match, acquire a context, run the
    /// chain cooperatively, assemble the response, release the context.
    ///
    /// This is the transport collaborator's entry point; `peer_addr` is the
    /// transport-level peer, used only for client-IP resolution.
    pub fn dispatch(&self, request: Request<Bytes>, peer_addr: Option<SocketAddr>) -> Response<Bytes> {
        let (parts, body) = request.into_parts();
        let matched = self.router.at(&parts.method, parts.uri.path());
        let (chain, params) = matched.into_parts();

        let mut ctx = self.contexts.acquire();
        ctx.bind_request(parts.method, parts.uri, parts.headers, body, peer_addr, self.store.clone(), chain, params);
        ctx.next();
        let response = ctx.take_response();
        self.contexts.release(ctx);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::COMPRESS_HINT;
    use http::Method;
    use http::header::HeaderValue;
    use serde_json::Value;
    use std::io::Read;
    use std::sync::{Arc, Mutex};

    fn request(method: Method, uri: &str) -> Request<Bytes> {
        Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
    }

    fn probe(log: &Arc<Mutex<Vec<String>>>, id: &'static str) -> Handler {
        let log = Arc::clone(log);
        handler_fn(move |ctx| {
            log.lock().unwrap().push(format!("{id}:in"));
            ctx.next();
            log.lock().unwrap().push(format!("{id}:out"));
        })
    }

    #[test]
    fn dispatch_runs_scopes_in_declaration_order() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let terminal_log = Arc::clone(&log);

        let app = AppBuilder::bare()
            .middleware(probe(&log, "app"))
            .group("/api", |api| {
                api.middleware(probe(&log, "grandparent"));
                api.group("/v1", |v1| {
                    v1.middleware(probe(&log, "parent"));
                    v1.route(Route::new("/ping").method(Method::GET).with(probe(&log, "route")).handle(handler_fn(
                        move |ctx| {
                            terminal_log.lock().unwrap().push(String::from("terminal"));
                            ctx.json(StatusCode::OK, &json!({"pong": true}));
                        },
                    )));
                });
            })
            .build()
            .unwrap();

        let response = app.dispatch(request(Method::GET, "/api/v1/ping"), None);
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "app:in",
                "grandparent:in",
                "parent:in",
                "route:in",
                "terminal",
                "route:out",
                "parent:out",
                "grandparent:out",
                "app:out",
            ]
        );
    }

    #[test]
    fn default_stack_stamps_server_header() {
        let app = AppBuilder::new()
            .get("/ping", handler_fn(|ctx| ctx.json(StatusCode::OK, &json!({"pong": true}))))
            .build()
            .unwrap();

        let response = app.dispatch(request(Method::GET, "/ping"), None);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(http::header::SERVER).unwrap(), "weft");
        assert_eq!(response.body().as_ref(), b"{\"pong\":true}\n");
    }

    #[test]
    fn path_params_reach_the_handler() {
        let app = AppBuilder::bare()
            .get(
                "/users/{id}",
                handler_fn(|ctx| {
                    let id = ctx.param("id").unwrap_or("?").to_string();
                    ctx.json(StatusCode::OK, &json!({"id": id}));
                }),
            )
            .build()
            .unwrap();

        let response = app.dispatch(request(Method::GET, "/users/42"), None);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"id": "42"}));
    }

    #[test]
    fn unmatched_path_gets_not_found_json() {
        let app = AppBuilder::bare().get("/known", handler_fn(|_| {})).build().unwrap();

        let response = app.dispatch(request(Method::GET, "/unknown"), None);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"error": "not found"}));
    }

    #[test]
    fn unmatched_method_gets_method_not_allowed() {
        let app = AppBuilder::bare()
            .get("/known", handler_fn(|ctx| ctx.json(StatusCode::OK, &json!({}))))
            .build()
            .unwrap();

        let response = app.dispatch(request(Method::POST, "/known"), None);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn default_middleware_observes_fallback_chains() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let app = AppBuilder::bare().middleware(probe(&log, "app")).build().unwrap();
        app.dispatch(request(Method::GET, "/nowhere"), None);

        assert_eq!(*log.lock().unwrap(), vec!["app:in", "app:out"]);
    }

    #[test]
    fn compress_hint_header_gzips_the_response() {
        let app = AppBuilder::bare()
            .get("/data", handler_fn(|ctx| ctx.json(StatusCode::OK, &json!({"a": 1}))))
            .build()
            .unwrap();

        let plain = app.dispatch(request(Method::GET, "/data"), None);
        assert!(plain.headers().get(http::header::CONTENT_ENCODING).is_none());
        assert_eq!(plain.body().as_ref(), b"{\"a\":1}\n");

        let req = Request::builder()
            .method(Method::GET)
            .uri("/data")
            .header(&COMPRESS_HINT, HeaderValue::from_static("1"))
            .body(Bytes::new())
            .unwrap();
        let compressed = app.dispatch(req, None);
        assert_eq!(compressed.headers().get(http::header::CONTENT_ENCODING).unwrap(), "gzip");

        let mut decoder = flate2::read::GzDecoder::new(compressed.body().as_ref());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, plain.body().as_ref());
    }

    #[test]
    fn compressed_route_flag_gzips_without_the_header() {
        let app = AppBuilder::bare()
            .route(
                Route::new("/data")
                    .method(Method::GET)
                    .compressed(true)
                    .handle(handler_fn(|ctx| ctx.json(StatusCode::OK, &json!({"a": 1})))),
            )
            .build()
            .unwrap();

        let response = app.dispatch(request(Method::GET, "/data"), None);
        assert_eq!(response.headers().get(http::header::CONTENT_ENCODING).unwrap(), "gzip");
    }

    #[test]
    fn no_request_state_leaks_between_dispatches() {
        let app = AppBuilder::bare()
            .get(
                "/first",
                handler_fn(|ctx| {
                    ctx.set_value("marker", 1_u8);
                    ctx.json(StatusCode::IM_A_TEAPOT, &json!({"first": true}));
                }),
            )
            .get(
                "/second",
                handler_fn(|ctx| {
                    assert!(ctx.value::<u8>("marker").is_none());
                    assert!(ctx.errors().is_empty());
                    ctx.json(StatusCode::OK, &json!({"second": true}));
                }),
            )
            .build()
            .unwrap();

        let first = app.dispatch(request(Method::GET, "/first"), None);
        assert_eq!(first.status(), StatusCode::IM_A_TEAPOT);

        // the pool reuses the same context object for the next request
        let second = app.dispatch(request(Method::GET, "/second"), None);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.body().as_ref(), b"{\"second\":true}\n");
    }

    #[test]
    fn store_is_shared_across_requests() {
        let app = AppBuilder::bare()
            .post(
                "/seed",
                handler_fn(|ctx| {
                    ctx.store().set("flag", String::from("set"));
                    ctx.json(StatusCode::NO_CONTENT, &json!(null));
                }),
            )
            .get(
                "/read",
                handler_fn(|ctx| {
                    let flag = ctx.store().get::<String>("flag").map(|v| v.to_string()).unwrap_or_default();
                    ctx.json(StatusCode::OK, &json!({"flag": flag}));
                }),
            )
            .build()
            .unwrap();

        let seeded = app.dispatch(request(Method::POST, "/seed"), None);
        assert_eq!(seeded.status(), StatusCode::NO_CONTENT);
        assert!(seeded.body().is_empty());

        let read = app.dispatch(request(Method::GET, "/read"), None);
        let body: Value = serde_json::from_slice(read.body()).unwrap();
        assert_eq!(body, json!({"flag": "set"}));
    }

    #[test]
    fn concurrent_dispatch_is_safe() {
        let app = Arc::new(
            AppBuilder::bare()
                .get(
                    "/users/{id}",
                    handler_fn(|ctx| {
                        let id = ctx.param("id").unwrap_or_default().to_string();
                        ctx.json(StatusCode::OK, &json!({"id": id}));
                    }),
                )
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|thread| {
                let app = Arc::clone(&app);
                std::thread::spawn(move || {
                    for n in 0..50 {
                        let id = thread * 1000 + n;
                        let response = app.dispatch(request(Method::GET, &format!("/users/{id}")), None);
                        let body: Value = serde_json::from_slice(response.body()).unwrap();
                        assert_eq!(body, json!({"id": id.to_string()}));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn route_without_handlers_fails_the_build() {
        let result = AppBuilder::bare().route(Route::new("/empty").method(Method::GET)).build();
        assert!(matches!(result, Err(BuildError::EmptyRoute { .. })));
    }
}
