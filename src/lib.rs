//! A handler-chain composition and dispatch layer for HTTP services.
//!
//! Middleware declared at application, group, and route scope merges into
//! one frozen, deterministic chain per route. Each request runs its chain
//! cooperatively on a pooled execution context: a middleware calls
//! [`Context::next`] to hand control inward and regains it on the way back
//! out, onion style. Responses are JSON, optionally gzip-compressed, with
//! consistent status/size/error bookkeeping surfaced in one structured log
//! line per request.
//!
//! Transport is not owned here: an HTTP server collaborator parses requests
//! and calls [`App::dispatch`] once per request.
//!
//! ```no_run
//! use http::StatusCode;
//! use serde_json::json;
//! use weft::{App, handler_fn};
//!
//! let app = App::builder()
//!     .group("/api", |api| {
//!         api.get("/users/{id}", handler_fn(|ctx| {
//!             let id = ctx.param("id").unwrap_or_default().to_string();
//!             ctx.json(StatusCode::OK, &json!({ "id": id }));
//!         }));
//!     })
//!     .build()
//!     .expect("route table");
//! # let _ = app;
//! ```

mod app;
mod bindings;
mod chain;
mod context;
mod encoding;
mod group;
mod logger;
mod pool;
mod router;
mod store;

pub mod error;

pub use app::{App, AppBuilder};
pub use bindings::Bindings;
pub use chain::{Chain, Handler, Route, handler_fn};
pub use context::{COMPRESS_HINT, Context};
pub use error::{BoxError, BuildError, Origin, TracedError};
pub use group::Group;
pub use logger::{LogRecord, default_headers, init_tracing, logger};
pub use router::{RouteMatch, Router};
pub use store::Store;
