//! End-of-request logging.
//!
//! A [`LogRecord`] is an immutable snapshot of one completed request, built
//! once after the chain finishes and emitted as a single structured event
//! followed by one event per accumulated error. Errors wrapped by
//! [`TracedError`](crate::error::TracedError) surface their origin.

use crate::chain::{Handler, handler_fn};
use crate::context::Context;
use crate::error::{BoxError, TracedError};
use http::header::HeaderValue;
use http::{Method, StatusCode};
use std::time::{Duration, Instant, SystemTime};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Immutable snapshot of one completed request's outcome.
pub struct LogRecord {
    timestamp: SystemTime,
    status: StatusCode,
    latency: Duration,
    method: Method,
    path: String,
    client_ip: String,
    bytes_written: usize,
    errors: Vec<BoxError>,
}

impl LogRecord {
    /// Snapshots the context after chain completion, draining its error
    /// list. The status is the bookkeeping view: the last one a handler set.
    pub fn capture(ctx: &mut Context, start: Instant) -> Self {
        Self {
            timestamp: SystemTime::now(),
            status: ctx.status(),
            latency: start.elapsed(),
            method: ctx.method().clone(),
            path: ctx.path().to_string(),
            client_ip: ctx.client_ip().unwrap_or_default(),
            bytes_written: ctx.bytes_written(),
            errors: ctx.take_errors(),
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn errors(&self) -> &[BoxError] {
        &self.errors
    }

    /// Emits one structured line for the request, then one line per error.
    pub fn emit(&self) {
        info!(
            status = self.status.as_u16(),
            latency_us = self.latency.as_micros() as u64,
            client_ip = %self.client_ip,
            method = %self.method,
            path = %self.path,
            bytes = self.bytes_written,
            "request completed"
        );
        for err in &self.errors {
            match err.downcast_ref::<TracedError>() {
                Some(traced) => error!(origin = %traced.origin(), "{traced}"),
                None => error!("{err}"),
            }
        }
    }
}

/// Default logging middleware: times the rest of the chain, then captures
/// and emits the record. Registered first, so it observes every inner
/// handler including the fallback chains.
pub fn logger() -> Handler {
    handler_fn(|ctx| {
        let start = Instant::now();
        ctx.next();
        LogRecord::capture(ctx, start).emit();
    })
}

/// Default middleware stamping the `Server` response header, set-if-absent.
pub fn default_headers() -> Handler {
    handler_fn(|ctx| {
        ctx.header(http::header::SERVER, HeaderValue::from_static("weft"));
        ctx.next();
    })
}

/// Installs a formatting `tracing` subscriber at INFO level. Call once at
/// process start; panics if a global subscriber is already set.
pub fn init_tracing() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}
