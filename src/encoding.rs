//! JSON response encoding, plain and gzip-compressed.
//!
//! Both modes serialize the payload once into a pooled scratch buffer, append
//! exactly one trailing newline, and count the pre-compression bytes on the
//! context for the request log. Failures are fail-soft: a marshalling or
//! write error is appended to the context's error list and the response still
//! goes out with whatever status was committed.
//!
//! `flate2`'s `GzEncoder` is consumed by `finish`, so the reuse pool holds
//! the scratch buffers rather than the encoders; an encoder is always fully
//! finished before its buffer returns to the pool.

use crate::context::Context;
use crate::pool::Pool;
use bytes::{BufMut, BytesMut};
use flate2::Compression;
use flate2::write::GzEncoder;
use http::StatusCode;
use http::header::{CONTENT_ENCODING, HeaderValue};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::io::Write;

static SCRATCH: Lazy<Pool<Vec<u8>>> = Lazy::new(Pool::new);

/// Whether `status` permits a response body. Informational statuses,
/// 204 No Content, and 304 Not Modified never carry one.
pub(crate) fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

/// Writes `payload` as plain JSON plus one newline.
pub(crate) fn write_json<T: Serialize>(ctx: &mut Context, status: StatusCode, payload: &T) {
    ctx.set_status(status);

    let mut scratch = SCRATCH.acquire();
    marshal(ctx, payload, &mut scratch);
    ctx.push_body(&scratch);
    SCRATCH.release(scratch);
}

/// Writes `payload` as gzip-compressed JSON plus one newline. The byte count
/// reported on the context is the uncompressed size, mirroring the plain
/// mode, while the body holds the compressed stream.
pub(crate) fn write_compressed_json<T: Serialize>(ctx: &mut Context, status: StatusCode, payload: &T) {
    ctx.header(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    ctx.set_status(status);

    let mut scratch = SCRATCH.acquire();
    marshal(ctx, payload, &mut scratch);

    // Compress into a fresh buffer and append it only once both the write
    // and the trailer succeed, so a failed encode leaves any body written by
    // an earlier handler (and its byte count) intact.
    let mut encoder = GzEncoder::new(BytesMut::new().writer(), Compression::default());
    let write_result = encoder.write_all(&scratch);
    match encoder.finish() {
        Ok(sink) if write_result.is_ok() => {
            ctx.body_mut().unsplit(sink.into_inner());
            ctx.add_bytes(scratch.len());
        }
        Ok(_) => {}
        Err(err) => ctx.append_error(err),
    }
    if let Err(err) = write_result {
        ctx.append_error(err);
    }
    SCRATCH.release(scratch);
}

/// Serializes into `scratch` and appends the trailing newline. On failure the
/// error is recorded and the buffer keeps whatever partial output was
/// produced, newline included.
fn marshal<T: Serialize>(ctx: &mut Context, payload: &T, scratch: &mut Vec<u8>) {
    if let Err(err) = serde_json::to_writer(&mut *scratch, payload) {
        ctx.append_error(err);
    }
    scratch.push(b'\n');
}
