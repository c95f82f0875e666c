//! Security event sink and the suspicious-request monitor.
//!
//! Events are plain `tracing` records under the `security` target, so they
//! can be routed or filtered (`RUST_LOG=security=warn`) like any other log.

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::warn;

pub const SECURITY: &str = "security";

/// Header bytes above this are reported as `LARGE_HEADERS`.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

const SUSPICIOUS_PATTERNS: &[&str] = &[
    "../",
    "..\\",
    "<script",
    "javascript:",
    "vbscript:",
    "onload=",
    "onerror=",
    "eval(",
    "alert(",
    "confirm(",
    "prompt(",
    "document.cookie",
    "document.write",
];

/// First attack pattern found in the path or query, if any.
pub fn suspicious_pattern(path: &str, query: Option<&str>) -> Option<&'static str> {
    let path = path.to_lowercase();
    let query = query.map(str::to_lowercase).unwrap_or_default();
    SUSPICIOUS_PATTERNS
        .iter()
        .copied()
        .find(|p| path.contains(p) || query.contains(p))
}

/// Logs suspicious requests. Never blocks them.
pub async fn monitor(request: Request, next: Next) -> Response {
    let uri = request.uri();
    if let Some(pattern) = suspicious_pattern(uri.path(), uri.query()) {
        warn!(
            target: SECURITY,
            event = "SUSPICIOUS_REQUEST",
            pattern,
            method = %request.method(),
            uri = %uri,
        );
    }

    let header_bytes: usize = request
        .headers()
        .iter()
        .map(|(k, v)| k.as_str().len() + v.len())
        .sum();
    if header_bytes > MAX_HEADER_BYTES {
        warn!(
            target: SECURITY,
            event = "LARGE_HEADERS",
            header_bytes,
            uri = %request.uri(),
        );
    }

    next.run(request).await
}
