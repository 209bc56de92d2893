//! HTTP handlers for bucket and object operations. Each function streams
//! its body where possible and delegates storage concerns to [`crate::store::FsStore`].

pub mod bucket_handlers;
pub mod multipart_handlers;
pub mod object_handlers;

use axum::http::HeaderValue;

/// Escape the five XML-reserved characters for safe inclusion in a body.
pub(crate) fn xml_escape(value: &str) -> String {
    crate::error::xml_escape(value)
}

/// Quote an unquoted hex etag for the wire, e.g. `abc123` -> `"abc123"`.
pub(crate) fn quoted_etag(etag: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{etag}\"")).unwrap_or_else(|_| HeaderValue::from_static("\"\""))
}
