//! HTTP handlers for single-object operations: put, get, head, delete, copy.

use std::collections::BTreeMap;
use std::io;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use super::multipart_handlers::{self, ObjectQuery};
use super::{quoted_etag, xml_escape};
use crate::error::AppError;
use crate::models::object::ObjectMetadata;
use crate::server::AppState;
use crate::validation::parse_copy_source;
use crate::website::{self, WebsiteRoute};

const USER_META_PREFIX: &str = "x-amz-meta-";

fn extract_user_metadata(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Some(suffix) = name.as_str().strip_prefix(USER_META_PREFIX) {
            if let Ok(value) = value.to_str() {
                metadata.insert(suffix.to_ascii_lowercase(), value.to_string());
            }
        }
    }
    metadata
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMetadata, size: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("binary/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&size.to_string()).unwrap(),
    );
    headers.insert(header::ETAG, quoted_etag(&meta.etag));
    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&meta.last_modified.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    if let Some(encoding) = &meta.content_encoding {
        if let Ok(v) = HeaderValue::from_str(encoding) {
            headers.insert(header::CONTENT_ENCODING, v);
        }
    }
    if let Some(disposition) = &meta.content_disposition {
        if let Ok(v) = HeaderValue::from_str(disposition) {
            headers.insert(header::CONTENT_DISPOSITION, v);
        }
    }
    if let Some(cache_control) = &meta.cache_control {
        if let Ok(v) = HeaderValue::from_str(cache_control) {
            headers.insert(header::CACHE_CONTROL, v);
        }
    }
    for (key, value) in &meta.metadata {
        if let Ok(header_name) = format!("{USER_META_PREFIX}{key}").parse::<header::HeaderName>() {
            if let Ok(header_value) = HeaderValue::from_str(value) {
                headers.insert(header_name, header_value);
            }
        }
    }
}

/// `PUT /{bucket}/{*key}` — upload, copy when `x-amz-copy-source` is set, or
/// stage a multipart part when `partNumber`/`uploadId` are present.
pub async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    if q.upload_id.is_some() || q.part_number.is_some() {
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|err| AppError::InvalidRequest(err.to_string()))?;
        return multipart_handlers::upload_part(
            State(state),
            Path((bucket, key)),
            Query(q),
            bytes,
        )
        .await;
    }

    if let Some(copy_source) = headers
        .get("x-amz-copy-source")
        .and_then(|v| v.to_str().ok())
    {
        return copy_object(&state, &bucket, &key, copy_source, &headers).await;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_md5 = headers
        .get(header::CONTENT_MD5)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let user_metadata = extract_user_metadata(&headers);

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::other(err)));

    let outcome = state
        .store
        .put_object_checked(&bucket, &key, content_type, user_metadata, content_md5, stream)
        .await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::ETAG, quoted_etag(&outcome.etag));
    Ok(response)
}

async fn copy_object(
    state: &AppState,
    dest_bucket: &str,
    dest_key: &str,
    copy_source: &str,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let (source_bucket, source_key) = parse_copy_source(copy_source)?;

    let directive = headers
        .get("x-amz-metadata-directive")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("COPY");

    let replace = if directive.eq_ignore_ascii_case("REPLACE") {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        Some((content_type, extract_user_metadata(headers)))
    } else {
        None
    };

    let outcome = state
        .store
        .copy_object(dest_bucket, dest_key, &source_bucket, &source_key, replace)
        .await?;

    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<CopyObjectResult>"#,
            r#"<ETag>&quot;{}&quot;</ETag>"#,
            r#"<LastModified>{}</LastModified>"#,
            r#"</CopyObjectResult>"#
        ),
        xml_escape(&outcome.etag),
        outcome
            .last_modified
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    let mut response = Response::new(Body::from(xml));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    Ok(response)
}

/// `GET /{bucket}/{*key}` — download, list parts of a multipart upload when
/// `uploadId` is present, with `Range` support and a website-mode fallback
/// when the bucket has static-website routing enabled.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if q.upload_id.is_some() {
        return multipart_handlers::list_parts(State(state), Path((bucket, key)), Query(q)).await;
    }

    match state.store.head_object(&bucket, &key).await {
        Ok((meta, size)) => stream_object(&state, &bucket, &key, meta, size, &headers).await,
        Err(AppError::NoSuchKey { .. }) => {
            let website = match state.store.get_website(&bucket).await.ok().flatten() {
                Some(website) => Some(website),
                None => state.default_website.as_deref().cloned(),
            };
            if let Some(website) = website {
                return serve_website_fallback(&state, &bucket, &key, &website).await;
            }
            Err(AppError::NoSuchKey { bucket, key })
        }
        Err(err) => Err(err),
    }
}

async fn serve_website_fallback(
    state: &AppState,
    bucket: &str,
    key: &str,
    website: &crate::models::website::WebsiteConfiguration,
) -> Result<Response, AppError> {
    match website::resolve(website, key, false) {
        WebsiteRoute::Index(doc_key) => match state.store.head_object(bucket, &doc_key).await {
            Ok((meta, size)) => stream_object(state, bucket, &doc_key, meta, size, &HeaderMap::new()).await,
            Err(_) => Ok(not_found_page(website)),
        },
        WebsiteRoute::ErrorDocument(doc_key) => match state.store.head_object(bucket, &doc_key).await {
            Ok((meta, size)) => {
                let mut response =
                    stream_object(state, bucket, &doc_key, meta, size, &HeaderMap::new()).await?;
                *response.status_mut() = StatusCode::NOT_FOUND;
                Ok(response)
            }
            Err(_) => Ok(not_found_page(website)),
        },
        WebsiteRoute::DefaultNotFound => Ok(not_found_page(website)),
    }
}

fn not_found_page(_website: &crate::models::website::WebsiteConfiguration) -> Response {
    let mut response = Response::new(Body::from(website::DEFAULT_NOT_FOUND_BODY));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    response
}

async fn stream_object(
    state: &AppState,
    bucket: &str,
    key: &str,
    meta: ObjectMetadata,
    size: u64,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, size));

    let mut file = state.store.open_object(bucket, key).await?;

    if let Some((start, end)) = range {
        if start > end || end >= size {
            return Err(AppError::RangeNotSatisfiable);
        }
        use tokio::io::{AsyncSeekExt, SeekFrom};
        file.seek(SeekFrom::Start(start)).await?;
        let length = end - start + 1;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).await?;

        let mut response = Response::new(Body::from(buf));
        *response.status_mut() = StatusCode::PARTIAL_CONTENT;
        set_object_headers(response.headers_mut(), &meta, length);
        response.headers_mut().insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")).unwrap(),
        );
        response
            .headers_mut()
            .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        return Ok(response);
    }

    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta, size);
    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    Ok(response)
}

/// Parse a single-range `bytes=start-end` header, clamped to `size`.
fn parse_range(value: &str, size: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    if start.is_empty() {
        let suffix_len: u64 = end.parse().ok()?;
        let start = size.saturating_sub(suffix_len);
        return Some((start, size.saturating_sub(1)));
    }
    let start: u64 = start.parse().ok()?;
    let end = if end.is_empty() {
        size.saturating_sub(1)
    } else {
        end.parse().ok()?
    };
    Some((start, end))
}

/// `HEAD /{bucket}/{*key}`
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, size) = state.store.head_object(&bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta, size);
    Ok(response)
}

/// `DELETE /{bucket}/{*key}` — delete, or abort a multipart upload when
/// `uploadId` is present.
pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    if q.upload_id.is_some() {
        let response =
            multipart_handlers::abort_multipart_upload(State(state), Path((bucket, key)), Query(q))
                .await?;
        return Ok(response.into_response());
    }
    state.store.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `POST /{bucket}/{*key}` — initiate (`?uploads`) or complete
/// (`?uploadId=`) a multipart upload.
pub async fn post_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    if q.uploads.is_some() {
        return multipart_handlers::initiate_multipart_upload(
            State(state),
            Path((bucket, key)),
            headers,
        )
        .await;
    }
    if q.upload_id.is_some() {
        let text = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|err| AppError::InvalidRequest(err.to_string()))?;
        let text = String::from_utf8(text.to_vec())
            .map_err(|_| AppError::MalformedXml)?;
        return multipart_handlers::complete_multipart_upload(
            State(state),
            Path((bucket, key)),
            Query(q),
            text,
        )
        .await;
    }
    Err(AppError::InvalidRequest(
        "unsupported object-level POST operation".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_range() {
        assert_eq!(parse_range("bytes=0-99", 65536), Some((0, 99)));
    }

    #[test]
    fn parses_suffix_range() {
        assert_eq!(parse_range("bytes=-500", 1000), Some((500, 999)));
    }

    #[test]
    fn parses_open_ended_range() {
        assert_eq!(parse_range("bytes=100-", 1000), Some((100, 999)));
    }
}
