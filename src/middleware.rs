//! Bucket-name resolution (path-style vs. virtual-host-style) and CORS
//! header injection, applied ahead of route dispatch.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::cors;
use crate::server::AppState;

/// Resolve the bucket implied by a request's `Host` header, if the host
/// isn't the server's own configured hostname and either ends in a
/// configured virtual-hosting suffix or matches a bucket that already
/// exists.
pub async fn resolve_virtual_host_bucket(
    state: &AppState,
    headers: &HeaderMap,
) -> Option<String> {
    let host = headers.get("host")?.to_str().ok()?;
    let host_without_port = host.split(':').next().unwrap_or(host);

    if host_without_port == state.config.hostname {
        return None;
    }

    if let Some(suffix) = &state.config.virtual_host_suffix {
        let dotted_suffix = format!(".{suffix}");
        if let Some(bucket) = host_without_port.strip_suffix(&dotted_suffix) {
            if !bucket.is_empty() {
                return Some(bucket.to_string());
            }
        }
    }

    if state.store.bucket_exists(host_without_port).await {
        return Some(host_without_port.to_string());
    }

    None
}

/// Attach CORS response headers for a resolved decision, or for the
/// default wildcard rule when the bucket has no configuration of its own.
pub fn apply_cors_headers(
    response: &mut Response,
    decision: &crate::cors::CorsDecision,
) {
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        decision.allow_origin.parse().unwrap(),
    );
    if let Some(methods) = &decision.allow_methods {
        headers.insert(
            "access-control-allow-methods",
            methods.join(", ").parse().unwrap(),
        );
    }
    if let Some(allowed) = &decision.allow_headers {
        if !allowed.is_empty() {
            headers.insert(
                "access-control-allow-headers",
                allowed.join(", ").parse().unwrap(),
            );
        }
    }
    if !decision.expose_headers.is_empty() {
        headers.insert(
            "access-control-expose-headers",
            decision.expose_headers.join(", ").parse().unwrap(),
        );
    }
    if let Some(max_age) = decision.max_age_seconds {
        headers.insert("access-control-max-age", max_age.into());
    }
}

/// Rewrite virtual-hosted-style requests onto the path-style route table,
/// answer CORS preflights directly, and inject CORS headers on the way out.
pub async fn cors_and_host(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(bucket) = resolve_virtual_host_bucket(&state, request.headers()).await {
        rewrite_path_for_bucket(request.uri_mut(), &bucket);
    }

    let bucket = first_path_segment(request.uri().path());
    let origin = request
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if request.method() == axum::http::Method::OPTIONS {
        if let (Some(bucket), Some(origin)) = (&bucket, &origin) {
            let requested_method = request
                .headers()
                .get("access-control-request-method")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("GET")
                .to_string();
            let requested_headers: Vec<String> = request
                .headers()
                .get("access-control-request-headers")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(',').map(|h| h.trim().to_ascii_lowercase()).collect())
                .unwrap_or_default();

            if let Some(config) = resolve_cors_config(&state, bucket).await {
                return match cors::evaluate_preflight(&config, origin, &requested_method, &requested_headers) {
                    Some(decision) => {
                        let mut response = Response::new(axum::body::Body::empty());
                        apply_cors_headers(&mut response, &decision);
                        response
                    }
                    None => crate::error::AppError::AccessDenied.into_response(),
                };
            }
        }
    }

    let method = request.method().clone();
    let mut response = next.run(request).await;

    if let (Some(bucket), Some(origin)) = (&bucket, &origin) {
        if let Some(config) = resolve_cors_config(&state, bucket).await {
            if let Some(decision) = cors::evaluate(&config, origin, method.as_str()) {
                apply_cors_headers(&mut response, &decision);
            }
        }
    }

    response
}

/// A bucket's own CORS configuration, falling back to the server-wide
/// `--cors` document when the bucket has none of its own.
async fn resolve_cors_config(
    state: &AppState,
    bucket: &str,
) -> Option<std::sync::Arc<crate::models::cors::CorsConfiguration>> {
    if let Ok(Some(config)) = state.store.get_cors(bucket).await {
        return Some(std::sync::Arc::new(config));
    }
    state.default_cors.clone()
}

fn first_path_segment(path: &str) -> Option<String> {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn rewrite_path_for_bucket(uri: &mut Uri, bucket: &str) {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let (path, query) = path_and_query
        .split_once('?')
        .map(|(p, q)| (p, Some(q)))
        .unwrap_or((path_and_query.as_str(), None));

    let rewritten = match query {
        Some(q) => format!("/{bucket}{path}?{q}"),
        None => format!("/{bucket}{path}"),
    };

    if let Ok(new_uri) = rewritten.parse() {
        *uri = new_uri;
    }
}
