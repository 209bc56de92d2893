//! Defines routes for all S3-compatible bucket and object operations.
//!
//! ## Structure
//! - **Bucket-level endpoints** (`/{bucket}`)
//!   - `GET    /{bucket}` — list objects, or a CORS/website/location/acl/versioning/policy sub-resource
//!   - `PUT    /{bucket}` — create bucket, or set CORS/website configuration
//!   - `DELETE /{bucket}` — delete bucket, or remove CORS/website configuration
//!   - `HEAD   /{bucket}` — existence check
//!   - `POST   /{bucket}` — bulk delete (`?delete`)
//!
//! - **Object-level endpoints** (`/{bucket}/{*key}`)
//!   - `PUT    /{bucket}/{*key}` — upload, copy (`x-amz-copy-source`), or stage a multipart part
//!   - `GET    /{bucket}/{*key}` — download, or list parts of a multipart upload
//!   - `HEAD   /{bucket}/{*key}` — retrieve metadata only
//!   - `DELETE /{bucket}/{*key}` — delete, or abort a multipart upload
//!   - `POST   /{bucket}/{*key}` — initiate or complete a multipart upload
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`. Query
//! string dispatch (sub-resources, multipart phases) happens inside the
//! handlers themselves, since axum does not route on the query string.

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::get,
};

use crate::handlers::{bucket_handlers, object_handlers};
use crate::middleware;
use crate::server::AppState;

/// Build the router for all S3-compatible routes, with the virtual-host
/// rewrite and CORS middleware applied ahead of dispatch.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/{bucket}/{*key}",
            get(object_handlers::get_object)
                .put(object_handlers::put_object)
                .head(object_handlers::head_object)
                .delete(object_handlers::delete_object)
                .post(object_handlers::post_object),
        )
        .route(
            "/{bucket}",
            get(bucket_handlers::bucket_get)
                .put(bucket_handlers::bucket_put)
                .delete(bucket_handlers::bucket_delete)
                .head(bucket_handlers::bucket_head)
                .post(bucket_handlers::bulk_delete),
        )
        .route("/", get(bucket_handlers::list_buckets))
        .layer(from_fn_with_state(state.clone(), middleware::cors_and_host))
        .with_state(state)
}
