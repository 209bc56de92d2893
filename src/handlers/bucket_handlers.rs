//! HTTP handlers for bucket-level operations: create/delete/list, the
//! canned sub-resource GETs (`location`, `acl`, `versioning`, `policy`),
//! CORS/website configuration, and bulk delete.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use serde::Deserialize;

use super::xml_escape;
use crate::error::AppError;
use crate::listing::ListParams;
use crate::models::cors::CorsConfiguration;
use crate::models::website::WebsiteConfiguration;
use crate::server::AppState;
use crate::validation::ensure_bucket_name_safe;

fn xml_response(body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    response
}

/// `GET /` — list every bucket.
pub async fn list_buckets(State(state): State<AppState>) -> Result<Response, AppError> {
    let buckets = state.store.list_buckets().await?;
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Buckets>"#,
    );
    for bucket in &buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            bucket.creation_date.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets></ListAllMyBucketsResult>");
    Ok(xml_response(xml))
}

#[derive(Debug, Deserialize, Default)]
pub struct BucketQuery {
    location: Option<String>,
    cors: Option<String>,
    acl: Option<String>,
    website: Option<String>,
    versioning: Option<String>,
    policy: Option<String>,
    #[serde(rename = "list-type")]
    list_type: Option<u8>,
    prefix: Option<String>,
    delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    max_keys: Option<usize>,
    marker: Option<String>,
    #[serde(rename = "continuation-token")]
    continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    start_after: Option<String>,
}

/// `GET /{bucket}` — dispatches on query string: sub-resource GETs, or a
/// v1/v2 object listing when none of them are present.
pub async fn bucket_get(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(q): Query<BucketQuery>,
) -> Result<Response, AppError> {
    if q.location.is_some() {
        return Ok(xml_response(String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/"></LocationConstraint>"#,
        )));
    }
    if q.acl.is_some() {
        return Ok(xml_response(String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><AccessControlPolicy xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Owner><ID>local</ID><DisplayName>local</DisplayName></Owner><AccessControlList></AccessControlList></AccessControlPolicy>"#,
        )));
    }
    if q.versioning.is_some() {
        return Ok(xml_response(String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><VersioningConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"></VersioningConfiguration>"#,
        )));
    }
    if q.policy.is_some() {
        return Ok(xml_response(String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><Policy></Policy>"#,
        )));
    }
    if q.cors.is_some() {
        return get_cors(&state, &bucket).await;
    }
    if q.website.is_some() {
        return get_website(&state, &bucket).await;
    }

    list_objects(&state, &bucket, &q).await
}

async fn get_cors(state: &AppState, bucket: &str) -> Result<Response, AppError> {
    match state.store.get_cors(bucket).await? {
        Some(cors) => {
            let xml = quick_xml::se::to_string(&cors).map_err(|err| AppError::Internal(err.to_string()))?;
            Ok(xml_response(xml))
        }
        None => Err(AppError::InvalidRequest(
            "bucket has no CORS configuration".into(),
        )),
    }
}

async fn get_website(state: &AppState, bucket: &str) -> Result<Response, AppError> {
    match state.store.get_website(bucket).await? {
        Some(website) => {
            let xml = quick_xml::se::to_string(&website)
                .map_err(|err| AppError::Internal(err.to_string()))?;
            Ok(xml_response(xml))
        }
        None => Err(AppError::InvalidRequest(
            "bucket has no website configuration".into(),
        )),
    }
}

async fn list_objects(
    state: &AppState,
    bucket: &str,
    q: &BucketQuery,
) -> Result<Response, AppError> {
    let v2 = q.list_type == Some(2);
    let marker = if v2 {
        q.continuation_token.clone().or_else(|| q.start_after.clone())
    } else {
        q.marker.clone()
    }
    .unwrap_or_default();

    let params = ListParams {
        prefix: q.prefix.clone().unwrap_or_default(),
        delimiter: q.delimiter.clone(),
        marker,
        max_keys: q.max_keys.unwrap_or(1000),
    };
    let result = state.store.list_objects(bucket, params.clone()).await?;

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
    );
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(bucket)));
    xml.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(&params.prefix)));
    xml.push_str(&format!("<MaxKeys>{}</MaxKeys>", params.max_keys));
    if let Some(delimiter) = &params.delimiter {
        xml.push_str(&format!("<Delimiter>{}</Delimiter>", xml_escape(delimiter)));
    }
    xml.push_str(&format!(
        "<IsTruncated>{}</IsTruncated>",
        result.is_truncated
    ));

    if v2 {
        xml.push_str(&format!("<KeyCount>{}</KeyCount>", result.key_count));
        if let Some(token) = &q.continuation_token {
            xml.push_str(&format!(
                "<ContinuationToken>{}</ContinuationToken>",
                xml_escape(token)
            ));
        }
        if let Some(start_after) = &q.start_after {
            xml.push_str(&format!("<StartAfter>{}</StartAfter>", xml_escape(start_after)));
        }
        if let Some(next) = &result.next_marker {
            xml.push_str(&format!(
                "<NextContinuationToken>{}</NextContinuationToken>",
                xml_escape(next)
            ));
        }
    } else {
        if let Some(marker) = &q.marker {
            xml.push_str(&format!("<Marker>{}</Marker>", xml_escape(marker)));
        }
        if let Some(next) = &result.next_marker {
            xml.push_str(&format!("<NextMarker>{}</NextMarker>", xml_escape(next)));
        }
    }

    for object in &result.contents {
        xml.push_str("<Contents>");
        xml.push_str(&format!("<Key>{}</Key>", xml_escape(&object.key)));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            object.last_modified.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str(&format!("<ETag>&quot;{}&quot;</ETag>", xml_escape(&object.etag)));
        xml.push_str(&format!("<Size>{}</Size>", object.size));
        xml.push_str("<StorageClass>STANDARD</StorageClass>");
        xml.push_str("</Contents>");
    }
    for prefix in &result.common_prefixes {
        xml.push_str("<CommonPrefixes><Prefix>");
        xml.push_str(&xml_escape(prefix));
        xml.push_str("</Prefix></CommonPrefixes>");
    }
    xml.push_str("</ListBucketResult>");
    Ok(xml_response(xml))
}

/// `PUT /{bucket}` — create, or set CORS/website configuration.
pub async fn bucket_put(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(q): Query<BucketQuery>,
    body: String,
) -> Result<Response, AppError> {
    if q.cors.is_some() {
        let cors: CorsConfiguration =
            quick_xml::de::from_str(&body).map_err(|_| AppError::MalformedXml)?;
        state.store.put_cors(&bucket, cors).await?;
        return Ok(Response::new(Body::empty()));
    }
    if q.website.is_some() {
        let website: WebsiteConfiguration =
            quick_xml::de::from_str(&body).map_err(|_| AppError::MalformedXml)?;
        state.store.put_website(&bucket, website).await?;
        return Ok(Response::new(Body::empty()));
    }

    ensure_bucket_name_safe(&bucket)?;
    state.store.create_bucket(&bucket).await?;
    Ok(xml_response(format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<CreateBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
            r#"<Location>/{}</Location></CreateBucketResult>"#
        ),
        xml_escape(&bucket)
    )))
}

/// `DELETE /{bucket}` — delete, or remove CORS/website configuration.
pub async fn bucket_delete(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(q): Query<BucketQuery>,
) -> Result<impl IntoResponse, AppError> {
    if q.cors.is_some() {
        state.store.delete_cors(&bucket).await?;
        return Ok(StatusCode::NO_CONTENT);
    }
    if q.website.is_some() {
        state.store.delete_website(&bucket).await?;
        return Ok(StatusCode::NO_CONTENT);
    }
    state.store.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `HEAD /{bucket}` — existence check.
pub async fn bucket_head(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if state.store.bucket_exists(&bucket).await {
        Ok(StatusCode::OK)
    } else {
        Err(AppError::NoSuchBucket { bucket })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Delete")]
struct DeleteRequest {
    #[serde(rename = "Object", default)]
    objects: Vec<DeleteObjectEntry>,
}

#[derive(Debug, Deserialize)]
struct DeleteObjectEntry {
    #[serde(rename = "Key")]
    key: String,
}

/// `POST /{bucket}?delete` — bulk delete.
pub async fn bulk_delete(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: String,
) -> Result<Response, AppError> {
    let request: DeleteRequest =
        quick_xml::de::from_str(&body).map_err(|_| AppError::MalformedXml)?;
    let keys: Vec<String> = request.objects.into_iter().map(|o| o.key).collect();

    let (deleted, errors) = state.store.delete_objects(&bucket, &keys).await?;

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><DeleteResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
    );
    for key in &deleted {
        xml.push_str(&format!("<Deleted><Key>{}</Key></Deleted>", xml_escape(key)));
    }
    for (key, err) in &errors {
        xml.push_str("<Error>");
        xml.push_str(&format!("<Key>{}</Key>", xml_escape(key)));
        xml.push_str(&format!("<Code>{}</Code>", err.code()));
        xml.push_str(&format!("<Message>{}</Message>", xml_escape(&err.to_string())));
        xml.push_str("</Error>");
    }
    xml.push_str("</DeleteResult>");
    Ok(xml_response(xml))
}
