//! HTTP handlers for the multipart upload sub-protocol: initiate, upload
//! part, complete, abort, and list parts.

use std::collections::BTreeMap;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::xml_escape;
use crate::error::AppError;
use crate::server::AppState;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ObjectQuery {
    pub uploads: Option<String>,
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(rename = "partNumber")]
    pub part_number: Option<u32>,
}

fn xml_response(body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    response
}

const USER_META_PREFIX: &str = "x-amz-meta-";

fn extract_user_metadata(headers: &axum::http::HeaderMap) -> BTreeMap<String, String> {
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

/// `POST /{bucket}/{*key}?uploads` — initiate a multipart upload.
pub async fn initiate_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("binary/octet-stream")
        .to_string();
    let metadata = extract_user_metadata(&headers);

    let upload_id = state
        .store
        .initiate_multipart_upload(&bucket, &key, content_type, metadata)
        .await?;

    Ok(xml_response(format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
            r#"<Bucket>{}</Bucket><Key>{}</Key><UploadId>{}</UploadId>"#,
            r#"</InitiateMultipartUploadResult>"#
        ),
        xml_escape(&bucket),
        xml_escape(&key),
        xml_escape(&upload_id),
    )))
}

/// `PUT /{bucket}/{*key}?partNumber=&uploadId=` — upload a single part.
pub async fn upload_part(
    State(state): State<AppState>,
    Path((bucket, _key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
    body: Bytes,
) -> Result<Response, AppError> {
    let upload_id = q
        .upload_id
        .ok_or_else(|| AppError::InvalidRequest("missing uploadId".into()))?;
    let part_number = q
        .part_number
        .ok_or_else(|| AppError::InvalidRequest("missing partNumber".into()))?;

    let etag = state
        .store
        .upload_part(&bucket, &upload_id, part_number, &body)
        .await?;

    let mut response = Response::new(Body::empty());
    response
        .headers_mut()
        .insert(header::ETAG, super::quoted_etag(&etag));
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteRequest {
    #[serde(rename = "Part", default)]
    parts: Vec<CompletePart>,
}

#[derive(Debug, Deserialize)]
struct CompletePart {
    #[serde(rename = "PartNumber")]
    part_number: u32,
}

/// `POST /{bucket}/{*key}?uploadId=` — complete a multipart upload.
pub async fn complete_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
    body: String,
) -> Result<Response, AppError> {
    let upload_id = q
        .upload_id
        .ok_or_else(|| AppError::InvalidRequest("missing uploadId".into()))?;

    let request: CompleteRequest =
        quick_xml::de::from_str(&body).map_err(|_| AppError::MalformedXml)?;
    let part_numbers: Vec<u32> = request.parts.into_iter().map(|p| p.part_number).collect();

    let outcome = state
        .store
        .complete_multipart_upload(&bucket, &upload_id, &part_numbers)
        .await?;

    Ok(xml_response(format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<CompleteMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
            r#"<Bucket>{}</Bucket><Key>{}</Key><ETag>&quot;{}&quot;</ETag>"#,
            r#"</CompleteMultipartUploadResult>"#
        ),
        xml_escape(&bucket),
        xml_escape(&key),
        xml_escape(&outcome.etag),
    )))
}

/// `DELETE /{bucket}/{*key}?uploadId=` — abort a multipart upload.
pub async fn abort_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, _key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
) -> Result<impl IntoResponse, AppError> {
    let upload_id = q
        .upload_id
        .ok_or_else(|| AppError::InvalidRequest("missing uploadId".into()))?;
    state.store.abort_multipart_upload(&bucket, &upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /{bucket}/{*key}?uploadId=` — list the parts uploaded so far.
pub async fn list_parts(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    let upload_id = q
        .upload_id
        .ok_or_else(|| AppError::InvalidRequest("missing uploadId".into()))?;
    let parts = state.store.list_parts(&bucket, &upload_id).await?;

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListPartsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
    );
    xml.push_str(&format!("<Bucket>{}</Bucket>", xml_escape(&bucket)));
    xml.push_str(&format!("<Key>{}</Key>", xml_escape(&key)));
    xml.push_str(&format!("<UploadId>{}</UploadId>", xml_escape(&upload_id)));
    for part in &parts {
        xml.push_str("<Part>");
        xml.push_str(&format!("<PartNumber>{}</PartNumber>", part.part_number));
        xml.push_str(&format!("<Size>{}</Size>", part.size));
        xml.push_str("</Part>");
    }
    xml.push_str("</ListPartsResult>");
    Ok(xml_response(xml))
}
