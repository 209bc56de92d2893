//! The closed set of S3-style error codes this service can return, plus the
//! XML `<Error>` body rendering shared by every failed request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("The specified bucket does not exist")]
    NoSuchBucket { bucket: String },

    #[error("The specified key does not exist")]
    NoSuchKey { bucket: String, key: String },

    #[error("The bucket you tried to delete is not empty")]
    BucketNotEmpty { bucket: String },

    #[error("The requested bucket name is not available")]
    BucketAlreadyExists { bucket: String },

    #[error("The specified bucket is not valid")]
    InvalidBucketName { bucket: String, reason: String },

    #[error("The Content-MD5 you specified did not match what we received")]
    InvalidDigest,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("The XML you provided was not well-formed")]
    MalformedXml,

    #[error("Access denied")]
    AccessDenied,

    #[error("At least one of the pre-conditions you specified did not hold")]
    PreconditionFailed,

    #[error("The requested range is not satisfiable")]
    RangeNotSatisfiable,

    #[error("We encountered an internal error, please try again")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NoSuchBucket { .. } => "NoSuchBucket",
            AppError::NoSuchKey { .. } => "NoSuchKey",
            AppError::BucketNotEmpty { .. } => "BucketNotEmpty",
            AppError::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            AppError::InvalidBucketName { .. } => "InvalidBucketName",
            AppError::InvalidDigest => "InvalidDigest",
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::MalformedXml => "MalformedXML",
            AppError::AccessDenied => "AccessDenied",
            AppError::PreconditionFailed => "PreconditionFailed",
            AppError::RangeNotSatisfiable => "InvalidRange",
            AppError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoSuchBucket { .. } | AppError::NoSuchKey { .. } => StatusCode::NOT_FOUND,
            AppError::BucketNotEmpty { .. } | AppError::BucketAlreadyExists { .. } => {
                StatusCode::CONFLICT
            }
            AppError::InvalidBucketName { .. }
            | AppError::InvalidDigest
            | AppError::InvalidRequest(_)
            | AppError::MalformedXml => StatusCode::BAD_REQUEST,
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            AppError::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Resource path reported in the `<Error>` body, if one is known.
    pub fn resource(&self) -> Option<String> {
        match self {
            AppError::NoSuchBucket { bucket } | AppError::BucketAlreadyExists { bucket } => {
                Some(format!("/{bucket}"))
            }
            AppError::BucketNotEmpty { bucket } => Some(format!("/{bucket}")),
            AppError::InvalidBucketName { bucket, .. } => Some(format!("/{bucket}")),
            AppError::NoSuchKey { bucket, key } => Some(format!("/{bucket}/{key}")),
            _ => None,
        }
    }

    pub fn to_xml(&self, request_id: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{}</Code><Message>{}</Message><Resource>{}</Resource><RequestId>{}</RequestId></Error>",
            self.code(),
            xml_escape(&self.to_string()),
            xml_escape(self.resource().as_deref().unwrap_or("/")),
            request_id,
        )
    }
}

/// Escape the five XML-reserved characters for safe inclusion in a body.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(self, AppError::AccessDenied) {
            // CORS-denied preflights get an empty body, not an <Error> document.
            return (status, ()).into_response();
        }
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let body = self.to_xml(&request_id);
        tracing::warn!(code = self.code(), %status, "request failed");
        (
            status,
            [("content-type", "application/xml")],
            body,
        )
            .into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
