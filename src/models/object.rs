//! Represents an object (blob) stored in a bucket, and its metadata sidecar.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-disk sidecar persisted next to an object's content blob.
///
/// Serialized as JSON at `<key>.s3rver_metadata.json`. Holds everything
/// needed to answer a `HeadObject`/`GetObject` without touching the blob.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectMetadata {
    #[serde(rename = "content-type")]
    pub content_type: String,

    #[serde(rename = "content-encoding", skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    #[serde(
        rename = "content-disposition",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_disposition: Option<String>,

    #[serde(rename = "cache-control", skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// Hex MD5 of the content blob, unquoted.
    pub etag: String,

    pub last_modified: DateTime<Utc>,

    /// User-defined `x-amz-meta-*` values, keyed by the lowercased suffix.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ObjectMetadata {
    pub fn new(etag: String, last_modified: DateTime<Utc>) -> Self {
        Self {
            content_type: "binary/octet-stream".to_string(),
            content_encoding: None,
            content_disposition: None,
            cache_control: None,
            expires: None,
            etag,
            last_modified,
            metadata: BTreeMap::new(),
        }
    }
}

/// A fully materialised object: its sidecar plus the size observed on disk.
///
/// Not itself persisted — assembled by the store from the sidecar and a
/// `stat` of the blob when a caller needs both at once (e.g. listing).
#[derive(Clone, Debug)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}
