//! In-progress multipart upload state, staged outside any bucket's object
//! namespace until `CompleteMultipartUpload` assembles the final blob.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug)]
pub struct PartSummary {
    pub part_number: u32,
    pub size: u64,
}
