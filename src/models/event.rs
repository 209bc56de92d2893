//! Event records published on the in-process notification bus.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventName {
    ObjectCreatedPut,
    ObjectCreatedCopy,
    ObjectRemovedDelete,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::ObjectCreatedPut => "ObjectCreated:Put",
            EventName::ObjectCreatedCopy => "ObjectCreated:Copy",
            EventName::ObjectRemovedDelete => "ObjectRemoved:Delete",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct S3Event {
    pub event_name: &'static str,
    pub bucket_name: String,
    pub object_key: String,
    pub object_size: Option<u64>,
    pub object_etag: Option<String>,
}

impl S3Event {
    pub fn new(name: EventName, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            event_name: name.as_str(),
            bucket_name: bucket.into(),
            object_key: key.into(),
            object_size: None,
            object_etag: None,
        }
    }

    pub fn with_object(mut self, size: u64, etag: impl Into<String>) -> Self {
        self.object_size = Some(size);
        self.object_etag = Some(etag.into());
        self
    }
}
