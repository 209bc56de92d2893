//! Represents a logical bucket — a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cors::CorsConfiguration;
use super::website::WebsiteConfiguration;

/// A storage bucket in the S3-compatible system.
///
/// A bucket is a namespace for objects. It exists as a directory under the
/// data root; its name, creation time, and any CORS/website configuration
/// are the only state kept in memory (configuration is also persisted
/// alongside the bucket directory so it survives a restart).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Bucket {
    /// Globally unique bucket name (must conform to the naming grammar).
    pub name: String,

    /// When this bucket's directory was created.
    pub creation_date: DateTime<Utc>,

    /// Per-bucket CORS rules, if any have been configured.
    #[serde(default)]
    pub cors: Option<CorsConfiguration>,

    /// Static-website routing configuration, if enabled for this bucket.
    #[serde(default)]
    pub website: Option<WebsiteConfiguration>,
}

impl Bucket {
    pub fn new(name: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            creation_date,
            cors: None,
            website: None,
        }
    }
}
