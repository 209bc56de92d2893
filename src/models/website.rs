//! Static-website routing configuration, per-bucket or server-wide.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename = "WebsiteConfiguration")]
pub struct WebsiteConfiguration {
    pub index_document: String,
    #[serde(default)]
    pub error_document: Option<String>,
}

impl WebsiteConfiguration {
    pub fn new(index_document: impl Into<String>, error_document: Option<String>) -> Self {
        Self {
            index_document: index_document.into(),
            error_document,
        }
    }
}
