//! CORS configuration document, as stored per-bucket and parsed from the
//! `<CORSConfiguration>` XML a client uploads via `PUT ?cors`.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename = "CORSConfiguration")]
pub struct CorsConfiguration {
    #[serde(rename = "CORSRule", default)]
    pub rules: Vec<CorsRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CorsRule {
    #[serde(rename = "AllowedOrigin", default)]
    pub allowed_origins: Vec<String>,

    #[serde(rename = "AllowedMethod", default)]
    pub allowed_methods: Vec<String>,

    #[serde(rename = "AllowedHeader", default)]
    pub allowed_headers: Vec<String>,

    #[serde(rename = "ExposeHeader", default)]
    pub expose_headers: Vec<String>,

    #[serde(rename = "MaxAgeSeconds", skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<u32>,
}

impl CorsRule {
    /// Rule used when no configuration has been set for a bucket: matches
    /// every origin and every common method, nothing exposed.
    pub fn wildcard() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "PUT".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
                "HEAD".to_string(),
            ],
            allowed_headers: vec!["*".to_string()],
            expose_headers: Vec::new(),
            max_age_seconds: None,
        }
    }
}
