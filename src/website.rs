//! Static-website routing: maps a request path on a website-enabled bucket
//! to an index document or an error document.

use crate::models::website::WebsiteConfiguration;

pub enum WebsiteRoute {
    /// Serve this key with a 200.
    Index(String),
    /// Serve this key with a 404 (the bucket's configured error document).
    ErrorDocument(String),
    /// No error document configured; serve the built-in placeholder.
    DefaultNotFound,
}

/// Resolve `request_key` (the object key a plain GET would have targeted)
/// against a website configuration. `request_key` should already have had
/// a trailing-slash directory treated as "no object at this key".
pub fn resolve(config: &WebsiteConfiguration, request_key: &str, object_exists: bool) -> WebsiteRoute {
    if object_exists {
        return WebsiteRoute::Index(request_key.to_string());
    }

    if request_key.is_empty() || request_key.ends_with('/') {
        return WebsiteRoute::Index(format!("{request_key}{}", config.index_document));
    }

    match &config.error_document {
        Some(doc) => WebsiteRoute::ErrorDocument(doc.clone()),
        None => WebsiteRoute::DefaultNotFound,
    }
}

pub const DEFAULT_NOT_FOUND_BODY: &str = "<html><body><h1>404 Not Found</h1></body></html>";

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WebsiteConfiguration {
        WebsiteConfiguration::new("index.html", Some("error.html".to_string()))
    }

    #[test]
    fn root_path_resolves_to_index_document() {
        match resolve(&config(), "", false) {
            WebsiteRoute::Index(key) => assert_eq!(key, "index.html"),
            _ => panic!("expected index route"),
        }
    }

    #[test]
    fn missing_object_falls_back_to_error_document() {
        match resolve(&config(), "missing", false) {
            WebsiteRoute::ErrorDocument(key) => assert_eq!(key, "error.html"),
            _ => panic!("expected error document route"),
        }
    }

    #[test]
    fn existing_object_is_served_directly() {
        match resolve(&config(), "page.html", true) {
            WebsiteRoute::Index(key) => assert_eq!(key, "page.html"),
            _ => panic!("expected index route"),
        }
    }
}
