//! CORS matching: glob-style origin/header patterns and the preflight vs.
//! normal-response header rules.

use crate::models::cors::{CorsConfiguration, CorsRule};

/// Result of evaluating a CORS rule set against a request.
pub struct CorsDecision {
    pub allow_origin: String,
    pub allow_methods: Option<Vec<String>>,
    pub allow_headers: Option<Vec<String>>,
    pub expose_headers: Vec<String>,
    pub max_age_seconds: Option<u32>,
}

/// Match a non-preflight request, producing the headers to attach to the
/// response. Returns `None` when no rule allows the origin/method pair.
pub fn evaluate(
    config: &CorsConfiguration,
    origin: &str,
    method: &str,
) -> Option<CorsDecision> {
    let rule = find_matching_rule(config, origin, method)?;
    Some(CorsDecision {
        allow_origin: echoed_origin(rule, origin),
        allow_methods: None,
        allow_headers: None,
        expose_headers: rule.expose_headers.clone(),
        max_age_seconds: None,
    })
}

/// Match an `OPTIONS` preflight, producing the full preflight header set.
/// `requested_headers` is the lowercased, comma-split value of
/// `Access-Control-Request-Headers`, if present.
pub fn evaluate_preflight(
    config: &CorsConfiguration,
    origin: &str,
    requested_method: &str,
    requested_headers: &[String],
) -> Option<CorsDecision> {
    let rule = find_matching_rule(config, origin, requested_method)?;

    let allow_headers: Vec<String> = requested_headers
        .iter()
        .filter(|h| rule_allows_header(rule, h))
        .cloned()
        .collect();
    if !requested_headers.is_empty() && allow_headers.len() != requested_headers.len() {
        return None;
    }

    Some(CorsDecision {
        allow_origin: echoed_origin(rule, origin),
        allow_methods: Some(rule.allowed_methods.clone()),
        allow_headers: Some(allow_headers),
        expose_headers: rule.expose_headers.clone(),
        max_age_seconds: rule.max_age_seconds,
    })
}

fn find_matching_rule<'a>(
    config: &'a CorsConfiguration,
    origin: &str,
    method: &str,
) -> Option<&'a CorsRule> {
    config.rules.iter().find(|rule| {
        rule.allowed_origins.iter().any(|p| glob_match(p, origin))
            && rule
                .allowed_methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method))
    })
}

fn rule_allows_header(rule: &CorsRule, header: &str) -> bool {
    rule.allowed_headers
        .iter()
        .any(|pattern| glob_match(&pattern.to_ascii_lowercase(), header))
}

fn echoed_origin(rule: &CorsRule, origin: &str) -> String {
    if rule.allowed_origins.iter().any(|p| p == "*") {
        "*".to_string()
    } else {
        origin.to_string()
    }
}

/// Single-wildcard glob match: `*` matches any run of characters, every
/// other character must match literally. No other glob syntax is supported.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == candidate,
        Some((prefix, suffix)) => {
            candidate.len() >= prefix.len() + suffix.len()
                && candidate.starts_with(prefix)
                && candidate.ends_with(suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wildcard_config() -> CorsConfiguration {
        CorsConfiguration {
            rules: vec![CorsRule::wildcard()],
        }
    }

    #[test]
    fn wildcard_origin_is_echoed_as_star() {
        let decision = evaluate(&wildcard_config(), "https://example.com", "GET").unwrap();
        assert_eq!(decision.allow_origin, "*");
    }

    #[test]
    fn non_matching_method_denies() {
        let config = CorsConfiguration {
            rules: vec![CorsRule {
                allowed_origins: vec!["https://example.com".to_string()],
                allowed_methods: vec!["GET".to_string()],
                ..Default::default()
            }],
        };
        assert!(evaluate_preflight(&config, "https://example.com", "DELETE", &[]).is_none());
    }

    #[test]
    fn glob_pattern_matches_subdomains() {
        assert!(glob_match("https://*.example.com", "https://a.example.com"));
        assert!(!glob_match("https://*.example.com", "https://example.com"));
    }

    #[test]
    fn specific_origin_is_echoed_verbatim() {
        let config = CorsConfiguration {
            rules: vec![CorsRule {
                allowed_origins: vec!["https://example.com".to_string()],
                allowed_methods: vec!["GET".to_string()],
                ..Default::default()
            }],
        };
        let decision = evaluate(&config, "https://example.com", "GET").unwrap();
        assert_eq!(decision.allow_origin, "https://example.com");
    }
}
