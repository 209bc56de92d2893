//! Pure validation for bucket names and object keys, and the `CopySource`
//! header parsing used by `CopyObject`.

use percent_encoding::percent_decode_str;

use crate::error::AppError;

pub const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Reject keys that are empty, too long, absolute, escape their bucket via
/// `..`, or carry bytes that have no business in a filesystem path.
pub fn ensure_key_safe(key: &str) -> Result<(), AppError> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(AppError::InvalidRequest(
            "object key must be 1-1024 bytes".into(),
        ));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(AppError::InvalidRequest(
            "object key may not escape the bucket".into(),
        ));
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(AppError::InvalidRequest(
            "object key contains an invalid byte".into(),
        ));
    }
    Ok(())
}

/// Validate bucket name format.
///
/// - 3-63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with a dot or hyphen
/// - cannot look like an IPv4 address
pub fn ensure_bucket_name_safe(name: &str) -> Result<(), AppError> {
    let invalid = |reason: &str| AppError::InvalidBucketName {
        bucket: name.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = name.trim();
    if trimmed != name {
        return Err(invalid("cannot begin or end with whitespace"));
    }

    let len = name.len();
    if len < BUCKET_NAME_MIN_LEN || len > BUCKET_NAME_MAX_LEN {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    for label in name.split('.') {
        if label.is_empty() || label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("dot-separated labels must not start or end with a hyphen"));
        }
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted as an IP address"));
    }

    Ok(())
}

fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}

/// Parse an `x-amz-copy-source` header value into `(bucket, key)`.
///
/// The header is percent-decoded first, then any leading slash is
/// stripped, then the remainder is split on the first `/`.
pub fn parse_copy_source(header: &str) -> Result<(String, String), AppError> {
    let decoded = percent_decode_str(header)
        .decode_utf8()
        .map_err(|_| AppError::InvalidRequest("x-amz-copy-source is not valid UTF-8".into()))?;
    let trimmed = decoded.trim_start_matches('/');
    let (bucket, key) = trimmed
        .split_once('/')
        .ok_or_else(|| AppError::InvalidRequest("x-amz-copy-source must be bucket/key".into()))?;
    if bucket.is_empty() || key.is_empty() {
        return Err(AppError::InvalidRequest(
            "x-amz-copy-source must be bucket/key".into(),
        ));
    }
    Ok((bucket.to_string(), key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_bucket_names() {
        assert!(ensure_bucket_name_safe("my-bucket.example").is_ok());
    }

    #[test]
    fn rejects_short_names() {
        assert!(ensure_bucket_name_safe("ab").is_err());
    }

    #[test]
    fn rejects_ipv4_shaped_names() {
        assert!(ensure_bucket_name_safe("192.168.1.1").is_err());
    }

    #[test]
    fn rejects_uppercase() {
        assert!(ensure_bucket_name_safe("MyBucket").is_err());
    }

    #[test]
    fn rejects_parent_traversal_keys() {
        assert!(ensure_key_safe("a/../b").is_err());
    }

    #[test]
    fn accepts_nested_keys() {
        assert!(ensure_key_safe("a/b/c.txt").is_ok());
    }

    #[test]
    fn parses_copy_source_with_leading_slash() {
        let (b, k) = parse_copy_source("/src-bucket/dir/key.txt").unwrap();
        assert_eq!(b, "src-bucket");
        assert_eq!(k, "dir/key.txt");
    }

    #[test]
    fn parses_percent_encoded_copy_source() {
        let (b, k) = parse_copy_source("/src-bucket/my%20key.txt").unwrap();
        assert_eq!(b, "src-bucket");
        assert_eq!(k, "my key.txt");
    }
}
