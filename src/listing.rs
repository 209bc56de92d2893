//! Pure prefix/delimiter/marker pagination over an already-sorted set of
//! object keys. Kept free of I/O so it can be exercised directly by tests;
//! the store is responsible for collecting the candidate key set.

use std::collections::BTreeSet;

use crate::models::object::ObjectSummary;

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub prefix: String,
    pub delimiter: Option<String>,
    /// v1 `marker` or v2 `continuation-token`/`start-after`, whichever the
    /// caller resolved; listing itself doesn't care which wire field it came from.
    pub marker: String,
    pub max_keys: usize,
}

impl ListParams {
    pub fn clamp_max_keys(mut self) -> Self {
        if self.max_keys == 0 || self.max_keys > 1000 {
            self.max_keys = 1000;
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
    pub key_count: usize,
}

/// Run the listing algorithm over `objects`, which must already be sorted
/// in ascending key order.
pub fn list(objects: Vec<ObjectSummary>, params: &ListParams) -> ListResult {
    let candidates: Vec<ObjectSummary> = objects
        .into_iter()
        .filter(|o| o.key.starts_with(&params.prefix))
        .filter(|o| params.marker.is_empty() || o.key.as_str() > params.marker.as_str())
        .collect();

    let mut contents = Vec::new();
    let mut common_prefixes: BTreeSet<String> = BTreeSet::new();
    let mut truncated = false;
    let mut last_key = None;

    for object in candidates {
        if contents.len() + common_prefixes.len() >= params.max_keys {
            truncated = true;
            break;
        }

        match params
            .delimiter
            .as_deref()
            .and_then(|d| common_prefix(&object.key, &params.prefix, d))
        {
            Some(cp) => {
                last_key = Some(object.key.clone());
                common_prefixes.insert(cp);
            }
            None => {
                last_key = Some(object.key.clone());
                contents.push(object);
            }
        }
    }

    let key_count = contents.len() + common_prefixes.len();
    ListResult {
        contents,
        common_prefixes: common_prefixes.into_iter().collect(),
        is_truncated: truncated,
        next_marker: if truncated { last_key } else { None },
        key_count,
    }
}

/// If `key` (after stripping `prefix`) contains `delimiter`, return the
/// substring from the start of `key` through the first delimiter occurrence.
fn common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    if !key.starts_with(prefix) {
        return None;
    }
    let rest = &key[prefix.len()..];
    let pos = rest.find(delimiter)?;
    Some(format!("{}{}", prefix, &rest[..pos + delimiter.len()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(key: &str) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            size: 0,
            etag: "00000000000000000000000000000000".to_string(),
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn partitions_contents_and_common_prefixes() {
        let keys = [
            "akey1", "akey2", "akey3", "key/key1", "key1", "key2", "key3",
        ];
        let objects: Vec<_> = keys.iter().map(|k| summary(k)).collect();
        let params = ListParams {
            prefix: String::new(),
            delimiter: Some("/".to_string()),
            marker: String::new(),
            max_keys: 1000,
        };
        let result = list(objects, &params);
        assert_eq!(result.contents.len(), 6);
        assert_eq!(result.common_prefixes, vec!["key/".to_string()]);
    }

    #[test]
    fn truncates_at_max_keys() {
        let objects: Vec<_> = (0..10).map(|i| summary(&format!("k{i}"))).collect();
        let params = ListParams {
            prefix: String::new(),
            delimiter: None,
            marker: String::new(),
            max_keys: 3,
        };
        let result = list(objects, &params);
        assert!(result.is_truncated);
        assert_eq!(result.contents.len(), 3);
        assert_eq!(result.next_marker.as_deref(), Some("k2"));
    }

    #[test]
    fn marker_excludes_keys_up_to_and_including() {
        let objects: Vec<_> = ["a", "b", "c"].iter().map(|k| summary(k)).collect();
        let params = ListParams {
            prefix: String::new(),
            delimiter: None,
            marker: "a".to_string(),
            max_keys: 1000,
        };
        let result = list(objects, &params);
        let keys: Vec<_> = result.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }
}
