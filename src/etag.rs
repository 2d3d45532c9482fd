//! ETag computation and conditional GET checks.

use axum::http::{HeaderMap, header};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// Builds a weak ETag from file size and modification time.
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    let modified = metadata.modified().ok();
    if let Some(modified) = modified
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{}\"", size)
}

/// True when `If-None-Match` names the current entity, so a 304 can be sent.
pub fn is_not_modified(headers: &HeaderMap, current_etag: &str) -> bool {
    match headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) => value.trim() == "*" || etag_matches(value, current_etag),
        None => false,
    }
}

fn etag_matches(header_value: &str, current: &str) -> bool {
    header_value
        .split(',')
        .map(|item| item.trim())
        .any(|item| item == current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn if_none_match_lists_are_checked() {
        let mut headers = HeaderMap::new();
        assert!(!is_not_modified(&headers, "W/\"3-1-0\""));

        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("W/\"1-1-1\", W/\"3-1-0\""),
        );
        assert!(is_not_modified(&headers, "W/\"3-1-0\""));
        assert!(!is_not_modified(&headers, "W/\"4-1-0\""));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(is_not_modified(&headers, "W/\"4-1-0\""));
    }
}
