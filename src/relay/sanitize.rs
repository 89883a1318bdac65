//! Header sanitization applied before any request leaves the relay.
//!
//! # Responsibilities
//! - Strip inbound credentials (`authorization`)
//! - Force the outbound content type to JSON
//! - Strip hop-by-hop headers that belong to the inbound connection

use axum::http::{header, HeaderMap, HeaderValue};

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [&str; 10] = [
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "te",
    "trailer",
    "proxy-authorization",
    "proxy-connection",
];

/// Remove `authorization` and set `content-type: application/json`.
///
/// Header names are case-insensitive in a [`HeaderMap`], so a single removal
/// drops every casing the client may have sent.
pub fn sanitize(headers: &mut HeaderMap) {
    headers.remove(header::AUTHORIZATION);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
}

/// Remove headers scoped to the inbound connection.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderName;

    #[test]
    fn test_sanitize_removes_authorization_any_case() {
        for name in ["authorization", "Authorization", "AUTHORIZATION"] {
            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static("Bearer secret"),
            );
            headers.append("x-custom", HeaderValue::from_static("keep"));

            sanitize(&mut headers);

            assert!(headers.get("authorization").is_none(), "{} survived", name);
            assert_eq!(headers.get("x-custom").unwrap(), "keep");
        }
    }

    #[test]
    fn test_sanitize_forces_json_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        sanitize(&mut headers);

        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get_all(header::CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert("traceparent", HeaderValue::from_static("00-abc-def-01"));

        sanitize(&mut headers);
        let once = headers.clone();
        sanitize(&mut headers);

        assert_eq!(headers, once);
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("relay.local"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert("traceparent", HeaderValue::from_static("00-abc-def-01"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("traceparent"));
    }
}
