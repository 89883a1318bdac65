//! Outbound relay to a downstream HTTP endpoint.
//!
//! # Responsibilities
//! - Resolve the target scheme (`http` / `https` only)
//! - Issue exactly one request with the sanitized, propagated headers
//! - Return the downstream status, reason phrase and body verbatim
//!
//! # Design Decisions
//! - Non-2xx responses are values, not errors; the caller passes them through
//! - No retries: a failed call surfaces once as 502
//! - Scheme is checked before any connection is attempted

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::{RelayError, RelayResult};
use crate::relay::sanitize::strip_hop_by_hop;

/// Transport scheme accepted by the forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Resolve the scheme of a target URL.
    pub fn resolve(url: &Url) -> RelayResult<Self> {
        match url.scheme() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(RelayError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }
}

/// A single outbound request, consumed by [`Forwarder::forward`].
#[derive(Debug)]
pub struct RelayEnvelope {
    pub target: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RelayEnvelope {
    /// Build an envelope from a target string.
    pub fn new(target: &str, method: Method, headers: HeaderMap) -> RelayResult<Self> {
        let target = Url::parse(target).map_err(|e| RelayError::InvalidUrl {
            url: target.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            target,
            method,
            headers,
            body: None,
        })
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }
}

/// What the downstream answered.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub reason: String,
    pub body: Bytes,
}

impl RelayResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// HTTP client wrapper performing the relay call.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Forward the envelope and return the downstream answer.
    pub async fn forward(&self, envelope: RelayEnvelope) -> RelayResult<RelayResponse> {
        let RelayEnvelope {
            target,
            method,
            mut headers,
            body,
        } = envelope;

        let scheme = Scheme::resolve(&target)?;
        if target.host_str().is_none() {
            return Err(RelayError::InvalidUrl {
                url: target.to_string(),
                reason: "missing host".to_string(),
            });
        }

        strip_hop_by_hop(&mut headers);

        tracing::debug!(
            target = %target,
            scheme = ?scheme,
            method = %method,
            "Forwarding request"
        );

        let mut request = self.client.request(method, target).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let reason = reason_phrase(&response);
        let body = response.bytes().await?;

        Ok(RelayResponse {
            status,
            reason,
            body,
        })
    }
}

/// The phrase the downstream sent, or the canonical one for its status.
///
/// hyper only records the phrase when it differs from the canonical text.
fn reason_phrase(response: &reqwest::Response) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_resolution() {
        let http = Url::parse("http://example.com/api/headers").unwrap();
        let https = Url::parse("https://example.com/api/headers").unwrap();
        assert_eq!(Scheme::resolve(&http).unwrap(), Scheme::Http);
        assert_eq!(Scheme::resolve(&https).unwrap(), Scheme::Https);
    }

    #[tokio::test]
    async fn test_unsupported_scheme_makes_no_call() {
        let forwarder = Forwarder::default();
        for target in ["ftp://example.com/file", "ws://example.com/socket", "file:///etc/hosts"] {
            let envelope = RelayEnvelope::new(target, Method::GET, HeaderMap::new()).unwrap();
            let err = forwarder.forward(envelope).await.unwrap_err();
            assert!(
                matches!(err, RelayError::UnsupportedScheme { .. }),
                "{} was not rejected: {:?}",
                target,
                err
            );
        }
    }

    async fn answer_once(status_line: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}",
                status_line
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{}/api/end", addr)
    }

    #[tokio::test]
    async fn test_reason_phrase_from_downstream() {
        let target = answer_once("503 Backend Overloaded").await;
        let envelope = RelayEnvelope::new(&target, Method::POST, HeaderMap::new()).unwrap();
        let response = Forwarder::default().forward(envelope).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.reason, "Backend Overloaded");
        assert_eq!(&response.body[..], b"{}");
    }

    #[tokio::test]
    async fn test_canonical_reason_phrase() {
        let target = answer_once("404 Not Found").await;
        let envelope = RelayEnvelope::new(&target, Method::GET, HeaderMap::new()).unwrap();
        let response = Forwarder::default().forward(envelope).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.reason, "Not Found");
    }

    #[test]
    fn test_invalid_target_url() {
        let err = RelayEnvelope::new("not a url", Method::GET, HeaderMap::new()).unwrap_err();
        assert!(matches!(err, RelayError::InvalidUrl { .. }));
    }

    #[test]
    fn test_empty_body_is_dropped() {
        let envelope = RelayEnvelope::new("http://example.com", Method::POST, HeaderMap::new())
            .unwrap()
            .with_body(Bytes::new());
        assert!(envelope.body.is_none());
    }
}
