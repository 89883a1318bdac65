//! Structured request logging.
//!
//! # Responsibilities
//! - Snapshot an inbound request into a [`LogEntry`]
//! - Emit it through `tracing`
//! - Rebuild a header bag from an entry carried on the queue
//! - Keep credentials out of every snapshot
//!
//! # Design Decisions
//! - Capturing and emitting never fail; missing data falls back to defaults
//! - The same shape is the queue message body, so `/end` sees what
//!   `/enqueue` saw

use std::collections::BTreeMap;

use axum::extract::OriginalUri;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::relay::propagate::TRACEPARENT;

pub const NO_URL: &str = "NO_URL";
pub const NO_FUNC_NAME: &str = "NO_FUNC_NAME";
pub const NO_METHOD: &str = "NO_METHOD";

/// Headers never copied into a snapshot.
const REDACTED: [&str; 2] = ["authorization", "proxy-authorization"];

/// Target under which request entries are emitted.
pub const REQUEST_TARGET: &str = "trace_relay::request";

/// Per-invocation metadata supplied by the trigger (HTTP route or queue).
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub function_name: Option<String>,
    pub invocation_id: Uuid,
    pub route_params: BTreeMap<String, String>,
    pub retry_count: u32,
    pub max_retry_count: u32,
}

impl InvocationContext {
    pub fn new(function_name: &str) -> Self {
        Self {
            function_name: Some(function_name.to_string()),
            ..Self::default()
        }
    }

    /// Attach queue delivery information.
    pub fn with_retry(mut self, retry_count: u32, max_retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self.max_retry_count = max_retry_count;
        self
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self {
            function_name: None,
            invocation_id: Uuid::new_v4(),
            route_params: BTreeMap::new(),
            retry_count: 0,
            max_retry_count: 0,
        }
    }
}

/// Write-once snapshot of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    pub url: String,
    pub function_name: String,
    pub invocation_id: String,
    pub method: String,
    pub route_params: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub trace_context: Option<String>,
    pub retry_count: u32,
    pub max_retry_count: u32,
    /// Function that first captured the entry; survives queue replay.
    pub source: String,
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            url: NO_URL.to_string(),
            function_name: NO_FUNC_NAME.to_string(),
            invocation_id: String::new(),
            method: NO_METHOD.to_string(),
            route_params: BTreeMap::new(),
            query_params: BTreeMap::new(),
            headers: BTreeMap::new(),
            trace_context: None,
            retry_count: 0,
            max_retry_count: 0,
            source: NO_FUNC_NAME.to_string(),
        }
    }
}

impl LogEntry {
    /// Snapshot request parts.
    pub fn capture(parts: &Parts, ctx: &InvocationContext) -> Self {
        // Nested routers strip their prefix from `parts.uri`.
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&parts.uri);
        let url = match parts.headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
            Some(host) if uri.authority().is_none() => format!("http://{}{}", host, uri),
            _ => uri.to_string(),
        };

        let query_params = uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        let function_name = ctx
            .function_name
            .clone()
            .unwrap_or_else(|| NO_FUNC_NAME.to_string());

        Self {
            url: if url.is_empty() { NO_URL.to_string() } else { url },
            source: function_name.clone(),
            function_name,
            invocation_id: ctx.invocation_id.to_string(),
            method: parts.method.as_str().to_string(),
            route_params: ctx.route_params.clone(),
            query_params,
            headers: header_snapshot(&parts.headers),
            trace_context: parts
                .headers
                .get(TRACEPARENT)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
            retry_count: ctx.retry_count,
            max_retry_count: ctx.max_retry_count,
        }
    }

    /// Emit through the logging sink.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => tracing::info!(
                target: REQUEST_TARGET,
                function = %self.function_name,
                invocation_id = %self.invocation_id,
                method = %self.method,
                retry_count = self.retry_count,
                entry = %json,
                "Request logged"
            ),
            Err(_) => tracing::info!(
                target: REQUEST_TARGET,
                function = %self.function_name,
                entry = ?self,
                "Request logged"
            ),
        }
    }

    /// Rebuild a header bag. Entries that are not valid headers are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Skipping invalid header in log entry"),
            }
        }
        headers
    }
}

/// Flatten a header bag; repeated headers are joined with `, `.
///
/// `authorization` and `proxy-authorization` are dropped.
pub fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut snapshot: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if REDACTED.contains(&name.as_str()) {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes());
        snapshot
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    snapshot
}
