//! Trace context propagation and repair.
//!
//! # Responsibilities
//! - Parse the `traceparent` token (`version-traceId-parentId-flags`)
//! - Reconcile its trace id with an externally supplied correlation id
//! - Keep the legacy `trace-id` / `parent-id` pair consistent with it
//! - Synthesize a context when none was sent and strict mode is off
//!
//! # Design Decisions
//! - Only the segment count is validated; segment contents are opaque
//! - A rewritten header keeps its previous value under `<name>-original`
//! - Running the propagator twice over the same bag changes nothing

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderValue};

use crate::config::{TraceConfig, TraceMode};
use crate::error::{RelayError, RelayResult};

/// W3C trace context header.
pub const TRACEPARENT: &str = "traceparent";
/// Legacy trace id header.
pub const TRACE_ID: &str = "trace-id";
/// Legacy parent span id header.
pub const PARENT_ID: &str = "parent-id";

const TRACEPARENT_ORIGINAL: &str = "traceparent-original";
const TRACE_ID_ORIGINAL: &str = "trace-id-original";

const SEGMENTS: usize = 4;

/// A parsed `traceparent` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub version: String,
    pub trace_id: String,
    pub parent_id: String,
    pub flags: String,
}

impl TraceContext {
    /// Build a fresh sampled context.
    ///
    /// The trace id is the given one, or the current Unix time in nanoseconds
    /// rendered as 32 hex digits. The parent id is random.
    pub fn synthesize(trace_id: Option<&str>) -> Self {
        let trace_id = match trace_id {
            Some(id) => id.to_string(),
            None => {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos();
                format!("{:032x}", nanos)
            }
        };

        Self {
            version: "00".to_string(),
            trace_id,
            parent_id: format!("{:016x}", rand::random::<u64>()),
            flags: "01".to_string(),
        }
    }
}

impl FromStr for TraceContext {
    type Err = RelayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = value.split('-').collect();
        if segments.len() != SEGMENTS {
            return Err(RelayError::InvalidTraceContext {
                value: value.to_string(),
                segments: segments.len(),
            });
        }

        Ok(Self {
            version: segments[0].to_string(),
            trace_id: segments[1].to_string(),
            parent_id: segments[2].to_string(),
            flags: segments[3].to_string(),
        })
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.version, self.trace_id, self.parent_id, self.flags
        )
    }
}

/// What the propagator did to `traceparent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Present and already consistent.
    Unchanged,
    /// Trace id replaced by the correlation id.
    Rewritten { original: String },
    /// Absent and generated locally.
    Synthesized,
}

impl Reconciliation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reconciliation::Unchanged => "unchanged",
            Reconciliation::Rewritten { .. } => "rewritten",
            Reconciliation::Synthesized => "synthesized",
        }
    }
}

/// Reconciles trace headers on a header bag.
#[derive(Debug, Clone, Copy)]
pub struct Propagator {
    mode: TraceMode,
}

impl Propagator {
    pub fn new(mode: TraceMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    /// Validate and repair the trace headers in place.
    pub fn propagate(
        &self,
        headers: &mut HeaderMap,
        correlation_id: Option<&str>,
    ) -> RelayResult<Reconciliation> {
        // Dashes would break the 4-segment layout once spliced in. An id with
        // nothing left after stripping them counts as absent.
        let segment_id = correlation_id
            .map(|id| id.replace('-', ""))
            .filter(|id| !id.is_empty());
        let correlation_id = correlation_id.filter(|_| segment_id.is_some());

        let existing = match headers.get(TRACEPARENT) {
            Some(value) => Some(value.to_str().map(str::to_string).map_err(|_| {
                RelayError::InvalidTraceContext {
                    value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    segments: 0,
                }
            })?),
            None => None,
        };

        let (context, outcome) = match existing {
            None => match self.mode {
                TraceMode::Strict => {
                    return Err(RelayError::MissingTraceContext { header: TRACEPARENT })
                }
                TraceMode::Synthesize => {
                    let context = TraceContext::synthesize(segment_id.as_deref());
                    headers.insert(TRACEPARENT, header_value(TRACEPARENT, &context.to_string())?);
                    (context, Reconciliation::Synthesized)
                }
            },
            Some(raw) => {
                let mut context: TraceContext = raw.parse()?;

                match segment_id {
                    Some(id) if id != context.trace_id => {
                        context.trace_id = id;
                        let rewritten = header_value(TRACEPARENT, &context.to_string())?;
                        headers.insert(TRACEPARENT_ORIGINAL, header_value(TRACEPARENT_ORIGINAL, &raw)?);
                        headers.insert(TRACEPARENT, rewritten);
                        (context, Reconciliation::Rewritten { original: raw })
                    }
                    _ => (context, Reconciliation::Unchanged),
                }
            }
        };

        reconcile_legacy(headers, &context, correlation_id)?;
        Ok(outcome)
    }
}

/// Keep `trace-id` / `parent-id` in line with the reconciled context.
fn reconcile_legacy(
    headers: &mut HeaderMap,
    context: &TraceContext,
    correlation_id: Option<&str>,
) -> RelayResult<()> {
    let existing = headers
        .get(TRACE_ID)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    match (existing, correlation_id) {
        (None, id) => {
            let trace_id = id.unwrap_or(&context.trace_id);
            headers.insert(TRACE_ID, header_value(TRACE_ID, trace_id)?);
        }
        (Some(existing), Some(id)) if existing != id => {
            let rewritten = header_value(TRACE_ID, id)?;
            headers.insert(TRACE_ID_ORIGINAL, header_value(TRACE_ID_ORIGINAL, &existing)?);
            headers.insert(TRACE_ID, rewritten);
        }
        _ => {}
    }

    if !headers.contains_key(PARENT_ID) {
        headers.insert(PARENT_ID, header_value(PARENT_ID, &context.parent_id)?);
    }
    Ok(())
}

fn header_value(name: &str, value: &str) -> RelayResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| RelayError::InvalidHeader {
        name: name.to_string(),
    })
}

/// Find the caller-supplied correlation id.
///
/// The query parameter wins over the header.
pub fn resolve_correlation_id(
    query: Option<&str>,
    headers: &HeaderMap,
    config: &TraceConfig,
) -> Option<String> {
    let from_query = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == config.correlation_query_param.as_str())
            .map(|(_, value)| value.into_owned())
    });

    from_query
        .or_else(|| {
            headers
                .get(config.correlation_header.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|id| !id.is_empty())
}
