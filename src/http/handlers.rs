//! Relay route handlers and the queue-triggered dequeue handler.
//!
//! # Responsibilities
//! - `/start`, `/caller`: log, sanitize, propagate, forward, pass through
//! - `/headers`: echo the inbound request as a log entry
//! - `/enqueue`: check the trace context, then submit the entry to the queue
//! - `/end`: terminal handler; completes only a record the worker dequeued
//! - [`dequeue`]: replay a queued record to the downstream `/end`
//!
//! Every error is logged with the request's headers before it is returned.

use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, Method},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};
use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::observability::logging::{InvocationContext, LogEntry};
use crate::observability::metrics;
use crate::queue::QueueMessage;
use crate::relay::{
    resolve_correlation_id, sanitize, Reconciliation, RelayEnvelope, RelayRecord, RelayResponse,
    RelayStage,
};

/// What `/enqueue` answers once the transport accepted the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    pub message_id: Uuid,
    pub queue: String,
    pub stage: RelayStage,
    pub entry: LogEntry,
}

/// What `/end` answers.
///
/// `stage` is `Completed` only when the body was a dequeued record; a direct
/// call without one stays `Received`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub stage: RelayStage,
    pub entry: LogEntry,
    /// Entry carried through the queue, when the caller sent one.
    pub relayed: Option<LogEntry>,
}

pub async fn start(State(state): State<AppState>, request: Request) -> Response {
    let path = state.config.downstream.headers_path.clone();
    relay(&state, "start", &path, request).await
}

pub async fn caller(State(state): State<AppState>, request: Request) -> Response {
    let path = state.config.downstream.enqueue_path.clone();
    relay(&state, "caller", &path, request).await
}

pub async fn headers(request: Request) -> Response {
    let start_time = Instant::now();
    let (parts, _) = request.into_parts();
    let entry = LogEntry::capture(&parts, &InvocationContext::new("headers"));
    entry.emit();

    metrics::record_request("headers", 200, start_time);
    Json(entry).into_response()
}

pub async fn enqueue(State(state): State<AppState>, request: Request) -> Response {
    let start_time = Instant::now();
    let (parts, _) = request.into_parts();
    let entry = LogEntry::capture(&parts, &InvocationContext::new("enqueue"));
    entry.emit();

    let accepted = check_trace_context(&state, &parts).and_then(|()| submit(&state, entry.clone()));
    let response = match accepted {
        Ok(receipt) => {
            tracing::info!(
                request_id = %request_id(&parts.headers),
                message_id = %receipt.message_id,
                queue = %receipt.queue,
                "Request enqueued"
            );
            Json(receipt).into_response()
        }
        Err(e) => fail("enqueue", &entry, e),
    };

    metrics::record_request("enqueue", response.status().as_u16(), start_time);
    response
}

pub async fn end(State(state): State<AppState>, request: Request) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let entry = LogEntry::capture(&parts, &InvocationContext::new("end"));
    entry.emit();

    let record = match axum::body::to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(bytes) if !bytes.is_empty() => match serde_json::from_slice::<RelayRecord>(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Body of /end is not a relay record");
                None
            }
        },
        Ok(_) => None,
        Err(e) => {
            let response = fail("end", &entry, RelayError::InvalidBody(e));
            metrics::record_request("end", response.status().as_u16(), start_time);
            return response;
        }
    };

    let response = match record {
        Some(record) => match record.advance(RelayStage::Completed) {
            Ok(record) => {
                tracing::info!(
                    request_id = %request_id(&parts.headers),
                    source = %record.entry.source,
                    stage = ?record.stage,
                    "Relay completed"
                );
                Json(Completion {
                    stage: record.stage,
                    entry,
                    relayed: Some(record.entry),
                })
                .into_response()
            }
            Err(e) => fail("end", &entry, e),
        },
        None => {
            tracing::info!(
                request_id = %request_id(&parts.headers),
                "Terminal route called without a relayed record"
            );
            Json(Completion {
                stage: RelayStage::Received,
                entry,
                relayed: None,
            })
            .into_response()
        }
    };

    metrics::record_request("end", response.status().as_u16(), start_time);
    response
}

/// Queue trigger: replay a queued record to the downstream terminal route.
///
/// A retryable error hands the message back to the transport for
/// redelivery; any other error dead-letters it.
pub async fn dequeue(state: AppState, message: QueueMessage) -> RelayResult<()> {
    let record: RelayRecord = serde_json::from_str(&message.body)?;
    let record = record.advance(RelayStage::Dequeued)?;
    let queued = record.entry.clone();

    let ctx = InvocationContext::new("dequeue").with_retry(
        message.delivery_count.saturating_sub(1),
        state.config.queue.max_delivery_count,
    );
    let entry = LogEntry {
        function_name: ctx.function_name.clone().unwrap_or_default(),
        invocation_id: ctx.invocation_id.to_string(),
        retry_count: ctx.retry_count,
        max_retry_count: ctx.max_retry_count,
        ..queued.clone()
    };
    entry.emit();

    tracing::info!(
        message_id = %message.id,
        delivery_count = message.delivery_count,
        source = %queued.source,
        stage = ?record.stage,
        "Message dequeued"
    );

    let trace = &state.config.trace;
    let mut headers = queued.header_map();
    sanitize(&mut headers);
    let correlation_id = queued
        .query_params
        .get(&trace.correlation_query_param)
        .filter(|id| !id.is_empty())
        .cloned()
        .or_else(|| resolve_correlation_id(None, &headers, trace));

    let result: RelayResult<()> = async {
        let outcome = state.propagator.propagate(&mut headers, correlation_id.as_deref())?;
        metrics::record_reconciliation(outcome.as_str());

        let downstream = &state.config.downstream;
        let target = downstream.target(&downstream.end_path);
        let envelope = RelayEnvelope::new(&target, Method::POST, headers)?
            .with_body(Bytes::from(serde_json::to_vec(&record)?));
        let response = state.forwarder.forward(envelope).await?;

        if !response.is_success() {
            return Err(RelayError::DownstreamStatus {
                status: response.status,
                reason: response.reason,
            });
        }
        Ok(())
    }
    .await;

    if let Err(e) = &result {
        tracing::error!(
            function = "dequeue",
            message_id = %message.id,
            error = %e,
            headers = ?entry.headers,
            "Queue replay failed"
        );
    }
    result
}

/// Sanitize, propagate and forward an inbound request.
async fn relay(state: &AppState, function: &'static str, path: &str, request: Request) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let entry = LogEntry::capture(&parts, &InvocationContext::new(function));
    entry.emit();

    let response = match forward_inbound(state, function, path, parts, body).await {
        Ok(downstream) => {
            if !downstream.is_success() {
                tracing::error!(
                    function,
                    status = downstream.status.as_u16(),
                    reason = %downstream.reason,
                    headers = ?entry.headers,
                    "Downstream returned an error status"
                );
            }
            pass_through(downstream)
        }
        Err(e) => fail(function, &entry, e),
    };

    metrics::record_request(function, response.status().as_u16(), start_time);
    response
}

async fn forward_inbound(
    state: &AppState,
    function: &'static str,
    path: &str,
    parts: Parts,
    body: Body,
) -> RelayResult<RelayResponse> {
    let body = axum::body::to_bytes(body, state.config.server.max_body_bytes).await?;
    let correlation_id =
        resolve_correlation_id(parts.uri.query(), &parts.headers, &state.config.trace);

    let mut headers = parts.headers;
    sanitize(&mut headers);
    let outcome = state
        .propagator
        .propagate(&mut headers, correlation_id.as_deref())?;
    metrics::record_reconciliation(outcome.as_str());

    if let Reconciliation::Rewritten { original } = &outcome {
        tracing::info!(
            function,
            original = %original,
            correlation_id = correlation_id.as_deref().unwrap_or_default(),
            "Trace context rewritten"
        );
    }

    let target = state.config.downstream.target(path);
    let envelope = RelayEnvelope::new(&target, parts.method, headers)?.with_body(body);
    state.forwarder.forward(envelope).await
}

/// Refuse up front what the queue worker could never replay.
///
/// Propagation runs over a copy; the queued entry keeps the inbound headers.
fn check_trace_context(state: &AppState, parts: &Parts) -> RelayResult<()> {
    let correlation_id =
        resolve_correlation_id(parts.uri.query(), &parts.headers, &state.config.trace);
    let mut headers = parts.headers.clone();
    state
        .propagator
        .propagate(&mut headers, correlation_id.as_deref())
        .map(|_| ())
}

fn submit(state: &AppState, entry: LogEntry) -> RelayResult<EnqueueReceipt> {
    let record = RelayRecord::enqueued(entry)?;
    let message = QueueMessage::json(&record)?;
    let message_id = message.id;
    state.queue.send(message)?;

    Ok(EnqueueReceipt {
        message_id,
        queue: state.queue.queue_name().to_string(),
        stage: record.stage,
        entry: record.entry,
    })
}

/// Downstream status and body, verbatim, as JSON.
fn pass_through(downstream: RelayResponse) -> Response {
    (
        downstream.status,
        [(header::CONTENT_TYPE, "application/json")],
        downstream.body,
    )
        .into_response()
}

fn fail(function: &'static str, entry: &LogEntry, error: RelayError) -> Response {
    tracing::error!(
        function,
        status = error.status().as_u16(),
        error = %error,
        headers = ?entry.headers,
        "Relay failed"
    );
    error.into_response()
}
