//! Metrics collection for range-serve
//!
//! Thread-safe counters updated once per response. Responses are classified
//! by status: full (200), partial (206), unsatisfiable (416), not modified
//! (304), precondition failed (412), other client errors and server errors.

use http::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for served responses
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct RangeMetrics {
    // Response classes
    total_requests: AtomicU64,
    full_responses: AtomicU64,
    partial_responses: AtomicU64,
    unsatisfiable_responses: AtomicU64,
    not_modified_responses: AtomicU64,
    precondition_failed_responses: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,

    // Bytes announced in Content-Length
    body_bytes: AtomicU64,

    // Stored as microseconds
    total_request_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub full_responses: u64,
    pub partial_responses: u64,
    pub unsatisfiable_responses: u64,
    pub not_modified_responses: u64,
    pub precondition_failed_responses: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub body_bytes: u64,
    pub total_request_duration_us: u64,
}

impl RangeMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished response
    ///
    /// # Arguments
    /// * `status` - Status line that was sent
    /// * `body_bytes` - Body length announced for the response
    /// * `duration` - Time from request arrival to response head
    pub fn record_response(&self, status: StatusCode, body_bytes: u64, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let counter = match status {
            StatusCode::OK => Some(&self.full_responses),
            StatusCode::PARTIAL_CONTENT => Some(&self.partial_responses),
            StatusCode::RANGE_NOT_SATISFIABLE => Some(&self.unsatisfiable_responses),
            StatusCode::NOT_MODIFIED => Some(&self.not_modified_responses),
            StatusCode::PRECONDITION_FAILED => Some(&self.precondition_failed_responses),
            s if s.is_client_error() => Some(&self.client_errors),
            s if s.is_server_error() => Some(&self.server_errors),
            _ => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        self.body_bytes.fetch_add(body_bytes, Ordering::Relaxed);
        self.total_request_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// Fields are loaded one at a time, so a snapshot taken under load may
    /// not be perfectly consistent across fields.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            full_responses: self.full_responses.load(Ordering::Relaxed),
            partial_responses: self.partial_responses.load(Ordering::Relaxed),
            unsatisfiable_responses: self.unsatisfiable_responses.load(Ordering::Relaxed),
            not_modified_responses: self.not_modified_responses.load(Ordering::Relaxed),
            precondition_failed_responses: self
                .precondition_failed_responses
                .load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            body_bytes: self.body_bytes.load(Ordering::Relaxed),
            total_request_duration_us: self.total_request_duration_us.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.full_responses,
            &self.partial_responses,
            &self.unsatisfiable_responses,
            &self.not_modified_responses,
            &self.precondition_failed_responses,
            &self.client_errors,
            &self.server_errors,
            &self.body_bytes,
            &self.total_request_duration_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl MetricsSnapshot {
    /// Share of requests answered with 206, as a percentage (0.0 to 100.0)
    pub fn partial_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.partial_responses as f64 / self.total_requests as f64) * 100.0
        }
    }

    /// Calculate average request duration in milliseconds
    pub fn avg_request_duration_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_request_duration_us as f64 / self.total_requests as f64) / 1000.0
        }
    }
}
