//! Metrics HTTP Endpoint
//!
//! A separate listener exposing response metrics and cache statistics:
//!
//! - `/metrics`: Prometheus text exposition
//! - `/stats`: the same numbers as JSON
//! - `/health`: liveness probe

use crate::cache::{BufferCache, CacheStats};
use crate::error::Result;
use crate::metrics::{MetricsSnapshot, RangeMetrics};
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<RangeMetrics>,
    cache: Option<Arc<BufferCache>>,
    addr: SocketAddr,
}

#[derive(Serialize)]
struct StatsDocument {
    responses: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<CacheStats>,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Example
    /// ```no_run
    /// use range_serve::metrics::RangeMetrics;
    /// use range_serve::metrics_endpoint::MetricsEndpoint;
    /// use std::sync::Arc;
    ///
    /// let metrics = Arc::new(RangeMetrics::new());
    /// let endpoint = MetricsEndpoint::new(metrics, "127.0.0.1:9090".parse().unwrap());
    /// ```
    pub fn new(metrics: Arc<RangeMetrics>, addr: SocketAddr) -> Self {
        Self {
            metrics,
            cache: None,
            addr,
        }
    }

    /// Also report statistics of a buffer cache
    pub fn with_cache(mut self, cache: Arc<BufferCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Bind the configured address and serve until the process exits
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        info!("Metrics endpoint listening on http://{}", local);
        info!("Metrics available at http://{}/metrics", local);

        let metrics = self.metrics;
        let cache = self.cache;
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&metrics);
            let cache = cache.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let response = route(req.uri().path(), &metrics, cache.as_deref());
                    async move { Ok::<_, Infallible>(response) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

fn route(path: &str, metrics: &RangeMetrics, cache: Option<&BufferCache>) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => {
            let cache_stats = cache.map(BufferCache::stats);
            let body = format_prometheus_metrics(&metrics.get_stats(), cache_stats.as_ref());
            text_response(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                body,
            )
        }
        "/stats" => stats_response(metrics, cache),
        "/health" => text_response(
            StatusCode::OK,
            "application/json",
            r#"{"status":"healthy"}"#.to_string(),
        ),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "404 Not Found".to_string()),
    }
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn stats_response(metrics: &RangeMetrics, cache: Option<&BufferCache>) -> Response<Full<Bytes>> {
    let document = StatsDocument {
        responses: metrics.get_stats(),
        cache: cache.map(BufferCache::stats),
    };
    match serde_json::to_string_pretty(&document) {
        Ok(json) => text_response(StatusCode::OK, "application/json", json),
        Err(e) => {
            error!("Failed to serialize stats: {}", e);
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "500 Internal Server Error".to_string(),
            )
        }
    }
}

fn push_metric(
    output: &mut String,
    name: &str,
    kind: &str,
    help: &str,
    value: impl std::fmt::Display,
) {
    // Writing to a String cannot fail.
    let _ = writeln!(output, "# HELP range_serve_{} {}", name, help);
    let _ = writeln!(output, "# TYPE range_serve_{} {}", name, kind);
    let _ = writeln!(output, "range_serve_{} {}", name, value);
    output.push('\n');
}

/// Format metrics in Prometheus exposition format
fn format_prometheus_metrics(snapshot: &MetricsSnapshot, cache: Option<&CacheStats>) -> String {
    let mut output = String::new();

    push_metric(
        &mut output,
        "requests_total",
        "counter",
        "Total number of requests processed",
        snapshot.total_requests,
    );
    push_metric(
        &mut output,
        "full_responses_total",
        "counter",
        "Responses served with the full body (200)",
        snapshot.full_responses,
    );
    push_metric(
        &mut output,
        "partial_responses_total",
        "counter",
        "Responses served as a byte range (206)",
        snapshot.partial_responses,
    );
    push_metric(
        &mut output,
        "unsatisfiable_responses_total",
        "counter",
        "Range requests that could not be satisfied (416)",
        snapshot.unsatisfiable_responses,
    );
    push_metric(
        &mut output,
        "not_modified_responses_total",
        "counter",
        "Conditional requests answered with 304",
        snapshot.not_modified_responses,
    );
    push_metric(
        &mut output,
        "precondition_failed_responses_total",
        "counter",
        "Conditional requests answered with 412",
        snapshot.precondition_failed_responses,
    );
    push_metric(
        &mut output,
        "client_errors_total",
        "counter",
        "Other 4xx responses",
        snapshot.client_errors,
    );
    push_metric(
        &mut output,
        "server_errors_total",
        "counter",
        "5xx responses",
        snapshot.server_errors,
    );
    push_metric(
        &mut output,
        "body_bytes_total",
        "counter",
        "Body bytes announced to clients",
        snapshot.body_bytes,
    );
    push_metric(
        &mut output,
        "partial_rate",
        "gauge",
        "Share of requests answered with 206 in percent",
        format!("{:.2}", snapshot.partial_rate()),
    );
    push_metric(
        &mut output,
        "request_duration_ms_avg",
        "gauge",
        "Average request duration in milliseconds",
        format!("{:.2}", snapshot.avg_request_duration_ms()),
    );

    if let Some(cache) = cache {
        push_metric(
            &mut output,
            "cache_entries",
            "gauge",
            "Resources held in the buffer cache",
            cache.total_entries,
        );
        push_metric(
            &mut output,
            "cache_bytes",
            "gauge",
            "Bytes held in the buffer cache",
            cache.total_bytes,
        );
        push_metric(&mut output, "cache_hits_total", "counter", "Number of cache hits", cache.hits);
        push_metric(
            &mut output,
            "cache_misses_total",
            "counter",
            "Number of cache misses",
            cache.misses,
        );
        push_metric(
            &mut output,
            "cache_stale_total",
            "counter",
            "Cached entries found stale",
            cache.stale,
        );
        push_metric(
            &mut output,
            "cache_evictions_total",
            "counter",
            "Entries evicted to honour the limits",
            cache.evictions,
        );
        push_metric(
            &mut output,
            "cache_bypassed_total",
            "counter",
            "Resources too large to cache",
            cache.bypassed,
        );
        push_metric(
            &mut output,
            "cache_hit_rate",
            "gauge",
            "Cache hit rate percentage",
            format!("{:.2}", cache.hit_rate()),
        );
    }

    output
}
