//! HTTP server
//!
//! [`PathRouter`] dispatches requests to handlers mounted under path
//! prefixes. [`RangeServer`] runs the hyper accept loop: each request body is
//! buffered, the request is routed inside an `info_span!("request")`, errors
//! are mapped to status responses and the outcome is recorded in
//! [`RangeMetrics`].

use crate::blocking::BlockingHandler;
use crate::body::RangeBody;
use crate::cache::BufferCache;
use crate::config::{ExecutionMode, RangeConfig};
use crate::error::{RangeError, Result};
use crate::handler::{Handler, MountedPath};
use crate::metrics::RangeMetrics;
use crate::provider::{CachingProvider, FileSystemProvider, ResourceProvider};
use crate::resource_handler::ResourceHandler;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, Instrument};

/// Routes requests to handlers by longest matching path prefix
///
/// The matched prefix is stripped and the remainder handed to the handler as
/// its [`MountedPath`].
#[derive(Default)]
pub struct PathRouter {
    routes: Vec<(String, Arc<dyn Handler>)>,
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

impl PathRouter {
    pub fn new() -> Self {
        PathRouter { routes: Vec::new() }
    }

    /// Mount `handler` under `prefix`
    pub fn add_prefix_path(mut self, prefix: &str, handler: impl Handler) -> Self {
        let prefix = normalize_prefix(prefix);
        let handler: Arc<dyn Handler> = Arc::new(handler);
        self.routes.retain(|(existing, _)| *existing != prefix);
        self.routes.push((prefix, handler));
        self
    }

    /// Find the handler for `path` and the path relative to its mount
    pub fn route(&self, path: &str) -> Option<(Arc<dyn Handler>, String)> {
        self.routes
            .iter()
            .filter_map(|(prefix, handler)| {
                let rest = if prefix == "/" {
                    path
                } else {
                    let rest = path.strip_prefix(prefix.as_str())?;
                    if !rest.is_empty() && !rest.starts_with('/') {
                        return None;
                    }
                    rest
                };
                Some((prefix.len(), handler, rest))
            })
            .max_by_key(|(len, _, _)| *len)
            .map(|(_, handler, rest)| {
                let rest = if rest.is_empty() { "/" } else { rest };
                (Arc::clone(handler), rest.to_string())
            })
    }
}

#[async_trait]
impl Handler for PathRouter {
    async fn handle(&self, mut request: Request<Bytes>) -> Result<Response<RangeBody>> {
        let path = MountedPath::of(&request).to_string();
        let Some((handler, rest)) = self.route(&path) else {
            debug!("No handler mounted: path={}", path);
            return Err(RangeError::not_found(path));
        };
        request.extensions_mut().insert(MountedPath(rest));
        handler.handle(request).await
    }
}

/// Build the response sent for a handler error
pub fn error_response(err: &RangeError) -> Response<RangeBody> {
    let status =
        StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let reason = status.canonical_reason().unwrap_or("Error");

    let mut response = Response::new(RangeBody::from(reason));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(reason.len()));
    if status == StatusCode::METHOD_NOT_ALLOWED {
        headers.insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
    }
    response
}

/// Build the file-serving handler described by `config`
///
/// Returns the handler and, when caching is enabled, the cache it reads
/// through so its statistics can be exported.
pub fn file_handler(config: &RangeConfig) -> (Arc<dyn Handler>, Option<Arc<BufferCache>>) {
    let files = Arc::new(
        FileSystemProvider::new(&config.root_dir).with_etags(config.generate_etags),
    );
    let cache = config
        .cache
        .enabled
        .then(|| Arc::new(BufferCache::new(config.cache.limits())));

    let provider: Arc<dyn ResourceProvider> = match &cache {
        Some(cache) => Arc::new(CachingProvider::new(files, Arc::clone(cache))),
        None => files,
    };

    let handler = ResourceHandler::new(provider).with_accept_ranges(config.send_accept_ranges);
    let handler: Arc<dyn Handler> = match config.execution_mode {
        ExecutionMode::NonBlocking => Arc::new(handler),
        ExecutionMode::Blocking => Arc::new(BlockingHandler::new(handler)),
    };
    (handler, cache)
}

/// HTTP/1 server bound to a listener
pub struct RangeServer {
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    metrics: Arc<RangeMetrics>,
}

impl RangeServer {
    /// Bind `addr` and prepare to serve `handler`
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn Handler>,
        metrics: Arc<RangeMetrics>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(RangeServer {
            listener,
            handler,
            metrics,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics(&self) -> &Arc<RangeMetrics> {
        &self.metrics
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> Result<()> {
        info!("Listening on http://{}", self.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let handler = Arc::clone(&self.handler);
            let metrics = Arc::clone(&self.metrics);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    dispatch(Arc::clone(&handler), Arc::clone(&metrics), req)
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection from {} closed with error: {:?}", peer, err);
                }
            });
        }
    }
}

async fn dispatch(
    handler: Arc<dyn Handler>,
    metrics: Arc<RangeMetrics>,
    req: Request<Incoming>,
) -> std::result::Result<Response<RangeBody>, Infallible> {
    let start = Instant::now();
    let span = info_span!("request", method = %req.method(), path = %req.uri().path());

    async move {
        let (parts, body) = req.into_parts();
        let response = match body.collect().await {
            Ok(collected) => {
                let request = Request::from_parts(parts, collected.to_bytes());
                match handler.handle(request).await {
                    Ok(response) => response,
                    Err(e) if e.is_client_error() => {
                        debug!("Request rejected: {}", e);
                        error_response(&e)
                    }
                    Err(e) => {
                        error!("Request failed: {}", e);
                        error_response(&e)
                    }
                }
            }
            Err(e) => {
                error!("Failed to read request body: {}", e);
                error_response(&RangeError::HttpError(e.to_string()))
            }
        };

        let body_bytes = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        metrics.record_response(response.status(), body_bytes, start.elapsed());
        debug!("Responding: status={}, length={}", response.status(), body_bytes);

        Ok(response)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use http_body_util::BodyExt;

    async fn echo_path(request: Request<Bytes>) -> Result<Response<RangeBody>> {
        Ok(Response::new(RangeBody::from(
            MountedPath::of(&request).to_string(),
        )))
    }

    async fn body_text(response: Response<RangeBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn router() -> PathRouter {
        PathRouter::new()
            .add_prefix_path("/path", handler_fn(echo_path))
            .add_prefix_path("/resource/", handler_fn(echo_path))
            .add_prefix_path("/resource/cached", handler_fn(echo_path))
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix(""), "/");
        assert_eq!(normalize_prefix("files/"), "/files");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let router = router();
        let (_, rest) = router.route("/resource/cached/range.txt").unwrap();
        assert_eq!(rest, "/range.txt");
        let (_, rest) = router.route("/resource/range.txt").unwrap();
        assert_eq!(rest, "/range.txt");
        let (_, rest) = router.route("/path").unwrap();
        assert_eq!(rest, "/");
    }

    #[test]
    fn test_prefix_matches_whole_segments() {
        let router = router();
        assert!(router.route("/pathological").is_none());
        assert!(router.route("/other").is_none());
    }

    #[tokio::test]
    async fn test_router_sets_mounted_path() {
        let router = router();
        let request = Request::get("/resource/cached/a/b.txt")
            .body(Bytes::new())
            .unwrap();
        let response = router.handle(request).await.unwrap();
        assert_eq!(body_text(response).await, "/a/b.txt");
    }

    #[tokio::test]
    async fn test_router_not_found() {
        let request = Request::get("/missing").body(Bytes::new()).unwrap();
        let err = router().handle(request).await.unwrap_err();
        assert!(matches!(err, RangeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = error_response(&RangeError::MethodNotAllowed("PUT".into()));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "GET, HEAD");
        assert_eq!(body_text(response).await, "Method Not Allowed");

        let response = error_response(&RangeError::LengthMismatch {
            expected: 10,
            actual: 4,
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(ALLOW).is_none());
    }

    #[test]
    fn test_file_handler_cache_wiring() {
        let mut config = RangeConfig::default();
        let (_, cache) = file_handler(&config);
        assert!(cache.is_none());

        config.cache.enabled = true;
        config.execution_mode = ExecutionMode::Blocking;
        let (_, cache) = file_handler(&config);
        assert!(cache.is_some());
    }
}
