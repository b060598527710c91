//! Generic range-wrapping handler
//!
//! [`ByteRangeHandler`] wraps any other [`Handler`] that produces a complete
//! 200 response. The upstream response is buffered, the validators and
//! length it staged are captured, and the range decision is applied to the
//! buffered bytes. Everything else passes through untouched.

use crate::body::RangeBody;
use crate::error::{RangeError, Result};
use crate::handler::Handler;
use crate::models::ResourceMetadata;
use crate::request_analyzer::RequestAnalyzer;
use crate::response_assembler::{BodySource, ResponseAssembler};
use crate::validators::EntityTag;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use http::{HeaderMap, HeaderName, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use tracing::{debug, warn};

/// Applies byte-range semantics to the output of another handler
pub struct ByteRangeHandler<H> {
    next: H,
    analyzer: RequestAnalyzer,
    assembler: ResponseAssembler,
}

impl<H: Handler> ByteRangeHandler<H> {
    pub fn new(next: H) -> Self {
        ByteRangeHandler {
            next,
            analyzer: RequestAnalyzer::new(),
            assembler: ResponseAssembler::new(),
        }
    }

    pub fn with_accept_ranges(mut self, send_accept_ranges: bool) -> Self {
        self.assembler = self.assembler.with_accept_ranges(send_accept_ranges);
        self
    }

    pub fn inner(&self) -> &H {
        &self.next
    }
}

/// Metadata of a buffered upstream response, taken from the headers the
/// upstream staged. The length is always the buffered length.
fn captured_metadata(headers: &HeaderMap, length: u64) -> ResourceMetadata {
    let declared = header_str(headers, CONTENT_LENGTH).and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(declared) = declared {
        if declared != length {
            warn!(
                "Upstream Content-Length disagrees with body: declared={}, actual={}",
                declared, length
            );
        }
    }

    let mut metadata = ResourceMetadata::new(length);
    metadata.etag = header_str(headers, ETAG).and_then(EntityTag::parse);
    metadata.last_modified =
        header_str(headers, LAST_MODIFIED).and_then(|v| httpdate::parse_http_date(v).ok());
    metadata.content_type = header_str(headers, CONTENT_TYPE).map(str::to_string);
    metadata
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn eligible(method: &Method, response: &Response<RangeBody>) -> bool {
    method == Method::GET
        && response.status() == StatusCode::OK
        && !response.headers().contains_key(CONTENT_RANGE)
}

#[async_trait]
impl<H: Handler> Handler for ByteRangeHandler<H> {
    async fn handle(&self, request: Request<Bytes>) -> Result<Response<RangeBody>> {
        let method = request.method().clone();
        let request_headers = request.headers().clone();

        let response = self.next.handle(request).await?;
        if !eligible(&method, &response) {
            debug!(
                "Passing response through: method={}, status={}",
                method,
                response.status()
            );
            return Ok(response);
        }

        let (parts, body) = response.into_parts();
        let data = body
            .collect()
            .await
            .map_err(|e| RangeError::io(format!("failed to buffer upstream body: {}", e)))?
            .to_bytes();

        let metadata = captured_metadata(&parts.headers, data.len() as u64);
        let decision = self.analyzer.analyze(&request_headers, &metadata);
        debug!(
            "Wrapped response: length={}, etag={:?}, decision={:?}",
            metadata.length, metadata.etag, decision
        );

        self.assembler
            .assemble(
                decision,
                BodySource::Buffer(data),
                Response::from_parts(parts, ()),
                false,
            )
            .await
    }
}
