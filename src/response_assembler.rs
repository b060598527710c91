//! Range-aware response writer
//!
//! Turns a [`RangeDecision`] plus a byte source into the final response:
//! status line, `Content-Range`, `Content-Length` and the body window. The
//! same code runs whether the caller is an async task or a blocking worker
//! thread; the only suspension point is opening a provider window.

use crate::body::RangeBody;
use crate::error::{RangeError, Result};
use crate::models::{ByteRange, RangeDecision, Resource, ResourceMetadata};
use crate::provider::ResourceProvider;
use crate::validators::format_http_date;
use bytes::Bytes;
use http::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED,
};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Where the body bytes of a response come from
pub enum BodySource {
    /// Windows are opened on demand from a provider
    Provider {
        provider: Arc<dyn ResourceProvider>,
        resource: Resource,
    },
    /// The complete representation, already in memory
    Buffer(Bytes),
}

impl BodySource {
    /// Total length of the representation
    pub fn total(&self) -> u64 {
        match self {
            BodySource::Provider { resource, .. } => resource.length(),
            BodySource::Buffer(data) => data.len() as u64,
        }
    }

    async fn window(self, range: ByteRange) -> Result<RangeBody> {
        match self {
            BodySource::Provider { provider, resource } => {
                let window = provider.open_window(&resource, range).await?;
                Ok(RangeBody::from(window))
            }
            BodySource::Buffer(data) => {
                if range.end >= data.len() as u64 {
                    return Err(RangeError::InvalidRange(format!(
                        "window {}-{} outside buffer of {} bytes",
                        range.start,
                        range.end,
                        data.len()
                    )));
                }
                // Bounds checked above, so both fit in usize.
                let start = range.start as usize;
                let end = range.end as usize;
                Ok(RangeBody::full(data.slice(start..=end)))
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| RangeError::HttpError(format!("Invalid header value: {}", e)))
}

/// Set `ETag`, `Last-Modified` and `Content-Type` from resource metadata
pub fn apply_metadata_headers(metadata: &ResourceMetadata, headers: &mut HeaderMap) -> Result<()> {
    if let Some(etag) = &metadata.etag {
        headers.insert(ETAG, header_value(&etag.to_string())?);
    }
    if let Some(modified) = metadata.last_modified {
        headers.insert(LAST_MODIFIED, header_value(&format_http_date(modified))?);
    }
    if let Some(content_type) = &metadata.content_type {
        headers.insert(CONTENT_TYPE, header_value(content_type)?);
    }
    Ok(())
}

/// Writes range decisions as HTTP responses
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    send_accept_ranges: bool,
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        ResponseAssembler::new()
    }
}

impl ResponseAssembler {
    /// Create a ResponseAssembler that advertises `Accept-Ranges: bytes`
    pub fn new() -> Self {
        ResponseAssembler {
            send_accept_ranges: true,
        }
    }

    pub fn with_accept_ranges(mut self, send_accept_ranges: bool) -> Self {
        self.send_accept_ranges = send_accept_ranges;
        self
    }

    /// Compute status and length/range headers for a decision
    ///
    /// `status` is the status already staged for a full response (usually
    /// 200). `headers` is updated in place; every other header passes
    /// through unchanged.
    pub fn build_response_header(
        &self,
        decision: &RangeDecision,
        status: StatusCode,
        total: u64,
        headers: &mut HeaderMap,
    ) -> Result<StatusCode> {
        debug!("Building response headers: total={}, decision={:?}", total, decision);

        let (status, content_length) = match decision {
            RangeDecision::Full => {
                headers.remove(CONTENT_RANGE);
                (status, total)
            }
            RangeDecision::Partial { range, total: range_total } => {
                if range.end >= *range_total || *range_total != total {
                    return Err(RangeError::InvalidRange(format!(
                        "window {}-{} does not fit resource of {} bytes",
                        range.start, range.end, total
                    )));
                }
                headers.insert(CONTENT_RANGE, header_value(&range.to_content_range(total))?);
                (StatusCode::PARTIAL_CONTENT, range.size())
            }
            RangeDecision::Unsatisfiable { total } => {
                headers.insert(CONTENT_RANGE, header_value(&format!("bytes */{}", total))?);
                (StatusCode::RANGE_NOT_SATISFIABLE, 0)
            }
        };

        headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
        if self.send_accept_ranges {
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        }

        Ok(status)
    }

    /// Write `decision` over `source`
    ///
    /// `staged` carries the status and headers prepared before range
    /// handling (upstream output in wrapping mode, metadata headers for
    /// resources). With `head_only` the headers are computed as for GET but
    /// no body is sent.
    pub async fn assemble(
        &self,
        decision: RangeDecision,
        source: BodySource,
        staged: Response<()>,
        head_only: bool,
    ) -> Result<Response<RangeBody>> {
        let (mut parts, ()) = staged.into_parts();
        let total = source.total();
        parts.status =
            self.build_response_header(&decision, parts.status, total, &mut parts.headers)?;

        let body = if head_only {
            RangeBody::empty()
        } else {
            match decision {
                RangeDecision::Full => match ByteRange::whole(total) {
                    Some(whole) => source.window(whole).await?,
                    None => RangeBody::empty(),
                },
                RangeDecision::Partial { range, .. } => source.window(range).await?,
                RangeDecision::Unsatisfiable { .. } => RangeBody::empty(),
            }
        };

        debug!(
            "Assembled response: status={}, content_range={:?}",
            parts.status,
            parts.headers.get(CONTENT_RANGE)
        );
        Ok(Response::from_parts(parts, body))
    }
}
