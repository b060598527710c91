//! Resource-backed handler
//!
//! Serves GET and HEAD requests from a [`ResourceProvider`]: resolve the
//! path, evaluate conditional headers, evaluate the range, then write the
//! response. Only the requested window is ever read from the provider.

use crate::body::RangeBody;
use crate::error::{RangeError, Result};
use crate::handler::{Handler, MountedPath};
use crate::provider::ResourceProvider;
use crate::request_analyzer::RequestAnalyzer;
use crate::response_assembler::{apply_metadata_headers, BodySource, ResponseAssembler};
use crate::validators::{evaluate_preconditions, Precondition};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

pub struct ResourceHandler {
    provider: Arc<dyn ResourceProvider>,
    analyzer: RequestAnalyzer,
    assembler: ResponseAssembler,
}

impl ResourceHandler {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        ResourceHandler {
            provider,
            analyzer: RequestAnalyzer::new(),
            assembler: ResponseAssembler::new(),
        }
    }

    pub fn with_accept_ranges(mut self, send_accept_ranges: bool) -> Self {
        self.assembler = self.assembler.with_accept_ranges(send_accept_ranges);
        self
    }

    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    /// Empty 304/412 response carrying the resource validators
    fn conditional_response(status: StatusCode, staged: Response<()>) -> Response<RangeBody> {
        let (mut parts, ()) = staged.into_parts();
        parts.status = status;
        parts.headers.remove(CONTENT_TYPE);
        Response::from_parts(parts, RangeBody::empty())
    }
}

#[async_trait]
impl Handler for ResourceHandler {
    async fn handle(&self, request: Request<Bytes>) -> Result<Response<RangeBody>> {
        let method = request.method();
        if method != Method::GET && method != Method::HEAD {
            return Err(RangeError::MethodNotAllowed(method.to_string()));
        }
        let head_only = method == Method::HEAD;

        let path = MountedPath::of(&request);
        let resource = self.provider.resolve(path).await?;

        let mut staged = Response::new(());
        apply_metadata_headers(&resource.metadata, staged.headers_mut())?;

        match evaluate_preconditions(method, request.headers(), &resource.metadata) {
            Precondition::Proceed => {}
            Precondition::NotModified => {
                debug!("Not modified: path={}", path);
                return Ok(Self::conditional_response(StatusCode::NOT_MODIFIED, staged));
            }
            Precondition::Failed => {
                debug!("Precondition failed: path={}", path);
                return Ok(Self::conditional_response(
                    StatusCode::PRECONDITION_FAILED,
                    staged,
                ));
            }
        }

        let decision = self.analyzer.analyze(request.headers(), &resource.metadata);
        debug!(
            "Serving resource: path={}, length={}, decision={:?}",
            path,
            resource.length(),
            decision
        );

        let source = BodySource::Provider {
            provider: Arc::clone(&self.provider),
            resource,
        };
        self.assembler.assemble(decision, source, staged, head_only).await
    }
}
