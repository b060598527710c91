//! Request handler abstraction
//!
//! Every mount point in a [`PathRouter`](crate::server::PathRouter) is a
//! [`Handler`]. Requests arrive with their body already buffered; responses
//! carry a [`RangeBody`] so windows can be streamed from a provider.

use crate::body::RangeBody;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use std::future::Future;
use std::sync::Arc;

/// Path of a request relative to the mount point it was routed to
///
/// Inserted into the request extensions by the router. Handlers that are
/// not mounted below a prefix fall back to the URI path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedPath(pub String);

impl MountedPath {
    /// The path a handler should serve for `request`
    pub fn of<B>(request: &Request<B>) -> &str {
        request
            .extensions()
            .get::<MountedPath>()
            .map(|mounted| mounted.0.as_str())
            .unwrap_or_else(|| request.uri().path())
    }
}

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request<Bytes>) -> Result<Response<RangeBody>>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, request: Request<Bytes>) -> Result<Response<RangeBody>> {
        (**self).handle(request).await
    }
}

/// A [`Handler`] built from an async closure
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<RangeBody>>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<RangeBody>>> + Send + 'static,
{
    async fn handle(&self, request: Request<Bytes>) -> Result<Response<RangeBody>> {
        (self.f)(request).await
    }
}
