//! Blocking execution mode
//!
//! [`BlockingHandler`] runs the wrapped handler on tokio's blocking thread
//! pool. The handler's provider calls are driven to completion on that
//! thread, so slow storage never occupies an I/O worker. Streamed body
//! windows are still polled by the connection task once the head is
//! returned.

use crate::body::RangeBody;
use crate::error::{RangeError, Result};
use crate::handler::Handler;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error};

/// Runs a handler on a dedicated blocking worker per request
pub struct BlockingHandler<H> {
    inner: Arc<H>,
}

impl<H: Handler> BlockingHandler<H> {
    pub fn new(inner: H) -> Self {
        BlockingHandler {
            inner: Arc::new(inner),
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for BlockingHandler<H> {
    async fn handle(&self, request: Request<Bytes>) -> Result<Response<RangeBody>> {
        let inner = Arc::clone(&self.inner);
        let runtime = Handle::current();

        let task = tokio::task::spawn_blocking(move || {
            debug!("Handling request on blocking worker: path={}", request.uri().path());
            runtime.block_on(async move { inner.handle(request).await })
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Blocking worker failed: {}", e);
                Err(RangeError::InternalError(format!("blocking worker failed: {}", e)))
            }
        }
    }
}
