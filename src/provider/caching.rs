//! Buffered cache decorator
//!
//! Wraps another provider. Windows of a fresh cached resource are sliced
//! from the in-memory buffer without any I/O. On a miss the whole resource
//! is fetched from the wrapped provider, stored, and the window is sliced
//! from the new buffer: whole-resource buffers serve every later range
//! request, partial ones would not.

use super::{check_window, ByteWindow, ResourceProvider};
use crate::cache::{BufferCache, CacheLookup};
use crate::error::{RangeError, Result};
use crate::models::{ByteRange, Resource};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// A [`ResourceProvider`] backed by a shared [`BufferCache`]
pub struct CachingProvider {
    inner: Arc<dyn ResourceProvider>,
    cache: Arc<BufferCache>,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn ResourceProvider>, cache: Arc<BufferCache>) -> Self {
        CachingProvider { inner, cache }
    }

    pub fn cache(&self) -> &Arc<BufferCache> {
        &self.cache
    }

    /// Fetch the whole resource from the wrapped provider and cache it
    ///
    /// The fill runs as its own task so it still completes, and populates
    /// the cache, if the request that started it goes away. Concurrent fills
    /// of the same path are allowed; the last one stored wins.
    async fn fill(&self, resource: &Resource) -> Result<Bytes> {
        let Some(whole) = ByteRange::whole(resource.length()) else {
            return Ok(Bytes::new());
        };

        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        let resource = resource.clone();

        let task = tokio::spawn(async move {
            let data = inner.open_window(&resource, whole).await?.into_bytes().await?;
            cache.insert(&resource.path, resource.metadata.clone(), data.clone());
            Ok::<Bytes, RangeError>(data)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Cache fill task failed: {}", e);
                Err(RangeError::InternalError(format!("cache fill task failed: {}", e)))
            }
        }
    }
}

fn slice_window(data: &Bytes, range: ByteRange) -> Result<ByteWindow> {
    let start = usize::try_from(range.start)
        .map_err(|_| RangeError::InvalidRange(format!("start {} too large", range.start)))?;
    let end = usize::try_from(range.end)
        .map_err(|_| RangeError::InvalidRange(format!("end {} too large", range.end)))?;
    if end >= data.len() {
        return Err(RangeError::LengthMismatch {
            expected: range.end + 1,
            actual: data.len() as u64,
        });
    }
    Ok(ByteWindow::Buffered(data.slice(start..=end)))
}

#[async_trait]
impl ResourceProvider for CachingProvider {
    async fn resolve(&self, path: &str) -> Result<Resource> {
        let resource = self.inner.resolve(path).await?;
        if self.cache.invalidate_if_stale(path, &resource.metadata) {
            debug!("Resource changed since it was cached: path={}", path);
        }
        Ok(resource)
    }

    async fn open_window(&self, resource: &Resource, range: ByteRange) -> Result<ByteWindow> {
        check_window(resource, &range)?;

        if !self.cache.admits(resource.length()) {
            self.cache.record_bypass();
            debug!(
                "Resource too large for cache, reading through: path={}, length={}",
                resource.path,
                resource.length()
            );
            return self.inner.open_window(resource, range).await;
        }

        if let CacheLookup::Hit(data) = self.cache.lookup(&resource.path, &resource.metadata) {
            return slice_window(&data, range);
        }

        let data = self.fill(resource).await?;
        slice_window(&data, range)
    }
}
