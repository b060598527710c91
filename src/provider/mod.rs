//! Resource providers
//!
//! A provider resolves a request path to the current [`Resource`] metadata
//! and hands out byte windows of that exact version. Two implementations
//! live here: [`FileSystemProvider`] reads straight from disk on every
//! request, and [`CachingProvider`] decorates any other provider with a
//! shared [`BufferCache`](crate::cache::BufferCache).

pub mod caching;
pub mod fs;

pub use caching::CachingProvider;
pub use fs::FileSystemProvider;

use crate::error::{RangeError, Result};
use crate::models::{ByteRange, Resource};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes of one window, ready to be written to a response
pub enum ByteWindow {
    /// Already in memory
    Buffered(Bytes),
    /// A reader positioned at the window start that yields at least `len` bytes
    Streamed {
        reader: Pin<Box<dyn AsyncRead + Send>>,
        len: u64,
    },
}

impl ByteWindow {
    pub fn len(&self) -> u64 {
        match self {
            ByteWindow::Buffered(data) => data.len() as u64,
            ByteWindow::Streamed { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole window into memory
    ///
    /// Fails with [`RangeError::LengthMismatch`] if the reader ends early.
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self {
            ByteWindow::Buffered(data) => Ok(data),
            ByteWindow::Streamed { reader, len } => {
                let capacity = usize::try_from(len).unwrap_or(0);
                let mut buffer = Vec::with_capacity(capacity);
                reader.take(len).read_to_end(&mut buffer).await?;

                let actual = buffer.len() as u64;
                if actual != len {
                    return Err(RangeError::LengthMismatch {
                        expected: len,
                        actual,
                    });
                }
                Ok(Bytes::from(buffer))
            }
        }
    }
}

impl fmt::Debug for ByteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteWindow::Buffered(data) => {
                f.debug_tuple("Buffered").field(&data.len()).finish()
            }
            ByteWindow::Streamed { len, .. } => {
                f.debug_struct("Streamed").field("len", len).finish()
            }
        }
    }
}

/// Resolves resources and opens byte windows over them
#[async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    /// Resolve `path` to its current metadata
    ///
    /// Returns [`RangeError::NotFound`] when there is nothing to serve.
    async fn resolve(&self, path: &str) -> Result<Resource>;

    /// Open `range` of a previously resolved resource
    ///
    /// The window must come from the same content version as
    /// `resource.metadata`; if the length on the backing store changed the
    /// provider fails with [`RangeError::LengthMismatch`] instead.
    async fn open_window(&self, resource: &Resource, range: ByteRange) -> Result<ByteWindow>;
}

/// Make sure a requested window lies inside the resolved resource
pub(crate) fn check_window(resource: &Resource, range: &ByteRange) -> Result<()> {
    if range.end >= resource.length() {
        return Err(RangeError::InvalidRange(format!(
            "window {}-{} outside resource {} of {} bytes",
            range.start,
            range.end,
            resource.path,
            resource.length()
        )));
    }
    Ok(())
}
