//! Direct filesystem provider
//!
//! Metadata is read from the filesystem on every resolve; nothing is
//! cached. Windows are served by seeking an opened file to the window start
//! and bounding the read to the window length.

use super::{check_window, ByteWindow, ResourceProvider};
use crate::error::{RangeError, Result};
use crate::models::{ByteRange, Resource, ResourceMetadata};
use crate::validators::EntityTag;
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{self, File};
use tokio::io::AsyncSeekExt;
use tracing::debug;

/// Serves files below a root directory
#[derive(Debug, Clone)]
pub struct FileSystemProvider {
    root: PathBuf,
    generate_etags: bool,
}

impl FileSystemProvider {
    /// Create a provider rooted at `root`, generating entity tags
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSystemProvider {
            root: root.into(),
            generate_etags: true,
        }
    }

    /// Enable or disable entity tag generation
    pub fn with_etags(mut self, enabled: bool) -> Self {
        self.generate_etags = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto the root, refusing anything that would
    /// escape it
    ///
    /// Segments are percent-decoded first; the escape checks run on the
    /// decoded text.
    fn map_path(&self, path: &str) -> Result<PathBuf> {
        let mut mapped = self.root.clone();
        for raw in path.split('/') {
            let segment = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| RangeError::not_found(path))?;
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." || segment.contains(['/', '\\', '\0']) {
                return Err(RangeError::not_found(path));
            }
            let mut components = Path::new(&*segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => mapped.push(part),
                _ => return Err(RangeError::not_found(path)),
            }
        }
        Ok(mapped)
    }

    fn entity_tag(length: u64, modified: Option<SystemTime>) -> EntityTag {
        let stamp = modified
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        EntityTag::strong(format!("{:x}-{:x}", length, stamp))
    }

    fn map_io_error(path: &str, err: std::io::Error) -> RangeError {
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => RangeError::not_found(path),
            _ => err.into(),
        }
    }
}

#[async_trait]
impl ResourceProvider for FileSystemProvider {
    async fn resolve(&self, path: &str) -> Result<Resource> {
        let fs_path = self.map_path(path)?;
        let attributes = fs::metadata(&fs_path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        if !attributes.is_file() {
            debug!("Not a regular file: path={}", path);
            return Err(RangeError::not_found(path));
        }

        let length = attributes.len();
        let modified = attributes.modified().ok();

        let mut metadata = ResourceMetadata::new(length);
        metadata.last_modified = modified;
        if self.generate_etags {
            metadata.etag = Some(Self::entity_tag(length, modified));
        }
        metadata.content_type = mime_guess::from_path(&fs_path)
            .first()
            .map(|mime| mime.to_string());

        debug!("Resolved file: path={}, length={}", path, length);
        Ok(Resource::new(path, metadata))
    }

    async fn open_window(&self, resource: &Resource, range: ByteRange) -> Result<ByteWindow> {
        check_window(resource, &range)?;

        let fs_path = self.map_path(&resource.path)?;
        let mut file = File::open(&fs_path)
            .await
            .map_err(|e| Self::map_io_error(&resource.path, e))?;

        let actual = file.metadata().await?.len();
        if actual != resource.length() {
            return Err(RangeError::LengthMismatch {
                expected: resource.length(),
                actual,
            });
        }

        if range.start > 0 {
            file.seek(SeekFrom::Start(range.start)).await?;
        }

        debug!(
            "Opened file window: path={}, range={}-{}",
            resource.path, range.start, range.end
        );
        Ok(ByteWindow::Streamed {
            reader: Box::pin(file),
            len: range.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, FileSystemProvider) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("range.txt"), b"0123456789").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let provider = FileSystemProvider::new(dir.path());
        (dir, provider)
    }

    #[tokio::test]
    async fn test_resolve_file() {
        let (_dir, provider) = fixture();
        let resource = provider.resolve("/range.txt").await.unwrap();
        assert_eq!(resource.length(), 10);
        assert!(resource.metadata.last_modified.is_some());
        assert!(resource.metadata.etag.is_some());
        assert_eq!(resource.metadata.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_resolve_without_etags() {
        let (dir, _) = fixture();
        let provider = FileSystemProvider::new(dir.path()).with_etags(false);
        let resource = provider.resolve("/range.txt").await.unwrap();
        assert!(resource.metadata.etag.is_none());
    }

    #[tokio::test]
    async fn test_resolve_missing_and_directories() {
        let (_dir, provider) = fixture();
        assert!(matches!(
            provider.resolve("/missing.txt").await,
            Err(RangeError::NotFound(_))
        ));
        assert!(matches!(provider.resolve("/sub").await, Err(RangeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, provider) = fixture();
        assert!(matches!(
            provider.resolve("/../etc/passwd").await,
            Err(RangeError::NotFound(_))
        ));
        assert!(matches!(
            provider.resolve("/sub/..\\range.txt").await,
            Err(RangeError::NotFound(_))
        ));
        let encoded_escapes = [
            "/%2e%2e/etc/passwd",
            "/sub/%2E%2E/%2E%2E/etc/passwd",
            "/sub%2F..%2F..%2Fetc",
        ];
        for encoded in encoded_escapes {
            assert!(matches!(
                provider.resolve(encoded).await,
                Err(RangeError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_percent_encoded_names() {
        let (dir, provider) = fixture();
        std::fs::write(dir.path().join("sub").join("my file.txt"), b"spaced").unwrap();

        let resource = provider.resolve("/sub/my%20file.txt").await.unwrap();
        assert_eq!(resource.length(), 6);
        let window = provider
            .open_window(&resource, ByteRange::new(3, 5).unwrap())
            .await
            .unwrap();
        assert_eq!(window.into_bytes().await.unwrap(), Bytes::from_static(b"ced"));

        assert!(matches!(
            provider.resolve("/%ff%fe.txt").await,
            Err(RangeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_window() {
        let (_dir, provider) = fixture();
        let resource = provider.resolve("/range.txt").await.unwrap();
        let window = provider
            .open_window(&resource, ByteRange::new(3, 6).unwrap())
            .await
            .unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.into_bytes().await.unwrap(), Bytes::from_static(b"3456"));
    }

    #[tokio::test]
    async fn test_open_window_after_length_change() {
        let (dir, provider) = fixture();
        let resource = provider.resolve("/range.txt").await.unwrap();
        std::fs::write(dir.path().join("range.txt"), b"01234").unwrap();

        let err = provider
            .open_window(&resource, ByteRange::new(0, 3).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RangeError::LengthMismatch { expected: 10, actual: 5 }));
    }

    #[tokio::test]
    async fn test_open_window_outside_resource() {
        let (_dir, provider) = fixture();
        let resource = provider.resolve("/range.txt").await.unwrap();
        assert!(provider
            .open_window(&resource, ByteRange::new(5, 10).unwrap())
            .await
            .is_err());
    }
}
