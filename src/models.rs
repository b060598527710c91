//! Core data models for range evaluation

use crate::error::{RangeError, Result};
use crate::validators::EntityTag;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// An inclusive byte window `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if `start <= end`
    /// * `Err(RangeError::InvalidRange)` otherwise
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(RangeError::InvalidRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// The whole of a non-empty resource of `length` bytes
    pub fn whole(length: u64) -> Option<Self> {
        length.checked_sub(1).map(|end| ByteRange { start: 0, end })
    }

    /// Number of bytes in this window
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for this window within a resource of `total` bytes
    pub fn to_content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// A single range-spec from a `Range: bytes=...` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=-n`: the last `n` bytes
    Suffix(u64),
    /// `bytes=start-`: from `start` to the end
    Open(u64),
    /// `bytes=start-end`: inclusive, `end` may exceed the length
    Closed(u64, u64),
}

impl RangeSpec {
    /// Parse a `Range` header value
    ///
    /// Returns `None` for anything other than a single `bytes=` range-spec:
    /// other units, multiple ranges, missing or non-numeric positions. The
    /// caller treats `None` as "no range requested".
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?.trim();

        if spec.is_empty() || spec.contains(',') {
            return None;
        }

        let (first, last) = spec.split_once('-')?;
        let (first, last) = (first.trim(), last.trim());

        match (first.is_empty(), last.is_empty()) {
            (true, true) => None,
            (true, false) => parse_position(last).map(RangeSpec::Suffix),
            (false, true) => parse_position(first).map(RangeSpec::Open),
            (false, false) => {
                let start = parse_position(first)?;
                let end = parse_position(last)?;
                Some(RangeSpec::Closed(start, end))
            }
        }
    }

    /// Resolve this spec against a resource of `total` bytes
    pub fn resolve(&self, total: u64) -> RangeDecision {
        let window = match *self {
            RangeSpec::Suffix(n) => {
                if total == 0 || n == 0 {
                    None
                } else {
                    Some((total.saturating_sub(n), total - 1))
                }
            }
            RangeSpec::Open(start) => {
                if start >= total {
                    None
                } else {
                    Some((start, total - 1))
                }
            }
            RangeSpec::Closed(start, end) => {
                if start > end || start >= total {
                    None
                } else {
                    Some((start, end.min(total - 1)))
                }
            }
        };

        match window {
            Some((start, end)) if start <= end && end < total => RangeDecision::Partial {
                range: ByteRange { start, end },
                total,
            },
            _ => RangeDecision::Unsatisfiable { total },
        }
    }
}

/// Digits only; signs and whitespace inside a position are rejected
fn parse_position(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Outcome of evaluating a request's range headers against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDecision {
    /// Serve the complete representation
    Full,
    /// Serve `range` of a resource of `total` bytes with 206
    Partial { range: ByteRange, total: u64 },
    /// 416 with `Content-Range: bytes */total`
    Unsatisfiable { total: u64 },
}

impl RangeDecision {
    /// `Content-Range` header value, absent for full responses
    pub fn content_range(&self) -> Option<String> {
        match self {
            RangeDecision::Full => None,
            RangeDecision::Partial { range, total } => Some(range.to_content_range(*total)),
            RangeDecision::Unsatisfiable { total } => Some(format!("bytes */{}", total)),
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, RangeDecision::Partial { .. })
    }
}

/// Metadata describing the current version of a resource
///
/// Recomputed every time a resource is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// Total size in bytes
    pub length: u64,
    /// Weak validator
    pub last_modified: Option<SystemTime>,
    /// Strong validator
    pub etag: Option<EntityTag>,
    /// Media type, not part of validation
    pub content_type: Option<String>,
}

impl ResourceMetadata {
    pub fn new(length: u64) -> Self {
        ResourceMetadata {
            length,
            last_modified: None,
            etag: None,
            content_type: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_etag(mut self, etag: EntityTag) -> Self {
        self.etag = Some(etag);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Whether two metadata values describe the same content version
    pub fn same_version(&self, other: &ResourceMetadata) -> bool {
        self.length == other.length
            && self.last_modified == other.last_modified
            && self.etag == other.etag
    }
}

/// A resolved resource: the request path bound to the metadata observed
/// when it was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: String,
    pub metadata: ResourceMetadata,
}

impl Resource {
    pub fn new(path: impl Into<String>, metadata: ResourceMetadata) -> Self {
        Resource {
            path: path.into(),
            metadata,
        }
    }

    pub fn length(&self) -> u64 {
        self.metadata.length
    }
}
