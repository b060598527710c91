//! Entity tags, `If-Range` and the conditional request headers
//!
//! A resource carries two validators: an optional strong entity tag and an
//! optional last-modified timestamp. `If-Range` compares against either one
//! and only ever decides whether a `Range` header is honoured. The other
//! preconditions (`If-Match`, `If-None-Match`, `If-Modified-Since`,
//! `If-Unmodified-Since`) are evaluated by the resource handler before any
//! range logic runs.

use crate::models::ResourceMetadata;
use http::header::{IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE};
use http::{HeaderMap, Method};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// An HTTP entity tag, e.g. `"abc"` or `W/"abc"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityTag {
    weak: bool,
    tag: String,
}

impl EntityTag {
    /// Create a strong entity tag from its opaque value (without quotes)
    pub fn strong(tag: impl Into<String>) -> Self {
        EntityTag {
            weak: false,
            tag: tag.into(),
        }
    }

    /// Create a weak entity tag from its opaque value (without quotes)
    pub fn weak(tag: impl Into<String>) -> Self {
        EntityTag {
            weak: true,
            tag: tag.into(),
        }
    }

    /// Parse a header value such as `"v1"` or `W/"v1"`
    ///
    /// Returns `None` when the value is not a quoted entity tag.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (weak, rest) = match value.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, value),
        };

        let tag = rest.strip_prefix('"')?.strip_suffix('"')?;
        if tag.contains('"') {
            return None;
        }

        Some(EntityTag {
            weak,
            tag: tag.to_string(),
        })
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// The opaque value without quotes or weakness prefix
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Strong comparison: both tags strong and identical
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }

    /// Weak comparison: opaque values identical, weakness ignored
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.tag == other.tag
    }

    /// Looks like an entity tag rather than an HTTP date
    pub fn looks_like(value: &str) -> bool {
        let value = value.trim_start();
        value.starts_with('"') || value.starts_with("W/")
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.tag)
        } else {
            write!(f, "\"{}\"", self.tag)
        }
    }
}

/// Truncate a timestamp to whole seconds, the resolution of an HTTP date
pub fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()),
        Err(_) => time,
    }
}

/// Format a timestamp as an IMF-fixdate header value
pub fn format_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Parsed value of an `If-Range` request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfRange {
    EntityTag(EntityTag),
    Date(SystemTime),
    /// Neither a quoted entity tag nor a valid HTTP date
    Invalid,
}

impl IfRange {
    pub fn parse(value: &str) -> Self {
        if EntityTag::looks_like(value) {
            return match EntityTag::parse(value) {
                Some(tag) => IfRange::EntityTag(tag),
                None => IfRange::Invalid,
            };
        }

        match httpdate::parse_http_date(value.trim()) {
            Ok(date) => IfRange::Date(date),
            Err(_) => IfRange::Invalid,
        }
    }

    /// Whether the resource is unchanged with respect to this validator
    ///
    /// A validator that cannot be compared (the resource lacks the matching
    /// validator, or the header was unparseable) counts as changed.
    pub fn is_satisfied_by(&self, metadata: &ResourceMetadata) -> bool {
        match self {
            IfRange::EntityTag(requested) => match &metadata.etag {
                Some(current) => requested.strong_eq(current),
                None => false,
            },
            IfRange::Date(date) => match metadata.last_modified {
                Some(modified) => truncate_to_secs(modified) <= *date,
                None => false,
            },
            IfRange::Invalid => false,
        }
    }
}

/// Outcome of evaluating the conditional request headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Serve the request normally
    Proceed,
    /// 304 Not Modified
    NotModified,
    /// 412 Precondition Failed
    Failed,
}

/// Evaluate `If-Match`, `If-Unmodified-Since`, `If-None-Match` and
/// `If-Modified-Since` in the order required by RFC 7232 section 6
pub fn evaluate_preconditions(
    method: &Method,
    headers: &HeaderMap,
    metadata: &ResourceMetadata,
) -> Precondition {
    let safe = method == Method::GET || method == Method::HEAD;

    if let Some(if_match) = header_str(headers, IF_MATCH) {
        if !etag_list_matches(if_match, metadata.etag.as_ref(), true) {
            debug!("If-Match failed: header={}", if_match);
            return Precondition::Failed;
        }
    } else if let Some(since) = header_date(headers, IF_UNMODIFIED_SINCE) {
        if let Some(modified) = metadata.last_modified {
            if truncate_to_secs(modified) > since {
                debug!("If-Unmodified-Since failed");
                return Precondition::Failed;
            }
        }
    }

    if let Some(if_none_match) = header_str(headers, IF_NONE_MATCH) {
        if etag_list_matches(if_none_match, metadata.etag.as_ref(), false) {
            return if safe {
                Precondition::NotModified
            } else {
                Precondition::Failed
            };
        }
    } else if safe {
        if let (Some(since), Some(modified)) =
            (header_date(headers, IF_MODIFIED_SINCE), metadata.last_modified)
        {
            if truncate_to_secs(modified) <= since {
                return Precondition::NotModified;
            }
        }
    }

    Precondition::Proceed
}

fn header_str(headers: &HeaderMap, name: http::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_date(headers: &HeaderMap, name: http::header::HeaderName) -> Option<SystemTime> {
    header_str(headers, name).and_then(|v| httpdate::parse_http_date(v.trim()).ok())
}

/// Match a comma separated entity tag list (or `*`) against the current tag
fn etag_list_matches(list: &str, current: Option<&EntityTag>, strong: bool) -> bool {
    if list.trim() == "*" {
        return true;
    }

    let Some(current) = current else {
        return false;
    };

    list.split(',')
        .filter_map(EntityTag::parse)
        .any(|candidate| {
            if strong {
                candidate.strong_eq(current)
            } else {
                candidate.weak_eq(current)
            }
        })
}
