//! Range request evaluation
//!
//! Combines the `Range` and `If-Range` request headers with a resource's
//! metadata into a [`RangeDecision`]. The `If-Range` gate is checked before
//! the range is resolved: a failed precondition yields the full resource,
//! never a 416.

use crate::models::{RangeDecision, RangeSpec, ResourceMetadata};
use crate::validators::IfRange;
use http::header::{IF_RANGE, RANGE};
use http::HeaderMap;
use tracing::debug;

/// Evaluate raw `Range` / `If-Range` header values against `metadata`
pub fn evaluate(
    range_header: Option<&str>,
    if_range_header: Option<&str>,
    metadata: &ResourceMetadata,
) -> RangeDecision {
    evaluate_with(range_header, if_range_header.map(IfRange::parse), metadata)
}

/// Evaluate a raw `Range` value with an already parsed `If-Range` validator
pub fn evaluate_with(
    range_header: Option<&str>,
    if_range: Option<IfRange>,
    metadata: &ResourceMetadata,
) -> RangeDecision {
    let Some(range_header) = range_header else {
        return RangeDecision::Full;
    };

    let Some(spec) = RangeSpec::parse(range_header) else {
        debug!("Ignoring unsupported Range header: {}", range_header);
        return RangeDecision::Full;
    };

    if let Some(if_range) = if_range {
        if !if_range.is_satisfied_by(metadata) {
            debug!("If-Range precondition failed: if_range={:?}, serving full body", if_range);
            return RangeDecision::Full;
        }
    }

    let decision = spec.resolve(metadata.length);
    debug!(
        "Evaluated range: header={}, length={}, decision={:?}",
        range_header, metadata.length, decision
    );
    decision
}

/// Extracts range headers from a request and evaluates them
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestAnalyzer;

impl RequestAnalyzer {
    pub fn new() -> Self {
        RequestAnalyzer
    }

    /// Evaluate the range headers of a request against a resource
    ///
    /// More than one `Range` header is treated like a malformed one. An
    /// `If-Range` that is repeated or not valid text cannot be compared and
    /// always yields the full body.
    pub fn analyze(&self, headers: &HeaderMap, metadata: &ResourceMetadata) -> RangeDecision {
        let mut ranges = headers.get_all(RANGE).iter();
        let range = match (ranges.next(), ranges.next()) {
            (Some(value), None) => value.to_str().ok(),
            (Some(_), Some(_)) => {
                debug!("Multiple Range headers present, serving full body");
                None
            }
            (None, _) => None,
        };

        let mut validators = headers.get_all(IF_RANGE).iter();
        let if_range = match (validators.next(), validators.next()) {
            (Some(value), None) => Some(
                value
                    .to_str()
                    .map(IfRange::parse)
                    .unwrap_or(IfRange::Invalid),
            ),
            (Some(_), Some(_)) => {
                debug!("Multiple If-Range headers present");
                Some(IfRange::Invalid)
            }
            (None, _) => None,
        };

        evaluate_with(range, if_range, metadata)
    }

    /// Whether the request carries a Range header at all
    pub fn has_range(&self, headers: &HeaderMap) -> bool {
        headers.contains_key(RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ByteRange;
    use crate::validators::{format_http_date, EntityTag};
    use http::HeaderValue;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn metadata() -> ResourceMetadata {
        ResourceMetadata::new(10)
            .with_last_modified(UNIX_EPOCH + Duration::from_secs(10))
            .with_etag(EntityTag::strong("someetag"))
    }

    fn partial(start: u64, end: u64) -> RangeDecision {
        RangeDecision::Partial {
            range: ByteRange::new(start, end).unwrap(),
            total: 10,
        }
    }

    fn create_headers_with_range(range: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_str(range).unwrap());
        headers
    }

    #[test]
    fn test_no_range_header() {
        assert_eq!(evaluate(None, None, &metadata()), RangeDecision::Full);
        assert_eq!(evaluate(None, Some("\"someetag\""), &metadata()), RangeDecision::Full);
    }

    #[test]
    fn test_concrete_windows() {
        let meta = metadata();
        assert_eq!(evaluate(Some("bytes=2-3"), None, &meta), partial(2, 3));
        assert_eq!(evaluate(Some("bytes=-1"), None, &meta), partial(9, 9));
        assert_eq!(evaluate(Some("bytes=3-1000"), None, &meta), partial(3, 9));
        assert_eq!(evaluate(Some("bytes=0-"), None, &meta), partial(0, 9));
        assert_eq!(
            evaluate(Some("bytes=99-100"), None, &meta),
            RangeDecision::Unsatisfiable { total: 10 }
        );
        assert_eq!(
            evaluate(Some("bytes=2-1"), None, &meta),
            RangeDecision::Unsatisfiable { total: 10 }
        );
    }

    #[test]
    fn test_malformed_range_serves_full() {
        let meta = metadata();
        assert_eq!(evaluate(Some("bytes=0-0,2-3"), None, &meta), RangeDecision::Full);
        assert_eq!(evaluate(Some("lines=1-2"), None, &meta), RangeDecision::Full);
        assert_eq!(evaluate(Some("garbage"), None, &meta), RangeDecision::Full);
    }

    #[test]
    fn test_if_range_date() {
        let meta = metadata();
        let future = format_http_date(SystemTime::now() + Duration::from_secs(1));
        assert_eq!(evaluate(Some("bytes=2-3"), Some(&future), &meta), partial(2, 3));

        let epoch = format_http_date(UNIX_EPOCH);
        assert_eq!(evaluate(Some("bytes=2-3"), Some(&epoch), &meta), RangeDecision::Full);
    }

    #[test]
    fn test_if_range_etag() {
        let meta = metadata();
        assert_eq!(
            evaluate(Some("bytes=2-3"), Some("\"someetag\""), &meta),
            partial(2, 3)
        );
        assert_eq!(
            evaluate(Some("bytes=2-3"), Some("\"otheretag\""), &meta),
            RangeDecision::Full
        );
    }

    #[test]
    fn test_failed_if_range_wins_over_unsatisfiable() {
        let meta = metadata();
        assert_eq!(
            evaluate(Some("bytes=99-100"), Some("\"otheretag\""), &meta),
            RangeDecision::Full
        );
    }

    #[test]
    fn test_if_range_without_validator_serves_full() {
        let meta = ResourceMetadata::new(10);
        assert_eq!(
            evaluate(Some("bytes=2-3"), Some("\"someetag\""), &meta),
            RangeDecision::Full
        );
        let date = format_http_date(SystemTime::now());
        assert_eq!(evaluate(Some("bytes=2-3"), Some(&date), &meta), RangeDecision::Full);
    }

    #[test]
    fn test_analyze_headers() {
        let analyzer = RequestAnalyzer::new();
        let headers = create_headers_with_range("bytes=2-3");
        assert!(analyzer.has_range(&headers));
        assert_eq!(analyzer.analyze(&headers, &metadata()), partial(2, 3));

        assert!(!analyzer.has_range(&HeaderMap::new()));
        assert_eq!(analyzer.analyze(&HeaderMap::new(), &metadata()), RangeDecision::Full);
    }

    #[test]
    fn test_analyze_multiple_range_headers() {
        let analyzer = RequestAnalyzer::new();
        let mut headers = create_headers_with_range("bytes=2-3");
        headers.append(RANGE, HeaderValue::from_static("bytes=4-5"));
        assert_eq!(analyzer.analyze(&headers, &metadata()), RangeDecision::Full);
    }

    #[test]
    fn test_analyze_if_range_with_opaque_bytes() {
        let analyzer = RequestAnalyzer::new();
        let mut headers = create_headers_with_range("bytes=2-3");
        headers.insert(IF_RANGE, HeaderValue::from_bytes(b"\"caf\xe9\"").unwrap());
        assert_eq!(analyzer.analyze(&headers, &metadata()), RangeDecision::Full);
    }

    #[test]
    fn test_analyze_multiple_if_range_headers() {
        let analyzer = RequestAnalyzer::new();
        let mut headers = create_headers_with_range("bytes=2-3");
        headers.append(IF_RANGE, HeaderValue::from_static("\"someetag\""));
        assert_eq!(analyzer.analyze(&headers, &metadata()), partial(2, 3));

        headers.append(IF_RANGE, HeaderValue::from_static("\"otheretag\""));
        assert_eq!(analyzer.analyze(&headers, &metadata()), RangeDecision::Full);
    }
}
