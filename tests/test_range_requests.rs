//! Range request scenarios
//!
//! Every scenario runs against the five mounts a deployment can use: the
//! generic wrapper around a fixed-content handler, a direct file resource,
//! a cached file resource, and both resource variants in blocking mode. All
//! of them must answer byte-identically.

use bytes::Bytes;
use http::header::{
    HeaderName, CONTENT_LENGTH, CONTENT_RANGE, ETAG, IF_RANGE, LAST_MODIFIED, RANGE,
};
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::BodyExt;
use range_serve::{
    handler_fn, BlockingHandler, BufferCache, ByteRangeHandler, CacheLimits, CachingProvider,
    FileSystemProvider, Handler, PathRouter, RangeBody, ResourceHandler, ResourceProvider,
};
use std::sync::Arc;
use tempfile::TempDir;

const CONTENT: &[u8] = b"0123456789";

const MOUNTS: [&str; 5] = [
    "/path",
    "/resource/range.txt",
    "/cachedresource/range.txt",
    "/resource-blocking/range.txt",
    "/cachedresource-blocking/range.txt",
];

struct Fixture {
    _dir: TempDir,
    router: PathRouter,
    cache: Arc<BufferCache>,
}

async fn generic_content(_request: Request<Bytes>) -> range_serve::Result<Response<RangeBody>> {
    Ok(Response::builder()
        .header(ETAG, "\"someetag\"")
        .header(LAST_MODIFIED, "Thu, 01 Jan 1970 00:00:10 GMT")
        .body(RangeBody::from(Bytes::from_static(CONTENT)))?)
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("range.txt"), CONTENT).unwrap();

    let files = Arc::new(FileSystemProvider::new(dir.path()));
    let cache = Arc::new(BufferCache::new(CacheLimits::default()));
    let cached: Arc<dyn ResourceProvider> =
        Arc::new(CachingProvider::new(files.clone(), Arc::clone(&cache)));

    let router = PathRouter::new()
        .add_prefix_path("/path", ByteRangeHandler::new(handler_fn(generic_content)))
        .add_prefix_path("/resource", ResourceHandler::new(files.clone()))
        .add_prefix_path("/cachedresource", ResourceHandler::new(cached.clone()))
        .add_prefix_path(
            "/resource-blocking",
            BlockingHandler::new(ResourceHandler::new(files)),
        )
        .add_prefix_path(
            "/cachedresource-blocking",
            BlockingHandler::new(ResourceHandler::new(cached)),
        );

    Fixture {
        _dir: dir,
        router,
        cache,
    }
}

struct Answer {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Answer {
    fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

type Headers<'a> = [(HeaderName, &'a str)];

async fn get(router: &PathRouter, path: &str, headers: &Headers<'_>) -> Answer {
    let mut builder = Request::get(path);
    for (name, value) in headers {
        builder = builder.header(name, *value);
    }
    let response = router.handle(builder.body(Bytes::new()).unwrap()).await.unwrap();
    let (parts, body) = response.into_parts();
    Answer {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}

async fn assert_partial(router: &PathRouter, range: &str, body: &str, content_range: &str) {
    for mount in MOUNTS {
        let answer = get(router, mount, &[(RANGE, range)]).await;
        assert_eq!(answer.status, StatusCode::PARTIAL_CONTENT, "{} {}", mount, range);
        assert_eq!(answer.body, Bytes::from(body.to_string()), "{} {}", mount, range);
        assert_eq!(answer.header(CONTENT_RANGE), Some(content_range), "{} {}", mount, range);
        assert_eq!(
            answer.header(CONTENT_LENGTH),
            Some(body.len().to_string().as_str()),
            "{} {}",
            mount,
            range
        );
    }
}

async fn assert_unsatisfiable(router: &PathRouter, range: &str) {
    for mount in MOUNTS {
        let answer = get(router, mount, &[(RANGE, range)]).await;
        assert_eq!(answer.status, StatusCode::RANGE_NOT_SATISFIABLE, "{} {}", mount, range);
        assert_eq!(answer.header(CONTENT_RANGE), Some("bytes */10"), "{} {}", mount, range);
        assert!(answer.body.is_empty(), "{} {}", mount, range);
    }
}

async fn assert_full(router: &PathRouter, headers: &Headers<'_>) {
    for mount in MOUNTS {
        let answer = get(router, mount, headers).await;
        assert_eq!(answer.status, StatusCode::OK, "{} {:?}", mount, headers);
        assert_eq!(answer.body, Bytes::from_static(CONTENT), "{} {:?}", mount, headers);
        assert!(answer.header(CONTENT_RANGE).is_none(), "{} {:?}", mount, headers);
        assert_eq!(answer.header(CONTENT_LENGTH), Some("10"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_range_serves_full_body() {
    let fixture = fixture();
    assert_full(&fixture.router, &[]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_ranges() {
    let fixture = fixture();
    let router = &fixture.router;
    assert_partial(router, "bytes=2-3", "23", "bytes 2-3/10").await;
    assert_partial(router, "bytes=0-0", "0", "bytes 0-0/10").await;
    assert_partial(router, "bytes=3-9", "3456789", "bytes 3-9/10").await;
    assert_partial(router, "bytes=3-1000", "3456789", "bytes 3-9/10").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_ranges() {
    let fixture = fixture();
    let router = &fixture.router;
    assert_partial(router, "bytes=1-", "123456789", "bytes 1-9/10").await;
    assert_partial(router, "bytes=0-", "0123456789", "bytes 0-9/10").await;
    assert_partial(router, "bytes=9-", "9", "bytes 9-9/10").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_suffix_ranges() {
    let fixture = fixture();
    let router = &fixture.router;
    assert_partial(router, "bytes=-1", "9", "bytes 9-9/10").await;
    assert_partial(router, "bytes=-3", "789", "bytes 7-9/10").await;
    assert_partial(router, "bytes=-20", "0123456789", "bytes 0-9/10").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsatisfiable_ranges() {
    let fixture = fixture();
    let router = &fixture.router;
    assert_unsatisfiable(router, "bytes=2-1").await;
    assert_unsatisfiable(router, "bytes=99-100").await;
    assert_unsatisfiable(router, "bytes=10-").await;
    assert_unsatisfiable(router, "bytes=-0").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_ranges_are_ignored() {
    let fixture = fixture();
    for range in ["bytes=abc", "items=0-1", "bytes=0-1,3-4", "bytes=-", "0-1"] {
        assert_full(&fixture.router, &[(RANGE, range)]).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_if_range_dates() {
    let fixture = fixture();
    let router = &fixture.router;

    for mount in MOUNTS {
        let answer = get(
            router,
            mount,
            &[(RANGE, "bytes=2-3"), (IF_RANGE, "Fri, 01 Jan 2100 00:00:00 GMT")],
        )
        .await;
        assert_eq!(answer.status, StatusCode::PARTIAL_CONTENT, "{}", mount);
        assert_eq!(answer.body, Bytes::from_static(b"23"), "{}", mount);
        assert_eq!(answer.header(CONTENT_RANGE), Some("bytes 2-3/10"), "{}", mount);
    }

    assert_full(
        router,
        &[(RANGE, "bytes=2-3"), (IF_RANGE, "Thu, 01 Jan 1970 00:00:00 GMT")],
    )
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_if_range_matching_etag() {
    let fixture = fixture();
    let router = &fixture.router;

    for mount in MOUNTS {
        let plain = get(router, mount, &[]).await;
        let etag = plain.header(ETAG).expect("every mount has an entity tag").to_string();

        let answer = get(router, mount, &[(RANGE, "bytes=2-3"), (IF_RANGE, etag.as_str())]).await;
        assert_eq!(answer.status, StatusCode::PARTIAL_CONTENT, "{}", mount);
        assert_eq!(answer.body, Bytes::from_static(b"23"), "{}", mount);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_if_range_other_etag() {
    let fixture = fixture();
    assert_full(
        &fixture.router,
        &[(RANGE, "bytes=2-3"), (IF_RANGE, "\"otheretag\"")],
    )
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_if_range_beats_unsatisfiable() {
    let fixture = fixture();
    assert_full(
        &fixture.router,
        &[(RANGE, "bytes=99-100"), (IF_RANGE, "\"otheretag\"")],
    )
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_validators_pass_through() {
    let fixture = fixture();
    let answer = get(&fixture.router, "/path", &[(RANGE, "bytes=0-1")]).await;
    assert_eq!(answer.header(ETAG), Some("\"someetag\""));
    assert_eq!(answer.header(LAST_MODIFIED), Some("Thu, 01 Jan 1970 00:00:10 GMT"));

    let answer = get(&fixture.router, "/resource/range.txt", &[(RANGE, "bytes=0-1")]).await;
    assert!(answer.header(ETAG).is_some());
    assert!(answer.header(LAST_MODIFIED).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cached_path_matches_direct_path_on_repeat() {
    let fixture = fixture();
    let router = &fixture.router;

    for range in ["bytes=2-3", "bytes=-1", "bytes=3-1000", "bytes=0-"] {
        let direct = get(router, "/resource/range.txt", &[(RANGE, range)]).await;
        for _ in 0..3 {
            let cached = get(router, "/cachedresource/range.txt", &[(RANGE, range)]).await;
            assert_eq!(cached.status, direct.status, "{}", range);
            assert_eq!(cached.body, direct.body, "{}", range);
            assert_eq!(cached.header(CONTENT_RANGE), direct.header(CONTENT_RANGE), "{}", range);
        }
    }

    let stats = fixture.cache.stats();
    assert_eq!(stats.total_entries, 1);
    assert!(stats.hits > 0);
}
