//! range-serve
//!
//! An HTTP byte-range layer (RFC 7233): single-range `Range` requests with
//! `If-Range` validation, served from files, from an in-memory buffer cache
//! in front of them, or by slicing the complete output of any other handler.
//!
//! # Overview
//!
//! For every GET the layer decides between three outcomes:
//!
//! - **Full**: no usable `Range` header, a multi-range request, or an
//!   `If-Range` validator that no longer matches. 200 with the whole body.
//! - **Partial**: a satisfiable single range. 206 with
//!   `Content-Range: bytes start-end/length` and exactly those bytes.
//! - **Unsatisfiable**: a syntactically valid range that selects nothing.
//!   416 with `Content-Range: bytes */length` and an empty body.
//!
//! Malformed `Range` headers are ignored, never rejected.
//!
//! # Architecture
//!
//! - [`RequestAnalyzer`]: evaluates `Range` and `If-Range` against
//!   [`ResourceMetadata`] into a [`RangeDecision`]
//! - [`ResourceProvider`]: resolves paths and opens byte windows;
//!   [`FileSystemProvider`] reads from disk, [`CachingProvider`] decorates any
//!   provider with a shared [`BufferCache`]
//! - [`ResponseAssembler`]: writes a decision as status, headers and a
//!   [`RangeBody`]
//! - [`ResourceHandler`]: serves a provider, including HEAD and conditional
//!   requests
//! - [`ByteRangeHandler`]: wraps another [`Handler`] and slices its buffered
//!   output
//! - [`BlockingHandler`]: runs a handler on a blocking worker thread
//! - [`RangeServer`] and [`PathRouter`]: hyper accept loop and prefix routing
//! - [`RangeMetrics`] and [`MetricsEndpoint`]: counters and their exposition
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "127.0.0.1:8080"
//! root_dir: "./public"
//! execution_mode: non_blocking     # or: blocking
//! send_accept_ranges: true
//! generate_etags: true
//! cache:
//!   enabled: true
//!   max_entries: 1000
//!   max_bytes: 67108864            # 64MB
//!   max_entry_size: 1048576        # 1MB
//! metrics_endpoint:
//!   enabled: true
//!   address: "127.0.0.1:9090"
//! ```
//!
//! See [`RangeConfig`] for every option.
//!
//! # Example
//!
//! ```rust,no_run
//! use range_serve::{file_handler, PathRouter, RangeConfig, RangeMetrics, RangeServer};
//! use std::sync::Arc;
//!
//! # async fn run() -> range_serve::Result<()> {
//! let config = RangeConfig::from_file("range_serve.yaml")?;
//! let (files, _cache) = file_handler(&config);
//! let router = PathRouter::new().add_prefix_path("/", files);
//!
//! let metrics = Arc::new(RangeMetrics::new());
//! let server = RangeServer::bind(config.listen_addr()?, Arc::new(router), metrics).await?;
//! server.run().await
//! # }
//! ```

pub mod blocking;
pub mod body;
pub mod byte_range_handler;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod provider;
pub mod request_analyzer;
pub mod resource_handler;
pub mod response_assembler;
pub mod server;
pub mod validators;

// Re-export commonly used types
pub use blocking::BlockingHandler;
pub use body::RangeBody;
pub use byte_range_handler::ByteRangeHandler;
pub use cache::{BufferCache, CacheLimits, CacheStats};
pub use config::{CacheConfig, ExecutionMode, MetricsEndpointConfig, RangeConfig};
pub use error::{RangeError, Result};
pub use handler::{handler_fn, FnHandler, Handler, MountedPath};
pub use metrics::{MetricsSnapshot, RangeMetrics};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{ByteRange, RangeDecision, RangeSpec, Resource, ResourceMetadata};
pub use provider::{ByteWindow, CachingProvider, FileSystemProvider, ResourceProvider};
pub use request_analyzer::RequestAnalyzer;
pub use resource_handler::ResourceHandler;
pub use response_assembler::{BodySource, ResponseAssembler};
pub use server::{error_response, file_handler, PathRouter, RangeServer};
pub use validators::{EntityTag, IfRange, Precondition};
