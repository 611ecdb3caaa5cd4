//! # Host Bridge Traits
//!
//! Capability traits the cache core depends on but does not implement itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Streaming HTTP GET for cache fills and passthrough
//! - [`MediaResolver`](resolver::MediaResolver) - (artist, title) → direct audio URL
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to an external pipeline
//!
//! Desktop implementations live in `bridge-desktop`. With the `test-support`
//! feature, [`fakes`] provides in-memory versions of each trait.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their native errors and keep messages actionable.

pub mod error;
pub mod http;
pub mod resolver;
pub mod time;

#[cfg(feature = "test-support")]
pub mod fakes;

pub use error::BridgeError;

pub use http::{ByteStream, HttpClient, HttpRequest, HttpStreamResponse};
pub use resolver::{MediaResolver, ResolvedMedia};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
