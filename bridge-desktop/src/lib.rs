//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest` with streamed bodies
//! - `MediaResolver` shelling out to `yt-dlp`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, YtDlpResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let resolver = YtDlpResolver::new("yt-dlp");
//!     let media = resolver.resolve("Daft Punk", "One More Time").await?;
//!     Ok(())
//! }
//! ```

mod http;
mod resolver;

pub use http::ReqwestHttpClient;
pub use resolver::YtDlpResolver;
