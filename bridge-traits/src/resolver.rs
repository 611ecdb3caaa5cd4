//! Media Resolver Abstraction
//!
//! Turns an (artist, title) pair into a directly fetchable audio URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A resolved, directly fetchable audio source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    /// Direct stream URL. Usually signed and short-lived.
    pub url: String,
    /// Container/extension reported by the resolver, if known.
    pub format: Option<String>,
}

impl ResolvedMedia {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Media resolver trait
///
/// Resolution is expensive and failure-prone (network, geo-blocking, no
/// match). Callers treat any error as "track unavailable" for that request.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, artist: &str, title: &str) -> Result<ResolvedMedia>;
}
