//! # Range-Serving Responder
//!
//! Serves complete cache entries with HTTP byte-range semantics.
//!
//! Only single ranges in the `bytes` unit are honored. Anything that does not
//! parse is treated as if no `Range` header had been sent, so a client always
//! gets playable bytes back. A start at or past the end of the file is the one
//! caller-visible failure.

use crate::error::{PlaybackError, Result};
use core_library::CacheEntry;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tracing::{debug, instrument};

pub const STATUS_OK: u16 = 200;
pub const STATUS_PARTIAL_CONTENT: u16 = 206;
pub const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

/// A parsed `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No header, or one we could not parse.
    Full,
    /// `bytes=<start>-`
    From { start: u64 },
    /// `bytes=<start>-<end>`, end inclusive
    Bounded { start: u64, end: u64 },
    /// `bytes=-<len>`: the last `len` bytes
    Suffix { len: u64 },
}

/// Parse an optional `Range` header value.
///
/// Never fails: multi-range lists, other units, non-numeric bounds and
/// `end < start` all yield [`RangeRequest::Full`].
pub fn parse_range(header: Option<&str>) -> RangeRequest {
    header.and_then(parse_bytes_range).unwrap_or(RangeRequest::Full)
}

fn parse_bytes_range(header: &str) -> Option<RangeRequest> {
    let (unit, range_set) = header.trim().split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") || range_set.contains(',') {
        return None;
    }

    let (start, end) = range_set.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, true) => None,
        (true, false) => Some(RangeRequest::Suffix {
            len: parse_bound(end)?,
        }),
        (false, true) => Some(RangeRequest::From {
            start: parse_bound(start)?,
        }),
        (false, false) => {
            let start = parse_bound(start)?;
            let end = parse_bound(end)?;
            (end >= start).then_some(RangeRequest::Bounded { start, end })
        }
    }
}

fn parse_bound(value: &str) -> Option<u64> {
    // `u64::from_str` accepts a leading '+', which is not valid here.
    if value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

/// Inclusive byte span inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfiable_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

impl RangeRequest {
    /// Resolve against a file of `size` bytes.
    ///
    /// `Ok(None)` means serve the whole file with 200.
    pub fn resolve(&self, size: u64) -> Result<Option<ByteRange>> {
        let not_satisfiable = |start| PlaybackError::RangeNotSatisfiable { start, size };

        match *self {
            RangeRequest::Full => Ok(None),
            RangeRequest::From { start } => {
                if start >= size {
                    return Err(not_satisfiable(start));
                }
                Ok(Some(ByteRange {
                    start,
                    end: size - 1,
                }))
            }
            RangeRequest::Bounded { start, end } => {
                if start >= size {
                    return Err(not_satisfiable(start));
                }
                Ok(Some(ByteRange {
                    start,
                    end: end.min(size - 1),
                }))
            }
            RangeRequest::Suffix { len } => {
                if len == 0 || size == 0 {
                    return Err(not_satisfiable(size));
                }
                Ok(Some(ByteRange {
                    start: size.saturating_sub(len),
                    end: size - 1,
                }))
            }
        }
    }
}

/// An opened, positioned file ready to be streamed.
#[derive(Debug)]
pub struct RangedBody {
    /// 200 or 206
    pub status: u16,
    pub content_type: String,
    /// Real size of the file on disk
    pub total_size: u64,
    /// Present for 206 responses
    pub range: Option<ByteRange>,
    /// Number of bytes `reader` yields
    pub content_length: u64,
    pub reader: Take<File>,
}

impl RangedBody {
    pub fn is_partial(&self) -> bool {
        self.range.is_some()
    }

    pub fn content_range(&self) -> Option<String> {
        self.range.map(|range| range.content_range(self.total_size))
    }
}

/// Opens cache entries for full or partial reads.
#[derive(Debug, Clone)]
pub struct RangeResponder {
    content_type: String,
}

impl RangeResponder {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Open `entry` and position it for `range`.
    ///
    /// The size is taken from the file itself, not the index.
    #[instrument(skip(self, entry), fields(track_key = %entry.track_key))]
    pub async fn respond(&self, entry: &CacheEntry, range: RangeRequest) -> Result<RangedBody> {
        let mut file = match File::open(&entry.file_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlaybackError::NotCached(entry.track_key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let total_size = file.metadata().await?.len();

        let resolved = range.resolve(total_size)?;
        let (status, start, content_length) = match resolved {
            Some(span) => (STATUS_PARTIAL_CONTENT, span.start, span.len()),
            None => (STATUS_OK, 0, total_size),
        };

        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }

        debug!(status, start, content_length, total_size, "Serving cached file");
        Ok(RangedBody {
            status,
            content_type: self.content_type.clone(),
            total_size,
            range: resolved,
            content_length,
            reader: file.take(content_length),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(parse_range(None), RangeRequest::Full);
        assert_eq!(
            parse_range(Some("bytes=100-199")),
            RangeRequest::Bounded { start: 100, end: 199 }
        );
        assert_eq!(parse_range(Some("bytes=900-")), RangeRequest::From { start: 900 });
        assert_eq!(parse_range(Some("bytes=-500")), RangeRequest::Suffix { len: 500 });
        assert_eq!(
            parse_range(Some(" bytes = 5 - 10 ")),
            RangeRequest::Bounded { start: 5, end: 10 }
        );
    }

    #[test]
    fn test_malformed_ranges_are_full() {
        for header in [
            "",
            "bytes",
            "bytes=",
            "bytes=-",
            "bytes=abc-def",
            "bytes=10-5",
            "bytes=0-1,5-6",
            "items=0-10",
            "bytes=+5-10",
        ] {
            assert_eq!(parse_range(Some(header)), RangeRequest::Full, "{header}");
        }
    }

    #[test]
    fn test_resolve_clamps_end() {
        let range = RangeRequest::Bounded { start: 900, end: 5000 };
        assert_eq!(
            range.resolve(1000).unwrap(),
            Some(ByteRange { start: 900, end: 999 })
        );
    }

    #[test]
    fn test_resolve_suffix() {
        let range = RangeRequest::Suffix { len: 100 };
        assert_eq!(
            range.resolve(1000).unwrap(),
            Some(ByteRange { start: 900, end: 999 })
        );

        let longer_than_file = RangeRequest::Suffix { len: 5000 };
        assert_eq!(
            longer_than_file.resolve(1000).unwrap(),
            Some(ByteRange { start: 0, end: 999 })
        );

        assert!(RangeRequest::Suffix { len: 0 }.resolve(1000).is_err());
    }

    #[test]
    fn test_resolve_start_past_end() {
        let err = RangeRequest::From { start: 1000 }.resolve(1000).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::RangeNotSatisfiable { start: 1000, size: 1000 }
        ));
        assert!(RangeRequest::Bounded { start: 0, end: 10 }.resolve(0).is_err());
        assert_eq!(RangeRequest::Full.resolve(0).unwrap(), None);
    }

    #[test]
    fn test_content_range_strings() {
        let span = ByteRange { start: 100, end: 199 };
        assert_eq!(span.len(), 100);
        assert_eq!(span.content_range(1000), "bytes 100-199/1000");
        assert_eq!(unsatisfiable_content_range(1000), "bytes */1000");
    }
}
