//! Byte-range access to files, following HTTP range semantics (RFC 7233).
//!
//! A request is served in three steps:
//!
//! 1. [`RangeFile::open`] the resource to learn its total size.
//! 2. [`resolve_range`] the optional `Range` header against that size.
//! 3. [`RangeFile::stream`] exactly the resolved bytes, framed by the
//!    [`ResponseFrame`] of the resolved range.
//!
//! Only single ranges of the form `bytes=<start>-[<end>]` are supported.
//! Invalid intervals are rejected, never clamped.

use crate::{Error, Result};
use bytes::Bytes;
use futures::Stream;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Prefix of the only range unit this module understands.
const BYTES_UNIT: &str = "bytes=";

/// A validated, inclusive byte interval `[start, end]` of a resource.
///
/// Invariant: `start <= end < total_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    start: u64,
    end: u64,
    total_size: u64,
}

impl RangeRequest {
    /// # Errors
    ///
    /// Returns [`Error::RangeNotSatisfiable`] unless
    /// `start <= end < total_size`.
    pub fn new(start: u64, end: u64, total_size: u64) -> Result<Self> {
        if start >= total_size || end >= total_size || start > end {
            return Err(Error::RangeNotSatisfiable { total_size });
        }

        Ok(Self {
            start,
            end,
            total_size,
        })
    }

    pub const fn start(&self) -> u64 {
        self.start
    }

    pub const fn end(&self) -> u64 {
        self.end
    }

    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of bytes in the interval.
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Outcome of resolving an optional `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedRange {
    /// No header: the whole resource.
    Full { total_size: u64 },
    /// A satisfiable sub-range.
    Partial(RangeRequest),
}

impl ResolvedRange {
    /// Offset of the first byte to serve.
    pub const fn offset(&self) -> u64 {
        match self {
            Self::Full { .. } => 0,
            Self::Partial(range) => range.start(),
        }
    }

    /// Number of bytes to serve.
    pub const fn len(&self) -> u64 {
        match self {
            Self::Full { total_size } => *total_size,
            Self::Partial(range) => range.len(),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status line and headers of the response carrying this range.
    pub fn frame(&self) -> ResponseFrame {
        match self {
            Self::Full { total_size } => ResponseFrame {
                status: 200,
                content_length: *total_size,
                content_range: None,
                accept_ranges: false,
            },
            Self::Partial(range) => ResponseFrame {
                status: 206,
                content_length: range.len(),
                content_range: Some(format!(
                    "bytes {}-{}/{}",
                    range.start(),
                    range.end(),
                    range.total_size()
                )),
                accept_ranges: true,
            },
        }
    }
}

/// Transport-agnostic framing of a file response.
///
/// `Content-Type` is not part of the frame; it is a per-resource constant
/// supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// `200` for a full body, `206` for partial content.
    pub status: u16,
    /// Value of `Content-Length`.
    pub content_length: u64,
    /// Value of `Content-Range`, partial responses only.
    pub content_range: Option<String>,
    /// Whether to send `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
}

/// `Content-Range` value accompanying a `416 Range Not Satisfiable`.
pub fn unsatisfied_range(total_size: u64) -> String {
    format!("bytes */{total_size}")
}

/// Resolves an optional `Range` header against a resource of `total_size`
/// bytes.
///
/// `<end>` defaults to the last byte when omitted; `<start>` is mandatory.
///
/// # Errors
///
/// Returns [`Error::RangeNotSatisfiable`] when the header cannot be parsed
/// or the interval does not fit the resource.
pub fn resolve_range(header: Option<&str>, total_size: u64) -> Result<ResolvedRange> {
    let Some(header) = header else {
        return Ok(ResolvedRange::Full { total_size });
    };

    let (start, end) = parse_byte_range(header).ok_or(Error::RangeNotSatisfiable { total_size })?;
    let end = end.unwrap_or_else(|| total_size.saturating_sub(1));

    RangeRequest::new(start, end, total_size).map(ResolvedRange::Partial)
}

fn parse_byte_range(header: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = header.trim().strip_prefix(BYTES_UNIT)?.split_once('-')?;

    let start = parse_position(start)?;
    let end = match end.trim() {
        "" => None,
        end => Some(parse_position(end)?),
    };

    Some((start, end))
}

fn parse_position(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// A read-only file opened for range serving.
///
/// Concurrent requests each open their own handle; nothing is shared.
#[derive(Debug)]
pub struct RangeFile {
    file: File,
    path: PathBuf,
    total_size: u64,
}

impl RangeFile {
    /// Opens `path` and reads its size.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the file does not exist.
    /// - [`Error::Io`] for any other I/O failure.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                resource: path.display().to_string(),
            },
            _ => Error::Io(e),
        })?;
        let total_size = file.metadata().await?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            total_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Turns the file into a single-pass stream of exactly `range.len()`
    /// bytes starting at `range.offset()`.
    ///
    /// At most `chunk_bytes` bytes of the file are buffered at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if seeking to the start of the range fails.
    pub async fn stream(
        mut self,
        range: ResolvedRange,
        chunk_bytes: usize,
    ) -> Result<impl Stream<Item = io::Result<Bytes>> + Send + 'static> {
        self.file.seek(SeekFrom::Start(range.offset())).await?;
        let reader = self.file.take(range.len());

        Ok(ReaderStream::with_capacity(reader, chunk_bytes.max(1)))
    }
}
