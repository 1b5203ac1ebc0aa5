// Copyright 2026 Blobs3 Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Content store: opaque blob storage addressed by locator.
//!
//! The content store knows nothing about buckets, keys, or versions. It
//! stores immutable byte sequences and hands back a [`Locator`] the
//! metadata index maps object versions to. Two implementations:
//! [`FsContentStore`] for durable filesystem blobs and
//! [`MemoryContentStore`] for tests and ephemeral deployments.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

mod fs;
mod memory;

pub use fs::FsContentStore;
pub use memory::MemoryContentStore;

/// A chunked byte stream, the unit of object I/O.
///
/// Producers yield chunks lazily; nothing in the engine buffers a whole
/// object in memory on the filesystem path.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send + 'static>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn stream_from(data: impl Into<Bytes>) -> ByteStream {
    Box::pin(futures::stream::iter([Ok(data.into())]))
}

/// Opaque handle to stored content.
///
/// Locators are unique per write (never reused), so the metadata index can
/// reference-count them for copy-on-write without aliasing surprises.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    /// Mint a fresh locator.
    pub fn generate() -> Self {
        Locator(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// One past the last byte offset (exclusive).
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Validate against a total size: `0 <= start < end <= size`.
    pub fn validate(&self, size: u64) -> Result<(), StorageError> {
        if self.is_empty() || self.start >= size || self.end > size {
            return Err(StorageError::RangeNotSatisfiable {
                start: self.start,
                end: self.end,
                size,
            });
        }
        Ok(())
    }
}

/// Result of a completed content store write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Locator of the committed blob.
    pub locator: Locator,
    /// Bytes written.
    pub size: u64,
    /// SHA-256 computed while streaming.
    pub checksum: [u8; 32],
}

impl WriteOutcome {
    /// Hex form of the checksum.
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }
}

/// Opaque blob storage.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Stream content in, returning its locator, size, and SHA-256.
    ///
    /// The write is atomic: either the full content is durably stored
    /// under the returned locator, or (on error or cancellation) nothing
    /// remains.
    async fn write(&self, stream: ByteStream) -> Result<WriteOutcome, StorageError>;

    /// Stream content out, optionally restricted to a half-open range.
    async fn read(&self, locator: &Locator, range: Option<ByteRange>) -> Result<ByteStream, StorageError>;

    /// Remove content. Idempotent: unknown locators are a no-op.
    async fn delete(&self, locator: &Locator) -> Result<(), StorageError>;
}

/// Collect a stream into one buffer. Test and small-payload helper.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Vec<u8>, StorageError> {
    use futures::StreamExt;
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_validate() {
        assert!(ByteRange::new(0, 5).validate(5).is_ok());
        assert!(ByteRange::new(1, 4).validate(5).is_ok());
        assert!(ByteRange::new(5, 6).validate(5).is_err());
        assert!(ByteRange::new(0, 6).validate(5).is_err());
        assert!(ByteRange::new(3, 3).validate(5).is_err());
        assert!(ByteRange::new(0, 1).validate(0).is_err());
    }

    #[test]
    fn test_byte_range_len() {
        assert_eq!(ByteRange::new(1, 4).len(), 3);
        assert_eq!(ByteRange::new(4, 4).len(), 0);
    }

    #[tokio::test]
    async fn test_stream_from_round_trip() {
        let data = collect_stream(stream_from("hello")).await.unwrap();
        assert_eq!(data, b"hello");
    }
}
