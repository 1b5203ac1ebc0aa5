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

//! In-memory content store for tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::store::{ByteRange, ByteStream, ContentStore, Locator, WriteOutcome};

/// Content store holding every blob in a map. Loses data on restart.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<Locator, Bytes>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs. Reclamation tests count these.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn write(&self, mut stream: ByteStream) -> Result<WriteOutcome, StorageError> {
        let mut hasher = Sha256::new();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            buf.extend_from_slice(&chunk);
        }
        let locator = Locator::generate();
        let size = buf.len() as u64;
        let checksum: [u8; 32] = hasher.finalize().into();
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(locator.clone(), Bytes::from(buf));
        Ok(WriteOutcome { locator, size, checksum })
    }

    async fn read(&self, locator: &Locator, range: Option<ByteRange>) -> Result<ByteStream, StorageError> {
        let blob = self
            .blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(locator)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: locator.to_string(),
            })?;
        let data = match range {
            Some(r) => {
                r.validate(blob.len() as u64)?;
                blob.slice(r.start as usize..r.end as usize)
            }
            None => blob,
        };
        Ok(Box::pin(futures::stream::iter([Ok(data)])))
    }

    async fn delete(&self, locator: &Locator) -> Result<(), StorageError> {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(locator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{collect_stream, stream_from};

    #[tokio::test]
    async fn test_memory_round_trip_and_range() {
        let store = MemoryContentStore::new();
        let outcome = store.write(stream_from("hello")).await.unwrap();
        assert_eq!(outcome.size, 5);

        let all = collect_stream(store.read(&outcome.locator, None).await.unwrap())
            .await
            .unwrap();
        assert_eq!(all, b"hello");

        let part = collect_stream(
            store
                .read(&outcome.locator, Some(ByteRange::new(1, 4)))
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(part, b"ell");
    }

    #[tokio::test]
    async fn test_memory_delete_idempotent() {
        let store = MemoryContentStore::new();
        let outcome = store.write(stream_from("x")).await.unwrap();
        store.delete(&outcome.locator).await.unwrap();
        store.delete(&outcome.locator).await.unwrap();
        assert_eq!(store.blob_count(), 0);
    }
}
