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

//! Object manager: orchestrates the content store and metadata index.
//!
//! Writes go content-first: the blob is streamed and committed, then the
//! descriptor is installed in one index transaction. If the install fails
//! the fresh blob is deleted again (compensating delete), so a failed put
//! leaves no orphan. Reads go metadata-first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::StorageError;
use crate::index::{DeleteOutcome, Listing, MetadataIndex};
use crate::store::{ByteRange, ByteStream, ContentStore, Locator};
use crate::types::{descriptor::now_nanos, BucketRecord, ObjectDescriptor};

const MAX_KEY_BYTES: usize = 1024;
const READ_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(10);

/// Options for a put (or multipart initiate).
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// MIME content type.
    pub content_type: String,
    /// User-defined metadata.
    pub metadata: HashMap<String, String>,
    /// Caller-claimed SHA-256; the put fails on mismatch.
    pub expected_checksum: Option<[u8; 32]>,
}

impl Default for PutOptions {
    fn default() -> Self {
        PutOptions {
            content_type: "application/octet-stream".to_string(),
            metadata: HashMap::new(),
            expected_checksum: None,
        }
    }
}

/// Reject empty keys, keys over 1024 bytes, and control characters.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            reason: "key is empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StorageError::InvalidKey {
            reason: format!("key exceeds {} bytes", MAX_KEY_BYTES),
        });
    }
    if key.chars().any(|c| c.is_control()) {
        return Err(StorageError::InvalidKey {
            reason: "key contains control characters".to_string(),
        });
    }
    Ok(())
}

/// Bucket names: 3-63 chars of lowercase alphanumerics, `-`, `.`, with
/// alphanumeric first and last characters.
pub fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(StorageError::InvalidKey {
            reason: "bucket name must be 3-63 characters".to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(StorageError::InvalidKey {
            reason: "bucket name may contain lowercase letters, digits, '-', '.'".to_string(),
        });
    }
    let first = name.chars().next().unwrap_or(' ');
    let last = name.chars().last().unwrap_or(' ');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(StorageError::InvalidKey {
            reason: "bucket name must start and end with a letter or digit".to_string(),
        });
    }
    Ok(())
}

/// Orchestrates buckets and objects atop a content store and the index.
pub struct ObjectManager {
    store: Arc<dyn ContentStore>,
    index: Arc<MetadataIndex>,
    versioned: bool,
}

impl ObjectManager {
    pub fn new(store: Arc<dyn ContentStore>, index: Arc<MetadataIndex>, versioned: bool) -> Self {
        ObjectManager {
            store,
            index,
            versioned,
        }
    }

    /// True when the store runs with versioning.
    pub fn versioned(&self) -> bool {
        self.versioned
    }

    /// The underlying content store (the multipart coordinator stages
    /// parts through the same store).
    pub fn content_store(&self) -> Arc<dyn ContentStore> {
        self.store.clone()
    }

    pub async fn create_bucket(&self, name: &str) -> Result<BucketRecord, StorageError> {
        validate_bucket_name(name)?;
        let record = self.index.create_bucket(name).await?;
        info!(bucket = name, "created bucket");
        Ok(record)
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), StorageError> {
        self.index.delete_bucket(name).await?;
        info!(bucket = name, "deleted bucket");
        Ok(())
    }

    pub async fn head_bucket(&self, name: &str) -> Result<BucketRecord, StorageError> {
        self.index.get_bucket(name).await
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketRecord>, StorageError> {
        self.index.list_buckets().await
    }

    /// Stream an object in and install it as the new current version.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        stream: ByteStream,
        opts: PutOptions,
    ) -> Result<ObjectDescriptor, StorageError> {
        validate_key(key)?;
        // fail before streaming; the install transaction re-checks
        self.index.get_bucket(bucket).await?;

        let outcome = self.store.write(stream).await?;

        if let Some(expected) = opts.expected_checksum {
            if expected != outcome.checksum {
                let computed = outcome.checksum_hex();
                self.reclaim(std::slice::from_ref(&outcome.locator)).await;
                return Err(StorageError::ChecksumMismatch {
                    expected: hex::encode(expected),
                    computed,
                });
            }
        }

        let descriptor = ObjectDescriptor::from_write(&outcome, opts.content_type, opts.metadata);
        match self
            .index
            .put_descriptor(bucket, key, descriptor, self.versioned)
            .await
        {
            Ok(install) => {
                self.reclaim(&install.reclaimable).await;
                info!(bucket, key, size = install.descriptor.size, "put object");
                Ok(install.descriptor)
            }
            Err(e) => {
                // compensating delete of the blob that was never installed
                self.reclaim(std::slice::from_ref(&outcome.locator)).await;
                Err(e)
            }
        }
    }

    /// Fetch descriptor and content stream, optionally a byte range of a
    /// specific version. Transient open failures are retried with
    /// exponential backoff. If the blob vanishes between the descriptor
    /// lookup and the open (a concurrent overwrite reclaimed the locator),
    /// the descriptor is re-fetched once and the read retried.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
        version_id: Option<&str>,
    ) -> Result<(ObjectDescriptor, ByteStream), StorageError> {
        let mut descriptor = self.head_object(bucket, key, version_id).await?;
        let mut refreshed = false;
        let mut attempt = 0;
        let stream = loop {
            let locator = descriptor.locator.clone().ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
            if let Some(r) = range {
                r.validate(descriptor.size)?;
            }
            match self.store.read(&locator, range).await {
                Ok(stream) => break stream,
                Err(StorageError::NotFound { .. }) if !refreshed => {
                    warn!(bucket, key, locator = %locator, "blob gone before open, re-reading descriptor");
                    refreshed = true;
                    descriptor = self.head_object(bucket, key, version_id).await?;
                }
                Err(e) if e.is_transient() && attempt + 1 < READ_RETRIES => {
                    warn!(bucket, key, attempt, error = %e, "retrying content read");
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        Ok((descriptor, stream))
    }

    /// Descriptor without content. Delete markers read as `NotFound`.
    pub async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectDescriptor, StorageError> {
        let descriptor = self.index.get_descriptor(bucket, key, version_id).await?;
        if descriptor.is_delete_marker {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(descriptor)
    }

    /// Delete an object: marker install under versioning, removal plus
    /// blob reclamation otherwise. An explicit version is always
    /// physically removed.
    pub async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteOutcome, StorageError> {
        let outcome = self.index.remove(bucket, key, version_id, self.versioned).await?;
        self.reclaim(&outcome.reclaimable).await;
        info!(
            bucket,
            key,
            delete_marker = outcome.delete_marker,
            "deleted object"
        );
        Ok(outcome)
    }

    /// Copy without moving bytes: the destination descriptor shares the
    /// source locator, whose refcount the install bumps. Copy-on-write
    /// falls out of locator immutability; overwriting either side installs
    /// a new locator and only drops one reference.
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        src_version: Option<&str>,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectDescriptor, StorageError> {
        validate_key(dst_key)?;
        let src = self.head_object(src_bucket, src_key, src_version).await?;

        let now = now_nanos();
        let descriptor = ObjectDescriptor {
            locator: src.locator.clone(),
            size: src.size,
            checksum: src.checksum,
            etag: src.etag.clone(),
            content_type: src.content_type.clone(),
            metadata: src.metadata.clone(),
            created_at: now,
            modified_at: now,
            version_id: None,
            is_delete_marker: false,
        };

        let install = self
            .index
            .put_descriptor(dst_bucket, dst_key, descriptor, self.versioned)
            .await?;
        self.reclaim(&install.reclaimable).await;
        info!(
            src = format!("{}/{}", src_bucket, src_key),
            dst = format!("{}/{}", dst_bucket, dst_key),
            "copied object"
        );
        Ok(install.descriptor)
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<Listing, StorageError> {
        self.index.list(bucket, prefix, delimiter, token, max_keys).await
    }

    /// All versions of a key, newest first.
    pub async fn list_object_versions(&self, bucket: &str, key: &str) -> Result<Vec<ObjectDescriptor>, StorageError> {
        self.index.list_versions(bucket, key).await
    }

    /// Delete blobs whose last reference went away. Failures are logged,
    /// not propagated: the metadata commit already happened and a leaked
    /// blob is preferable to a failed request.
    pub async fn reclaim(&self, locators: &[Locator]) {
        for locator in locators {
            if let Err(e) = self.store.delete(locator).await {
                warn!(locator = %locator, error = %e, "failed to reclaim blob");
            }
        }
    }
}
