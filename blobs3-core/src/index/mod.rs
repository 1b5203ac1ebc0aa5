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

//! Metadata index: buckets, object descriptors, version chains, and
//! locator reference counts in a single redb database.
//!
//! All mutations run inside one redb write transaction, so a reader never
//! observes a half-installed version and concurrent writers serialize on
//! commit order. Reclamation of content blobs happens outside the
//! transaction: mutating calls report the locators whose reference count
//! reached zero and the caller deletes them after commit.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use redb::{Database, ReadableTable, TableDefinition};
use tokio::sync::Mutex;
use tokio::task;

use crate::error::StorageError;
use crate::store::Locator;
use crate::types::{generate_version_id, BucketRecord, ObjectDescriptor, VersionChain};

const BUCKETS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("buckets");
/// Current version per object key, keyed by `bucket/key`.
const OBJECTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");
/// Every version, keyed by `bucket/key\0version_id`.
const VERSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");
/// Version chain per object key, keyed by `bucket/key`.
const CHAINS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chains");
/// Reference count per locator.
const LOCATOR_REFS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("locator_refs");

/// Result of installing a descriptor.
#[derive(Debug)]
pub struct InstallOutcome {
    /// The descriptor as installed (version ID assigned when versioned).
    pub descriptor: ObjectDescriptor,
    /// Locators whose reference count dropped to zero.
    pub reclaimable: Vec<Locator>,
}

/// Result of removing an object or version.
#[derive(Debug)]
pub struct DeleteOutcome {
    /// Version affected: the removed version, or the new delete marker.
    pub version_id: Option<String>,
    /// True when the delete installed a marker instead of removing data.
    pub delete_marker: bool,
    /// Locators whose reference count dropped to zero.
    pub reclaimable: Vec<Locator>,
}

/// One listed object.
#[derive(Debug, Clone)]
pub struct ListEntry {
    /// Object key (relative to the bucket).
    pub key: String,
    pub descriptor: ObjectDescriptor,
}

/// One page of a listing.
#[derive(Debug, Default)]
pub struct Listing {
    pub entries: Vec<ListEntry>,
    pub common_prefixes: Vec<String>,
    /// Opaque token resuming after the last scanned key.
    pub next_token: Option<String>,
    pub is_truncated: bool,
}

/// Metadata index over redb.
///
/// Single database connection behind a mutex; blocking redb calls run on
/// the blocking thread pool.
pub struct MetadataIndex {
    db: Arc<Mutex<Database>>,
}

fn object_key(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

// NUL is rejected in object keys, so it can separate key from version.
fn version_key(bucket: &str, key: &str, version_id: &str) -> String {
    format!("{}/{}\u{0}{}", bucket, key, version_id)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

// URL-safe alphabet: tokens travel in query strings
fn encode_token(last_key: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(last_key)
}

fn decode_token(token: &str) -> Result<String, StorageError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| StorageError::InvalidKey {
            reason: "invalid continuation token".to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| StorageError::InvalidKey {
        reason: "invalid continuation token".to_string(),
    })
}

fn inc_ref(table: &mut redb::Table<&str, u64>, locator: &Locator) -> Result<(), StorageError> {
    let count = table
        .get(locator.as_str())
        .map_err(db_err)?
        .map(|g| g.value())
        .unwrap_or(0);
    table.insert(locator.as_str(), count + 1).map_err(db_err)?;
    Ok(())
}

/// Decrement a locator's refcount; returns it when it reached zero.
fn dec_ref(table: &mut redb::Table<&str, u64>, locator: &Locator) -> Result<Option<Locator>, StorageError> {
    let count = table
        .get(locator.as_str())
        .map_err(db_err)?
        .map(|g| g.value())
        .unwrap_or(0);
    if count <= 1 {
        table.remove(locator.as_str()).map_err(db_err)?;
        Ok(Some(locator.clone()))
    } else {
        table.insert(locator.as_str(), count - 1).map_err(db_err)?;
        Ok(None)
    }
}

fn require_bucket(table: &impl ReadableTable<&'static str, &'static [u8]>, bucket: &str) -> Result<(), StorageError> {
    if table.get(bucket).map_err(db_err)?.is_none() {
        return Err(StorageError::BucketNotFound {
            bucket: bucket.to_string(),
        });
    }
    Ok(())
}

impl MetadataIndex {
    /// Create or open the index database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }
        let db = Database::create(db_path).map_err(db_err)?;

        // redb requires a write transaction to create tables
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            write_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
            write_txn.open_table(OBJECTS_TABLE).map_err(db_err)?;
            write_txn.open_table(VERSIONS_TABLE).map_err(db_err)?;
            write_txn.open_table(CHAINS_TABLE).map_err(db_err)?;
            write_txn.open_table(LOCATOR_REFS_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub async fn create_bucket(&self, name: &str) -> Result<BucketRecord, StorageError> {
        let db = self.db.clone();
        let name = name.to_string();

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let write_txn = db_guard.begin_write().map_err(db_err)?;
            let record = BucketRecord::new(name.clone());
            {
                let mut buckets = write_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
                if buckets.get(name.as_str()).map_err(db_err)?.is_some() {
                    return Err(StorageError::BucketAlreadyExists { bucket: name });
                }
                let bytes = encode(&record)?;
                buckets.insert(name.as_str(), bytes.as_slice()).map_err(db_err)?;
            }
            write_txn.commit().map_err(db_err)?;
            Ok(record)
        })
        .await
        .map_err(db_err)?
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), StorageError> {
        let db = self.db.clone();
        let name = name.to_string();

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let write_txn = db_guard.begin_write().map_err(db_err)?;
            {
                let mut buckets = write_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
                if buckets.get(name.as_str()).map_err(db_err)?.is_none() {
                    return Err(StorageError::BucketNotFound { bucket: name });
                }
                let objects = write_txn.open_table(OBJECTS_TABLE).map_err(db_err)?;
                let scan_prefix = format!("{}/", name);
                let mut iter = objects
                    .range::<&str>((Bound::Included(scan_prefix.as_str()), Bound::Unbounded))
                    .map_err(db_err)?;
                if let Some(first) = iter.next() {
                    let (key_guard, _) = first.map_err(db_err)?;
                    if key_guard.value().starts_with(&scan_prefix) {
                        return Err(StorageError::BucketNotEmpty { bucket: name });
                    }
                }
                buckets.remove(name.as_str()).map_err(db_err)?;
            }
            write_txn.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(db_err)?
    }

    pub async fn get_bucket(&self, name: &str) -> Result<BucketRecord, StorageError> {
        let db = self.db.clone();
        let name = name.to_string();

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let read_txn = db_guard.begin_read().map_err(db_err)?;
            let buckets = read_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
            match buckets.get(name.as_str()).map_err(db_err)? {
                Some(guard) => decode(guard.value()),
                None => Err(StorageError::BucketNotFound { bucket: name }),
            }
        })
        .await
        .map_err(db_err)?
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketRecord>, StorageError> {
        let db = self.db.clone();

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let read_txn = db_guard.begin_read().map_err(db_err)?;
            let buckets = read_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
            let mut out = Vec::new();
            for item in buckets.iter().map_err(db_err)? {
                let (_, value_guard) = item.map_err(db_err)?;
                out.push(decode(value_guard.value())?);
            }
            Ok(out)
        })
        .await
        .map_err(db_err)?
    }

    /// Install a descriptor as the new current version of `bucket/key`.
    ///
    /// Versioned: assigns a fresh version ID, appends to the chain, and
    /// keeps the previous current version. Unversioned: replaces in place
    /// and reports the replaced locator for reclamation. The installed
    /// locator's refcount is incremented either way, so a copied locator
    /// simply counts one more reference.
    pub async fn put_descriptor(
        &self,
        bucket: &str,
        key: &str,
        mut descriptor: ObjectDescriptor,
        versioned: bool,
    ) -> Result<InstallOutcome, StorageError> {
        let db = self.db.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let write_txn = db_guard.begin_write().map_err(db_err)?;
            let mut reclaimable = Vec::new();
            {
                let buckets = write_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
                require_bucket(&buckets, &bucket)?;

                let mut objects = write_txn.open_table(OBJECTS_TABLE).map_err(db_err)?;
                let mut refs = write_txn.open_table(LOCATOR_REFS_TABLE).map_err(db_err)?;
                let okey = object_key(&bucket, &key);

                if versioned {
                    let version_id = generate_version_id();
                    descriptor.version_id = Some(version_id.clone());
                    let bytes = encode(&descriptor)?;

                    let mut chains = write_txn.open_table(CHAINS_TABLE).map_err(db_err)?;
                    let mut chain: VersionChain = match chains.get(okey.as_str()).map_err(db_err)? {
                        Some(guard) => decode(guard.value())?,
                        None => VersionChain::default(),
                    };
                    chain.push(version_id.clone(), false);
                    let chain_bytes = encode(&chain)?;
                    chains.insert(okey.as_str(), chain_bytes.as_slice()).map_err(db_err)?;

                    let mut versions = write_txn.open_table(VERSIONS_TABLE).map_err(db_err)?;
                    let vkey = version_key(&bucket, &key, &version_id);
                    versions.insert(vkey.as_str(), bytes.as_slice()).map_err(db_err)?;
                    objects.insert(okey.as_str(), bytes.as_slice()).map_err(db_err)?;
                } else {
                    descriptor.version_id = None;
                    let bytes = encode(&descriptor)?;
                    let previous = objects
                        .insert(okey.as_str(), bytes.as_slice())
                        .map_err(db_err)?
                        .map(|g| g.value().to_vec());
                    if let Some(prev_bytes) = previous {
                        let prev: ObjectDescriptor = decode(&prev_bytes)?;
                        if let Some(loc) = prev.locator {
                            if let Some(freed) = dec_ref(&mut refs, &loc)? {
                                reclaimable.push(freed);
                            }
                        }
                    }
                }

                if let Some(loc) = &descriptor.locator {
                    inc_ref(&mut refs, loc)?;
                }
            }
            write_txn.commit().map_err(db_err)?;
            Ok(InstallOutcome {
                descriptor,
                reclaimable,
            })
        })
        .await
        .map_err(db_err)?
    }

    /// Fetch the current descriptor, or a specific version.
    ///
    /// A current delete marker reads as `NotFound`. An explicit version is
    /// returned as stored, marker or not; callers decide how to surface
    /// marker versions.
    pub async fn get_descriptor(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectDescriptor, StorageError> {
        let db = self.db.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let version_id = version_id.map(|v| v.to_string());

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let read_txn = db_guard.begin_read().map_err(db_err)?;
            let buckets = read_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
            require_bucket(&buckets, &bucket)?;

            match version_id {
                None => {
                    let objects = read_txn.open_table(OBJECTS_TABLE).map_err(db_err)?;
                    let okey = object_key(&bucket, &key);
                    let descriptor: ObjectDescriptor = match objects.get(okey.as_str()).map_err(db_err)? {
                        Some(guard) => decode(guard.value())?,
                        None => return Err(StorageError::NotFound { key }),
                    };
                    if descriptor.is_delete_marker {
                        return Err(StorageError::NotFound { key });
                    }
                    Ok(descriptor)
                }
                Some(version) => {
                    let versions = read_txn.open_table(VERSIONS_TABLE).map_err(db_err)?;
                    let vkey = version_key(&bucket, &key, &version);
                    match versions.get(vkey.as_str()).map_err(db_err)? {
                        Some(guard) => decode(guard.value()),
                        None => Err(StorageError::VersionNotFound {
                            key,
                            version_id: version,
                        }),
                    }
                }
            }
        })
        .await
        .map_err(db_err)?
    }

    /// All versions of a key, newest first.
    pub async fn list_versions(&self, bucket: &str, key: &str) -> Result<Vec<ObjectDescriptor>, StorageError> {
        let db = self.db.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let read_txn = db_guard.begin_read().map_err(db_err)?;
            let buckets = read_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
            require_bucket(&buckets, &bucket)?;

            let chains = read_txn.open_table(CHAINS_TABLE).map_err(db_err)?;
            let okey = object_key(&bucket, &key);
            let chain: VersionChain = match chains.get(okey.as_str()).map_err(db_err)? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StorageError::NotFound { key }),
            };

            let versions = read_txn.open_table(VERSIONS_TABLE).map_err(db_err)?;
            let mut out = Vec::with_capacity(chain.len());
            for entry in &chain.versions {
                let vkey = version_key(&bucket, &key, &entry.version_id);
                if let Some(guard) = versions.get(vkey.as_str()).map_err(db_err)? {
                    out.push(decode(guard.value())?);
                }
            }
            Ok(out)
        })
        .await
        .map_err(db_err)?
    }

    /// Remove an object (or one version of it).
    ///
    /// No explicit version, versioned store: installs a delete marker.
    /// No explicit version, unversioned: removes the descriptor.
    /// Explicit version: removes that version and repairs the chain.
    pub async fn remove(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        versioned: bool,
    ) -> Result<DeleteOutcome, StorageError> {
        let db = self.db.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let version_id = version_id.map(|v| v.to_string());

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let write_txn = db_guard.begin_write().map_err(db_err)?;
            let outcome;
            {
                let buckets = write_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
                require_bucket(&buckets, &bucket)?;

                let mut objects = write_txn.open_table(OBJECTS_TABLE).map_err(db_err)?;
                let mut refs = write_txn.open_table(LOCATOR_REFS_TABLE).map_err(db_err)?;
                let okey = object_key(&bucket, &key);

                match version_id {
                    Some(version) => {
                        let mut versions = write_txn.open_table(VERSIONS_TABLE).map_err(db_err)?;
                        let vkey = version_key(&bucket, &key, &version);
                        let removed = versions
                            .remove(vkey.as_str())
                            .map_err(db_err)?
                            .map(|g| g.value().to_vec());
                        let removed: ObjectDescriptor = match removed {
                            Some(bytes) => decode(&bytes)?,
                            None => {
                                return Err(StorageError::VersionNotFound {
                                    key,
                                    version_id: version,
                                })
                            }
                        };

                        let mut reclaimable = Vec::new();
                        if let Some(loc) = &removed.locator {
                            if let Some(freed) = dec_ref(&mut refs, loc)? {
                                reclaimable.push(freed);
                            }
                        }

                        let mut chains = write_txn.open_table(CHAINS_TABLE).map_err(db_err)?;
                        let mut chain: VersionChain = match chains.get(okey.as_str()).map_err(db_err)? {
                            Some(guard) => decode(guard.value())?,
                            None => VersionChain::default(),
                        };
                        let was_current =
                            chain.current().map(|c| c.version_id == version).unwrap_or(false);
                        chain.remove(&version);

                        if chain.is_empty() {
                            chains.remove(okey.as_str()).map_err(db_err)?;
                            objects.remove(okey.as_str()).map_err(db_err)?;
                        } else {
                            if was_current {
                                // promote the next-newest version to current
                                let next = chain.current().map(|c| c.version_id.clone());
                                if let Some(next_id) = next {
                                    let next_key = version_key(&bucket, &key, &next_id);
                                    if let Some(guard) = versions.get(next_key.as_str()).map_err(db_err)? {
                                        let bytes = guard.value().to_vec();
                                        drop(guard);
                                        objects.insert(okey.as_str(), bytes.as_slice()).map_err(db_err)?;
                                    }
                                }
                            }
                            let chain_bytes = encode(&chain)?;
                            chains.insert(okey.as_str(), chain_bytes.as_slice()).map_err(db_err)?;
                        }

                        outcome = DeleteOutcome {
                            version_id: Some(version),
                            delete_marker: false,
                            reclaimable,
                        };
                    }
                    None if versioned => {
                        let marker_id = generate_version_id();
                        let marker = ObjectDescriptor::delete_marker(marker_id.clone());
                        let bytes = encode(&marker)?;

                        let mut chains = write_txn.open_table(CHAINS_TABLE).map_err(db_err)?;
                        let mut chain: VersionChain = match chains.get(okey.as_str()).map_err(db_err)? {
                            Some(guard) => decode(guard.value())?,
                            None => VersionChain::default(),
                        };
                        chain.push(marker_id.clone(), true);
                        let chain_bytes = encode(&chain)?;
                        chains.insert(okey.as_str(), chain_bytes.as_slice()).map_err(db_err)?;

                        let mut versions = write_txn.open_table(VERSIONS_TABLE).map_err(db_err)?;
                        let vkey = version_key(&bucket, &key, &marker_id);
                        versions.insert(vkey.as_str(), bytes.as_slice()).map_err(db_err)?;
                        objects.insert(okey.as_str(), bytes.as_slice()).map_err(db_err)?;

                        outcome = DeleteOutcome {
                            version_id: Some(marker_id),
                            delete_marker: true,
                            reclaimable: Vec::new(),
                        };
                    }
                    None => {
                        let removed = objects
                            .remove(okey.as_str())
                            .map_err(db_err)?
                            .map(|g| g.value().to_vec());
                        let removed: ObjectDescriptor = match removed {
                            Some(bytes) => decode(&bytes)?,
                            None => return Err(StorageError::NotFound { key }),
                        };
                        let mut reclaimable = Vec::new();
                        if let Some(loc) = &removed.locator {
                            if let Some(freed) = dec_ref(&mut refs, loc)? {
                                reclaimable.push(freed);
                            }
                        }
                        outcome = DeleteOutcome {
                            version_id: None,
                            delete_marker: false,
                            reclaimable,
                        };
                    }
                }
            }
            write_txn.commit().map_err(db_err)?;
            Ok(outcome)
        })
        .await
        .map_err(db_err)?
    }

    /// One page of a lexicographic listing with optional delimiter
    /// grouping. The token resumes strictly after the last scanned key, so
    /// every surviving key appears exactly once across pages.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<Listing, StorageError> {
        let db = self.db.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let delimiter = delimiter.map(|d| d.to_string());
        let start_after = match token {
            Some(t) => Some(decode_token(t)?),
            None => None,
        };

        task::spawn_blocking(move || {
            let db_guard = futures::executor::block_on(db.lock());
            let read_txn = db_guard.begin_read().map_err(db_err)?;
            let buckets = read_txn.open_table(BUCKETS_TABLE).map_err(db_err)?;
            require_bucket(&buckets, &bucket)?;

            let mut listing = Listing::default();
            if max_keys == 0 {
                return Ok(listing);
            }

            let objects = read_txn.open_table(OBJECTS_TABLE).map_err(db_err)?;
            let scan_prefix = format!("{}/{}", bucket, prefix);
            let start = match &start_after {
                Some(last) => format!("{}/{}", bucket, last),
                None => scan_prefix.clone(),
            };
            let lower = if start_after.is_some() {
                Bound::Excluded(start.as_str())
            } else {
                Bound::Included(start.as_str())
            };

            let mut count = 0usize;
            let mut last_scanned = String::new();
            let mut last_group: Option<String> = None;

            for item in objects.range::<&str>((lower, Bound::Unbounded)).map_err(db_err)? {
                let (key_guard, value_guard) = item.map_err(db_err)?;
                let raw = key_guard.value();
                if !raw.starts_with(scan_prefix.as_str()) {
                    break;
                }
                let rel = &raw[bucket.len() + 1..];

                let descriptor: ObjectDescriptor = decode(value_guard.value())?;
                if descriptor.is_delete_marker {
                    last_scanned = rel.to_string();
                    continue;
                }

                let group = delimiter.as_deref().and_then(|d| {
                    rel[prefix.len()..]
                        .find(d)
                        .map(|i| rel[..prefix.len() + i + d.len()].to_string())
                });

                if count == max_keys {
                    // keep draining keys of the group already emitted so the
                    // resume token lands past it
                    if group.is_some() && group == last_group {
                        last_scanned = rel.to_string();
                        continue;
                    }
                    listing.is_truncated = true;
                    break;
                }

                match group {
                    Some(common) => {
                        if last_group.as_deref() != Some(common.as_str()) {
                            listing.common_prefixes.push(common.clone());
                            last_group = Some(common);
                            count += 1;
                        }
                    }
                    None => {
                        last_group = None;
                        listing.entries.push(ListEntry {
                            key: rel.to_string(),
                            descriptor,
                        });
                        count += 1;
                    }
                }
                last_scanned = rel.to_string();
            }

            if listing.is_truncated {
                listing.next_token = Some(encode_token(&last_scanned));
            }
            Ok(listing)
        })
        .await
        .map_err(db_err)?
    }
}
