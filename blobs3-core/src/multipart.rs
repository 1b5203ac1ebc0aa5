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

//! Multipart uploads: staged parts assembled into one object.
//!
//! Sessions are in-memory; parts are staged through the content store as
//! individual blobs, so part bytes are never buffered. The session lock is
//! never held across I/O, which lets distinct parts upload in parallel.
//! State machine: `Open -> Completed | Aborted`, both terminal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::TryStreamExt;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StorageError;
use crate::manager::{validate_key, ObjectManager, PutOptions};
use crate::store::{ByteStream, ContentStore, Locator};
use crate::types::ObjectDescriptor;

const MAX_PART_NUMBER: u32 = 10_000;

/// A part staged in the content store.
#[derive(Debug, Clone)]
pub struct StagedPart {
    pub locator: Locator,
    pub size: u64,
    pub checksum: [u8; 32],
}

impl StagedPart {
    /// Quoted hex SHA-256 of this part.
    pub fn etag(&self) -> String {
        format!("\"{}\"", hex::encode(self.checksum))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Completed,
    Aborted,
}

struct UploadSession {
    bucket: String,
    key: String,
    options: PutOptions,
    parts: HashMap<u32, StagedPart>,
    state: SessionState,
    last_activity: Instant,
}

impl UploadSession {
    fn new(bucket: String, key: String, options: PutOptions) -> Self {
        UploadSession {
            bucket,
            key,
            options,
            parts: HashMap::new(),
            state: SessionState::Open,
            last_activity: Instant::now(),
        }
    }
}

/// Coordinates multipart upload sessions.
pub struct MultipartCoordinator {
    store: Arc<dyn ContentStore>,
    manager: Arc<ObjectManager>,
    sessions: RwLock<HashMap<String, UploadSession>>,
}

impl MultipartCoordinator {
    pub fn new(manager: Arc<ObjectManager>) -> Self {
        MultipartCoordinator {
            store: manager.content_store(),
            manager,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session and return its upload ID.
    pub async fn initiate(&self, bucket: &str, key: &str, options: PutOptions) -> Result<String, StorageError> {
        validate_key(key)?;
        self.manager.head_bucket(bucket).await?;

        let upload_id = Uuid::new_v4().simple().to_string();
        self.sessions.write().await.insert(
            upload_id.clone(),
            UploadSession::new(bucket.to_string(), key.to_string(), options),
        );
        info!(bucket, key, upload_id = %upload_id, "initiated multipart upload");
        Ok(upload_id)
    }

    /// Stage one part. Restaging a part number is last-write-wins; the
    /// replaced blob is reclaimed.
    pub async fn stage_part(
        &self,
        upload_id: &str,
        part_number: u32,
        stream: ByteStream,
    ) -> Result<StagedPart, StorageError> {
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(StorageError::InvalidKey {
                reason: format!("part number must be 1-{}", MAX_PART_NUMBER),
            });
        }
        {
            let sessions = self.sessions.read().await;
            let session = sessions.get(upload_id).ok_or_else(|| StorageError::SessionNotFound {
                upload_id: upload_id.to_string(),
            })?;
            if session.state != SessionState::Open {
                return Err(StorageError::SessionClosed {
                    upload_id: upload_id.to_string(),
                });
            }
        }

        // no session lock across the upload
        let outcome = self.store.write(stream).await?;
        let staged = StagedPart {
            locator: outcome.locator,
            size: outcome.size,
            checksum: outcome.checksum,
        };

        let insert_result = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(upload_id) {
                Some(session) if session.state == SessionState::Open => {
                    session.last_activity = Instant::now();
                    Ok(session.parts.insert(part_number, staged.clone()))
                }
                Some(_) => Err(StorageError::Conflict {
                    reason: "session closed while part was uploading".to_string(),
                }),
                None => Err(StorageError::SessionNotFound {
                    upload_id: upload_id.to_string(),
                }),
            }
        };

        match insert_result {
            Ok(replaced) => {
                if let Some(old) = replaced {
                    self.reclaim_part(&old).await;
                }
                Ok(staged)
            }
            Err(e) => {
                // the session went away under us; drop the orphaned blob
                self.reclaim_part(&staged).await;
                Err(e)
            }
        }
    }

    /// Assemble the staged parts, in the given order, into one object.
    ///
    /// The part list must match the staged set exactly. Assembly streams
    /// every part blob through a single content store write, so the
    /// combined checksum is computed in one pass and the result is
    /// installed like any other put.
    pub async fn complete(&self, upload_id: &str, part_numbers: &[u32]) -> Result<ObjectDescriptor, StorageError> {
        let (bucket, key, options, ordered) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.get_mut(upload_id).ok_or_else(|| StorageError::SessionNotFound {
                upload_id: upload_id.to_string(),
            })?;
            match session.state {
                SessionState::Open => {}
                SessionState::Completed => {
                    return Err(StorageError::Conflict {
                        reason: "upload already completed".to_string(),
                    })
                }
                SessionState::Aborted => {
                    return Err(StorageError::SessionClosed {
                        upload_id: upload_id.to_string(),
                    })
                }
            }

            if part_numbers.is_empty() {
                return Err(StorageError::IncompletePartSet {
                    reason: "no parts listed".to_string(),
                });
            }
            let mut seen = HashSet::new();
            for n in part_numbers {
                if !seen.insert(*n) {
                    return Err(StorageError::IncompletePartSet {
                        reason: format!("part {} listed twice", n),
                    });
                }
                if !session.parts.contains_key(n) {
                    return Err(StorageError::IncompletePartSet {
                        reason: format!("part {} was never uploaded", n),
                    });
                }
            }
            for n in session.parts.keys() {
                if !seen.contains(n) {
                    return Err(StorageError::IncompletePartSet {
                        reason: format!("uploaded part {} missing from completion list", n),
                    });
                }
            }

            // reserve the session; rolled back if assembly fails
            session.state = SessionState::Completed;
            session.last_activity = Instant::now();
            let ordered: Vec<Locator> = part_numbers
                .iter()
                .map(|n| session.parts[n].locator.clone())
                .collect();
            (
                session.bucket.clone(),
                session.key.clone(),
                session.options.clone(),
                ordered,
            )
        };

        let assembled = chain_parts(self.store.clone(), ordered);
        match self.manager.put_object(&bucket, &key, assembled, options).await {
            Ok(descriptor) => {
                let parts = {
                    let mut sessions = self.sessions.write().await;
                    sessions
                        .get_mut(upload_id)
                        .map(|s| std::mem::take(&mut s.parts))
                        .unwrap_or_default()
                };
                for part in parts.values() {
                    self.reclaim_part(part).await;
                }
                info!(bucket, key, upload_id, size = descriptor.size, "completed multipart upload");
                Ok(descriptor)
            }
            Err(e) => {
                let mut sessions = self.sessions.write().await;
                if let Some(session) = sessions.get_mut(upload_id) {
                    session.state = SessionState::Open;
                }
                Err(e)
            }
        }
    }

    /// Abort a session and reclaim its staged parts. Aborting an already
    /// aborted session is a no-op.
    pub async fn abort(&self, upload_id: &str) -> Result<(), StorageError> {
        let parts = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.get_mut(upload_id).ok_or_else(|| StorageError::SessionNotFound {
                upload_id: upload_id.to_string(),
            })?;
            match session.state {
                SessionState::Aborted => return Ok(()),
                SessionState::Completed => {
                    return Err(StorageError::Conflict {
                        reason: "upload already completed".to_string(),
                    })
                }
                SessionState::Open => {
                    session.state = SessionState::Aborted;
                    session.last_activity = Instant::now();
                    std::mem::take(&mut session.parts)
                }
            }
        };
        for part in parts.values() {
            self.reclaim_part(part).await;
        }
        info!(upload_id, "aborted multipart upload");
        Ok(())
    }

    /// Abort open sessions idle longer than `ttl` and drop terminal
    /// sessions past their retention. Returns how many were aborted.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.state == SessionState::Open && now.duration_since(s.last_activity) > ttl)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut aborted = 0;
        for upload_id in &expired {
            match self.abort(upload_id).await {
                Ok(()) => {
                    info!(upload_id = %upload_id, "swept expired multipart upload");
                    aborted += 1;
                }
                Err(e) => warn!(upload_id = %upload_id, error = %e, "failed to sweep upload"),
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| {
            s.state == SessionState::Open || now.duration_since(s.last_activity) <= ttl
        });
        aborted
    }

    /// Number of parts currently staged for a session.
    pub async fn part_count(&self, upload_id: &str) -> Result<usize, StorageError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(upload_id)
            .map(|s| s.parts.len())
            .ok_or_else(|| StorageError::SessionNotFound {
                upload_id: upload_id.to_string(),
            })
    }

    async fn reclaim_part(&self, part: &StagedPart) {
        if let Err(e) = self.store.delete(&part.locator).await {
            warn!(locator = %part.locator, error = %e, "failed to reclaim part blob");
        }
    }
}

/// Lazily read the part blobs in order as one continuous stream.
fn chain_parts(store: Arc<dyn ContentStore>, locators: Vec<Locator>) -> ByteStream {
    let stream = futures::stream::iter(locators.into_iter().map(Ok::<_, StorageError>))
        .and_then(move |locator| {
            let store = store.clone();
            async move { store.read(&locator, None).await }
        })
        .try_flatten();
    Box::pin(stream)
}
