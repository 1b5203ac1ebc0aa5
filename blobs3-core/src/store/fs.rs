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

//! Filesystem content store: one file per blob under a fan-out directory.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::store::{ByteRange, ByteStream, ContentStore, Locator, WriteOutcome};

const STAGING_DIR: &str = "staging";
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Content store backed by the local filesystem.
///
/// Writes stream into a staging file, fsync, then rename into the blob
/// tree. Reads stream straight off the file. Deletes unlink; POSIX keeps
/// the data readable for streams that already hold the file open.
pub struct FsContentStore {
    blobs_dir: PathBuf,
}

impl FsContentStore {
    /// Open (creating directories as needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let blobs_dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(blobs_dir.join(STAGING_DIR))?;
        debug!(dir = %blobs_dir.display(), "opened filesystem content store");
        Ok(FsContentStore { blobs_dir })
    }

    /// Final path for a locator: two-character fan-out directory.
    fn blob_path(&self, locator: &Locator) -> PathBuf {
        let id = locator.as_str();
        let (shard, rest) = id.split_at(2.min(id.len()));
        self.blobs_dir.join(shard).join(rest)
    }

    fn staging_path(&self, locator: &Locator) -> PathBuf {
        self.blobs_dir.join(STAGING_DIR).join(format!("{}.tmp", locator))
    }
}

/// Removes the staging file unless the write committed. Runs on drop, so a
/// cancelled write future cleans up its partial file.
struct StagedBlob {
    path: PathBuf,
    committed: bool,
}

impl StagedBlob {
    fn new(path: PathBuf) -> Self {
        StagedBlob { path, committed: false }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to remove staged blob");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ContentStore for FsContentStore {
    async fn write(&self, mut stream: ByteStream) -> Result<WriteOutcome, StorageError> {
        let locator = Locator::generate();
        let staging = self.staging_path(&locator);
        let guard = StagedBlob::new(staging.clone());

        let mut file = File::create(&staging).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let final_path = self.blob_path(&locator);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&staging, &final_path).await?;
        guard.commit();

        let checksum: [u8; 32] = hasher.finalize().into();
        debug!(locator = %locator, size, "committed blob");
        Ok(WriteOutcome { locator, size, checksum })
    }

    async fn read(&self, locator: &Locator, range: Option<ByteRange>) -> Result<ByteStream, StorageError> {
        let path = self.blob_path(locator);
        let mut file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: locator.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        let (start, len) = match range {
            Some(r) => {
                r.validate(size)?;
                (r.start, r.len())
            }
            None => (0, size),
        };
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let reader = file.take(len);
        let stream = ReaderStream::with_capacity(reader, READ_CHUNK_SIZE).map_err(StorageError::Io);
        Ok(Box::pin(stream))
    }

    async fn delete(&self, locator: &Locator) -> Result<(), StorageError> {
        let path = self.blob_path(locator);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(locator = %locator, "deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
