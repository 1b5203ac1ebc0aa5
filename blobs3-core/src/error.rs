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

//! Error types for the storage engine.

use thiserror::Error;

/// Errors that can occur in the storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// Bucket name that was not found.
        bucket: String,
    },

    /// Bucket already exists and cannot be created again.
    #[error("Bucket already exists: {bucket}")]
    BucketAlreadyExists {
        /// Bucket name that already exists.
        bucket: String,
    },

    /// Bucket still contains objects and cannot be deleted.
    #[error("Bucket not empty: {bucket}")]
    BucketNotEmpty {
        /// Bucket name that is not empty.
        bucket: String,
    },

    /// Object, version chain, or locator not found.
    #[error("Not found: {key}")]
    NotFound {
        /// Object key (or locator id) that was not found.
        key: String,
    },

    /// Specific object version not found.
    #[error("Version not found: {key} (version: {version_id})")]
    VersionNotFound {
        /// Object key.
        key: String,
        /// Version ID that was not found.
        version_id: String,
    },

    /// Object key failed validation.
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected.
        reason: String,
    },

    /// Caller-supplied checksum disagrees with the computed one.
    #[error("Checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Checksum the caller claimed (hex).
        expected: String,
        /// Checksum computed while streaming (hex).
        computed: String,
    },

    /// Requested byte range lies outside the object.
    #[error("Range not satisfiable: [{start}, {end}) of {size} bytes")]
    RangeNotSatisfiable {
        /// Range start (inclusive).
        start: u64,
        /// Range end (exclusive).
        end: u64,
        /// Total object size.
        size: u64,
    },

    /// IO error from the storage backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Multipart upload session does not exist.
    #[error("Multipart session not found: {upload_id}")]
    SessionNotFound {
        /// Upload ID that was not found.
        upload_id: String,
    },

    /// Multipart upload session is completed or aborted.
    #[error("Multipart session closed: {upload_id}")]
    SessionClosed {
        /// Upload ID of the closed session.
        upload_id: String,
    },

    /// Completion request does not match the staged part set.
    #[error("Incomplete part set: {reason}")]
    IncompletePartSet {
        /// Which part (or mismatch) caused the failure.
        reason: String,
    },

    /// Concurrent state change won the race.
    #[error("Conflict: {reason}")]
    Conflict {
        /// What raced with the operation.
        reason: String,
    },
}

impl StorageError {
    /// True for errors worth a bounded retry (transient backend failures).
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}
