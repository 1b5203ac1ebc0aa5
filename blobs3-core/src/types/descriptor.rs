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

//! Object and bucket metadata records persisted in the index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::{Locator, WriteOutcome};

/// Metadata for a single stored object version.
///
/// The descriptor is the unit the metadata index stores and the API layer
/// renders. It never contains object bytes; `locator` points at them in the
/// content store. A delete marker carries no locator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectDescriptor {
    /// Content store locator, `None` for delete markers.
    pub locator: Option<Locator>,
    /// Object size in bytes.
    pub size: u64,
    /// SHA-256 of the content.
    pub checksum: [u8; 32],
    /// Quoted hex SHA-256 served as the HTTP ETag.
    pub etag: String,
    /// MIME content type.
    pub content_type: String,
    /// User-defined metadata (`x-amz-meta-*`).
    pub metadata: HashMap<String, String>,
    /// Creation timestamp (nanoseconds since epoch).
    pub created_at: u64,
    /// Last modification timestamp (nanoseconds since epoch).
    pub modified_at: u64,
    /// Version ID when the bucket's store runs versioned, else `None`.
    pub version_id: Option<String>,
    /// True when this version is a delete marker.
    pub is_delete_marker: bool,
}

impl ObjectDescriptor {
    /// Build a descriptor for freshly written content.
    pub fn from_write(outcome: &WriteOutcome, content_type: String, metadata: HashMap<String, String>) -> Self {
        let now = now_nanos();
        ObjectDescriptor {
            locator: Some(outcome.locator.clone()),
            size: outcome.size,
            checksum: outcome.checksum,
            etag: format!("\"{}\"", hex::encode(outcome.checksum)),
            content_type,
            metadata,
            created_at: now,
            modified_at: now,
            version_id: None,
            is_delete_marker: false,
        }
    }

    /// Build a delete marker for a versioned delete.
    pub fn delete_marker(version_id: String) -> Self {
        let now = now_nanos();
        ObjectDescriptor {
            locator: None,
            size: 0,
            checksum: [0u8; 32],
            etag: String::new(),
            content_type: String::new(),
            metadata: HashMap::new(),
            created_at: now,
            modified_at: now,
            version_id: Some(version_id),
            is_delete_marker: true,
        }
    }

    /// Unquoted hex checksum.
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }
}

/// Bucket record persisted in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketRecord {
    /// Bucket name (unique, immutable).
    pub name: String,
    /// Creation timestamp (nanoseconds since epoch).
    pub created_at: u64,
}

impl BucketRecord {
    pub fn new(name: String) -> Self {
        BucketRecord {
            name,
            created_at: now_nanos(),
        }
    }
}

/// Current time as nanoseconds since the Unix epoch.
pub fn now_nanos() -> u64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64
}
