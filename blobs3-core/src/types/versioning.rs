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

//! Per-key version chains.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new unique version ID.
pub fn generate_version_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One entry in a key's version chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionEntry {
    /// Version ID.
    pub version_id: String,
    /// True when the version is a delete marker.
    pub is_delete_marker: bool,
}

/// Ordered version history for one object key, newest first.
///
/// `seq` is a monotonic install counter: every installed version gets a
/// distinct sequence number, so concurrent writers can never collapse into
/// one version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionChain {
    /// Versions, newest first.
    pub versions: Vec<VersionEntry>,
    /// Monotonic install counter.
    pub seq: u64,
}

impl VersionChain {
    /// Record a newly installed version as current.
    pub fn push(&mut self, version_id: String, is_delete_marker: bool) {
        self.versions.insert(
            0,
            VersionEntry {
                version_id,
                is_delete_marker,
            },
        );
        self.seq += 1;
    }

    /// The current (newest) entry, if any.
    pub fn current(&self) -> Option<&VersionEntry> {
        self.versions.first()
    }

    /// Drop a version by ID. Returns true when it was present.
    pub fn remove(&mut self, version_id: &str) -> bool {
        let before = self.versions.len();
        self.versions.retain(|v| v.version_id != version_id);
        self.versions.len() != before
    }

    pub fn contains(&self, version_id: &str) -> bool {
        self.versions.iter().any(|v| v.version_id == version_id)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }
}
