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

//! blobs3 storage engine.
//!
//! Layers, bottom up:
//! - [`store`]: opaque content blobs addressed by locator
//! - [`index`]: buckets, descriptors, version chains, locator refcounts
//! - [`manager`]: object and bucket operations tying the two together
//! - [`multipart`]: staged-part upload sessions

pub mod error;
pub mod index;
pub mod manager;
pub mod multipart;
pub mod store;
pub mod types;

pub use error::StorageError;
pub use index::{DeleteOutcome, ListEntry, Listing, MetadataIndex};
pub use manager::{ObjectManager, PutOptions};
pub use multipart::{MultipartCoordinator, StagedPart};
pub use store::{
    collect_stream, stream_from, ByteRange, ByteStream, ContentStore, FsContentStore, Locator,
    MemoryContentStore, WriteOutcome,
};
pub use types::{BucketRecord, ObjectDescriptor};
