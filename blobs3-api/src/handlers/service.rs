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

//! Liveness and version endpoints.

/// `GET /ping` - liveness probe.
pub async fn ping() -> &'static str {
    "OK"
}

/// `GET /version` - running server version.
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
