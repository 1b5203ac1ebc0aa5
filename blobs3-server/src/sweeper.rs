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

//! Background task that expires idle multipart upload sessions.

use std::sync::Arc;
use std::time::Duration;

use blobs3_core::MultipartCoordinator;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Periodically aborts multipart sessions that have been idle longer
/// than the configured TTL, releasing their staged part blobs.
pub struct MultipartSweeper {
    multipart: Arc<MultipartCoordinator>,
    interval: Duration,
    ttl: Duration,
}

impl MultipartSweeper {
    pub fn new(multipart: Arc<MultipartCoordinator>, interval: Duration, ttl: Duration) -> Self {
        Self {
            multipart,
            interval,
            ttl,
        }
    }

    /// Spawns the sweep loop on the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            ttl_secs = self.ttl.as_secs(),
            "Multipart sweeper started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let expired = self.multipart.sweep_expired(self.ttl).await;
            if expired > 0 {
                info!(expired, "Expired idle multipart sessions");
            } else {
                debug!("Multipart sweep found no expired sessions");
            }
        }
    }
}
