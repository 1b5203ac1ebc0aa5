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

//! Application initialization and runtime.
//!
//! This module handles:
//! - Storage engine initialization
//! - HTTP server setup and routing
//! - Graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::ServiceExt;
use blobs3_api::{create_router, AppState};
use blobs3_core::{
    ContentStore, FsContentStore, MemoryContentStore, MetadataIndex, MultipartCoordinator,
    ObjectManager,
};
use tokio::net::TcpListener;
use tower_http::normalize_path::NormalizePath;
use tracing::info;

use crate::config::{Config, StorageBackend};
use crate::sweeper::MultipartSweeper;

/// Main application.
pub struct App {
    config: Config,
    manager: Arc<ObjectManager>,
    multipart: Arc<MultipartCoordinator>,
}

impl App {
    /// Creates a new application instance.
    ///
    /// Opens the metadata index and content store under the configured
    /// data directory.
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing blobs3 application...");

        tokio::fs::create_dir_all(&config.storage.data_dir)
            .await
            .context("Failed to create data directory")?;

        let index = MetadataIndex::open(&config.storage.data_dir.join("index.redb"))
            .context("Failed to open metadata index")?;

        let store: Arc<dyn ContentStore> = match config.storage.backend {
            StorageBackend::Fs => Arc::new(
                FsContentStore::open(config.storage.data_dir.join("blobs"))
                    .context("Failed to open blob store")?,
            ),
            StorageBackend::Memory => Arc::new(MemoryContentStore::new()),
        };

        let manager = Arc::new(ObjectManager::new(
            store,
            Arc::new(index),
            config.storage.versioning,
        ));
        let multipart = Arc::new(MultipartCoordinator::new(manager.clone()));

        info!("Storage engine initialized successfully");

        Ok(Self {
            config,
            manager,
            multipart,
        })
    }

    /// Runs the HTTP server until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        info!("blobs3 server starting...");
        info!("Data directory: {:?}", self.config.storage.data_dir);
        info!(
            "Versioning: {}",
            if self.manager.versioned() { "enabled" } else { "disabled" }
        );
        info!(
            "Max upload size: {} bytes ({:.2} GB)",
            self.config.server.max_upload_size,
            self.config.server.max_upload_size as f64 / (1024.0 * 1024.0 * 1024.0)
        );

        let addr: SocketAddr = self
            .config
            .server
            .bind
            .parse()
            .context("Invalid bind address")?;

        let state = AppState::new(self.manager.clone(), self.multipart.clone())
            .with_max_upload_size(self.config.server.max_upload_size)
            .with_cors_origins(self.config.server.cors_allowed_origins.clone());

        let sweeper = MultipartSweeper::new(
            self.multipart.clone(),
            Duration::from_secs(self.config.multipart.sweep_interval_secs),
            Duration::from_secs(self.config.multipart.ttl_secs),
        );
        let sweeper_handle = sweeper.spawn();

        let router = create_router(state);

        info!("Listening on http://{}", addr);
        let result = run_http_server(addr, router).await;

        sweeper_handle.abort();
        info!("Multipart sweeper stopped");

        result
    }
}

/// Runs the HTTP server.
async fn run_http_server(addr: SocketAddr, router: axum::Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;

    // Trim trailing slashes so clients that request "/bucket/" still
    // hit the bucket routes.
    let app = NormalizePath::trim_trailing_slash(router);

    axum::serve(
        listener,
        ServiceExt::<axum::http::Request<axum::body::Body>>::into_make_service(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handles graceful shutdown signals.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
