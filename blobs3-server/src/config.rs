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

//! Configuration from `BLOBS3_*` environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default maximum upload size (5GB).
const DEFAULT_MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024 * 1024;
/// Default multipart session TTL (24 hours).
const DEFAULT_MULTIPART_TTL_SECS: u64 = 24 * 60 * 60;
/// Default sweep interval (5 minutes).
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage engine settings.
    pub storage: StorageConfig,
    /// Multipart session expiry settings.
    pub multipart: MultipartConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g. "0.0.0.0:9000"). `BLOBS3_BIND`.
    pub bind: String,
    /// Maximum upload size in bytes. `BLOBS3_MAX_UPLOAD_SIZE`
    /// (e.g. "5GB", "100MB", "1024").
    pub max_upload_size: usize,
    /// CORS allow-list, comma separated. `BLOBS3_CORS_ALLOWED_ORIGINS`;
    /// unset allows any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
}

/// Content store backend. `BLOBS3_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Durable filesystem blobs.
    Fs,
    /// Ephemeral in-memory blobs (metadata stays on disk).
    Memory,
}

/// Storage engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root data directory. `BLOBS3_DATA_DIR`.
    pub data_dir: PathBuf,
    /// Content store backend. `BLOBS3_BACKEND` (`fs` or `memory`).
    pub backend: StorageBackend,
    /// Whether object versioning is enabled. `BLOBS3_VERSIONING`.
    pub versioning: bool,
}

/// Multipart session expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartConfig {
    /// Idle session TTL in seconds. `BLOBS3_MULTIPART_TTL_SECS`.
    pub ttl_secs: u64,
    /// Sweep interval in seconds. `BLOBS3_SWEEP_INTERVAL_SECS`.
    pub sweep_interval_secs: u64,
}

/// Parses a size string like "10GB", "100MB", "1024KB", "5000" into bytes.
///
/// Supported suffixes (case-insensitive): GB/G, MB/M, KB/K, B or none.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim().to_uppercase();
    let (number, multiplier) = if let Some(n) = s.strip_suffix("GB").or_else(|| s.strip_suffix('G')) {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB").or_else(|| s.strip_suffix('M')) {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KB").or_else(|| s.strip_suffix('K')) {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };
    let number: usize = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;
    Ok(number * multiplier)
}

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from the environment, with defaults for local
    /// development.
    pub fn load() -> anyhow::Result<Self> {
        let backend = match std::env::var("BLOBS3_BACKEND").as_deref() {
            Ok("memory") => StorageBackend::Memory,
            Ok("fs") | Err(_) => StorageBackend::Fs,
            Ok(other) => anyhow::bail!("unknown BLOBS3_BACKEND: {}", other),
        };

        let cors_allowed_origins = std::env::var("BLOBS3_CORS_ALLOWED_ORIGINS").ok().map(|v| {
            v.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        });

        Ok(Config {
            server: ServerConfig {
                bind: std::env::var("BLOBS3_BIND").unwrap_or_else(|_| "127.0.0.1:9000".to_string()),
                max_upload_size: std::env::var("BLOBS3_MAX_UPLOAD_SIZE")
                    .ok()
                    .and_then(|s| parse_size(&s).ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE),
                cors_allowed_origins,
            },
            storage: StorageConfig {
                data_dir: std::env::var("BLOBS3_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./blobs3-data")),
                backend,
                versioning: env_bool("BLOBS3_VERSIONING"),
            },
            multipart: MultipartConfig {
                ttl_secs: std::env::var("BLOBS3_MULTIPART_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MULTIPART_TTL_SECS),
                sweep_interval_secs: std::env::var("BLOBS3_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("512B").unwrap(), 512);
    }

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("100mb").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("5gb").unwrap(), 5 * 1024 * 1024 * 1024);
        assert_eq!(parse_size(" 2 MB ").unwrap(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("abc").is_err());
        assert!(parse_size("GB").is_err());
        assert!(parse_size("").is_err());
    }
}
