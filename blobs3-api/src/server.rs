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

//! Router setup and query-parameter dispatch.
//!
//! S3 overloads one URL per method: `PUT /{bucket}/{key}` is PutObject,
//! CopyObject, or UploadPart depending on headers and query parameters.
//! Each method gets a small router function that dispatches to the real
//! handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderName, HeaderValue},
    response::Response,
    routing::{delete, get, head, post, put},
    Router,
};
use blobs3_core::{MultipartCoordinator, ObjectManager};
use bytes::Bytes;
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::errors::ApiError;
use crate::handlers;

/// Default maximum upload size (5GB).
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024 * 1024;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Object and bucket operations.
    pub manager: Arc<ObjectManager>,
    /// Multipart upload sessions.
    pub multipart: Arc<MultipartCoordinator>,
    /// Maximum request body size in bytes.
    pub max_upload_size: usize,
    /// CORS allow-list; `None` allows any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl AppState {
    pub fn new(manager: Arc<ObjectManager>, multipart: Arc<MultipartCoordinator>) -> Self {
        AppState {
            manager,
            multipart,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            cors_allowed_origins: None,
        }
    }

    pub fn with_max_upload_size(mut self, max_upload_size: usize) -> Self {
        self.max_upload_size = max_upload_size;
        self
    }

    pub fn with_cors_origins(mut self, origins: Option<Vec<String>>) -> Self {
        self.cors_allowed_origins = origins;
        self
    }
}

/// Query parameters steering object-path dispatch.
#[derive(Debug, Default, Deserialize)]
struct ObjectQuery {
    #[serde(rename = "versionId")]
    version_id: Option<String>,
    #[serde(rename = "uploadId")]
    upload_id: Option<String>,
    #[serde(rename = "partNumber")]
    part_number: Option<u32>,
    /// Bare `?uploads` flag.
    uploads: Option<String>,
}

async fn list_buckets_router(State(state): State<AppState>) -> Result<Response, ApiError> {
    handlers::bucket::list_buckets(state).await
}

async fn put_bucket_router(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    handlers::bucket::create_bucket(state, bucket).await
}

async fn delete_bucket_router(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    handlers::bucket::delete_bucket(state, bucket).await
}

async fn head_bucket_router(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    handlers::bucket::head_bucket(state, bucket).await
}

async fn get_bucket_router(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<handlers::bucket::ListObjectsQuery>,
) -> Result<Response, ApiError> {
    handlers::bucket::list_objects(state, bucket, query).await
}

/// PutObject, CopyObject, or UploadPart.
async fn put_object_router(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: axum::http::HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    match (query.upload_id, query.part_number) {
        (Some(upload_id), Some(part_number)) => {
            handlers::multipart::upload_part(state, upload_id, part_number, body).await
        }
        (None, None) => handlers::object::put_object(state, bucket, key, headers, body).await,
        _ => Err(ApiError::InvalidRequest(
            "partNumber and uploadId must be used together".to_string(),
        )),
    }
}

async fn get_object_router(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: axum::http::HeaderMap,
) -> Result<Response, ApiError> {
    handlers::object::get_object(state, bucket, key, query.version_id, headers).await
}

async fn head_object_router(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, ApiError> {
    handlers::object::head_object(state, bucket, key, query.version_id).await
}

/// DeleteObject or AbortMultipartUpload.
async fn delete_object_router(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, ApiError> {
    match query.upload_id {
        Some(upload_id) => handlers::multipart::abort(state, upload_id).await,
        None => handlers::object::delete_object(state, bucket, key, query.version_id).await,
    }
}

/// CreateMultipartUpload or CompleteMultipartUpload.
async fn post_object_router(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if query.uploads.is_some() {
        handlers::multipart::initiate(state, bucket, key, headers).await
    } else if let Some(upload_id) = query.upload_id {
        handlers::multipart::complete(state, bucket, key, upload_id, body).await
    } else {
        Err(ApiError::InvalidRequest(
            "POST requires ?uploads or ?uploadId".to_string(),
        ))
    }
}

/// Build the S3-compatible router.
pub fn create_router(state: AppState) -> Router {
    let allow_origin = match &state.cors_allowed_origins {
        Some(origins) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
        ),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::ETAG,
            header::CONTENT_RANGE,
            HeaderName::from_static("x-amz-request-id"),
            HeaderName::from_static("x-amz-version-id"),
        ]);
    let max_upload_size = state.max_upload_size;

    Router::new()
        .route("/", get(list_buckets_router))
        .route("/ping", get(handlers::service::ping))
        .route("/version", get(handlers::service::version))
        .route("/:bucket", put(put_bucket_router))
        .route("/:bucket", delete(delete_bucket_router))
        .route("/:bucket", get(get_bucket_router))
        .route("/:bucket", head(head_bucket_router))
        .route("/:bucket/*key", put(put_object_router))
        .route("/:bucket/*key", get(get_object_router))
        .route("/:bucket/*key", head(head_object_router))
        .route("/:bucket/*key", delete(delete_object_router))
        .route("/:bucket/*key", post(post_object_router))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_size))
        .with_state(state)
}
