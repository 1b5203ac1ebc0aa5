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

//! Bucket operations: create, delete, head, list buckets, list objects.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::server::AppState;
use crate::xml;

const DEFAULT_MAX_KEYS: usize = 1000;

/// Query parameters for ListObjectsV2.
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsQuery {
    #[serde(default)]
    pub prefix: String,
    pub delimiter: Option<String>,
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<usize>,
}

/// `GET /` - ListBuckets.
pub async fn list_buckets(state: AppState) -> Result<Response, ApiError> {
    let buckets = state.manager.list_buckets().await?;
    let body = xml::list_buckets_response(&buckets);
    Ok(xml_response(StatusCode::OK, body))
}

/// `PUT /{bucket}` - CreateBucket.
pub async fn create_bucket(state: AppState, bucket: String) -> Result<Response, ApiError> {
    state.manager.create_bucket(&bucket).await?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::LOCATION, format!("/{}", bucket))
        .body(Body::empty())
        .unwrap())
}

/// `DELETE /{bucket}` - DeleteBucket. Only succeeds on an empty bucket.
pub async fn delete_bucket(state: AppState, bucket: String) -> Result<Response, ApiError> {
    state.manager.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `HEAD /{bucket}` - HeadBucket.
pub async fn head_bucket(state: AppState, bucket: String) -> Result<Response, ApiError> {
    state.manager.head_bucket(&bucket).await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /{bucket}` - ListObjectsV2 with prefix, delimiter, and
/// continuation token.
pub async fn list_objects(
    state: AppState,
    bucket: String,
    query: ListObjectsQuery,
) -> Result<Response, ApiError> {
    let max_keys = query.max_keys.unwrap_or(DEFAULT_MAX_KEYS).clamp(1, DEFAULT_MAX_KEYS);
    let delimiter = query.delimiter.as_deref().filter(|d| !d.is_empty());

    let listing = state
        .manager
        .list_objects(
            &bucket,
            &query.prefix,
            delimiter,
            query.continuation_token.as_deref(),
            max_keys,
        )
        .await?;

    let body = xml::list_objects_response(&bucket, &query.prefix, delimiter, max_keys, &listing);
    Ok(xml_response(StatusCode::OK, body))
}

pub(crate) fn xml_response(status: StatusCode, body: String) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from(body))
        .unwrap()
}
