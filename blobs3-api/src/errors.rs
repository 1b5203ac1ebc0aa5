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

//! S3-style error responses.
//!
//! Maps engine errors onto S3 error codes and renders the XML `<Error>`
//! body. Internal details (paths, locators, database messages) never reach
//! the client; 5xx responses carry a generic message.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use blobs3_core::StorageError;
use uuid::Uuid;

use crate::xml;

/// Errors surfaced by the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    /// Engine error, mapped per kind.
    Storage(StorageError),
    /// Request shape problem detected in the API layer.
    InvalidRequest(String),
    /// Unparseable XML request body.
    MalformedXml,
    /// `If-Match` precondition failed.
    PreconditionFailed,
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl ApiError {
    /// S3 error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Storage(e) => match e {
                StorageError::BucketNotFound { .. } => "NoSuchBucket",
                StorageError::BucketAlreadyExists { .. } => "BucketAlreadyExists",
                StorageError::BucketNotEmpty { .. } => "BucketNotEmpty",
                StorageError::NotFound { .. } => "NoSuchKey",
                StorageError::VersionNotFound { .. } => "NoSuchVersion",
                StorageError::InvalidKey { .. } => "InvalidArgument",
                StorageError::ChecksumMismatch { .. } => "BadDigest",
                StorageError::RangeNotSatisfiable { .. } => "InvalidRange",
                StorageError::SessionNotFound { .. } | StorageError::SessionClosed { .. } => "NoSuchUpload",
                StorageError::IncompletePartSet { .. } => "InvalidPart",
                StorageError::Conflict { .. } => "OperationAborted",
                StorageError::Io(_) | StorageError::Database(_) | StorageError::Serialization(_) => {
                    "InternalError"
                }
            },
            ApiError::InvalidRequest(_) => "InvalidRequest",
            ApiError::MalformedXml => "MalformedXML",
            ApiError::PreconditionFailed => "PreconditionFailed",
        }
    }

    /// HTTP status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Storage(e) => match e {
                StorageError::BucketNotFound { .. }
                | StorageError::NotFound { .. }
                | StorageError::VersionNotFound { .. }
                | StorageError::SessionNotFound { .. }
                | StorageError::SessionClosed { .. } => StatusCode::NOT_FOUND,
                StorageError::BucketAlreadyExists { .. }
                | StorageError::BucketNotEmpty { .. }
                | StorageError::Conflict { .. } => StatusCode::CONFLICT,
                StorageError::InvalidKey { .. }
                | StorageError::ChecksumMismatch { .. }
                | StorageError::IncompletePartSet { .. } => StatusCode::BAD_REQUEST,
                StorageError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
                StorageError::Io(_) | StorageError::Database(_) | StorageError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::InvalidRequest(_) | ApiError::MalformedXml => StatusCode::BAD_REQUEST,
            ApiError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        }
    }

    /// Client-facing message. Internal errors get a generic one.
    fn message(&self) -> String {
        match self {
            ApiError::Storage(e) => match e {
                StorageError::Io(_) | StorageError::Database(_) | StorageError::Serialization(_) => {
                    "We encountered an internal error. Please try again.".to_string()
                }
                other => other.to_string(),
            },
            ApiError::InvalidRequest(reason) => reason.clone(),
            ApiError::MalformedXml => "The XML you provided was not well-formed".to_string(),
            ApiError::PreconditionFailed => {
                "At least one of the preconditions you specified did not hold".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = Uuid::new_v4().simple().to_string();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = ?self, request_id = %request_id, "request failed");
        }
        let body = xml::error_response(self.code(), &self.message(), &request_id);

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/xml")
            .header("x-amz-request-id", request_id);
        // tell the range-failing client how large the object actually is
        if let ApiError::Storage(StorageError::RangeNotSatisfiable { size, .. }) = &self {
            builder = builder.header(header::CONTENT_RANGE, format!("bytes */{}", size));
        }
        builder.body(Body::from(body)).unwrap()
    }
}
