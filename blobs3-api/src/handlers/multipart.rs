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

//! Multipart upload operations: initiate, upload part, complete, abort.

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use blobs3_core::PutOptions;
use bytes::Bytes;

use crate::errors::ApiError;
use crate::handlers::bucket::xml_response;
use crate::handlers::object::{body_stream, content_type, extract_metadata};
use crate::server::AppState;
use crate::xml;

const VERSION_HEADER: &str = "x-amz-version-id";

/// `POST /{bucket}/{key}?uploads` - CreateMultipartUpload.
pub async fn initiate(
    state: AppState,
    bucket: String,
    key: String,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let opts = PutOptions {
        content_type: content_type(&headers),
        metadata: extract_metadata(&headers),
        expected_checksum: None,
    };
    let upload_id = state.multipart.initiate(&bucket, &key, opts).await?;
    let body = xml::initiate_multipart_response(&bucket, &key, &upload_id);
    Ok(xml_response(StatusCode::OK, body))
}

/// `PUT /{bucket}/{key}?partNumber=N&uploadId=ID` - UploadPart.
pub async fn upload_part(
    state: AppState,
    upload_id: String,
    part_number: u32,
    body: Body,
) -> Result<Response, ApiError> {
    let staged = state
        .multipart
        .stage_part(&upload_id, part_number, body_stream(body))
        .await?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::ETAG, staged.etag())
        .body(Body::empty())
        .unwrap())
}

/// `POST /{bucket}/{key}?uploadId=ID` - CompleteMultipartUpload. The body
/// lists the parts; assembly order follows the listed order.
pub async fn complete(
    state: AppState,
    bucket: String,
    key: String,
    upload_id: String,
    body: Bytes,
) -> Result<Response, ApiError> {
    let part_numbers = xml::parse_complete_request(&body)?;
    let descriptor = state.multipart.complete(&upload_id, &part_numbers).await?;

    let body = xml::complete_multipart_response(&bucket, &key, &descriptor.etag);
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/xml");
    if let Some(version) = &descriptor.version_id {
        builder = builder.header(VERSION_HEADER, version);
    }
    Ok(builder.body(Body::from(body)).unwrap())
}

/// `DELETE /{bucket}/{key}?uploadId=ID` - AbortMultipartUpload.
pub async fn abort(state: AppState, upload_id: String) -> Result<Response, ApiError> {
    state.multipart.abort(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
