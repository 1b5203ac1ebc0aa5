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

//! Object operations: put (and copy), get, head, delete.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, response::Builder, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::Engine as _;
use blobs3_core::{ByteRange, ByteStream, ObjectDescriptor, PutOptions, StorageError};
use futures::TryStreamExt;

use crate::errors::ApiError;
use crate::server::AppState;
use crate::xml;

const COPY_SOURCE_HEADER: &str = "x-amz-copy-source";
const CHECKSUM_HEADER: &str = "x-amz-checksum-sha256";
const VERSION_HEADER: &str = "x-amz-version-id";
const DELETE_MARKER_HEADER: &str = "x-amz-delete-marker";
const META_PREFIX: &str = "x-amz-meta-";

/// `PUT /{bucket}/{key}` - PutObject, or CopyObject when
/// `x-amz-copy-source` is present.
pub async fn put_object(
    state: AppState,
    bucket: String,
    key: String,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if let Some(source) = headers.get(COPY_SOURCE_HEADER) {
        let source = source
            .to_str()
            .map_err(|_| ApiError::InvalidRequest("invalid x-amz-copy-source header".to_string()))?;
        return copy_object(state, bucket, key, source).await;
    }

    let opts = PutOptions {
        content_type: content_type(&headers),
        metadata: extract_metadata(&headers),
        expected_checksum: parse_checksum_header(&headers)?,
    };
    let descriptor = state
        .manager
        .put_object(&bucket, &key, body_stream(body), opts)
        .await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::ETAG, &descriptor.etag);
    if let Some(version) = &descriptor.version_id {
        builder = builder.header(VERSION_HEADER, version);
    }
    Ok(builder.body(Body::empty()).unwrap())
}

async fn copy_object(state: AppState, bucket: String, key: String, source: &str) -> Result<Response, ApiError> {
    let (src_bucket, src_key, src_version) = parse_copy_source(source)?;
    let descriptor = state
        .manager
        .copy_object(&src_bucket, &src_key, src_version.as_deref(), &bucket, &key)
        .await?;

    let body = xml::copy_object_response(&descriptor.etag, descriptor.modified_at);
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/xml");
    if let Some(version) = &descriptor.version_id {
        builder = builder.header(VERSION_HEADER, version);
    }
    Ok(builder.body(Body::from(body)).unwrap())
}

/// `GET /{bucket}/{key}` - GetObject with `Range`, `If-Match`,
/// `If-None-Match`, and `versionId` support.
pub async fn get_object(
    state: AppState,
    bucket: String,
    key: String,
    version_id: Option<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let version = version_id.as_deref();
    let descriptor = state.manager.head_object(&bucket, &key, version).await?;

    if let Some(condition) = header_str(&headers, header::IF_NONE_MATCH) {
        if etag_matches(condition, &descriptor.etag) {
            return Ok(Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(header::ETAG, &descriptor.etag)
                .body(Body::empty())
                .unwrap());
        }
    }
    if let Some(condition) = header_str(&headers, header::IF_MATCH) {
        if !etag_matches(condition, &descriptor.etag) {
            return Err(ApiError::PreconditionFailed);
        }
    }

    let range = match header_str(&headers, header::RANGE) {
        Some(spec) => parse_range(spec, descriptor.size)?,
        None => None,
    };

    let (descriptor, stream) = state.manager.get_object(&bucket, &key, range, version).await?;

    let (status, content_length) = match range {
        Some(r) => (StatusCode::PARTIAL_CONTENT, r.len()),
        None => (StatusCode::OK, descriptor.size),
    };
    let mut builder = object_headers(Response::builder().status(status), &descriptor)
        .header(header::CONTENT_LENGTH, content_length);
    if let Some(r) = range {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", r.start, r.end - 1, descriptor.size),
        );
    }
    Ok(builder.body(Body::from_stream(stream)).unwrap())
}

/// `HEAD /{bucket}/{key}` - HeadObject.
pub async fn head_object(
    state: AppState,
    bucket: String,
    key: String,
    version_id: Option<String>,
) -> Result<Response, ApiError> {
    let descriptor = state
        .manager
        .head_object(&bucket, &key, version_id.as_deref())
        .await?;
    let builder = object_headers(Response::builder().status(StatusCode::OK), &descriptor)
        .header(header::CONTENT_LENGTH, descriptor.size);
    Ok(builder.body(Body::empty()).unwrap())
}

/// `DELETE /{bucket}/{key}` - DeleteObject. Installs a delete marker on a
/// versioned store; `versionId` removes that version outright.
pub async fn delete_object(
    state: AppState,
    bucket: String,
    key: String,
    version_id: Option<String>,
) -> Result<Response, ApiError> {
    match state
        .manager
        .delete_object(&bucket, &key, version_id.as_deref())
        .await
    {
        Ok(outcome) => {
            let mut builder = Response::builder().status(StatusCode::NO_CONTENT);
            if outcome.delete_marker {
                builder = builder.header(DELETE_MARKER_HEADER, "true");
            }
            if let Some(version) = &outcome.version_id {
                builder = builder.header(VERSION_HEADER, version);
            }
            Ok(builder.body(Body::empty()).unwrap())
        }
        // deleting an absent key succeeds, as S3 does
        Err(StorageError::NotFound { .. }) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(e.into()),
    }
}

/// Wrap a request body as an engine byte stream.
pub(crate) fn body_stream(body: Body) -> ByteStream {
    Box::pin(
        body.into_data_stream()
            .map_err(|e| StorageError::Io(std::io::Error::other(e))),
    )
}

pub(crate) fn content_type(headers: &HeaderMap) -> String {
    header_str(headers, header::CONTENT_TYPE)
        .unwrap_or("application/octet-stream")
        .to_string()
}

pub(crate) fn extract_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().strip_prefix(META_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn parse_checksum_header(headers: &HeaderMap) -> Result<Option<[u8; 32]>, ApiError> {
    let Some(value) = headers.get(CHECKSUM_HEADER) else {
        return Ok(None);
    };
    let decoded = value
        .to_str()
        .ok()
        .and_then(|v| base64::engine::general_purpose::STANDARD.decode(v).ok())
        .ok_or_else(|| ApiError::InvalidRequest("invalid x-amz-checksum-sha256 header".to_string()))?;
    let checksum: [u8; 32] = decoded
        .try_into()
        .map_err(|_| ApiError::InvalidRequest("x-amz-checksum-sha256 must be 32 bytes".to_string()))?;
    Ok(Some(checksum))
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `/src-bucket/src-key` with optional `?versionId=`.
fn parse_copy_source(raw: &str) -> Result<(String, String, Option<String>), ApiError> {
    let raw = raw.strip_prefix('/').unwrap_or(raw);
    let (path, version) = match raw.split_once("?versionId=") {
        Some((p, v)) => (p, Some(v.to_string())),
        None => (raw, None),
    };
    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string(), version))
        }
        _ => Err(ApiError::InvalidRequest(
            "x-amz-copy-source must be /bucket/key".to_string(),
        )),
    }
}

/// Weak comparison against a comma-separated `If-(None-)Match` list.
fn etag_matches(condition: &str, etag: &str) -> bool {
    condition
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_matches('"') == etag.trim_matches('"'))
}

/// Map an inclusive HTTP `Range` header onto the engine's half-open form.
///
/// A malformed specifier is ignored per RFC 9110 (the full object is
/// served); `Ok(None)`. A well-formed but unsatisfiable range is an
/// error, surfaced as 416.
fn parse_range(spec: &str, size: u64) -> Result<Option<ByteRange>, StorageError> {
    let spec = match spec.strip_prefix("bytes=") {
        Some(rest) => rest,
        None => return Ok(None),
    };
    // single range only
    if spec.contains(',') {
        return Ok(None);
    }
    let (first, last) = match spec.split_once('-') {
        Some(parts) => parts,
        None => return Ok(None),
    };
    if first.is_empty() {
        // suffix form: last n bytes
        let n: u64 = match last.parse() {
            Ok(n) => n,
            Err(_) => return Ok(None),
        };
        if n == 0 || size == 0 {
            return Err(StorageError::RangeNotSatisfiable {
                start: size,
                end: size,
                size,
            });
        }
        Ok(Some(ByteRange::new(size.saturating_sub(n), size)))
    } else {
        let start: u64 = match first.parse() {
            Ok(n) => n,
            Err(_) => return Ok(None),
        };
        let end = if last.is_empty() {
            size
        } else {
            let last: u64 = match last.parse() {
                Ok(n) => n,
                Err(_) => return Ok(None),
            };
            if last < start {
                return Ok(None);
            }
            // inclusive last byte, clamped to the object
            last.saturating_add(1).min(size)
        };
        if start >= size {
            return Err(StorageError::RangeNotSatisfiable { start, end, size });
        }
        Ok(Some(ByteRange::new(start, end)))
    }
}

fn object_headers(mut builder: Builder, descriptor: &ObjectDescriptor) -> Builder {
    builder = builder
        .header(header::ETAG, &descriptor.etag)
        .header(header::CONTENT_TYPE, &descriptor.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::LAST_MODIFIED, xml::format_http_date(descriptor.modified_at));
    if let Some(version) = &descriptor.version_id {
        builder = builder.header(VERSION_HEADER, version);
    }
    for (name, value) in &descriptor.metadata {
        builder = builder.header(format!("{}{}", META_PREFIX, name), value);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_valid() {
        assert_eq!(parse_range("bytes=1-3", 5).unwrap(), Some(ByteRange::new(1, 4)));
        assert_eq!(parse_range("bytes=0-4", 5).unwrap(), Some(ByteRange::new(0, 5)));
        // last byte clamped to object size
        assert_eq!(parse_range("bytes=2-99", 5).unwrap(), Some(ByteRange::new(2, 5)));
        assert_eq!(parse_range("bytes=2-", 5).unwrap(), Some(ByteRange::new(2, 5)));
        assert_eq!(parse_range("bytes=-2", 5).unwrap(), Some(ByteRange::new(3, 5)));
        assert_eq!(parse_range("bytes=-99", 5).unwrap(), Some(ByteRange::new(0, 5)));
    }

    #[test]
    fn test_parse_range_malformed_is_ignored() {
        assert_eq!(parse_range("items=0-1", 5).unwrap(), None);
        assert_eq!(parse_range("bytes=abc", 5).unwrap(), None);
        assert_eq!(parse_range("bytes=a-b", 5).unwrap(), None);
        assert_eq!(parse_range("bytes=12", 5).unwrap(), None);
        assert_eq!(parse_range("bytes=3-2", 5).unwrap(), None);
        assert_eq!(parse_range("bytes=0-1,3-4", 5).unwrap(), None);
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        assert!(parse_range("bytes=5-6", 5).is_err());
        assert!(parse_range("bytes=-0", 5).is_err());
        assert!(parse_range("bytes=0-0", 0).is_err());
    }

    #[test]
    fn test_etag_matches() {
        assert!(etag_matches("\"abc\"", "\"abc\""));
        assert!(etag_matches("abc", "\"abc\""));
        assert!(etag_matches("*", "\"abc\""));
        assert!(etag_matches("\"x\", \"abc\"", "\"abc\""));
        assert!(!etag_matches("\"x\"", "\"abc\""));
    }

    #[test]
    fn test_parse_copy_source() {
        assert_eq!(
            parse_copy_source("/src/a/b.txt").unwrap(),
            ("src".to_string(), "a/b.txt".to_string(), None)
        );
        assert_eq!(
            parse_copy_source("src/k?versionId=v1").unwrap(),
            ("src".to_string(), "k".to_string(), Some("v1".to_string()))
        );
        assert!(parse_copy_source("no-key").is_err());
        assert!(parse_copy_source("/bucket/").is_err());
    }
}
