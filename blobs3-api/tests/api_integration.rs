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

//! API integration tests over in-process requests
//! (tower::ServiceExt::oneshot, no network I/O).

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use blobs3_api::{create_router, AppState};
use blobs3_core::{FsContentStore, MetadataIndex, MultipartCoordinator, ObjectManager};
use http_body_util::BodyExt;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tower::ServiceExt;

fn create_test_app(versioned: bool) -> (TempDir, Router) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let index = Arc::new(
        MetadataIndex::open(&temp_dir.path().join("index.redb")).expect("Failed to open index"),
    );
    let store =
        Arc::new(FsContentStore::open(temp_dir.path().join("blobs")).expect("Failed to open store"));
    let manager = Arc::new(ObjectManager::new(store, index, versioned));
    let multipart = Arc::new(MultipartCoordinator::new(manager.clone()));
    let router = create_router(AppState::new(manager, multipart));
    (temp_dir, router)
}

async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> axum::http::Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

async fn create_bucket(router: &Router, bucket: &str) {
    let response = send(
        router,
        Request::builder()
            .method("PUT")
            .uri(format!("/{}", bucket))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn put_object(router: &Router, bucket: &str, key: &str, content: &str) -> String {
    let response = send(
        router,
        Request::builder()
            .method("PUT")
            .uri(format!("/{}/{}", bucket, key))
            .body(Body::from(content.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.headers()["etag"].to_str().unwrap().to_string()
}

fn extract_tag(xml: &str, tag: &str) -> String {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open).unwrap() + open.len();
    let end = xml.find(&close).unwrap();
    xml[start..end].to_string()
}

#[tokio::test]
async fn test_ping_and_version() {
    let (_dir, router) = create_test_app(false);

    let response = send(&router, Request::get("/ping").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_string(response.into_body()).await, "OK");

    let response = send(&router, Request::get("/version").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_to_string(response.into_body()).await,
        env!("CARGO_PKG_VERSION")
    );
}

#[tokio::test]
async fn test_bucket_lifecycle() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;

    // duplicate creation conflicts
    let response = send(
        &router,
        Request::builder().method("PUT").uri("/data").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(
        &router,
        Request::builder().method("HEAD").uri("/data").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // listing mentions the bucket
    let response = send(&router, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_to_string(response.into_body()).await.contains("<Name>data</Name>"));

    // non-empty bucket cannot be deleted
    put_object(&router, "data", "k", "x").await;
    let response = send(
        &router,
        Request::builder().method("DELETE").uri("/data").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(
        &router,
        Request::builder().method("DELETE").uri("/data/k").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(
        &router,
        Request::builder().method("DELETE").uri("/data").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // invalid bucket name
    let response = send(
        &router,
        Request::builder().method("PUT").uri("/UP").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_get_round_trip() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;

    let etag = put_object(&router, "data", "greeting.txt", "hello").await;
    let expected = format!("\"{}\"", hex::encode(Sha256::digest(b"hello")));
    assert_eq!(etag, expected);

    let response = send(
        &router,
        Request::get("/data/greeting.txt").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["etag"].to_str().unwrap(), expected);
    assert_eq!(response.headers()["content-length"].to_str().unwrap(), "5");
    assert_eq!(response.headers()["accept-ranges"].to_str().unwrap(), "bytes");
    assert_eq!(body_to_string(response.into_body()).await, "hello");
}

#[tokio::test]
async fn test_range_request() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;
    put_object(&router, "data", "k", "hello").await;

    let response = send(
        &router,
        Request::get("/data/k")
            .header("range", "bytes=1-3")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()["content-range"].to_str().unwrap(),
        "bytes 1-3/5"
    );
    assert_eq!(body_to_string(response.into_body()).await, "ell");

    // start beyond the object
    let response = send(
        &router,
        Request::get("/data/k")
            .header("range", "bytes=9-10")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response.headers()["content-range"].to_str().unwrap(),
        "bytes */5"
    );

    // suffix form
    let response = send(
        &router,
        Request::get("/data/k")
            .header("range", "bytes=-2")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_to_string(response.into_body()).await, "lo");

    // an unparseable header is ignored and the full object served
    let response = send(
        &router,
        Request::get("/data/k")
            .header("range", "bytes=abc")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_string(response.into_body()).await, "hello");
}

#[tokio::test]
async fn test_conditional_get() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;
    let etag = put_object(&router, "data", "k", "hello").await;

    let response = send(
        &router,
        Request::get("/data/k")
            .header("if-none-match", &etag)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = send(
        &router,
        Request::get("/data/k")
            .header("if-match", "\"different\"")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let response = send(
        &router,
        Request::get("/data/k")
            .header("if-match", &etag)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_object_is_no_such_key() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;

    let response = send(&router, Request::get("/data/nope").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<Code>NoSuchKey</Code>"));

    let response = send(&router, Request::get("/missing/k").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_to_string(response.into_body())
        .await
        .contains("<Code>NoSuchBucket</Code>"));
}

#[tokio::test]
async fn test_checksum_precondition() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;

    use base64::Engine as _;
    let good = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(b"hello"));
    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri("/data/k")
            .header("x-amz-checksum-sha256", good)
            .body(Body::from("hello"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let bad = base64::engine::general_purpose::STANDARD.encode([0u8; 32]);
    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri("/data/k2")
            .header("x-amz-checksum-sha256", bad)
            .body(Body::from("hello"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_to_string(response.into_body())
        .await
        .contains("<Code>BadDigest</Code>"));
}

#[tokio::test]
async fn test_user_metadata_round_trip() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;

    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri("/data/k")
            .header("content-type", "text/plain")
            .header("x-amz-meta-author", "tests")
            .body(Body::from("x"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &router,
        Request::builder().method("HEAD").uri("/data/k").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"].to_str().unwrap(), "text/plain");
    assert_eq!(response.headers()["x-amz-meta-author"].to_str().unwrap(), "tests");
}

#[tokio::test]
async fn test_list_objects_with_delimiter_and_paging() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;
    for key in ["logs/2026/a", "logs/2027/b", "readme.md", "zz.txt"] {
        put_object(&router, "data", key, "x").await;
    }

    let response = send(
        &router,
        Request::get("/data?delimiter=/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<Prefix>logs/</Prefix>"));
    assert!(body.contains("<Key>readme.md</Key>"));
    assert!(body.contains("<Key>zz.txt</Key>"));
    assert!(!body.contains("<Key>logs/2026/a</Key>"));

    // page through with max-keys=2
    let response = send(
        &router,
        Request::get("/data?max-keys=2").body(Body::empty()).unwrap(),
    )
    .await;
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<IsTruncated>true</IsTruncated>"));
    let token = extract_tag(&body, "NextContinuationToken");

    let response = send(
        &router,
        Request::get(format!("/data?max-keys=2&continuation-token={}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<Key>zz.txt</Key>"));
    assert!(body.contains("<IsTruncated>false</IsTruncated>"));
}

#[tokio::test]
async fn test_copy_object() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;
    let etag = put_object(&router, "data", "src", "original").await;

    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri("/data/dst")
            .header("x-amz-copy-source", "/data/src")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<CopyObjectResult"));
    assert!(body.contains(&xml_escaped(&etag)));

    // overwrite the source; the copy is unaffected
    put_object(&router, "data", "src", "changed").await;
    let response = send(&router, Request::get("/data/dst").body(Body::empty()).unwrap()).await;
    assert_eq!(body_to_string(response.into_body()).await, "original");
}

fn xml_escaped(s: &str) -> String {
    s.replace('"', "&quot;")
}

#[tokio::test]
async fn test_multipart_upload_flow() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;

    let response = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/data/big.bin?uploads")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let upload_id = extract_tag(&body_to_string(response.into_body()).await, "UploadId");

    for (n, content) in [(1, "aaa"), (2, "bb"), (3, "c")] {
        let response = send(
            &router,
            Request::builder()
                .method("PUT")
                .uri(format!("/data/big.bin?partNumber={}&uploadId={}", n, upload_id))
                .body(Body::from(content))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("etag"));
    }

    let complete_body = r#"<CompleteMultipartUpload>
  <Part><PartNumber>1</PartNumber></Part>
  <Part><PartNumber>2</PartNumber></Part>
  <Part><PartNumber>3</PartNumber></Part>
</CompleteMultipartUpload>"#;
    let response = send(
        &router,
        Request::builder()
            .method("POST")
            .uri(format!("/data/big.bin?uploadId={}", upload_id))
            .body(Body::from(complete_body))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    let expected_etag = format!("\"{}\"", hex::encode(Sha256::digest(b"aaabbc")));
    assert!(body.contains(&xml_escaped(&expected_etag)));

    let response = send(&router, Request::get("/data/big.bin").body(Body::empty()).unwrap()).await;
    assert_eq!(body_to_string(response.into_body()).await, "aaabbc");

    // session is closed now
    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri(format!("/data/big.bin?partNumber=4&uploadId={}", upload_id))
            .body(Body::from("x"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_multipart_abort_and_incomplete_set() {
    let (_dir, router) = create_test_app(false);
    create_bucket(&router, "data").await;

    let response = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/data/k?uploads")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let upload_id = extract_tag(&body_to_string(response.into_body()).await, "UploadId");

    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri(format!("/data/k?partNumber=1&uploadId={}", upload_id))
            .body(Body::from("x"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // completion list must match the staged set
    let response = send(
        &router,
        Request::builder()
            .method("POST")
            .uri(format!("/data/k?uploadId={}", upload_id))
            .body(Body::from(
                "<CompleteMultipartUpload><Part><PartNumber>2</PartNumber></Part></CompleteMultipartUpload>",
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_to_string(response.into_body())
        .await
        .contains("<Code>InvalidPart</Code>"));

    let response = send(
        &router,
        Request::builder()
            .method("DELETE")
            .uri(format!("/data/k?uploadId={}", upload_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // staging into the aborted session fails
    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri(format!("/data/k?partNumber=2&uploadId={}", upload_id))
            .body(Body::from("y"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_to_string(response.into_body())
        .await
        .contains("<Code>NoSuchUpload</Code>"));
}

#[tokio::test]
async fn test_versioned_object_flow() {
    let (_dir, router) = create_test_app(true);
    create_bucket(&router, "data").await;

    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri("/data/k")
            .body(Body::from("v1"))
            .unwrap(),
    )
    .await;
    let v1 = response.headers()["x-amz-version-id"].to_str().unwrap().to_string();

    let response = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri("/data/k")
            .body(Body::from("v2"))
            .unwrap(),
    )
    .await;
    let v2 = response.headers()["x-amz-version-id"].to_str().unwrap().to_string();
    assert_ne!(v1, v2);

    // current is v2, explicit versionId reaches v1
    let response = send(&router, Request::get("/data/k").body(Body::empty()).unwrap()).await;
    assert_eq!(body_to_string(response.into_body()).await, "v2");
    let response = send(
        &router,
        Request::get(format!("/data/k?versionId={}", v1)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body_to_string(response.into_body()).await, "v1");

    // delete installs a marker and hides the key
    let response = send(
        &router,
        Request::builder().method("DELETE").uri("/data/k").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["x-amz-delete-marker"].to_str().unwrap(), "true");

    let response = send(&router, Request::get("/data/k").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // old versions remain reachable
    let response = send(
        &router,
        Request::get(format!("/data/k?versionId={}", v2)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body_to_string(response.into_body()).await, "v2");
}
