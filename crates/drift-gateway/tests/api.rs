//! End-to-end tests for the gateway HTTP surface

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use drift_gateway::{create_router, AppState, GatewayConfig};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    create_router(Arc::new(AppState::new(GatewayConfig::default())))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect body")
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

async fn upload_file(app: &Router, data: &[u8], headers: &[(&str, String)]) -> String {
    let mut request = Request::builder()
        .method("POST")
        .uri("/files")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, data.len().to_string());
    for (name, value) in headers {
        request = request.header(*name, value.as_str());
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(data.to_vec())).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["reference"].as_str().expect("reference").to_string()
}

async fn download_file(app: &Router, reference: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(format!("/files/{reference}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

fn deterministic_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x9E3779B97F4A7C15u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

#[tokio::test]
async fn upload_download_round_trip() {
    let app = app();
    let data = deterministic_bytes(10_000);

    let request = Request::builder()
        .method("POST")
        .uri("/files?name=data.bin")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, data.len().to_string());
    let response = app
        .clone()
        .oneshot(request.body(Body::from(data.clone())).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response.headers()[header::ETAG].to_str().expect("etag").to_string();
    assert!(response.headers().contains_key("swarm-tag-uid"));
    let reference = body_json(response).await["reference"]
        .as_str()
        .expect("reference")
        .to_string();
    assert_eq!(etag, format!("\"{reference}\""));
    assert_eq!(reference.len(), 64); // 32-byte plain reference

    let response = download_file(&app, &reference).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .expect("disposition"),
        "inline; filename=\"data.bin\""
    );
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().expect("type"),
        "application/octet-stream"
    );
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn empty_upload_round_trips() {
    let app = app();

    // No content-length header: the body is spooled to measure it.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files")
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let reference = body_json(response).await["reference"]
        .as_str()
        .expect("reference")
        .to_string();

    let response = download_file(&app, &reference).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH].to_str().expect("len"),
        "0"
    );
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn single_chunk_upload_round_trips() {
    let app = app();
    let data = vec![0xAA; 4096];
    let reference = upload_file(&app, &data, &[]).await;

    let response = download_file(&app, &reference).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn plaintext_references_are_reproducible() {
    // Two fresh nodes, same bytes, same root reference.
    let data = deterministic_bytes(2 * 1024 * 1024);
    let first = upload_file(&app(), &data, &[]).await;
    let second = upload_file(&app(), &data, &[]).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn encrypted_round_trip_and_truncated_reference() {
    let app = app();
    let data = deterministic_bytes(500_000);
    let reference = upload_file(
        &app,
        &data,
        &[("swarm-encrypt", "true".to_string())],
    )
    .await;
    assert_eq!(reference.len(), 128); // 64-byte encrypted reference

    let response = download_file(&app, &reference).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, data);

    // Dropping the key half must not expose the content.
    let truncated = &reference[..64];
    let response = download_file(&app, truncated).await;
    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::NOT_FOUND,
        "unexpected status {}",
        response.status()
    );
}

#[tokio::test]
async fn invalid_references_are_rejected() {
    let app = app();

    let response = download_file(&app, "not-hex").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid hex of the wrong width.
    let response = download_file(&app, &"ab".repeat(40)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], 400);
}

#[tokio::test]
async fn missing_reference_is_not_found() {
    let app = app();
    let response = download_file(&app, &"00".repeat(32)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn range_requests_are_honoured() {
    let app = app();
    let data = deterministic_bytes(10_000);
    let reference = upload_file(&app, &data, &[]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/files/{reference}"))
                .header(header::RANGE, "bytes=100-199")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE].to_str().expect("range"),
        "bytes 100-199/10000"
    );
    assert_eq!(body_bytes(response).await, &data[100..200]);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/files/{reference}"))
                .header(header::RANGE, "bytes=20000-")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn if_none_match_returns_not_modified() {
    let app = app();
    let reference = upload_file(&app, b"cached content", &[]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/files/{reference}"))
                .header(header::IF_NONE_MATCH, format!("\"{reference}\""))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn multipart_upload_round_trips() {
    let app = app();
    let body = concat!(
        "--boundary\r\n",
        "Content-Disposition: form-data; name=\"file\"; filename=\"hello.txt\"\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "hello multipart\r\n",
        "--boundary--\r\n",
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files")
                .header(
                    header::CONTENT_TYPE,
                    "multipart/form-data; boundary=boundary",
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let reference = body_json(response).await["reference"]
        .as_str()
        .expect("reference")
        .to_string();

    let response = download_file(&app, &reference).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .expect("disposition"),
        "inline; filename=\"hello.txt\""
    );
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().expect("type"),
        "text/plain"
    );
    assert_eq!(body_bytes(response).await, b"hello multipart");
}

fn build_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, *data)
            .expect("append tar entry");
    }
    builder.into_inner().expect("finish tar")
}

async fn upload_dir(app: &Router, archive: Vec<u8>, encrypt: bool) -> axum::response::Response {
    let mut request = Request::builder()
        .method("POST")
        .uri("/dirs")
        .header(header::CONTENT_TYPE, "application/x-tar");
    if encrypt {
        request = request.header("swarm-encrypt", "true");
    }
    app.clone()
        .oneshot(request.body(Body::from(archive)).expect("request"))
        .await
        .expect("response")
}

#[tokio::test]
async fn dir_upload_resolves_paths() {
    let app = app();
    let png = deterministic_bytes(1_500);
    let archive = build_tar(&[
        ("robots.txt", b"User-agent: *\n".as_slice()),
        ("img/1.png", &png),
        ("img/2.png", b"second image".as_slice()),
    ]);

    let response = upload_dir(&app, archive, false).await;
    assert_eq!(response.status(), StatusCode::OK);
    let root = body_json(response).await["reference"]
        .as_str()
        .expect("reference")
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/bzz/{root}/img/1.png"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().expect("type"),
        "image/png"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .expect("disposition"),
        "inline; filename=\"1.png\""
    );
    assert_eq!(body_bytes(response).await, png);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/bzz/{root}/does-not-exist"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["message"], "path address not found");
    assert_eq!(json["code"], 404);
}

#[tokio::test]
async fn encrypted_dir_upload_resolves_paths() {
    let app = app();
    let archive = build_tar(&[("docs/readme.md", b"# drift\n".as_slice())]);

    let response = upload_dir(&app, archive, true).await;
    assert_eq!(response.status(), StatusCode::OK);
    let root = body_json(response).await["reference"]
        .as_str()
        .expect("reference")
        .to_string();
    assert_eq!(root.len(), 128);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/bzz/{root}/docs/readme.md"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"# drift\n");
}

#[tokio::test]
async fn empty_archive_is_rejected() {
    let app = app();
    let archive = build_tar(&[]);
    let response = upload_dir(&app, archive, false).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dirs_require_tar_content_type() {
    let app = app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/dirs")
                .header(header::CONTENT_TYPE, "application/zip")
                .body(Body::from("not a tar"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn file_downloads_via_bzz_reject_non_manifests() {
    let app = app();
    let reference = upload_file(&app, b"just a file", &[]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/bzz/{reference}/anything"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
