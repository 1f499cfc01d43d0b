mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::{FakeTranscoder, Harness, TIMEOUT};
use serde_json::Value;
use tower::ServiceExt;
use vod_pipeline::app::create_app;
use vod_pipeline::infrastructure::storage::playlist::variant_uris;
use vod_pipeline::modules::content::events::Job;

/// Asset 1 is fully processed; asset 2 lost its thumbnail leg.
async fn seeded() -> (Harness, Router) {
    let h = Harness::new(FakeTranscoder::new());

    let ready = h.register("ready").await;
    h.pipeline.handle(&Job::transcode(ready.id, TIMEOUT)).await.unwrap();
    h.pipeline.handle(&Job::thumbnail(ready.id, TIMEOUT)).await.unwrap();

    h.transcoder.fail_thumbnail();
    let failed = h.register("no-thumbnail").await;
    h.pipeline.handle(&Job::transcode(failed.id, TIMEOUT)).await.unwrap();
    h.pipeline.handle(&Job::thumbnail(failed.id, TIMEOUT)).await.unwrap();

    let app = create_app(h.state.clone());
    (h, app)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn lists_videos_newest_first() {
    let (_h, app) = seeded().await;
    let (status, body) = get(&app, "/videos").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "success");
    let videos = json["data"].as_array().unwrap();
    assert_eq!(videos.len(), 2);

    assert_eq!(videos[0]["id"], 2);
    assert_eq!(videos[0]["status"], "failed");
    assert!(videos[0]["thumbnail_url"].is_null());
    assert!(videos[0].get("error_detail").is_none());

    assert_eq!(videos[1]["id"], 1);
    assert_eq!(videos[1]["title"], "ready");
    assert_eq!(videos[1]["category"], "movie");
    assert_eq!(videos[1]["status"], "ready");
    assert_eq!(videos[1]["thumbnail_url"], "/videos/1/thumbnail");
}

#[tokio::test]
async fn serves_rendition_and_master_manifests() {
    let (_h, app) = seeded().await;

    let (status, body) = get(&app, "/videos/1/720p/manifest").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().starts_with("#EXTM3U"));

    let (status, body) = get(&app, "/videos/1/master/manifest").await;
    assert_eq!(status, StatusCode::OK);
    let master = String::from_utf8(body).unwrap();
    assert_eq!(
        variant_uris(&master),
        vec!["480p/index.m3u8", "720p/index.m3u8", "1080p/index.m3u8"]
    );
}

#[tokio::test]
async fn manifest_has_hls_content_type() {
    let (_h, app) = seeded().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/videos/1/480p/manifest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.apple.mpegurl"
    );
}

#[tokio::test]
async fn segments_and_thumbnails_have_media_types() {
    let (_h, app) = seeded().await;
    for (uri, expected) in [
        ("/videos/1/720p/000.ts", "video/mp2t"),
        ("/videos/1/thumbnail", "image/jpeg"),
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(response.headers()[header::CONTENT_TYPE], expected, "{uri}");
    }
}

#[tokio::test]
async fn serves_segments_and_rejects_traversal() {
    let (_h, app) = seeded().await;

    let (status, body) = get(&app, "/videos/1/720p/000.ts").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"segment "));

    for uri in [
        "/videos/1/720p/..",
        "/videos/1/720p/..%2Fmaster.m3u8",
        "/videos/1/720p/..%2F..%2Fthumbnails%2F1_thumbnail.jpg",
        "/videos/1/..%2F720p/000.ts",
        "/videos/1/720p/.hidden",
        "/videos/1/720p/999.ts",
    ] {
        let (status, _) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn unknown_resolution_or_asset_is_not_found() {
    let (_h, app) = seeded().await;

    for uri in [
        "/videos/1/4k/manifest",
        "/videos/99/720p/manifest",
        "/videos/99/master/manifest",
        "/videos/99/720p/000.ts",
        "/videos/99/thumbnail",
    ] {
        let (status, _) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn thumbnail_is_served_only_when_present() {
    let (_h, app) = seeded().await;

    let (status, body) = get(&app, "/videos/1/thumbnail").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"\xFF\xD8\xFF"));

    let (status, _) = get(&app, "/videos/2/thumbnail").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn segment_supports_byte_ranges() {
    let (_h, app) = seeded().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/videos/1/720p/000.ts")
                .header(header::RANGE, "bytes=0-6")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"segment");
}

#[tokio::test]
async fn health_check_answers() {
    let (_h, app) = seeded().await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}
