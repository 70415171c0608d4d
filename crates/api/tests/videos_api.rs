//! Integration tests for the `/api/v1/videos` resource.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    body_json, build_test_app, delete, get, post_empty, post_json, post_multipart, spooled_entries,
    survey_parts, upload_and_settle, Part,
};
use roadscan_remote::Detection;

// ---------------------------------------------------------------------------
// Listing and upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_starts_empty() {
    let app = build_test_app();
    let response = get(&app, "/api/v1/videos").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["records"], json!([]));
    assert_eq!(json["data"]["activeUploads"], json!([]));
    assert_eq!(json["data"]["isUploading"], false);
}

#[tokio::test]
async fn batch_upload_registers_then_transfers() {
    let app = build_test_app();
    let mut parts = survey_parts();
    parts.push(Part::File {
        field: "files",
        file_name: "a.mp4",
        bytes: b"aaaa",
    });
    parts.push(Part::File {
        field: "files",
        file_name: "nested/b.mp4",
        bytes: b"bbbbbbbb",
    });
    parts.push(Part::File {
        field: "gpx",
        file_name: "track.gpx",
        bytes: b"<gpx></gpx>",
    });

    let response = post_multipart(&app, "/api/v1/videos/upload", &parts).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let records = json["data"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "a.mp4");
    assert_eq!(records[1]["name"], "b.mp4");
    assert_eq!(records[1]["size"], 8);
    assert_eq!(records[0]["routeId"], "R5");
    assert!(records[0]["backendId"].is_string());

    app.ingest.wait_idle().await;

    let json = body_json(get(&app, "/api/v1/videos").await).await;
    let records = json["data"]["records"].as_array().unwrap();
    assert!(records.iter().all(|r| r["progress"] == 100));
    assert!(records.iter().all(|r| r["gpxFile"] == "track.gpx"));
    assert_eq!(json["data"]["activeUploads"], json!([]));
}

#[tokio::test]
async fn same_base_names_are_spooled_apart() {
    let app = build_test_app();
    let mut parts = survey_parts();
    parts.push(Part::File {
        field: "files",
        file_name: "day1/GX010001.MP4",
        bytes: b"first clip",
    });
    parts.push(Part::File {
        field: "files",
        file_name: "day2/GX010001.MP4",
        bytes: b"the second, longer clip",
    });

    let response = post_multipart(&app, "/api/v1/videos/upload", &parts).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    app.ingest.wait_idle().await;

    let records = json["data"].as_array().unwrap();
    assert_eq!(records[0]["name"], "GX010001.MP4");
    assert_eq!(records[1]["name"], "GX010001.MP4");
    for (record, expected) in records.iter().zip([10u64, 23]) {
        assert_eq!(record["size"], expected);
        let backend_id = record["backendId"].as_str().unwrap();
        let stored = app.backend.video(backend_id).await.unwrap();
        assert_eq!(stored.uploaded_bytes, Some(expected));
    }
}

#[tokio::test]
async fn finished_batch_leaves_the_spool_empty() {
    let app = build_test_app();
    let mut parts = survey_parts();
    parts.push(Part::File {
        field: "files",
        file_name: "a.mp4",
        bytes: b"aaaa",
    });
    parts.push(Part::File {
        field: "gpx",
        file_name: "track.gpx",
        bytes: b"<gpx></gpx>",
    });

    let response = post_multipart(&app, "/api/v1/videos/upload", &parts).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    app.ingest.wait_idle().await;

    assert_eq!(spooled_entries(&app), Vec::<std::path::PathBuf>::new());
}

#[tokio::test]
async fn rejected_batch_leaves_the_spool_empty() {
    let app = build_test_app();
    let parts = [
        Part::Text("route_id", "R5"),
        Part::Text("survey_date", "not a date"),
        Part::Text("surveyor_name", "Asha"),
        Part::File {
            field: "files",
            file_name: "a.mp4",
            bytes: b"aaaa",
        },
    ];

    let response = post_multipart(&app, "/api/v1/videos/upload", &parts).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(spooled_entries(&app).is_empty());
}

#[tokio::test]
async fn upload_without_files_is_a_bad_request() {
    let app = build_test_app();
    let response = post_multipart(&app, "/api/v1/videos/upload", &survey_parts()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(app.ingest.snapshot().records.is_empty());
}

#[tokio::test]
async fn upload_without_route_fails_validation() {
    let app = build_test_app();
    let parts = [
        Part::Text("survey_date", "2025-03-14"),
        Part::Text("surveyor_name", "Asha"),
        Part::File {
            field: "files",
            file_name: "a.mp4",
            bytes: b"aaaa",
        },
    ];

    let response = post_multipart(&app, "/api/v1/videos/upload", &parts).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("route_id"));
    assert_eq!(app.backend.video_count().await, 0);
}

#[tokio::test]
async fn upload_with_malformed_date_is_a_bad_request() {
    let app = build_test_app();
    let parts = [
        Part::Text("route_id", "R5"),
        Part::Text("survey_date", "14/03/2025"),
        Part::Text("surveyor_name", "Asha"),
        Part::File {
            field: "files",
            file_name: "a.mp4",
            bytes: b"aaaa",
        },
    ];

    let response = post_multipart(&app, "/api/v1/videos/upload", &parts).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.backend.surveys().await.is_empty());
}

#[tokio::test]
async fn library_import_returns_the_record() {
    let app = build_test_app();
    let response = post_json(
        &app,
        "/api/v1/videos/library",
        json!({
            "path": "library/route5/clip_0001.mp4",
            "size": 2048,
            "thumb_path": "library/route5/clip_0001.jpg",
            "route_id": "R5",
            "survey_date": "2025-03-14",
            "surveyor_name": "Asha",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["name"], "clip_0001.mp4");
    assert_eq!(json["data"]["status"], "uploading");
    assert_eq!(json["data"]["thumbnailUrl"], "library/route5/clip_0001.jpg");

    app.ingest.wait_idle().await;
}

#[tokio::test]
async fn library_import_requires_a_path() {
    let app = build_test_app();
    let response = post_json(
        &app,
        "/api/v1/videos/library",
        json!({
            "path": "",
            "size": 2048,
            "route_id": "R5",
            "survey_date": "2025-03-14",
            "surveyor_name": "Asha",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// ---------------------------------------------------------------------------
// Per-video operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_answers_not_implemented() {
    let app = build_test_app();
    let ids = upload_and_settle(&app, &["a.mp4"]).await;

    let response = post_empty(&app, &format!("/api/v1/videos/{}/retry", ids[0])).await;

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_IMPLEMENTED");
}

#[tokio::test]
async fn remove_deletes_the_record_once() {
    let app = build_test_app();
    let ids = upload_and_settle(&app, &["a.mp4", "b.mp4"]).await;
    let uri = format!("/api/v1/videos/{}", ids[0]);

    let response = delete(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["localId"], ids[0].as_str());
    assert_eq!(app.ingest.snapshot().records.len(), 1);

    let response = delete(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reset_returns_uploaded_record() {
    let app = build_test_app();
    let ids = upload_and_settle(&app, &["a.mp4"]).await;

    let response = post_empty(&app, &format!("/api/v1/videos/{}/reset", ids[0])).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "uploaded");
    assert_eq!(json["data"]["progress"], 0);

    let response = post_empty(&app, "/api/v1/videos/missing/reset").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn demo_processing_loads_detections() {
    let app = build_test_app();
    app.backend
        .seed_demo_detections(
            "sample-survey",
            vec![Detection {
                asset_type: "street_light".into(),
                category: None,
                latitude: 12.97,
                longitude: 77.59,
                confidence: Some(0.8),
                frame_time_secs: None,
                attributes: json!({}),
            }],
        )
        .await;
    let ids = upload_and_settle(&app, &["demo_clip.mp4"]).await;

    let detections_uri = format!("/api/v1/videos/{}/detections", ids[0]);
    assert_eq!(get(&app, &detections_uri).await.status(), StatusCode::NOT_FOUND);

    let response = post_empty(&app, &format!("/api/v1/videos/{}/process", ids[0])).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["mode"], "demo");
    assert_eq!(json["data"]["detections"], 1);

    let json = body_json(get(&app, &detections_uri).await).await;
    assert_eq!(json["data"][0]["assetType"], "street_light");
}

#[tokio::test]
async fn real_processing_start_is_reported() {
    let app = build_test_app();
    let ids = upload_and_settle(&app, &["GX010042.MP4"]).await;

    let response = post_empty(&app, &format!("/api/v1/videos/{}/process", ids[0])).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["mode"], "started");
    assert!(json["data"].get("detections").is_none());
}

#[tokio::test]
async fn rejected_processing_is_a_bad_gateway() {
    let app = build_test_app();
    app.backend.reject_processing("GPU pool exhausted").await;
    let ids = upload_and_settle(&app, &["GX010042.MP4"]).await;

    let response = post_empty(&app, &format!("/api/v1/videos/{}/process", ids[0])).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PROCESSING_REJECTED");
    assert!(json["error"].as_str().unwrap().contains("GPU pool exhausted"));
}

#[tokio::test]
async fn gpx_attach_updates_the_record() {
    let app = build_test_app();
    let ids = upload_and_settle(&app, &["a.mp4"]).await;
    let uri = format!("/api/v1/videos/{}/gpx", ids[0]);

    let response = post_multipart(
        &app,
        &uri,
        &[Part::File {
            field: "gpx",
            file_name: "late.gpx",
            bytes: b"<gpx></gpx>",
        }],
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["gpxFile"], "late.gpx");

    let response = post_multipart(&app, &uri, &[Part::Text("note", "no file")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(spooled_entries(&app).is_empty());
}

#[tokio::test]
async fn gpx_attach_to_unknown_video_is_not_found() {
    let app = build_test_app();
    let response = post_multipart(
        &app,
        "/api/v1/videos/missing/gpx",
        &[Part::File {
            field: "gpx",
            file_name: "late.gpx",
            bytes: b"<gpx></gpx>",
        }],
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
