mod common;

use std::time::Duration;

use assert_matches::assert_matches;

use common::{drain, errors, harness, survey};
use roadscan_core::video_status::VideoStatus;
use roadscan_events::NotificationLevel;
use roadscan_ingest::IngestError;
use roadscan_remote::{BackendCall, RemoteVideo};

#[tokio::test]
async fn retry_is_not_implemented_and_changes_nothing() {
    let h = harness();
    h.backend.fail_uploads_for("a.mp4").await;
    let records = h.upload_and_settle(&["a.mp4"]).await;
    let before = h.record(&records[0].local_id);
    assert_eq!(before.status, VideoStatus::Error);
    let mut notifications = h.manager.notifications();

    let err = h.manager.retry_upload(&records[0].local_id).await.unwrap_err();

    assert_matches!(err, IngestError::RetryUnsupported { ref name, .. } if name == "a.mp4");
    assert_eq!(h.record(&records[0].local_id), before);
    let all = drain(&mut notifications);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].video_name.as_deref(), Some("a.mp4"));
    assert!(all[0].message.contains("not implemented"));
}

#[tokio::test]
async fn reset_is_local_and_unconditional() {
    let h = harness();
    let records = h.upload_and_settle(&["a.mp4"]).await;
    h.backend
        .set_remote_status(
            records[0].backend_id.as_deref().unwrap(),
            RemoteVideo {
                status: "processing".into(),
                progress: Some(70.0),
                eta: Some("1 min".into()),
                error: None,
            },
        )
        .await;
    h.manager.poll_once().await;
    let calls_before = h.backend.calls().await.len();

    let record = h.manager.reset_video_status(&records[0].local_id).await.unwrap();

    assert_eq!(record.status, VideoStatus::Uploaded);
    assert_eq!(record.progress, 0);
    assert!(record.eta.is_none());
    assert_eq!(h.backend.calls().await.len(), calls_before);
}

#[tokio::test]
async fn reset_of_unknown_video_is_reported() {
    let h = harness();
    let mut notifications = h.manager.notifications();

    let err = h.manager.reset_video_status("missing").await.unwrap_err();

    assert_matches!(err, IngestError::UnknownVideo(_));
    let errs = drain(&mut notifications);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].level, NotificationLevel::Error);
    assert_eq!(errs[0].local_id.as_deref(), Some("missing"));
}

#[tokio::test]
async fn remove_of_unknown_video_is_reported() {
    let h = harness();
    h.upload_and_settle(&["a.mp4"]).await;
    let mut notifications = h.manager.notifications();

    let err = h.manager.remove_video("missing").await.unwrap_err();

    assert_matches!(err, IngestError::UnknownVideo(_));
    let errs = errors(&drain(&mut notifications)).len();
    assert_eq!(errs, 1);
    assert_eq!(h.manager.snapshot().records.len(), 1);
}

#[tokio::test]
async fn remove_deletes_only_that_record() {
    let h = harness();
    let records = h.upload_and_settle(&["a.mp4", "b.mp4"]).await;
    let calls_before = h.backend.calls().await.len();

    let removed = h.manager.remove_video(&records[0].local_id).await.unwrap();

    assert_eq!(removed.local_id, records[0].local_id);
    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].local_id, records[1].local_id);
    assert_eq!(h.backend.calls().await.len(), calls_before);
    assert_eq!(h.backend.video_count().await, 2);

    let err = h.manager.remove_video(&records[0].local_id).await.unwrap_err();
    assert_matches!(err, IngestError::UnknownVideo(_));
}

#[tokio::test]
async fn gpx_can_be_attached_after_upload() {
    let h = harness();
    let records = h.upload_and_settle(&["a.mp4"]).await;
    let mut notifications = h.manager.notifications();

    let record = h
        .manager
        .upload_gpx_for_video(&records[0].local_id, h.gpx("late.gpx"))
        .await
        .unwrap();

    assert_eq!(record.gpx_file.as_deref(), Some("late.gpx"));
    let remote = h
        .backend
        .video(records[0].backend_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(remote.gpx_file.as_deref(), Some("late.gpx"));

    let all = drain(&mut notifications);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].level, NotificationLevel::Success);
}

#[tokio::test]
async fn failed_gpx_attach_changes_nothing() {
    let h = harness();
    let records = h.upload_and_settle(&["a.mp4"]).await;
    h.backend.fail_gpx_uploads().await;
    let before = h.record(&records[0].local_id);
    let mut notifications = h.manager.notifications();

    let err = h
        .manager
        .upload_gpx_for_video(&records[0].local_id, h.gpx("late.gpx"))
        .await
        .unwrap_err();

    assert_matches!(err, IngestError::Remote { .. });
    assert_eq!(h.record(&records[0].local_id), before);
    assert_eq!(errors(&drain(&mut notifications)).len(), 1);
}

#[tokio::test]
async fn gpx_for_unknown_video_is_reported() {
    let h = harness();
    let mut notifications = h.manager.notifications();

    let err = h
        .manager
        .upload_gpx_for_video("missing", h.gpx("late.gpx"))
        .await
        .unwrap_err();

    assert_matches!(err, IngestError::UnknownVideo(_));
    assert_eq!(errors(&drain(&mut notifications)).len(), 1);
    assert!(!h
        .backend
        .calls()
        .await
        .iter()
        .any(|c| matches!(c, BackendCall::UploadGpx(..))));
}

#[tokio::test]
async fn full_lifecycle_from_selection_to_completion() {
    let h = harness();
    let mut notifications = h.manager.notifications();

    let records = h
        .manager
        .upload_files(vec![h.file("GX010042.MP4", 4096)], survey(), Some(h.gpx("track.gpx")))
        .await
        .unwrap();
    let local_id = records[0].local_id.clone();
    let backend_id = records[0].backend_id.clone().unwrap();
    h.manager.wait_idle().await;

    h.manager.poll_once().await;
    assert_eq!(h.record(&local_id).status, VideoStatus::Uploaded);

    h.manager.process_with_ai(&local_id).await.unwrap();
    assert_eq!(h.record(&local_id).status, VideoStatus::Processing);

    h.backend
        .set_remote_status(
            &backend_id,
            RemoteVideo {
                status: "completed".into(),
                progress: Some(100.0),
                ..RemoteVideo::default()
            },
        )
        .await;
    h.manager.poll_once().await;

    let stored = h.record(&local_id);
    assert_eq!(stored.status, VideoStatus::Completed);
    assert_eq!(stored.gpx_file.as_deref(), Some("track.gpx"));
    assert!(stored.thumbnail_url.is_some());

    let all = drain(&mut notifications);
    assert!(errors(&all).is_empty());
    assert_eq!(
        all.iter()
            .filter(|n| n.level == NotificationLevel::Success)
            .count(),
        1
    );
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_uploads() {
    let h = harness();
    let records = h
        .manager
        .upload_files(vec![h.file("a.mp4", 1024)], survey(), None)
        .await
        .unwrap();

    h.manager.shutdown(Duration::from_secs(5)).await;

    let stored = h.record(&records[0].local_id);
    assert_eq!(stored.progress, 100);
    assert!(h.manager.snapshot().active_uploads.is_empty());
}
