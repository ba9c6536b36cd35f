mod fixtures;
mod helpers;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use art_intake::app_state::AppState;
use art_intake::db::memory::MemoryStore;
use art_intake::models::job::{JobStatus, NewJob, TargetKind};
use art_intake::models::resolution::ResolutionRequest;
use art_intake::models::target::{ProcessingStatus, TargetRecord};
use art_intake::routes::{admin, health, jobs};

use fixtures::SHARP_PNG;
use helpers::source;

fn state(store: &Arc<MemoryStore>) -> AppState {
    AppState {
        queue: store.clone(),
        targets: store.clone(),
    }
}

fn resolution(body: serde_json::Value) -> ResolutionRequest {
    serde_json::from_value(body).expect("valid resolution body")
}

#[tokio::test]
async fn test_enqueue_and_poll_job() {
    let store = Arc::new(MemoryStore::new());
    let body: NewJob = serde_json::from_value(serde_json::json!({
        "artworkId": "art-1",
        "sourceImage": {
            "url": SHARP_PNG.url,
            "externalId": "img-1",
            "storageFolder": "folder-one/u1/original"
        }
    }))
    .unwrap();

    let (status, Json(job)) = jobs::enqueue_job(State(state(&store)), Json(body))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.target_kind, TargetKind::Artwork);
    assert_eq!(job.source_image.external_id.as_deref(), Some("img-1"));

    let Json(fetched) = jobs::get_job_status(State(state(&store)), Path(job.id))
        .await
        .unwrap();
    assert_eq!(fetched.id, job.id);
}

#[tokio::test]
async fn test_enqueue_rejects_ambiguous_target() {
    let store = Arc::new(MemoryStore::new());
    let body = NewJob {
        artwork_id: Some("art-1".to_string()),
        frame_id: Some("frame-1".to_string()),
        source_image: source(SHARP_PNG.url),
    };

    let err = jobs::enqueue_job(State(state(&store)), Json(body))
        .await
        .unwrap_err();
    assert_eq!(err, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(store.jobs().is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let store = Arc::new(MemoryStore::new());
    let err = jobs::get_job_status(State(state(&store)), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resolve_reprocess_enqueues() {
    let store = Arc::new(MemoryStore::new());
    let mut record = TargetRecord::pending(TargetKind::Frame, "frame-1", source(SHARP_PNG.url));
    record.processing_status = ProcessingStatus::Failed;
    record.processing_errors = vec!["not_a_frame".to_string()];
    store.put_target(record);

    let request = resolution(serde_json::json!({
        "targetId": "frame-1",
        "targetKind": "frame",
        "action": "reprocess",
        "resolvedBy": "admin@example.com"
    }));

    let Json(outcome) = admin::resolve_target(State(state(&store)), Json(request))
        .await
        .unwrap();
    assert_eq!(outcome.processing_status, ProcessingStatus::Pending);

    let job_id = outcome.job_id.expect("reprocess enqueues a job");
    let queued = store.jobs_for(TargetKind::Frame, "frame-1");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, job_id);
    assert_eq!(queued[0].source_image.url, SHARP_PNG.url);
}

#[tokio::test]
async fn test_resolve_status_codes() {
    let store = Arc::new(MemoryStore::new());
    let mut bare = TargetRecord::pending(TargetKind::Artwork, "art-bare", source(SHARP_PNG.url));
    bare.image = None;
    store.put_target(bare);

    let missing = resolution(serde_json::json!({
        "targetId": "nope",
        "targetKind": "artwork",
        "action": "approve"
    }));
    assert_eq!(
        admin::resolve_target(State(state(&store)), Json(missing))
            .await
            .unwrap_err(),
        StatusCode::NOT_FOUND
    );

    let no_image = resolution(serde_json::json!({
        "targetId": "art-bare",
        "targetKind": "artwork",
        "action": "reprocess"
    }));
    assert_eq!(
        admin::resolve_target(State(state(&store)), Json(no_image))
            .await
            .unwrap_err(),
        StatusCode::CONFLICT
    );

    let blank_id = resolution(serde_json::json!({
        "targetId": "",
        "targetKind": "artwork",
        "action": "reject"
    }));
    assert_eq!(
        admin::resolve_target(State(state(&store)), Json(blank_id))
            .await
            .unwrap_err(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn test_health_reports_queue_depth() {
    let store = Arc::new(MemoryStore::new());
    helpers::upload(&store, TargetKind::Artwork, "art-1", SHARP_PNG.url).await;

    let (status, Json(body)) = health::health_check(State(state(&store))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, "ok");
    assert_eq!(body.checks.database.pending_jobs, Some(1));
}
