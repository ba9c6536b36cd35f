//! Test doubles and wiring for pipeline and worker tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use art_intake::db::memory::MemoryStore;
use art_intake::models::job::{JobStatus, NewJob, ProcessingJob, SourceImage, TargetKind};
use art_intake::models::target::{Label, SafeSearch, TargetRecord, WebEntity};
use art_intake::services::fetch::{FetchError, ImageFetcher};
use art_intake::services::queue::JobQueue;
use art_intake::services::vision::{VisionClient, VisionError};
use art_intake::services::worker::{Pipeline, WorkerSettings};

use crate::fixtures::{TestImageFixture, ALL_IMAGES, CORRUPT_URL};

/// Scripted vision service.
#[derive(Default)]
pub struct FakeVision {
    pub safe_search: SafeSearch,
    pub labels: Vec<Label>,
    pub web_entities: Vec<WebEntity>,
    pub fail_safety: bool,
    pub fail_web: bool,
    pub fail_labels: bool,
    pub label_calls: AtomicUsize,
}

impl FakeVision {
    pub fn safe() -> Self {
        Self::default()
    }

    pub fn with_safe_search(safe_search: SafeSearch) -> Self {
        Self {
            safe_search,
            ..Self::default()
        }
    }

    pub fn with_labels(labels: &[(&str, f32)]) -> Self {
        Self {
            labels: labels.iter().map(|(d, s)| Label::new(*d, *s)).collect(),
            ..Self::default()
        }
    }
}

fn unavailable() -> VisionError {
    VisionError::Status(503, "service unavailable".to_string())
}

#[async_trait]
impl VisionClient for FakeVision {
    async fn detect_safety(&self, _image: &SourceImage) -> Result<SafeSearch, VisionError> {
        if self.fail_safety {
            return Err(unavailable());
        }
        Ok(self.safe_search)
    }

    async fn detect_web_entities(
        &self,
        _image: &SourceImage,
    ) -> Result<Vec<WebEntity>, VisionError> {
        if self.fail_web {
            return Err(unavailable());
        }
        Ok(self.web_entities.clone())
    }

    async fn detect_labels(&self, _image: &SourceImage) -> Result<Vec<Label>, VisionError> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_labels {
            return Err(unavailable());
        }
        Ok(self.labels.clone())
    }
}

/// Serves fixture bytes by URL and records how many fetches overlap.
pub struct FakeFetcher {
    images: HashMap<String, Vec<u8>>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    /// Every fixture image plus a corrupt body; anything else is a 404.
    pub fn with_fixtures() -> Self {
        let mut images: HashMap<String, Vec<u8>> = ALL_IMAGES
            .iter()
            .map(|f| (f.url.to_string(), f.bytes()))
            .collect();
        images.insert(CORRUPT_URL.to_string(), b"\x89PNG not really".to_vec());

        Self {
            images,
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.images.get(url).cloned().ok_or(FetchError::Status(404))
    }
}

pub fn source(url: &str) -> SourceImage {
    SourceImage {
        url: url.to_string(),
        external_id: Some(format!("ext-{}", Uuid::new_v4())),
        storage_folder: Some("folder-one/test/original".to_string()),
    }
}

/// Create a Pending target (as the upload flow would) and enqueue its job.
pub async fn upload(
    store: &MemoryStore,
    kind: TargetKind,
    target_id: &str,
    url: &str,
) -> ProcessingJob {
    store.put_target(TargetRecord::pending(kind, target_id, source(url)));
    store
        .enqueue(&NewJob::for_target(kind, target_id, source(url)))
        .await
        .expect("enqueue")
}

pub async fn upload_fixture(
    store: &MemoryStore,
    kind: TargetKind,
    target_id: &str,
    fixture: &TestImageFixture,
) -> ProcessingJob {
    upload(store, kind, target_id, fixture.url).await
}

/// Claim exactly one job, as the worker loop would before handing it off.
pub async fn claim_one(store: &MemoryStore) -> ProcessingJob {
    let mut jobs = store
        .claim(1, Duration::from_secs(60), 3)
        .await
        .expect("claim");
    assert_eq!(jobs.len(), 1, "expected one claimable job");
    jobs.remove(0)
}

pub fn pipeline(
    store: &Arc<MemoryStore>,
    vision: FakeVision,
    fetcher: &Arc<FakeFetcher>,
) -> Pipeline {
    Pipeline::new(
        store.clone(),
        store.clone(),
        Arc::new(vision),
        fetcher.clone(),
    )
}

pub fn fast_settings(concurrency: usize) -> WorkerSettings {
    WorkerSettings {
        concurrency,
        batch_size: 5,
        idle_poll: Duration::from_millis(10),
        busy_poll: Duration::from_millis(5),
        lease: Duration::from_secs(60),
        max_attempts: 3,
        shutdown_grace: Duration::from_secs(5),
    }
}

/// Poll until every job is terminal (or the timeout passes).
pub async fn wait_for_all_terminal(store: &MemoryStore, timeout: Duration) -> Vec<ProcessingJob> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let jobs = store.jobs();
        if jobs.iter().all(|j| j.status.is_terminal()) {
            return jobs;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "jobs still running after {:?}: {:?}",
                timeout,
                jobs.iter().map(|j| j.status).collect::<Vec<_>>()
            );
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_status(store: &MemoryStore, job_id: Uuid, status: JobStatus) {
    for _ in 0..500 {
        if let Some(job) = store.get(job_id).await.unwrap() {
            if job.status == status {
                return;
            }
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached {:?}", job_id, status);
}
