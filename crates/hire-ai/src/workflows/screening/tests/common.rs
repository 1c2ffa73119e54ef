use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Notify;

use crate::config::{QueryConfig, ScreeningConfig};
use crate::workflows::screening::catalog::{NewApplicant, NewJobPost};
use crate::workflows::screening::documents::{
    file_extension, storage_key, BlobStore, MemoryBlobStore, UploadRequest,
};
use crate::workflows::screening::domain::{
    Applicant, ApplicantId, Caller, CvFile, CvFileId, CvFileStatus, JobPost, JobPostId,
    ScreeningVerdict,
};
use crate::workflows::screening::memory::MemoryStore;
use crate::workflows::screening::repository::CvFileRepository;
use crate::workflows::screening::scoring::{Scorer, ScoringError, ScoringRequest};
use crate::workflows::screening::services::ScreeningServices;

pub(super) const CV_TEXT: &str = "Jordan Reyes\nSenior backend engineer. Seven years of Go, PostgreSQL and Kubernetes.";

pub(super) fn recruiter() -> Caller {
    Caller::user("recruiter-1")
}

pub(super) fn other_recruiter() -> Caller {
    Caller::user("recruiter-2")
}

pub(super) fn admin() -> Caller {
    Caller::admin("ops-admin")
}

pub(super) fn verdict(score: u8) -> ScreeningVerdict {
    ScreeningVerdict {
        overall_score: score,
        summary: "Strong backend fit".to_string(),
        strengths: vec!["5y Go".to_string(), "Distributed systems".to_string()],
        weaknesses: vec!["No Kubernetes".to_string()],
        detailed_analysis: "Solid match for the payments team.".to_string(),
    }
}

/// Answers every request with the same outcome and records what it was asked.
pub(super) struct StubScorer {
    outcome: Result<ScreeningVerdict, ScoringError>,
    requests: Mutex<Vec<ScoringRequest>>,
}

impl StubScorer {
    pub(super) fn returning(verdict: ScreeningVerdict) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(verdict),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn failing(error: ScoringError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn calls(&self) -> usize {
        self.requests.lock().expect("scorer mutex poisoned").len()
    }

    pub(super) fn requests(&self) -> Vec<ScoringRequest> {
        self.requests.lock().expect("scorer mutex poisoned").clone()
    }
}

#[async_trait]
impl Scorer for StubScorer {
    async fn score(&self, request: &ScoringRequest) -> Result<ScreeningVerdict, ScoringError> {
        self.requests
            .lock()
            .expect("scorer mutex poisoned")
            .push(request.clone());
        self.outcome.clone()
    }
}

/// Holds every request until the test releases it.
pub(super) struct GatedScorer {
    entered: Notify,
    release: Notify,
    verdict: ScreeningVerdict,
}

impl GatedScorer {
    pub(super) fn new(verdict: ScreeningVerdict) -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
            verdict,
        })
    }

    pub(super) async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub(super) fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Scorer for GatedScorer {
    async fn score(&self, _request: &ScoringRequest) -> Result<ScreeningVerdict, ScoringError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.verdict.clone())
    }
}

/// Sleeps through every request and remembers the most calls seen in flight at once.
pub(super) struct CountingScorer {
    active: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl CountingScorer {
    pub(super) fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        })
    }

    pub(super) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for CountingScorer {
    async fn score(&self, _request: &ScoringRequest) -> Result<ScreeningVerdict, ScoringError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(verdict(60))
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<MemoryStore>,
    pub(super) blobs: Arc<MemoryBlobStore>,
    pub(super) services: Arc<ScreeningServices<MemoryStore>>,
}

pub(super) fn harness(scorer: Arc<dyn Scorer>) -> Harness {
    harness_with(scorer, ScreeningConfig::default())
}

pub(super) fn harness_with(scorer: Arc<dyn Scorer>, screening: ScreeningConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::default());
    let services = ScreeningServices::new(
        Arc::clone(&store),
        blobs.clone(),
        scorer,
        &screening,
        QueryConfig::default(),
    );

    Harness {
        store,
        blobs,
        services: Arc::new(services),
    }
}

pub(super) fn new_job_post(title: &str) -> NewJobPost {
    NewJobPost {
        title: title.to_string(),
        description: "Own our payment services end to end.".to_string(),
        location: "Remote".to_string(),
        department: "Engineering".to_string(),
        employment_type: "full_time".to_string(),
        experience_level: "senior".to_string(),
        required_skills: "Go, Kubernetes".to_string(),
        ..NewJobPost::default()
    }
}

pub(super) fn new_applicant(job_post_id: JobPostId, first: &str, last: &str) -> NewApplicant {
    NewApplicant {
        job_post_id: Some(job_post_id),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!(
            "{}.{}@example.com",
            first.to_lowercase(),
            last.to_lowercase()
        ),
        ..NewApplicant::default()
    }
}

impl Harness {
    pub(super) fn job(&self, caller: &Caller, title: &str) -> JobPost {
        self.services
            .catalog
            .create_job_post(caller, new_job_post(title))
            .expect("job post created")
    }

    pub(super) fn applicant(
        &self,
        caller: &Caller,
        job_post_id: JobPostId,
        first: &str,
        last: &str,
    ) -> Applicant {
        self.services
            .catalog
            .create_applicant(caller, new_applicant(job_post_id, first, last))
            .expect("applicant created")
    }

    pub(super) async fn upload_text(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
        text: &str,
    ) -> CvFile {
        self.services
            .documents
            .upload(
                caller,
                applicant_id,
                UploadRequest {
                    file_name: "cv.txt".to_string(),
                    content_type: Some("text/plain".to_string()),
                    bytes: text.as_bytes().to_vec(),
                },
            )
            .await
            .expect("upload accepted")
    }

    /// Store a file record and its bytes directly, bypassing the upload policy.
    pub(super) async fn seed_file(
        &self,
        applicant_id: ApplicantId,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> CvFile {
        let id = CvFileId::new();
        let extension = file_extension(file_name);
        let key = storage_key(applicant_id, id, &extension);
        self.blobs.put(&key, bytes).await.expect("bytes stored");

        self.store
            .insert_cv_file(CvFile {
                id,
                applicant_id,
                file_name: file_name.to_string(),
                storage_key: key,
                content_type: content_type.to_string(),
                size_bytes: bytes.len() as u64,
                extension,
                extracted_text: None,
                failure_reason: None,
                uploaded_at: Utc::now(),
                status: CvFileStatus::Uploaded,
            })
            .expect("file record stored")
    }

    pub(super) fn file_status(&self, file_id: CvFileId) -> CvFileStatus {
        self.store
            .cv_file(file_id)
            .expect("store available")
            .expect("file exists")
            .status
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}
