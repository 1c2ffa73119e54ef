//! End-to-end screening scenarios through the public service bundle, with CV bytes on
//! disk and the scoring capability served over HTTP by a mock server.

mod common {
    use std::sync::Arc;

    use hire_ai::config::{QueryConfig, ScoringConfig, ScreeningConfig};
    use hire_ai::workflows::screening::catalog::{NewApplicant, NewJobPost};
    use hire_ai::workflows::screening::documents::{FilesystemBlobStore, UploadRequest};
    use hire_ai::workflows::screening::{
        Applicant, Caller, HttpScoringClient, JobPost, MemoryStore, ScreeningServices,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use wiremock::MockServer;

    pub(super) struct Pipeline {
        pub(super) services: ScreeningServices<MemoryStore>,
        pub(super) storage: TempDir,
    }

    pub(super) fn recruiter() -> Caller {
        Caller::user("recruiter-1")
    }

    pub(super) fn pipeline(server: &MockServer, timeout_secs: u64) -> Pipeline {
        let storage = tempfile::tempdir().expect("temp dir");
        let scorer = HttpScoringClient::new(&ScoringConfig {
            endpoint: format!("{}/v1/", server.uri()),
            api_key: Some("test-key".to_string()),
            model: "test-model".to_string(),
            timeout_secs,
            max_cv_chars: 20_000,
        })
        .expect("client builds");
        let screening = ScreeningConfig {
            storage_dir: storage.path().to_path_buf(),
            ..ScreeningConfig::default()
        };

        let services = ScreeningServices::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FilesystemBlobStore::new(storage.path())),
            Arc::new(scorer),
            &screening,
            QueryConfig::default(),
        );

        Pipeline { services, storage }
    }

    pub(super) fn completion(content: &str) -> Value {
        json!({
            "choices": [{
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    impl Pipeline {
        pub(super) async fn applicant_with_cv(&self, cv: &str) -> (JobPost, Applicant) {
            let job = self
                .services
                .catalog
                .create_job_post(
                    &recruiter(),
                    NewJobPost {
                        title: "Backend Engineer".to_string(),
                        description: "Own our payment services.".to_string(),
                        required_skills: "Go, Kubernetes".to_string(),
                        ..NewJobPost::default()
                    },
                )
                .expect("job post created");
            let applicant = self
                .services
                .catalog
                .create_applicant(
                    &recruiter(),
                    NewApplicant {
                        job_post_id: Some(job.id),
                        first_name: "Jordan".to_string(),
                        last_name: "Reyes".to_string(),
                        email: "jordan@example.com".to_string(),
                        ..NewApplicant::default()
                    },
                )
                .expect("applicant created");
            self.services
                .documents
                .upload(
                    &recruiter(),
                    applicant.id,
                    UploadRequest {
                        file_name: "cv.txt".to_string(),
                        content_type: None,
                        bytes: cv.as_bytes().to_vec(),
                    },
                )
                .await
                .expect("upload accepted");
            (job, applicant)
        }
    }
}

use common::*;
use std::time::Duration;

use hire_ai::workflows::screening::{ApplicantOutcome, CvFileStatus, ScreeningStatus};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn applicant_is_scored_through_http_scorer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_string_contains("Seven years of Go"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"overall_score": 78, "summary": "Strong backend fit",
                "strengths": ["5y Go"], "weaknesses": ["No Kubernetes"],
                "detailed_analysis": "Solid"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, 5);
    let (job, applicant) = pipeline
        .applicant_with_cv("Jordan Reyes. Seven years of Go and PostgreSQL.")
        .await;

    let ticket = pipeline
        .services
        .orchestrator
        .start_batch(&recruiter(), &[applicant.id], job.id)
        .expect("batch accepted");
    let outcomes = ticket.join().await;
    assert_eq!(outcomes[0].outcome, ApplicantOutcome::Completed);

    let result = pipeline
        .services
        .orchestrator
        .results_for_applicant(&recruiter(), applicant.id)
        .expect("results visible")
        .remove(0);
    assert_eq!(result.status(), ScreeningStatus::Completed);
    let verdict = result.verdict().expect("verdict stored");
    assert_eq!(verdict.overall_score, 78);
    assert_eq!(verdict.strengths, vec!["5y Go"]);
    assert_eq!(verdict.weaknesses, vec!["No Kubernetes"]);

    let files = pipeline
        .services
        .documents
        .files_for_applicant(&recruiter(), applicant.id)
        .expect("files visible");
    assert_eq!(files[0].status, CvFileStatus::Processed);
    assert!(pipeline
        .storage
        .path()
        .join(&files[0].storage_key)
        .exists());
}

#[tokio::test]
async fn slow_scorer_times_out_into_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(r#"{"overall_score": 90, "summary": "late"}"#))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, 1);
    let (job, applicant) = pipeline.applicant_with_cv("Jordan Reyes. Go engineer.").await;

    let completed = pipeline
        .services
        .orchestrator
        .process(&recruiter(), applicant.id, job.id)
        .await
        .expect("screening runs");

    assert!(!completed);
    let result = pipeline
        .services
        .orchestrator
        .results_for_applicant(&recruiter(), applicant.id)
        .expect("results visible")
        .remove(0);
    assert_eq!(result.status(), ScreeningStatus::Failed);
    assert_eq!(result.error_message(), Some("scoring request timed out"));
    assert!(result.overall_score().is_none());
}

#[tokio::test]
async fn rejected_scoring_request_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "message": "context length exceeded", "type": "invalid_request_error" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, 5);
    let (job, applicant) = pipeline.applicant_with_cv("Jordan Reyes. Go engineer.").await;

    let completed = pipeline
        .services
        .orchestrator
        .process(&recruiter(), applicant.id, job.id)
        .await
        .expect("screening runs");

    assert!(!completed);
    let stats = pipeline
        .services
        .queries
        .job_screening_stats(&recruiter(), job.id)
        .expect("stats computed");
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.average_score, None);
}
