use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::screening::memory::MemoryStore;
use crate::workflows::screening::router::{
    get_result_handler, screening_router, CallerIdentity, FILE_NAME_HEADER, USER_ID_HEADER,
    USER_ROLE_HEADER,
};
use crate::workflows::screening::domain::ScreeningResultId;

fn json_request(method: &str, uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, user)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn as_admin(mut request: Request<Body>) -> Request<Body> {
    request
        .headers_mut()
        .insert(USER_ROLE_HEADER, "admin".parse().unwrap());
    request
}

fn get_request(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(USER_ID_HEADER, user)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let h = harness(StubScorer::returning(verdict(50)));
    let router = screening_router(h.services.clone());

    let response = router
        .oneshot(Request::get("/api/v1/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_screening_flow_over_http() {
    let h = harness(StubScorer::returning(verdict(78)));
    let router = screening_router(h.services.clone());

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            "recruiter-1",
            json!({
                "title": "Backend Engineer",
                "description": "Own our payment services.",
                "required_skills": "Go, Kubernetes"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let job = read_json_body(response).await;
    let job_id = job["id"].as_str().unwrap().to_string();
    assert_eq!(job["status"], "active");

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/applicants",
            "recruiter-1",
            json!({
                "job_post_id": job_id,
                "first_name": "Jordan",
                "last_name": "Reyes",
                "email": "jordan@example.com"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let applicant = read_json_body(response).await;
    let applicant_id = applicant["id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/applicants/{applicant_id}/cv-files"))
                .header(USER_ID_HEADER, "recruiter-1")
                .header(FILE_NAME_HEADER, "cv.txt")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from(CV_TEXT))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let file = read_json_body(response).await;
    assert_eq!(file["status"], "uploaded");

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/applicants/{applicant_id}/screenings"),
            "recruiter-1",
            json!({ "job_post_id": job_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = read_json_body(response).await;
    assert_eq!(outcome["completed"], true);
    assert_eq!(outcome["result"]["status"], "completed");
    assert_eq!(outcome["result"]["overall_score"], 78);

    let response = router
        .clone()
        .oneshot(get_request(
            "/api/v1/applicants?page_size=500&sort=score_desc",
            "recruiter-1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = read_json_body(response).await;
    assert_eq!(page["total_count"], 1);
    assert_eq!(page["page_size"], 100);
    assert_eq!(page["items"][0]["latest_screening"]["overall_score"], 78);
    assert_eq!(page["items"][0]["cv_files"][0]["status"], "processed");

    let response = router
        .clone()
        .oneshot(get_request(
            &format!("/api/v1/jobs/{job_id}/results.csv"),
            "recruiter-1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let csv = read_text_body(response).await;
    assert_eq!(csv.lines().count(), 2);

    let response = router
        .oneshot(get_request(&format!("/api/v1/jobs/{job_id}"), "recruiter-2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_upload_is_unprocessable() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let router = screening_router(h.services.clone());

    let response = router
        .oneshot(
            Request::post(format!("/api/v1/applicants/{}/cv-files", applicant.id))
                .header(USER_ID_HEADER, "recruiter-1")
                .header(FILE_NAME_HEADER, "setup.exe")
                .body(Body::from("MZ"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains(".exe"));
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn foreign_batch_lists_rejected_applicants() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let other_job = h.job(&recruiter(), "Data Engineer");
    let ours = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let theirs = h.applicant(&recruiter(), other_job.id, "Sam", "Okafor");
    let router = screening_router(h.services.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{}/screenings", job.id),
            "recruiter-1",
            json!({ "applicant_ids": [ours.id, theirs.id] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["applicant_ids"], json!([theirs.id]));
    assert_eq!(h.store.screening_row_count().unwrap(), 0);
}

#[tokio::test]
async fn accepted_batch_returns_immediately() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let router = screening_router(h.services.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{}/screenings", job.id),
            "recruiter-1",
            json!({ "applicant_ids": [applicant.id] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json_body(response).await;
    assert_eq!(body["accepted"], json!([applicant.id]));
}

#[tokio::test]
async fn override_route_enforces_admin_role() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let stalled = {
        use crate::workflows::screening::repository::ScreeningResultRepository;
        h.store
            .begin_screening(crate::workflows::screening::domain::ScreeningResult::start(
                applicant.id,
                job.id,
                chrono::Utc::now(),
            ))
            .unwrap()
    };
    let router = screening_router(h.services.clone());
    let uri = format!("/api/v1/screenings/{}/status", stalled.id);

    let response = router
        .clone()
        .oneshot(json_request(
            "PUT",
            &uri,
            "recruiter-1",
            json!({ "status": "failed" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(as_admin(json_request(
            "PUT",
            &uri,
            "ops-admin",
            json!({ "status": "processing" }),
        )))
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    let response = router
        .oneshot(as_admin(json_request(
            "PUT",
            &uri,
            "ops-admin",
            json!({ "status": "failed", "error_message": "scorer outage" }),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error_message"], "scorer outage");
}

#[tokio::test]
async fn validate_route_reports_reason() {
    let h = harness(StubScorer::returning(verdict(50)));
    let router = screening_router(h.services.clone());

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/cv-files/validate",
            "recruiter-1",
            json!({ "file_name": "cv.pdf", "content_type": "application/pdf", "size_bytes": 4096 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["valid"], true);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/cv-files/validate",
            "recruiter-1",
            json!({ "file_name": "cv.pdf", "size_bytes": 0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "file is empty");
}

#[tokio::test]
async fn missing_result_handler_returns_not_found() {
    let h = harness(StubScorer::returning(verdict(50)));
    let services: Arc<_> = h.services.clone();

    let response = get_result_handler::<MemoryStore>(
        State(services),
        CallerIdentity(recruiter()),
        Path(ScreeningResultId::new()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
