use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::catalog::{CatalogError, NewApplicant, NewJobPost};
use super::documents::{DocumentError, StorageError, UploadRequest};
use super::domain::{
    ApplicantId, ApplicantStatus, Caller, CvFileId, JobPostId, ScreeningResultId,
};
use super::orchestrator::{ScreeningError, StatusOverride};
use super::patch::{ApplicantPatch, JobPostPatch};
use super::query::{ApplicantListRequest, QueryError};
use super::repository::{RecruitmentStore, RepositoryError};
use super::services::ScreeningServices;
use super::validation::ValidationError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const FILE_NAME_HEADER: &str = "x-file-name";

type Services<S> = State<Arc<ScreeningServices<S>>>;

/// Router builder exposing catalog, document, screening, and query endpoints.
pub fn screening_router<S>(services: Arc<ScreeningServices<S>>) -> Router
where
    S: RecruitmentStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/jobs",
            post(create_job_handler::<S>).get(list_jobs_handler::<S>),
        )
        .route(
            "/api/v1/jobs/:job_post_id",
            get(get_job_handler::<S>).patch(update_job_handler::<S>),
        )
        .route("/api/v1/jobs/:job_post_id/stats", get(job_stats_handler::<S>))
        .route(
            "/api/v1/jobs/:job_post_id/results.csv",
            get(export_csv_handler::<S>),
        )
        .route(
            "/api/v1/jobs/:job_post_id/screenings",
            post(start_batch_handler::<S>),
        )
        .route(
            "/api/v1/applicants",
            post(create_applicant_handler::<S>).get(list_applicants_handler::<S>),
        )
        .route(
            "/api/v1/applicants/:applicant_id",
            get(get_applicant_handler::<S>).patch(update_applicant_handler::<S>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/status",
            put(set_applicant_status_handler::<S>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/cv-files",
            post(upload_handler::<S>).get(list_files_handler::<S>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/screenings",
            post(process_handler::<S>).get(applicant_results_handler::<S>),
        )
        .route("/api/v1/cv-files/validate", post(validate_handler::<S>))
        .route(
            "/api/v1/cv-files/:file_id",
            axum::routing::delete(delete_file_handler::<S>),
        )
        .route("/api/v1/cv-files/:file_id/extract", post(extract_handler::<S>))
        .route("/api/v1/cv-files/:file_id/content", get(content_handler::<S>))
        .route(
            "/api/v1/screenings/:result_id",
            get(get_result_handler::<S>).delete(delete_result_handler::<S>),
        )
        .route(
            "/api/v1/screenings/:result_id/status",
            put(override_status_handler::<S>),
        )
        .with_state(services)
}

/// Caller identity taken from the headers set by the upstream identity proxy.
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Caller);

#[axum::async_trait]
impl<St> FromRequestParts<St> for CallerIdentity
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                error_response(StatusCode::UNAUTHORIZED, "missing caller identity".to_string())
            })?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        let caller = if is_admin {
            Caller::admin(user_id)
        } else {
            Caller::user(user_id)
        };
        Ok(CallerIdentity(caller))
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn repository_error_response(error: RepositoryError) -> Response {
    match error {
        RepositoryError::NotFound | RepositoryError::ForeignKey(_) => {
            error_response(StatusCode::NOT_FOUND, "record not found".to_string())
        }
        RepositoryError::Conflict | RepositoryError::InvalidTransition { .. } => {
            error_response(StatusCode::CONFLICT, error.to_string())
        }
        RepositoryError::Unavailable(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
        }
    }
}

fn validation_response(error: ValidationError) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
}

fn catalog_error_response(error: CatalogError) -> Response {
    match error {
        CatalogError::Validation(error) => validation_response(error),
        CatalogError::NotFound => error_response(StatusCode::NOT_FOUND, error.to_string()),
        CatalogError::Repository(error) => repository_error_response(error),
    }
}

fn document_error_response(error: DocumentError) -> Response {
    match error {
        DocumentError::Validation(error) => validation_response(error),
        DocumentError::NotFound | DocumentError::Storage(StorageError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "document not found".to_string())
        }
        DocumentError::Extraction(error) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
        }
        DocumentError::Storage(error) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
        DocumentError::Repository(error) => repository_error_response(error),
    }
}

fn screening_error_response(error: ScreeningError) -> Response {
    match error {
        ScreeningError::NotFound => error_response(StatusCode::NOT_FOUND, error.to_string()),
        ScreeningError::AlreadyInProgress(_) | ScreeningError::InvalidTransition { .. } => {
            error_response(StatusCode::CONFLICT, error.to_string())
        }
        ScreeningError::ForeignApplicants(ref applicant_ids) => {
            let payload = json!({
                "error": error.to_string(),
                "applicant_ids": applicant_ids,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        ScreeningError::Unauthorized => error_response(StatusCode::FORBIDDEN, error.to_string()),
        ScreeningError::Validation(error) => validation_response(error),
        ScreeningError::Repository(error) => repository_error_response(error),
    }
}

fn query_error_response(error: QueryError) -> Response {
    match error {
        QueryError::NotFound => error_response(StatusCode::NOT_FOUND, error.to_string()),
        QueryError::Repository(error) => repository_error_response(error),
        QueryError::Export(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

pub(crate) async fn create_job_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<NewJobPost>,
) -> Response {
    match services.catalog.create_job_post(&caller, request) {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn list_jobs_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
) -> Response {
    match services.catalog.job_posts(&caller) {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn get_job_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(job_post_id): Path<JobPostId>,
) -> Response {
    match services.catalog.job_post(&caller, job_post_id) {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn update_job_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(job_post_id): Path<JobPostId>,
    Json(patch): Json<JobPostPatch>,
) -> Response {
    match services.catalog.update_job_post(&caller, job_post_id, patch) {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn job_stats_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(job_post_id): Path<JobPostId>,
) -> Response {
    match services.queries.job_screening_stats(&caller, job_post_id) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => query_error_response(error),
    }
}

pub(crate) async fn export_csv_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(job_post_id): Path<JobPostId>,
) -> Response {
    match services.queries.export_results_csv(&caller, job_post_id) {
        Ok(csv) => {
            let disposition = format!("attachment; filename=\"screening-{job_post_id}.csv\"");
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            );
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            (StatusCode::OK, headers, csv).into_response()
        }
        Err(error) => query_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchRequest {
    applicant_ids: Vec<ApplicantId>,
}

pub(crate) async fn start_batch_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(job_post_id): Path<JobPostId>,
    Json(request): Json<BatchRequest>,
) -> Response {
    match services
        .orchestrator
        .start_batch(&caller, &request.applicant_ids, job_post_id)
    {
        Ok(ticket) => {
            let payload = json!({
                "job_post_id": ticket.job_post_id,
                "accepted": ticket.accepted,
            });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        Err(error) => screening_error_response(error),
    }
}

pub(crate) async fn create_applicant_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Json(request): Json<NewApplicant>,
) -> Response {
    match services.catalog.create_applicant(&caller, request) {
        Ok(applicant) => (StatusCode::CREATED, Json(applicant)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn list_applicants_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Query(request): Query<ApplicantListRequest>,
) -> Response {
    match services.queries.list_applicants(&caller, request) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => query_error_response(error),
    }
}

pub(crate) async fn get_applicant_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(applicant_id): Path<ApplicantId>,
) -> Response {
    match services.catalog.applicant(&caller, applicant_id) {
        Ok(applicant) => (StatusCode::OK, Json(applicant)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn update_applicant_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(applicant_id): Path<ApplicantId>,
    Json(patch): Json<ApplicantPatch>,
) -> Response {
    match services.catalog.update_applicant(&caller, applicant_id, patch) {
        Ok(applicant) => (StatusCode::OK, Json(applicant)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    status: ApplicantStatus,
}

pub(crate) async fn set_applicant_status_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(applicant_id): Path<ApplicantId>,
    Json(request): Json<StatusRequest>,
) -> Response {
    match services
        .catalog
        .set_applicant_status(&caller, applicant_id, request.status)
    {
        Ok(applicant) => (StatusCode::OK, Json(applicant)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn upload_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(applicant_id): Path<ApplicantId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(file_name) = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
    else {
        return validation_response(ValidationError::MissingField(FILE_NAME_HEADER));
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let request = UploadRequest {
        file_name,
        content_type,
        bytes: body.to_vec(),
    };
    match services.documents.upload(&caller, applicant_id, request).await {
        Ok(file) => (StatusCode::CREATED, Json(file)).into_response(),
        Err(error) => document_error_response(error),
    }
}

pub(crate) async fn list_files_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(applicant_id): Path<ApplicantId>,
) -> Response {
    match services.documents.files_for_applicant(&caller, applicant_id) {
        Ok(files) => (StatusCode::OK, Json(files)).into_response(),
        Err(error) => document_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessRequest {
    job_post_id: JobPostId,
}

pub(crate) async fn process_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(applicant_id): Path<ApplicantId>,
    Json(request): Json<ProcessRequest>,
) -> Response {
    match services
        .orchestrator
        .process_outcome(&caller, applicant_id, request.job_post_id)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => screening_error_response(error),
    }
}

pub(crate) async fn applicant_results_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(applicant_id): Path<ApplicantId>,
) -> Response {
    match services
        .orchestrator
        .results_for_applicant(&caller, applicant_id)
    {
        Ok(results) => (StatusCode::OK, Json(results)).into_response(),
        Err(error) => screening_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateRequest {
    file_name: String,
    #[serde(default)]
    content_type: Option<String>,
    size_bytes: u64,
}

pub(crate) async fn validate_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(_caller): CallerIdentity,
    Json(request): Json<ValidateRequest>,
) -> Response {
    match services.documents.validate(
        &request.file_name,
        request.content_type.as_deref(),
        request.size_bytes,
    ) {
        Ok(()) => (StatusCode::OK, Json(json!({ "valid": true }))).into_response(),
        Err(error) => {
            let payload = json!({ "valid": false, "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn extract_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(file_id): Path<CvFileId>,
) -> Response {
    match services.documents.extract(&caller, file_id).await {
        Ok(file) => (StatusCode::OK, Json(file)).into_response(),
        Err(error) => document_error_response(error),
    }
}

pub(crate) async fn content_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(file_id): Path<CvFileId>,
) -> Response {
    match services.documents.content(&caller, file_id).await {
        Ok(content) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&content.content_type) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            let disposition = format!(
                "attachment; filename=\"{}\"",
                content.file_name.replace('"', "")
            );
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            (StatusCode::OK, headers, content.bytes).into_response()
        }
        Err(error) => document_error_response(error),
    }
}

pub(crate) async fn delete_file_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(file_id): Path<CvFileId>,
) -> Response {
    match services.documents.delete_file(&caller, file_id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => document_error_response(error),
    }
}

pub(crate) async fn get_result_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(result_id): Path<ScreeningResultId>,
) -> Response {
    match services.orchestrator.get_result(&caller, result_id) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => screening_error_response(error),
    }
}

pub(crate) async fn delete_result_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(result_id): Path<ScreeningResultId>,
) -> Response {
    match services.orchestrator.delete_result(&caller, result_id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => screening_error_response(error),
    }
}

pub(crate) async fn override_status_handler<S: RecruitmentStore + 'static>(
    State(services): Services<S>,
    CallerIdentity(caller): CallerIdentity,
    Path(result_id): Path<ScreeningResultId>,
    Json(target): Json<StatusOverride>,
) -> Response {
    match services
        .orchestrator
        .override_status(&caller, result_id, target)
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => screening_error_response(error),
    }
}
