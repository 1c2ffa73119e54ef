use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::visible_job;
use super::domain::{
    ApplicantId, ApplicantStatus, Caller, JobPostId, ScreeningResult, ScreeningResultId,
    ScreeningStatus,
};
use super::repository::{
    ApplicantFilter, ApplicantSort, DirectoryQuery, DirectoryRow, OwnerScope, RecruitmentStore,
    RepositoryError,
};
use crate::config::QueryConfig;

const TOP_RESULTS: usize = 5;
const EXPORT_HEADER: [&str; 13] = [
    "applicant_id",
    "first_name",
    "last_name",
    "email",
    "applicant_status",
    "applied_at",
    "screening_status",
    "overall_score",
    "summary",
    "strengths",
    "weaknesses",
    "error_message",
    "completed_at",
];

/// Listing request; every field is optional and out-of-range paging is clamped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicantListRequest {
    pub job_post_id: Option<JobPostId>,
    pub status: Option<ApplicantStatus>,
    pub search: Option<String>,
    /// One-based.
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub sort: Option<ApplicantSort>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicantPage {
    pub items: Vec<DirectoryRow>,
    /// Every match in the caller's scope, ignoring paging.
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub applicant_id: ApplicantId,
    pub applicant_name: String,
    pub result_id: ScreeningResultId,
    pub overall_score: u8,
    pub summary: String,
}

/// Screening progress for one job post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobScreeningStats {
    pub job_post_id: JobPostId,
    pub applicants: usize,
    /// Applicants with at least one screening attempt.
    pub screened_applicants: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean over each applicant's latest completed score.
    pub average_score: Option<f64>,
    pub top_results: Vec<RankedResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("csv export failed: {0}")]
    Export(String),
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    applicant_id: ApplicantId,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    applicant_status: &'static str,
    applied_at: DateTime<Utc>,
    screening_status: &'static str,
    overall_score: Option<u8>,
    summary: &'a str,
    strengths: String,
    weaknesses: String,
    error_message: &'a str,
    completed_at: Option<DateTime<Utc>>,
}

/// Read side over applicants and their screenings.
pub struct ApplicantQueryEngine<S> {
    store: Arc<S>,
    config: QueryConfig,
}

impl<S> ApplicantQueryEngine<S>
where
    S: RecruitmentStore + 'static,
{
    pub fn new(store: Arc<S>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    /// Scoped listing; callers never learn about rows outside their scope, counts included.
    pub fn list_applicants(
        &self,
        caller: &Caller,
        request: ApplicantListRequest,
    ) -> Result<ApplicantPage, QueryError> {
        let page = request.page.unwrap_or(1).max(1);
        let page_size = self.config.clamp_page_size(request.page_size);

        let query = DirectoryQuery {
            scope: OwnerScope::for_caller(caller),
            filter: ApplicantFilter {
                job_post_id: request.job_post_id,
                status: request.status,
                search: request
                    .search
                    .map(|search| search.trim().to_string())
                    .filter(|search| !search.is_empty()),
            },
            sort: request.sort.unwrap_or_default(),
            offset: (page - 1).saturating_mul(page_size),
            limit: page_size,
        };

        let directory = self.store.list_applicants(&query)?;
        Ok(ApplicantPage {
            total_pages: directory.total_count.div_ceil(page_size),
            items: directory.rows,
            total_count: directory.total_count,
            page,
            page_size,
        })
    }

    pub fn job_screening_stats(
        &self,
        caller: &Caller,
        job_post_id: JobPostId,
    ) -> Result<JobScreeningStats, QueryError> {
        visible_job(self.store.as_ref(), caller, job_post_id)?.ok_or(QueryError::NotFound)?;

        let applicants = self.store.applicants_for_job(job_post_id)?;
        let results = self.store.screening_results_for_job(job_post_id)?;
        let names: HashMap<ApplicantId, String> = applicants
            .iter()
            .map(|applicant| (applicant.id, applicant.full_name()))
            .collect();

        let count = |status: ScreeningStatus| {
            results
                .iter()
                .filter(|result| result.status() == status)
                .count()
        };

        let mut ranked: Vec<RankedResult> = latest_completed(&results)
            .into_iter()
            .filter_map(|result| {
                let verdict = result.verdict()?;
                Some(RankedResult {
                    applicant_id: result.applicant_id,
                    applicant_name: names.get(&result.applicant_id).cloned().unwrap_or_default(),
                    result_id: result.id,
                    overall_score: verdict.overall_score,
                    summary: verdict.summary.clone(),
                })
            })
            .collect();

        let average_score = (!ranked.is_empty()).then(|| {
            ranked
                .iter()
                .map(|entry| f64::from(entry.overall_score))
                .sum::<f64>()
                / ranked.len() as f64
        });
        ranked.sort_by(|a, b| {
            b.overall_score
                .cmp(&a.overall_score)
                .then_with(|| a.applicant_name.cmp(&b.applicant_name))
        });
        ranked.truncate(TOP_RESULTS);

        Ok(JobScreeningStats {
            job_post_id,
            applicants: applicants.len(),
            screened_applicants: latest_by_applicant(&results).len(),
            processing: count(ScreeningStatus::Processing),
            completed: count(ScreeningStatus::Completed),
            failed: count(ScreeningStatus::Failed),
            average_score,
            top_results: ranked,
        })
    }

    /// One CSV row per applicant with their latest screening, if any.
    pub fn export_results_csv(
        &self,
        caller: &Caller,
        job_post_id: JobPostId,
    ) -> Result<String, QueryError> {
        visible_job(self.store.as_ref(), caller, job_post_id)?.ok_or(QueryError::NotFound)?;

        let applicants = self.store.applicants_for_job(job_post_id)?;
        let results = self.store.screening_results_for_job(job_post_id)?;
        let latest = latest_by_applicant(&results);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(EXPORT_HEADER)
            .map_err(|err| QueryError::Export(err.to_string()))?;
        for applicant in &applicants {
            let result = latest.get(&applicant.id).copied();
            let verdict = result.and_then(ScreeningResult::verdict);
            writer
                .serialize(ExportRow {
                    applicant_id: applicant.id,
                    first_name: &applicant.first_name,
                    last_name: &applicant.last_name,
                    email: &applicant.email,
                    applicant_status: applicant.status.label(),
                    applied_at: applicant.applied_at,
                    screening_status: result
                        .map(|result| result.status().label())
                        .unwrap_or("not_screened"),
                    overall_score: verdict.map(|verdict| verdict.overall_score),
                    summary: verdict.map(|verdict| verdict.summary.as_str()).unwrap_or_default(),
                    strengths: verdict
                        .map(|verdict| verdict.strengths.join("; "))
                        .unwrap_or_default(),
                    weaknesses: verdict
                        .map(|verdict| verdict.weaknesses.join("; "))
                        .unwrap_or_default(),
                    error_message: result
                        .and_then(ScreeningResult::error_message)
                        .unwrap_or_default(),
                    completed_at: result.and_then(|result| result.completed_at),
                })
                .map_err(|err| QueryError::Export(err.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| QueryError::Export(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| QueryError::Export(err.to_string()))
    }
}

/// Input must be most recent first, as the repository returns it.
fn latest_by_applicant(results: &[ScreeningResult]) -> HashMap<ApplicantId, &ScreeningResult> {
    let mut latest = HashMap::new();
    for result in results {
        latest.entry(result.applicant_id).or_insert(result);
    }
    latest
}

fn latest_completed(results: &[ScreeningResult]) -> Vec<&ScreeningResult> {
    let mut seen = HashMap::new();
    for result in results.iter().filter(|result| result.verdict().is_some()) {
        seen.entry(result.applicant_id).or_insert(result);
    }
    seen.into_values().collect()
}
