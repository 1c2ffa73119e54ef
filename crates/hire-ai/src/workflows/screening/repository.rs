use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::{decode_string_list, encode_string_list};
use super::domain::{
    Applicant, ApplicantId, ApplicantStatus, Caller, CvFile, CvFileId, CvFileStatus,
    CvFileSummary, JobPost, JobPostId, ScreeningResult, ScreeningResultId, ScreeningSnapshot,
    ScreeningState, ScreeningStatus, ScreeningVerdict, UserId,
};

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("referenced {0} does not exist")]
    ForeignKey(&'static str),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub trait JobPostRepository: Send + Sync {
    fn insert_job_post(&self, job: JobPost) -> Result<JobPost, RepositoryError>;
    /// Read-modify-write under the row lock. Identity and owner are kept as stored.
    fn modify_job_post(
        &self,
        id: JobPostId,
        change: &mut dyn FnMut(JobPost) -> JobPost,
    ) -> Result<JobPost, RepositoryError>;
    fn job_post(&self, id: JobPostId) -> Result<Option<JobPost>, RepositoryError>;
    /// Newest first, restricted to the scope.
    fn job_posts(&self, scope: &OwnerScope) -> Result<Vec<JobPost>, RepositoryError>;
}

pub trait ApplicantRepository: Send + Sync {
    /// Fails with `ForeignKey` when the job post does not exist.
    fn insert_applicant(&self, applicant: Applicant) -> Result<Applicant, RepositoryError>;
    /// Read-modify-write under the row lock. Identity and `job_post_id` are kept as stored.
    fn modify_applicant(
        &self,
        id: ApplicantId,
        change: &mut dyn FnMut(Applicant) -> Applicant,
    ) -> Result<Applicant, RepositoryError>;
    fn applicant(&self, id: ApplicantId) -> Result<Option<Applicant>, RepositoryError>;
    /// Batch lookup in one round trip; unknown ids are simply absent from the output.
    fn applicants(&self, ids: &[ApplicantId]) -> Result<Vec<Applicant>, RepositoryError>;
    fn applicants_for_job(&self, job_post_id: JobPostId)
        -> Result<Vec<Applicant>, RepositoryError>;
}

pub trait CvFileRepository: Send + Sync {
    /// Fails with `ForeignKey` when the applicant does not exist.
    fn insert_cv_file(&self, file: CvFile) -> Result<CvFile, RepositoryError>;
    fn cv_file(&self, id: CvFileId) -> Result<Option<CvFile>, RepositoryError>;
    /// Newest upload first.
    fn cv_files_for_applicant(
        &self,
        applicant_id: ApplicantId,
    ) -> Result<Vec<CvFile>, RepositoryError>;
    /// Applies one step of the extraction lifecycle under the row lock.
    fn transition_cv_file(
        &self,
        id: CvFileId,
        transition: CvFileTransition,
    ) -> Result<CvFile, RepositoryError>;
    fn delete_cv_file(&self, id: CvFileId) -> Result<CvFile, RepositoryError>;
}

pub trait ScreeningResultRepository: Send + Sync {
    /// Inserts a `Processing` row unless the applicant already has one, in which
    /// case nothing is written and `Conflict` is returned. Check and insert are atomic.
    fn begin_screening(&self, result: ScreeningResult) -> Result<ScreeningResult, RepositoryError>;
    /// Moves a `Processing` row to a terminal state. Any other source state is
    /// an `InvalidTransition` and leaves the row untouched.
    fn finish_screening(
        &self,
        id: ScreeningResultId,
        state: ScreeningState,
        at: DateTime<Utc>,
    ) -> Result<ScreeningResult, RepositoryError>;
    fn screening_result(
        &self,
        id: ScreeningResultId,
    ) -> Result<Option<ScreeningResult>, RepositoryError>;
    /// Most recent first.
    fn screening_results_for_applicant(
        &self,
        applicant_id: ApplicantId,
    ) -> Result<Vec<ScreeningResult>, RepositoryError>;
    /// Most recent first.
    fn screening_results_for_job(
        &self,
        job_post_id: JobPostId,
    ) -> Result<Vec<ScreeningResult>, RepositoryError>;
    /// Only terminal rows can be removed.
    fn delete_screening_result(
        &self,
        id: ScreeningResultId,
    ) -> Result<ScreeningResult, RepositoryError>;
}

/// Joined, scoped, paged applicant listing.
pub trait ApplicantDirectory: Send + Sync {
    fn list_applicants(&self, query: &DirectoryQuery) -> Result<DirectoryPage, RepositoryError>;
}

/// Everything the screening services need from storage.
pub trait RecruitmentStore:
    JobPostRepository
    + ApplicantRepository
    + CvFileRepository
    + ScreeningResultRepository
    + ApplicantDirectory
{
}

impl<T> RecruitmentStore for T where
    T: JobPostRepository
        + ApplicantRepository
        + CvFileRepository
        + ScreeningResultRepository
        + ApplicantDirectory
{
}

/// One step of the CV extraction lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CvFileTransition {
    BeginProcessing,
    Processed { text: String },
    Failed { reason: String },
}

impl CvFileTransition {
    pub fn target(&self) -> CvFileStatus {
        match self {
            CvFileTransition::BeginProcessing => CvFileStatus::Processing,
            CvFileTransition::Processed { .. } => CvFileStatus::Processed,
            CvFileTransition::Failed { .. } => CvFileStatus::Error,
        }
    }

    /// Apply to a stored row, keeping extracted text present only when `Processed`.
    pub fn apply(self, file: &mut CvFile) -> Result<(), RepositoryError> {
        let target = self.target();
        if !file.status.can_transition_to(target) {
            return Err(RepositoryError::InvalidTransition {
                from: file.status.label(),
                to: target.label(),
            });
        }

        file.status = target;
        match self {
            CvFileTransition::BeginProcessing => {
                file.extracted_text = None;
                file.failure_reason = None;
            }
            CvFileTransition::Processed { text } => {
                file.extracted_text = Some(text);
                file.failure_reason = None;
            }
            CvFileTransition::Failed { reason } => {
                file.extracted_text = None;
                file.failure_reason = Some(reason);
            }
        }
        Ok(())
    }
}

/// Failure message for a screening whose pipeline stopped before reaching a terminal state.
pub const INTERRUPTED_MESSAGE: &str = "screening interrupted";

/// Check a terminal write against the stored row and produce the updated result.
pub fn finish_result(
    mut current: ScreeningResult,
    state: ScreeningState,
    at: DateTime<Utc>,
) -> Result<ScreeningResult, RepositoryError> {
    let target = state.status();
    if current.status().is_terminal() || !target.is_terminal() {
        return Err(RepositoryError::InvalidTransition {
            from: current.status().label(),
            to: target.label(),
        });
    }

    current.state = state;
    current.completed_at = Some(at);
    Ok(current)
}

/// Which owners' records a query may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerScope {
    All,
    OwnedBy(UserId),
}

impl OwnerScope {
    pub fn for_caller(caller: &Caller) -> Self {
        if caller.is_admin {
            OwnerScope::All
        } else {
            OwnerScope::OwnedBy(caller.user_id.clone())
        }
    }

    pub fn includes(&self, owner: &UserId) -> bool {
        match self {
            OwnerScope::All => true,
            OwnerScope::OwnedBy(user) => user == owner,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantSort {
    #[default]
    AppliedAtDesc,
    AppliedAtAsc,
    NameAsc,
    NameDesc,
    /// Latest completed score, unscored applicants last.
    ScoreDesc,
    StatusAsc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicantFilter {
    pub job_post_id: Option<JobPostId>,
    pub status: Option<ApplicantStatus>,
    /// Case-insensitive substring over first name, last name, full name, and email.
    pub search: Option<String>,
}

impl ApplicantFilter {
    pub fn matches(&self, applicant: &Applicant) -> bool {
        if self
            .job_post_id
            .is_some_and(|job| job != applicant.job_post_id)
        {
            return false;
        }
        if self.status.is_some_and(|status| status != applicant.status) {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                [
                    applicant.first_name.to_lowercase(),
                    applicant.last_name.to_lowercase(),
                    applicant.full_name().to_lowercase(),
                    applicant.email.to_lowercase(),
                ]
                .iter()
                .any(|haystack| haystack.contains(&needle))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    pub scope: OwnerScope,
    pub filter: ApplicantFilter,
    pub sort: ApplicantSort,
    pub offset: usize,
    pub limit: usize,
}

/// An applicant with everything a listing shows about them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryRow {
    pub applicant: Applicant,
    pub job_title: String,
    pub cv_files: Vec<CvFileSummary>,
    pub latest_screening: Option<ScreeningSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryPage {
    pub rows: Vec<DirectoryRow>,
    /// Matching rows inside the scope before paging.
    pub total_count: usize,
}

/// Column-shaped screening row as persisted; strengths and weaknesses go through the list codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningRow {
    pub id: ScreeningResultId,
    pub applicant_id: ApplicantId,
    pub job_post_id: JobPostId,
    pub status: ScreeningStatus,
    pub overall_score: Option<u8>,
    pub summary: Option<String>,
    pub strengths: String,
    pub weaknesses: String,
    pub detailed_analysis: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&ScreeningResult> for ScreeningRow {
    fn from(result: &ScreeningResult) -> Self {
        let verdict = result.verdict();
        Self {
            id: result.id,
            applicant_id: result.applicant_id,
            job_post_id: result.job_post_id,
            status: result.status(),
            overall_score: verdict.map(|verdict| verdict.overall_score),
            summary: verdict.map(|verdict| verdict.summary.clone()),
            strengths: verdict
                .map(|verdict| encode_string_list(&verdict.strengths))
                .unwrap_or_default(),
            weaknesses: verdict
                .map(|verdict| encode_string_list(&verdict.weaknesses))
                .unwrap_or_default(),
            detailed_analysis: verdict.map(|verdict| verdict.detailed_analysis.clone()),
            error_message: result.error_message().map(str::to_string),
            created_at: result.created_at,
            completed_at: result.completed_at,
        }
    }
}

impl From<ScreeningRow> for ScreeningResult {
    fn from(row: ScreeningRow) -> Self {
        let state = match row.status {
            ScreeningStatus::Processing => ScreeningState::Processing,
            ScreeningStatus::Completed => ScreeningState::Completed(ScreeningVerdict {
                overall_score: row.overall_score.unwrap_or_default(),
                summary: row.summary.unwrap_or_default(),
                strengths: decode_string_list(&row.strengths),
                weaknesses: decode_string_list(&row.weaknesses),
                detailed_analysis: row.detailed_analysis.unwrap_or_default(),
            }),
            ScreeningStatus::Failed => ScreeningState::Failed {
                error_message: row.error_message.unwrap_or_default(),
            },
        };

        Self {
            id: row.id,
            applicant_id: row.applicant_id,
            job_post_id: row.job_post_id,
            state,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}
