use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(raw.trim()).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a recruiter-owned job post.
    JobPostId
);
entity_id!(
    /// Identifier of an application submitted against a job post.
    ApplicantId
);
entity_id!(
    /// Identifier of an uploaded CV document.
    CvFileId
);
entity_id!(
    /// Identifier of a single screening attempt.
    ScreeningResultId
);

/// Opaque user identifier supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of whoever is invoking a core operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            is_admin: true,
        }
    }

    /// Administrators see everything; everyone else only what they own.
    pub fn can_access(&self, owner: &UserId) -> bool {
        self.is_admin || &self.user_id == owner
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPostStatus {
    Active,
    Inactive,
    Closed,
}

impl JobPostStatus {
    pub const fn label(self) -> &'static str {
        match self {
            JobPostStatus::Active => "active",
            JobPostStatus::Inactive => "inactive",
            JobPostStatus::Closed => "closed",
        }
    }
}

/// Advertised compensation range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryBand {
    pub min: u32,
    pub max: u32,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPost {
    pub id: JobPostId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub department: String,
    pub employment_type: String,
    pub experience_level: String,
    pub required_skills: String,
    pub preferred_skills: String,
    pub responsibilities: String,
    pub benefits: String,
    pub salary: Option<SalaryBand>,
    pub status: JobPostStatus,
    pub posted_at: DateTime<Utc>,
    pub closing_date: Option<NaiveDate>,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantStatus {
    Applied,
    UnderReview,
    Shortlisted,
    Rejected,
    Hired,
}

impl ApplicantStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicantStatus::Applied => "applied",
            ApplicantStatus::UnderReview => "under_review",
            ApplicantStatus::Shortlisted => "shortlisted",
            ApplicantStatus::Rejected => "rejected",
            ApplicantStatus::Hired => "hired",
        }
    }
}

/// A candidate who applied to exactly one job post. `job_post_id` never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ApplicantId,
    pub job_post_id: JobPostId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub portfolio_url: Option<String>,
    pub cover_letter: Option<String>,
    pub status: ApplicantStatus,
    pub applied_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Applicant {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Extraction lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvFileStatus {
    Uploaded,
    Processing,
    Processed,
    Error,
}

impl CvFileStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CvFileStatus::Uploaded => "uploaded",
            CvFileStatus::Processing => "processing",
            CvFileStatus::Processed => "processed",
            CvFileStatus::Error => "error",
        }
    }

    /// Uploaded -> Processing -> {Processed | Error}; nothing moves backwards.
    pub fn can_transition_to(self, next: CvFileStatus) -> bool {
        matches!(
            (self, next),
            (CvFileStatus::Uploaded, CvFileStatus::Processing)
                | (CvFileStatus::Processing, CvFileStatus::Processed)
                | (CvFileStatus::Processing, CvFileStatus::Error)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvFile {
    pub id: CvFileId,
    pub applicant_id: ApplicantId,
    pub file_name: String,
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub extension: String,
    /// Present only while `status` is `Processed`.
    pub extracted_text: Option<String>,
    /// Diagnostic retained when extraction ends in `Error`.
    pub failure_reason: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub status: CvFileStatus,
}

/// Metadata view of a CV file without the extracted text body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvFileSummary {
    pub id: CvFileId,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub status: &'static str,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&CvFile> for CvFileSummary {
    fn from(file: &CvFile) -> Self {
        Self {
            id: file.id,
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            size_bytes: file.size_bytes,
            status: file.status.label(),
            uploaded_at: file.uploaded_at,
        }
    }
}

/// Structured judgement returned by the scoring capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningVerdict {
    pub overall_score: u8,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub detailed_analysis: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Processing,
    Completed,
    Failed,
}

impl ScreeningStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ScreeningStatus::Processing => "processing",
            ScreeningStatus::Completed => "completed",
            ScreeningStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ScreeningStatus::Processing)
    }
}

/// Status plus the payload that status carries, so a result can never hold a
/// verdict and an error at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScreeningState {
    Processing,
    Completed(ScreeningVerdict),
    Failed { error_message: String },
}

impl ScreeningState {
    pub fn status(&self) -> ScreeningStatus {
        match self {
            ScreeningState::Processing => ScreeningStatus::Processing,
            ScreeningState::Completed(_) => ScreeningStatus::Completed,
            ScreeningState::Failed { .. } => ScreeningStatus::Failed,
        }
    }
}

/// One scoring attempt for an applicant against the job they applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub id: ScreeningResultId,
    pub applicant_id: ApplicantId,
    pub job_post_id: JobPostId,
    #[serde(flatten)]
    pub state: ScreeningState,
    pub created_at: DateTime<Utc>,
    /// Set when the attempt reaches either terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScreeningResult {
    pub fn start(applicant_id: ApplicantId, job_post_id: JobPostId, now: DateTime<Utc>) -> Self {
        Self {
            id: ScreeningResultId::new(),
            applicant_id,
            job_post_id,
            state: ScreeningState::Processing,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn status(&self) -> ScreeningStatus {
        self.state.status()
    }

    pub fn verdict(&self) -> Option<&ScreeningVerdict> {
        match &self.state {
            ScreeningState::Completed(verdict) => Some(verdict),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            ScreeningState::Failed { error_message } => Some(error_message),
            _ => None,
        }
    }

    pub fn overall_score(&self) -> Option<u8> {
        self.verdict().map(|verdict| verdict.overall_score)
    }

    pub fn snapshot(&self) -> ScreeningSnapshot {
        ScreeningSnapshot {
            result_id: self.id,
            status: self.status().label(),
            overall_score: self.overall_score(),
            summary: self.verdict().map(|verdict| verdict.summary.clone()),
            error_message: self.error_message().map(str::to_string),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Compact view of the latest screening joined into applicant listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreeningSnapshot {
    pub result_id: ScreeningResultId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
