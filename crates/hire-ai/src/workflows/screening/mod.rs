//! CV screening: applicants and their CV files flow through text extraction and
//! model scoring into persisted results that recruiters query and export.

pub(crate) mod access;
pub mod catalog;
pub(crate) mod codec;
pub mod documents;
pub mod domain;
pub mod memory;
pub mod orchestrator;
pub mod patch;
pub mod query;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod services;
pub mod validation;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, CatalogService, NewApplicant, NewJobPost};
pub use documents::{BlobStore, DocumentError, DocumentService, UploadPolicy, UploadRequest};
pub use domain::{
    Applicant, ApplicantId, ApplicantStatus, Caller, CvFile, CvFileId, CvFileStatus, JobPost,
    JobPostId, JobPostStatus, ScreeningResult, ScreeningResultId, ScreeningState,
    ScreeningStatus, ScreeningVerdict, UserId,
};
pub use memory::{MemoryStore, Recovered};
pub use orchestrator::{
    ApplicantOutcome, BatchOutcome, BatchTicket, ProcessOutcome, ScreeningError,
    ScreeningOrchestrator, StatusOverride,
};
pub use query::{ApplicantListRequest, ApplicantPage, ApplicantQueryEngine, JobScreeningStats, QueryError};
pub use repository::{RecruitmentStore, RepositoryError};
pub use router::screening_router;
pub use scoring::{HttpScoringClient, Scorer, ScoringError, ScoringRequest};
pub use services::ScreeningServices;
pub use validation::ValidationError;
