//! Scoring capability: CV text plus job requirements in, structured verdict out.

mod client;

use async_trait::async_trait;
use serde::Serialize;

use super::domain::{JobPost, ScreeningVerdict};

pub use client::HttpScoringClient;

/// Inputs sent to the scorer for one applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoringRequest {
    pub cv_text: String,
    pub job_title: String,
    pub job_description: String,
    pub required_skills: String,
}

impl ScoringRequest {
    pub fn for_job(cv_text: impl Into<String>, job: &JobPost) -> Self {
        Self {
            cv_text: cv_text.into(),
            job_title: job.title.clone(),
            job_description: job.description.clone(),
            required_skills: job.required_skills.clone(),
        }
    }
}

/// The two failure classes a scorer may report. The message is what ends up on a failed result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    /// Network, timeout, rate limit, or server-side failure.
    #[error("{0}")]
    Transient(String),
    /// Rejected input, content policy, or an unusable response.
    #[error("{0}")]
    Permanent(String),
}

impl ScoringError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoringError::Transient(_))
    }

    pub fn timed_out() -> Self {
        ScoringError::Transient("scoring request timed out".to_string())
    }
}

/// External scoring capability. Implementations do not retry.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> Result<ScreeningVerdict, ScoringError>;
}

/// Reject verdicts a scorer should never have produced.
pub(crate) fn check_verdict(verdict: ScreeningVerdict) -> Result<ScreeningVerdict, ScoringError> {
    if verdict.overall_score > 100 {
        return Err(ScoringError::Permanent(format!(
            "scorer returned out-of-range score {}",
            verdict.overall_score
        )));
    }
    if verdict.summary.trim().is_empty() {
        return Err(ScoringError::Permanent(
            "scorer returned an empty summary".to_string(),
        ));
    }
    Ok(verdict)
}
