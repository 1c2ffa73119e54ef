use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::access::{visible_applicant, visible_job};
use super::documents::DocumentService;
use super::domain::{
    Applicant, ApplicantId, Caller, CvFile, CvFileStatus, JobPost, JobPostId, ScreeningResult,
    ScreeningResultId, ScreeningState, ScreeningVerdict,
};
use super::repository::{
    RecruitmentStore, RepositoryError, ScreeningResultRepository, INTERRUPTED_MESSAGE,
};
use super::scoring::{Scorer, ScoringRequest};
use super::validation::ValidationError;

pub const NO_CV_MESSAGE: &str = "no extractable CV file";
const OVERRIDE_DEFAULT_MESSAGE: &str = "status overridden by operator";

/// Failures that stop a screening before it starts, or reject an operator action.
#[derive(Debug, thiserror::Error)]
pub enum ScreeningError {
    #[error("record not found")]
    NotFound,
    #[error("applicant {0} already has a screening in progress")]
    AlreadyInProgress(ApplicantId),
    #[error("{} applicant(s) do not belong to this job post", .0.len())]
    ForeignApplicants(Vec<ApplicantId>),
    #[error("only administrators may override a screening status")]
    Unauthorized,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("screening result cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ScreeningError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::InvalidTransition { from, to } => {
                ScreeningError::InvalidTransition { from, to }
            }
            RepositoryError::NotFound | RepositoryError::ForeignKey(_) => ScreeningError::NotFound,
            other => ScreeningError::Repository(other),
        }
    }
}

/// Terminal state an operator may force onto a stalled result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusOverride {
    Completed(ScreeningVerdict),
    Failed {
        #[serde(default)]
        error_message: Option<String>,
    },
}

impl StatusOverride {
    fn into_state(self) -> Result<ScreeningState, ValidationError> {
        match self {
            StatusOverride::Completed(verdict) => {
                if verdict.overall_score > 100 {
                    return Err(ValidationError::ScoreOutOfRange(u32::from(verdict.overall_score)));
                }
                Ok(ScreeningState::Completed(verdict))
            }
            StatusOverride::Failed { error_message } => Ok(ScreeningState::Failed {
                error_message: error_message
                    .map(|message| message.trim().to_string())
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| OVERRIDE_DEFAULT_MESSAGE.to_string()),
            }),
        }
    }
}

/// How one applicant of an accepted batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantOutcome {
    Completed,
    Failed,
    /// Another screening for the applicant was still running; nothing was written.
    AlreadyInProgress,
    /// The pipeline task died; its result was marked failed by the in-flight guard.
    Aborted,
}

/// Where a single screening attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    /// True only when this attempt itself recorded a completed verdict.
    pub completed: bool,
    /// The attempt's row as it stands once the pipeline is done with it.
    pub result: ScreeningResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub applicant_id: ApplicantId,
    pub outcome: ApplicantOutcome,
}

/// Handle on an accepted batch. Dropping it leaves the pipelines running.
#[derive(Debug)]
pub struct BatchTicket {
    pub job_post_id: JobPostId,
    pub accepted: Vec<ApplicantId>,
    handles: Vec<(ApplicantId, JoinHandle<ApplicantOutcome>)>,
}

impl BatchTicket {
    /// Wait for every pipeline in the batch, in submission order.
    pub async fn join(self) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for (applicant_id, handle) in self.handles {
            let outcome = handle.await.unwrap_or_else(|join_error| {
                error!(applicant_id = %applicant_id, error = %join_error, "screening task aborted");
                ApplicantOutcome::Aborted
            });
            outcomes.push(BatchOutcome {
                applicant_id,
                outcome,
            });
        }
        outcomes
    }
}

/// Marks a result Failed if the pipeline is dropped or unwinds before it reaches a terminal state.
struct InFlight<S: ScreeningResultRepository> {
    store: Arc<S>,
    result_id: ScreeningResultId,
    armed: bool,
}

impl<S: ScreeningResultRepository> InFlight<S> {
    fn new(store: Arc<S>, result_id: ScreeningResultId) -> Self {
        Self {
            store,
            result_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<S: ScreeningResultRepository> Drop for InFlight<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let state = ScreeningState::Failed {
            error_message: INTERRUPTED_MESSAGE.to_string(),
        };
        match self.store.finish_screening(self.result_id, state, Utc::now()) {
            Ok(_) => warn!(result_id = %self.result_id, "screening interrupted before completion"),
            Err(RepositoryError::InvalidTransition { .. }) => {}
            Err(err) => error!(result_id = %self.result_id, error = %err, "could not close interrupted screening"),
        }
    }
}

/// Drives applicants through extraction, scoring, and result persistence.
pub struct ScreeningOrchestrator<S> {
    store: Arc<S>,
    documents: DocumentService<S>,
    scorer: Arc<dyn Scorer>,
    permits: Arc<Semaphore>,
}

impl<S> Clone for ScreeningOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            documents: self.documents.clone(),
            scorer: Arc::clone(&self.scorer),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<S> ScreeningOrchestrator<S>
where
    S: RecruitmentStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        documents: DocumentService<S>,
        scorer: Arc<dyn Scorer>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            documents,
            scorer,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Screen one applicant and wait for the terminal outcome. `Ok(true)` means
    /// the result completed; `Ok(false)` means it was recorded as failed.
    pub async fn process(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
        job_post_id: JobPostId,
    ) -> Result<bool, ScreeningError> {
        Ok(self
            .process_outcome(caller, applicant_id, job_post_id)
            .await?
            .completed)
    }

    /// Same as [`Self::process`], also handing back the attempt it ran.
    pub async fn process_outcome(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
        job_post_id: JobPostId,
    ) -> Result<ProcessOutcome, ScreeningError> {
        let (applicant, job) = visible_applicant(self.store.as_ref(), caller, applicant_id)?
            .ok_or(ScreeningError::NotFound)?;
        if applicant.job_post_id != job_post_id {
            return Err(ScreeningError::ForeignApplicants(vec![applicant_id]));
        }

        let result = self.begin(&applicant)?;
        Ok(self.run(result, applicant, job).await)
    }

    /// Validate the whole batch, then screen every applicant independently.
    /// Rejection is all-or-nothing and writes nothing. Must be called inside a Tokio runtime.
    pub fn start_batch(
        &self,
        caller: &Caller,
        applicant_ids: &[ApplicantId],
        job_post_id: JobPostId,
    ) -> Result<BatchTicket, ScreeningError> {
        let mut seen = HashSet::new();
        let ids: Vec<ApplicantId> = applicant_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let job = visible_job(self.store.as_ref(), caller, job_post_id)?
            .ok_or(ScreeningError::NotFound)?;

        let mut found: HashMap<ApplicantId, Applicant> = self
            .store
            .applicants(&ids)?
            .into_iter()
            .filter(|applicant| applicant.job_post_id == job_post_id)
            .map(|applicant| (applicant.id, applicant))
            .collect();
        let foreign: Vec<ApplicantId> = ids
            .iter()
            .copied()
            .filter(|id| !found.contains_key(id))
            .collect();
        if !foreign.is_empty() {
            info!(job_post_id = %job_post_id, rejected = foreign.len(), "screening batch rejected");
            return Err(ScreeningError::ForeignApplicants(foreign));
        }

        let handles = ids
            .iter()
            .filter_map(|id| found.remove(id))
            .map(|applicant| {
                let orchestrator = self.clone();
                let job = job.clone();
                let applicant_id = applicant.id;
                let handle = tokio::spawn(async move { orchestrator.screen(applicant, job).await });
                (applicant_id, handle)
            })
            .collect();

        info!(job_post_id = %job_post_id, applicants = ids.len(), "screening batch accepted");
        Ok(BatchTicket {
            job_post_id,
            accepted: ids,
            handles,
        })
    }

    pub fn get_result(
        &self,
        caller: &Caller,
        result_id: ScreeningResultId,
    ) -> Result<ScreeningResult, ScreeningError> {
        let result = self
            .store
            .screening_result(result_id)?
            .ok_or(ScreeningError::NotFound)?;
        visible_job(self.store.as_ref(), caller, result.job_post_id)?
            .ok_or(ScreeningError::NotFound)?;
        Ok(result)
    }

    /// Most recent attempt first.
    pub fn results_for_applicant(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
    ) -> Result<Vec<ScreeningResult>, ScreeningError> {
        visible_applicant(self.store.as_ref(), caller, applicant_id)?
            .ok_or(ScreeningError::NotFound)?;
        Ok(self.store.screening_results_for_applicant(applicant_id)?)
    }

    /// Force a `Processing` result into a terminal state without re-running anything.
    pub fn override_status(
        &self,
        caller: &Caller,
        result_id: ScreeningResultId,
        target: StatusOverride,
    ) -> Result<ScreeningResult, ScreeningError> {
        let result = self
            .store
            .screening_result(result_id)?
            .ok_or(ScreeningError::NotFound)?;
        if !caller.is_admin {
            return match visible_job(self.store.as_ref(), caller, result.job_post_id)? {
                Some(_) => Err(ScreeningError::Unauthorized),
                None => Err(ScreeningError::NotFound),
            };
        }

        let state = target.into_state()?;
        let updated = self.store.finish_screening(result_id, state, Utc::now())?;
        info!(
            result_id = %result_id,
            status = updated.status().label(),
            operator = %caller.user_id,
            "screening status overridden"
        );
        Ok(updated)
    }

    /// Remove a finished attempt. Running attempts cannot be deleted.
    pub fn delete_result(
        &self,
        caller: &Caller,
        result_id: ScreeningResultId,
    ) -> Result<ScreeningResult, ScreeningError> {
        self.get_result(caller, result_id)?;
        Ok(self.store.delete_screening_result(result_id)?)
    }

    fn begin(&self, applicant: &Applicant) -> Result<ScreeningResult, ScreeningError> {
        let result = ScreeningResult::start(applicant.id, applicant.job_post_id, Utc::now());
        match self.store.begin_screening(result) {
            Ok(result) => Ok(result),
            Err(RepositoryError::Conflict) => Err(ScreeningError::AlreadyInProgress(applicant.id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn screen(&self, applicant: Applicant, job: JobPost) -> ApplicantOutcome {
        match self.begin(&applicant) {
            Ok(result) => {
                if self.run(result, applicant, job).await.completed {
                    ApplicantOutcome::Completed
                } else {
                    ApplicantOutcome::Failed
                }
            }
            Err(ScreeningError::AlreadyInProgress(_)) => ApplicantOutcome::AlreadyInProgress,
            Err(err) => {
                warn!(applicant_id = %applicant.id, error = %err, "screening could not start");
                ApplicantOutcome::Failed
            }
        }
    }

    /// Every path out of here leaves the result terminal.
    async fn run(&self, result: ScreeningResult, applicant: Applicant, job: JobPost) -> ProcessOutcome {
        let mut guard = InFlight::new(Arc::clone(&self.store), result.id);
        info!(
            result_id = %result.id,
            applicant_id = %applicant.id,
            job_post_id = %job.id,
            "screening started"
        );

        let outcome = match self.permits.acquire().await {
            Ok(_permit) => self.evaluate(&applicant, &job).await,
            Err(_) => Err("screening capacity unavailable".to_string()),
        };

        let state = match outcome {
            Ok(verdict) => ScreeningState::Completed(verdict),
            Err(error_message) => ScreeningState::Failed { error_message },
        };

        match self.store.finish_screening(result.id, state, Utc::now()) {
            Ok(finished) => {
                guard.disarm();
                match finished.verdict() {
                    Some(verdict) => info!(
                        result_id = %finished.id,
                        applicant_id = %applicant.id,
                        score = verdict.overall_score,
                        "screening completed"
                    ),
                    None => warn!(
                        result_id = %finished.id,
                        applicant_id = %applicant.id,
                        error = finished.error_message().unwrap_or_default(),
                        "screening failed"
                    ),
                }
                ProcessOutcome {
                    completed: finished.verdict().is_some(),
                    result: finished,
                }
            }
            Err(RepositoryError::InvalidTransition { from, .. }) => {
                guard.disarm();
                warn!(result_id = %result.id, status = from, "screening closed elsewhere before the pipeline finished");
                let closed = self.store.screening_result(result.id).ok().flatten();
                ProcessOutcome {
                    completed: false,
                    result: closed.unwrap_or(result),
                }
            }
            Err(err) => {
                error!(result_id = %result.id, error = %err, "could not record screening outcome");
                ProcessOutcome {
                    completed: false,
                    result,
                }
            }
        }
    }

    /// Extraction always finishes before scoring starts.
    async fn evaluate(&self, applicant: &Applicant, job: &JobPost) -> Result<ScreeningVerdict, String> {
        let files = self
            .store
            .cv_files_for_applicant(applicant.id)
            .map_err(|err| format!("could not load CV files: {err}"))?;

        let cv_text = match pick_cv_file(&files) {
            Some(file) => self
                .documents
                .extract_file(file.clone())
                .await
                .map_err(|err| format!("CV extraction failed: {err}"))?,
            None => return Err(NO_CV_MESSAGE.to_string()),
        };

        self.scorer
            .score(&ScoringRequest::for_job(cv_text, job))
            .await
            .map_err(|err| err.to_string())
    }
}

/// Newest processed file, else newest untouched upload. Files in `Error` are never retried.
fn pick_cv_file(files_newest_first: &[CvFile]) -> Option<&CvFile> {
    files_newest_first
        .iter()
        .find(|file| file.status == CvFileStatus::Processed && file.extracted_text.is_some())
        .or_else(|| {
            files_newest_first
                .iter()
                .find(|file| file.status == CvFileStatus::Uploaded)
        })
}
