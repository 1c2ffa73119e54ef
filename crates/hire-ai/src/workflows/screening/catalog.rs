use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{visible_applicant, visible_job};
use super::domain::{
    Applicant, ApplicantId, ApplicantStatus, Caller, JobPost, JobPostId, JobPostStatus,
    SalaryBand,
};
use super::patch::{merge_applicant, merge_job_post, ApplicantPatch, JobPostPatch};
use super::repository::{OwnerScope, RecruitmentStore, RepositoryError};
use super::validation::{require, require_email, ValidationError};

/// Fields a recruiter supplies when opening a job post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewJobPost {
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
    pub closing_date: Option<NaiveDate>,
}

/// An application as entered against a job post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewApplicant {
    pub job_post_id: Option<JobPostId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub portfolio_url: Option<String>,
    pub cover_letter: Option<String>,
}

/// Error raised by job post and applicant maintenance.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn check_salary(salary: Option<&SalaryBand>) -> Result<(), ValidationError> {
    match salary {
        Some(band) if band.min > band.max => Err(ValidationError::InvalidSalaryRange {
            min: band.min,
            max: band.max,
        }),
        Some(band) => require("salary.currency", &band.currency),
        None => Ok(()),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Job post and applicant records, always filtered through the caller's ownership.
pub struct CatalogService<S> {
    store: Arc<S>,
}

impl<S> CatalogService<S>
where
    S: RecruitmentStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create_job_post(
        &self,
        caller: &Caller,
        request: NewJobPost,
    ) -> Result<JobPost, CatalogError> {
        require("title", &request.title)?;
        require("description", &request.description)?;
        check_salary(request.salary.as_ref())?;

        let job = JobPost {
            id: JobPostId::new(),
            title: request.title.trim().to_string(),
            description: request.description,
            location: request.location,
            department: request.department,
            employment_type: request.employment_type,
            experience_level: request.experience_level,
            required_skills: request.required_skills,
            preferred_skills: request.preferred_skills,
            responsibilities: request.responsibilities,
            benefits: request.benefits,
            salary: request.salary,
            status: JobPostStatus::Active,
            posted_at: Utc::now(),
            closing_date: request.closing_date,
            owner_id: caller.user_id.clone(),
        };

        let job = self.store.insert_job_post(job)?;
        info!(job_post_id = %job.id, owner = %job.owner_id, "job post created");
        Ok(job)
    }

    pub fn update_job_post(
        &self,
        caller: &Caller,
        job_post_id: JobPostId,
        patch: JobPostPatch,
    ) -> Result<JobPost, CatalogError> {
        visible_job(self.store.as_ref(), caller, job_post_id)?.ok_or(CatalogError::NotFound)?;

        if let Some(title) = &patch.title {
            require("title", title)?;
        }
        if let Some(description) = &patch.description {
            require("description", description)?;
        }
        if let Some(salary) = &patch.salary {
            check_salary(salary.as_ref())?;
        }

        if patch.is_empty() {
            return self.job_post(caller, job_post_id);
        }

        let updated = self
            .store
            .modify_job_post(job_post_id, &mut |job| merge_job_post(job, patch.clone()))?;
        info!(job_post_id = %updated.id, "job post updated");
        Ok(updated)
    }

    pub fn job_post(&self, caller: &Caller, job_post_id: JobPostId) -> Result<JobPost, CatalogError> {
        visible_job(self.store.as_ref(), caller, job_post_id)?.ok_or(CatalogError::NotFound)
    }

    pub fn job_posts(&self, caller: &Caller) -> Result<Vec<JobPost>, CatalogError> {
        Ok(self.store.job_posts(&OwnerScope::for_caller(caller))?)
    }

    pub fn create_applicant(
        &self,
        caller: &Caller,
        request: NewApplicant,
    ) -> Result<Applicant, CatalogError> {
        let job_post_id = request
            .job_post_id
            .ok_or(ValidationError::MissingField("job_post_id"))?;
        require("first_name", &request.first_name)?;
        require("last_name", &request.last_name)?;
        require_email(&request.email)?;

        let job = visible_job(self.store.as_ref(), caller, job_post_id)?
            .ok_or(CatalogError::NotFound)?;
        if job.status != JobPostStatus::Active {
            return Err(ValidationError::JobNotAcceptingApplications.into());
        }

        let applicant = Applicant {
            id: ApplicantId::new(),
            job_post_id,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: optional(request.phone),
            linkedin_url: optional(request.linkedin_url),
            portfolio_url: optional(request.portfolio_url),
            cover_letter: optional(request.cover_letter),
            status: ApplicantStatus::Applied,
            applied_at: Utc::now(),
            updated_at: None,
        };

        let applicant = self.store.insert_applicant(applicant)?;
        info!(applicant_id = %applicant.id, job_post_id = %job_post_id, "applicant recorded");
        Ok(applicant)
    }

    pub fn update_applicant(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
        patch: ApplicantPatch,
    ) -> Result<Applicant, CatalogError> {
        let (applicant, _) = visible_applicant(self.store.as_ref(), caller, applicant_id)?
            .ok_or(CatalogError::NotFound)?;

        if let Some(first_name) = &patch.first_name {
            require("first_name", first_name)?;
        }
        if let Some(last_name) = &patch.last_name {
            require("last_name", last_name)?;
        }
        if let Some(email) = &patch.email {
            require_email(email)?;
        }
        if patch.is_empty() {
            return Ok(applicant);
        }

        let now = Utc::now();
        Ok(self
            .store
            .modify_applicant(applicant_id, &mut |stored| {
                merge_applicant(stored, patch.clone(), now)
            })?)
    }

    pub fn set_applicant_status(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
        status: ApplicantStatus,
    ) -> Result<Applicant, CatalogError> {
        self.update_applicant(
            caller,
            applicant_id,
            ApplicantPatch {
                status: Some(status),
                ..ApplicantPatch::default()
            },
        )
    }

    pub fn applicant(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
    ) -> Result<Applicant, CatalogError> {
        visible_applicant(self.store.as_ref(), caller, applicant_id)?
            .map(|(applicant, _)| applicant)
            .ok_or(CatalogError::NotFound)
    }
}
