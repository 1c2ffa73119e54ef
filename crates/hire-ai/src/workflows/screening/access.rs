//! Ownership scoping shared by the screening services.
//!
//! Lookups return `None` both for missing records and for records outside the
//! caller's scope, so callers cannot tell the two apart.

use super::domain::{Applicant, ApplicantId, Caller, JobPost, JobPostId};
use super::repository::{ApplicantRepository, JobPostRepository, RepositoryError};

pub(crate) fn visible_job<S>(
    store: &S,
    caller: &Caller,
    job_post_id: JobPostId,
) -> Result<Option<JobPost>, RepositoryError>
where
    S: JobPostRepository + ?Sized,
{
    Ok(store
        .job_post(job_post_id)?
        .filter(|job| caller.can_access(&job.owner_id)))
}

pub(crate) fn visible_applicant<S>(
    store: &S,
    caller: &Caller,
    applicant_id: ApplicantId,
) -> Result<Option<(Applicant, JobPost)>, RepositoryError>
where
    S: JobPostRepository + ApplicantRepository + ?Sized,
{
    let Some(applicant) = store.applicant(applicant_id)? else {
        return Ok(None);
    };
    Ok(visible_job(store, caller, applicant.job_post_id)?.map(|job| (applicant, job)))
}
