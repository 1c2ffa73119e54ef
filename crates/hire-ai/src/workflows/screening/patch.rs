//! Sparse update requests for job posts and applicants.
//!
//! A field is updated iff the request set it. For optional fields the request can also
//! set an explicit `null`, which clears the stored value; an absent key leaves it alone.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::domain::{Applicant, ApplicantStatus, JobPost, JobPostStatus, SalaryBand};

/// Distinguishes `"field": null` (Some(None)) from a missing key (None).
fn set_or_clear<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string())
}

/// Blank optional text clears the field, same as an explicit `null`.
fn trimmed_optional(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|inner| {
        inner
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPostPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub employment_type: Option<String>,
    pub experience_level: Option<String>,
    pub required_skills: Option<String>,
    pub preferred_skills: Option<String>,
    pub responsibilities: Option<String>,
    pub benefits: Option<String>,
    #[serde(deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
    pub salary: Option<Option<SalaryBand>>,
    pub status: Option<JobPostStatus>,
    #[serde(deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
    pub closing_date: Option<Option<NaiveDate>>,
}

impl JobPostPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Merge a patch into a job post. Identity, owner, and posting date are never patched.
pub fn merge_job_post(mut job: JobPost, patch: JobPostPatch) -> JobPost {
    assign(&mut job.title, trimmed(patch.title));
    assign(&mut job.description, patch.description);
    assign(&mut job.location, patch.location);
    assign(&mut job.department, patch.department);
    assign(&mut job.employment_type, patch.employment_type);
    assign(&mut job.experience_level, patch.experience_level);
    assign(&mut job.required_skills, patch.required_skills);
    assign(&mut job.preferred_skills, patch.preferred_skills);
    assign(&mut job.responsibilities, patch.responsibilities);
    assign(&mut job.benefits, patch.benefits);
    assign(&mut job.salary, patch.salary);
    assign(&mut job.status, patch.status);
    assign(&mut job.closing_date, patch.closing_date);
    job
}

/// Applicant fields a recruiter may correct. The owning job post is not among them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicantPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<Option<String>>,
    #[serde(deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
    pub portfolio_url: Option<Option<String>>,
    #[serde(deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<Option<String>>,
    pub status: Option<ApplicantStatus>,
}

impl ApplicantPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Merge a patch into an applicant, stamping `updated_at` when anything was set.
pub fn merge_applicant(
    mut applicant: Applicant,
    patch: ApplicantPatch,
    now: DateTime<Utc>,
) -> Applicant {
    if patch.is_empty() {
        return applicant;
    }

    assign(&mut applicant.first_name, trimmed(patch.first_name));
    assign(&mut applicant.last_name, trimmed(patch.last_name));
    assign(&mut applicant.email, trimmed(patch.email));
    assign(&mut applicant.phone, trimmed_optional(patch.phone));
    assign(&mut applicant.linkedin_url, trimmed_optional(patch.linkedin_url));
    assign(&mut applicant.portfolio_url, trimmed_optional(patch.portfolio_url));
    assign(&mut applicant.cover_letter, trimmed_optional(patch.cover_letter));
    assign(&mut applicant.status, patch.status);
    applicant.updated_at = Some(now);
    applicant
}
