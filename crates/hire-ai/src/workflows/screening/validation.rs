/// Input rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("file is empty")]
    EmptyFile,
    #[error("file is {size} bytes, the limit is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },
    #[error("file name '{0}' has no extension")]
    MissingExtension(String),
    #[error("extension '.{extension}' is not allowed (accepted: {allowed})")]
    ExtensionNotAllowed { extension: String, allowed: String },
    #[error("content type '{content_type}' does not match extension '.{extension}'")]
    ContentTypeMismatch {
        extension: String,
        content_type: String,
    },
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("salary minimum {min} exceeds maximum {max}")]
    InvalidSalaryRange { min: u32, max: u32 },
    #[error("job post is not accepting applications")]
    JobNotAcceptingApplications,
    #[error("batch contains no applicants")]
    EmptyBatch,
    #[error("score {0} is outside 0..=100")]
    ScoreOutOfRange(u32),
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Loose shape check: a single `@` with text on both sides and a dotted domain.
pub(crate) fn require_email(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    require("email", value)?;

    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(value.to_string()))
    }
}
