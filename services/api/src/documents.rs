use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use hire_ai::config::{AppConfig, ScreeningConfig};
use hire_ai::error::AppError;
use hire_ai::workflows::screening::documents::{
    file_extension, guess_content_type, TextExtractor, UploadPolicy,
};
use serde::Serialize;
use tracing::debug;

#[derive(Args, Debug)]
pub(crate) struct ExtractArgs {
    /// CV document to read
    pub(crate) path: PathBuf,
    /// Print at most this many characters
    #[arg(long)]
    pub(crate) max_chars: Option<usize>,
    /// Declared content type; guessed from the extension when omitted
    #[arg(long)]
    pub(crate) content_type: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ValidateArgs {
    /// CV document to check
    pub(crate) path: PathBuf,
    /// Declared content type; guessed from the extension when omitted
    #[arg(long)]
    pub(crate) content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValidationReport {
    pub(crate) file_name: String,
    pub(crate) content_type: String,
    pub(crate) size_bytes: u64,
    pub(crate) valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reason: Option<String>,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

fn screening_config() -> Result<ScreeningConfig, AppError> {
    Ok(AppConfig::load()?.screening)
}

pub(crate) fn validation_report(
    policy: &UploadPolicy,
    path: &Path,
    content_type: Option<String>,
) -> Result<ValidationReport, AppError> {
    let file_name = display_name(path);
    let content_type = content_type.unwrap_or_else(|| guess_content_type(&file_name));
    let size_bytes = fs::metadata(path)?.len();
    let outcome = policy.check_file(&file_name, &content_type, size_bytes);

    Ok(ValidationReport {
        file_name,
        content_type,
        size_bytes,
        valid: outcome.is_ok(),
        reason: outcome.err().map(|err| err.to_string()),
    })
}

/// Policy first, then the bytes, matching the service pipeline.
pub(crate) fn extract_text(
    policy: &UploadPolicy,
    path: &Path,
    content_type: Option<String>,
) -> Result<String, AppError> {
    let file_name = display_name(path);
    let content_type = content_type.unwrap_or_else(|| guess_content_type(&file_name));
    policy.check_file(&file_name, &content_type, fs::metadata(path)?.len())?;

    let bytes = fs::read(path)?;
    debug!(file = %file_name, size = bytes.len(), "extracting CV text");
    let text = TextExtractor::new().extract(&bytes, &file_extension(&file_name), &content_type)?;
    Ok(text)
}

pub(crate) fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    let policy = UploadPolicy::from_config(&screening_config()?);
    let text = extract_text(&policy, &args.path, args.content_type)?;
    let text = match args.max_chars {
        Some(limit) => text.chars().take(limit).collect(),
        None => text,
    };
    println!("{text}");
    Ok(())
}

pub(crate) fn run_validate(args: ValidateArgs) -> Result<(), AppError> {
    let policy = UploadPolicy::from_config(&screening_config()?);
    let report = validation_report(&policy, &args.path, args.content_type)?;
    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| AppError::Io(err.into()))?;
    println!("{rendered}");
    Ok(())
}
