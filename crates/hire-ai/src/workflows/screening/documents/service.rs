use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::extract::{ExtractionError, TextExtractor};
use super::policy::{file_extension, UploadPolicy};
use super::storage::{storage_key, BlobStore, StorageError};
use crate::workflows::screening::access::visible_applicant;
use crate::workflows::screening::domain::{
    ApplicantId, Caller, CvFile, CvFileId, CvFileStatus,
};
use crate::workflows::screening::repository::{
    CvFileTransition, RecruitmentStore, RepositoryError,
};
use crate::workflows::screening::validation::ValidationError;

/// Raw upload as received from a client.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    /// Guessed from the file name when absent.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Stored bytes plus the metadata needed to serve them back.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentContent {
    pub file_name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Error raised by document intake and extraction.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("document not found")]
    NotFound,
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Guess a content type from the file name, defaulting to `application/octet-stream`.
pub fn guess_content_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// CV intake: validation, byte storage, and the extraction lifecycle of each file.
pub struct DocumentService<S> {
    store: Arc<S>,
    blobs: Arc<dyn BlobStore>,
    policy: Arc<UploadPolicy>,
    extractor: TextExtractor,
}

impl<S> Clone for DocumentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            blobs: Arc::clone(&self.blobs),
            policy: Arc::clone(&self.policy),
            extractor: self.extractor,
        }
    }
}

impl<S> DocumentService<S>
where
    S: RecruitmentStore + 'static,
{
    pub fn new(store: Arc<S>, blobs: Arc<dyn BlobStore>, policy: UploadPolicy) -> Self {
        Self {
            store,
            blobs,
            policy: Arc::new(policy),
            extractor: TextExtractor::new(),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Pure pre-check over declared metadata; nothing is stored or read.
    pub fn validate(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        size_bytes: u64,
    ) -> Result<(), ValidationError> {
        let content_type = content_type
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(file_name));
        self.policy.check_file(file_name, &content_type, size_bytes)
    }

    /// Validate and store a new CV for an applicant in the caller's scope.
    pub async fn upload(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
        request: UploadRequest,
    ) -> Result<CvFile, DocumentError> {
        visible_applicant(self.store.as_ref(), caller, applicant_id)?
            .ok_or(DocumentError::NotFound)?;

        let file_name = request.file_name.trim().to_string();
        let content_type = request
            .content_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| guess_content_type(&file_name));
        let size_bytes = request.bytes.len() as u64;
        self.policy.check_file(&file_name, &content_type, size_bytes)?;

        let id = CvFileId::new();
        let extension = file_extension(&file_name);
        let key = storage_key(applicant_id, id, &extension);
        self.blobs.put(&key, &request.bytes).await?;

        let file = CvFile {
            id,
            applicant_id,
            file_name,
            storage_key: key.clone(),
            content_type,
            size_bytes,
            extension,
            extracted_text: None,
            failure_reason: None,
            uploaded_at: Utc::now(),
            status: CvFileStatus::Uploaded,
        };

        match self.store.insert_cv_file(file) {
            Ok(file) => {
                info!(cv_file_id = %file.id, applicant_id = %applicant_id, size_bytes, "stored CV upload");
                Ok(file)
            }
            Err(err) => {
                if let Err(cleanup) = self.blobs.delete(&key).await {
                    warn!(cv_file_id = %id, error = %cleanup, "failed to remove orphaned CV bytes");
                }
                Err(err.into())
            }
        }
    }

    /// Extract text for one file now, returning the updated record.
    pub async fn extract(&self, caller: &Caller, file_id: CvFileId) -> Result<CvFile, DocumentError> {
        let file = self.visible_file(caller, file_id)?;
        self.extract_file(file).await?;
        self.store
            .cv_file(file_id)?
            .ok_or(DocumentError::NotFound)
    }

    pub async fn content(
        &self,
        caller: &Caller,
        file_id: CvFileId,
    ) -> Result<DocumentContent, DocumentError> {
        let file = self.visible_file(caller, file_id)?;
        let bytes = self.blobs.get(&file.storage_key).await?;
        Ok(DocumentContent {
            file_name: file.file_name,
            content_type: file.content_type,
            bytes,
        })
    }

    pub fn files_for_applicant(
        &self,
        caller: &Caller,
        applicant_id: ApplicantId,
    ) -> Result<Vec<CvFile>, DocumentError> {
        visible_applicant(self.store.as_ref(), caller, applicant_id)?
            .ok_or(DocumentError::NotFound)?;
        Ok(self.store.cv_files_for_applicant(applicant_id)?)
    }

    /// Remove the record first, then its bytes; a file being extracted cannot be deleted.
    pub async fn delete_file(
        &self,
        caller: &Caller,
        file_id: CvFileId,
    ) -> Result<CvFile, DocumentError> {
        self.visible_file(caller, file_id)?;
        let removed = self.store.delete_cv_file(file_id)?;
        if let Err(err) = self.blobs.delete(&removed.storage_key).await {
            warn!(cv_file_id = %file_id, error = %err, "CV record removed but bytes were left behind");
        }
        info!(cv_file_id = %file_id, "deleted CV file");
        Ok(removed)
    }

    fn visible_file(&self, caller: &Caller, file_id: CvFileId) -> Result<CvFile, DocumentError> {
        let file = self.store.cv_file(file_id)?.ok_or(DocumentError::NotFound)?;
        visible_applicant(self.store.as_ref(), caller, file.applicant_id)?
            .ok_or(DocumentError::NotFound)?;
        Ok(file)
    }

    /// Drive a file to `Processed` or `Error` and return its text. Already
    /// processed files return their stored text without touching the bytes.
    pub(crate) async fn extract_file(&self, file: CvFile) -> Result<String, DocumentError> {
        if let (CvFileStatus::Processed, Some(text)) = (file.status, &file.extracted_text) {
            return Ok(text.clone());
        }

        // Runs detached so a dropped caller cannot strand the file in Processing.
        let service = self.clone();
        let file_id = file.id;
        match tokio::spawn(async move { service.run_extraction(file).await }).await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                warn!(cv_file_id = %file_id, error = %join_error, "extraction task aborted");
                Err(ExtractionError::ExtractionFailed("extraction task aborted".to_string()).into())
            }
        }
    }

    async fn run_extraction(&self, file: CvFile) -> Result<String, DocumentError> {
        let file = self
            .store
            .transition_cv_file(file.id, CvFileTransition::BeginProcessing)?;

        // The policy is re-checked before any bytes are read.
        if let Err(err) = self
            .policy
            .check(&file.extension, &file.content_type, file.size_bytes)
        {
            self.fail(&file, err.to_string())?;
            return Err(err.into());
        }

        let bytes = match self.blobs.get(&file.storage_key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.fail(&file, err.to_string())?;
                return Err(err.into());
            }
        };

        let extractor = self.extractor;
        let extension = file.extension.clone();
        let content_type = file.content_type.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            extractor.extract(&bytes, &extension, &content_type)
        })
        .await
        .unwrap_or_else(|join_error| {
            Err(ExtractionError::ExtractionFailed(format!(
                "extraction worker failed: {join_error}"
            )))
        });

        match extracted {
            Ok(text) => {
                self.store.transition_cv_file(
                    file.id,
                    CvFileTransition::Processed { text: text.clone() },
                )?;
                debug!(cv_file_id = %file.id, chars = text.chars().count(), "CV text extracted");
                Ok(text)
            }
            Err(err) => {
                self.fail(&file, err.to_string())?;
                Err(err.into())
            }
        }
    }

    fn fail(&self, file: &CvFile, reason: String) -> Result<(), RepositoryError> {
        warn!(cv_file_id = %file.id, file_name = %file.file_name, reason = %reason, "CV extraction failed");
        self.store
            .transition_cv_file(file.id, CvFileTransition::Failed { reason })?;
        Ok(())
    }
}
