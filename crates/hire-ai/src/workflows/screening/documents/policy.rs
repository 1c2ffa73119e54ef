use std::path::Path;

use serde::Serialize;

use crate::config::ScreeningConfig;
use crate::workflows::screening::validation::ValidationError;

/// Document formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Doc,
    Docx,
    PlainText,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "txt" | "text" => Some(Self::PlainText),
            _ => None,
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/msword" => Some(Self::Doc),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// The extension decides; the content type is only a fallback.
    pub fn detect(extension: &str, content_type: &str) -> Option<Self> {
        Self::from_extension(extension).or_else(|| Self::from_content_type(content_type))
    }
}

/// Lower-cased extension of a file name without the dot, or an empty string.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name.trim())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Size and type limits applied to every document before its bytes are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    max_file_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_file_bytes: u64, allowed_extensions: impl IntoIterator<Item = String>) -> Self {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self {
            max_file_bytes,
            allowed_extensions,
        }
    }

    pub fn from_config(config: &ScreeningConfig) -> Self {
        Self::new(config.max_file_bytes, config.allowed_extensions.clone())
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.allowed_extensions.iter().any(|allowed| *allowed == extension)
    }

    /// Pure predicate over declared metadata; never looks at content.
    pub fn check(
        &self,
        extension: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> Result<(), ValidationError> {
        if size_bytes == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if size_bytes > self.max_file_bytes {
            return Err(ValidationError::FileTooLarge {
                size: size_bytes,
                max: self.max_file_bytes,
            });
        }

        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if !self.allows_extension(&extension) {
            return Err(ValidationError::ExtensionNotAllowed {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }

        // Generic types such as application/octet-stream say nothing either way.
        if let (Some(declared), Some(by_extension)) = (
            DocumentFormat::from_content_type(content_type),
            DocumentFormat::from_extension(&extension),
        ) {
            if declared != by_extension {
                return Err(ValidationError::ContentTypeMismatch {
                    extension,
                    content_type: content_type.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Convenience form of [`UploadPolicy::check`] for a raw file name.
    pub fn check_file(
        &self,
        file_name: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> Result<(), ValidationError> {
        let extension = file_extension(file_name);
        if extension.is_empty() {
            return Err(ValidationError::MissingExtension(file_name.to_string()));
        }
        self.check(&extension, content_type, size_bytes)
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&ScreeningConfig::default())
    }
}
