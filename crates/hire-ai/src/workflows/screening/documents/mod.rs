//! CV intake: upload policy, byte storage, and text extraction.

pub mod extract;
pub mod policy;
pub mod service;
pub mod storage;

#[cfg(test)]
pub(crate) use extract::docx_from_paragraphs;
pub use extract::{ExtractionError, TextExtractor};
pub use policy::{file_extension, DocumentFormat, UploadPolicy};
pub use service::{guess_content_type, DocumentContent, DocumentError, DocumentService, UploadRequest};
pub use storage::{storage_key, BlobStore, FilesystemBlobStore, MemoryBlobStore, StorageError};
