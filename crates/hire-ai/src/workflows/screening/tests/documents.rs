use super::common::*;
use std::sync::Arc;

use crate::workflows::screening::documents::{
    docx_from_paragraphs, BlobStore, DocumentError, DocumentService, MemoryBlobStore,
    UploadPolicy, UploadRequest,
};
use crate::workflows::screening::domain::CvFileStatus;
use crate::workflows::screening::memory::MemoryStore;
use crate::workflows::screening::validation::ValidationError;

fn upload(file_name: &str, content_type: Option<&str>, bytes: &[u8]) -> UploadRequest {
    UploadRequest {
        file_name: file_name.to_string(),
        content_type: content_type.map(str::to_string),
        bytes: bytes.to_vec(),
    }
}

#[tokio::test]
async fn upload_stores_bytes_and_record() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");

    let file = h
        .services
        .documents
        .upload(&recruiter(), applicant.id, upload(" resume.TXT ", None, CV_TEXT.as_bytes()))
        .await
        .expect("upload accepted");

    assert_eq!(file.status, CvFileStatus::Uploaded);
    assert_eq!(file.file_name, "resume.TXT");
    assert_eq!(file.extension, "txt");
    assert_eq!(file.content_type, "text/plain");
    assert_eq!(file.size_bytes, CV_TEXT.len() as u64);
    assert!(file.extracted_text.is_none());
    assert!(h.blobs.contains(&file.storage_key));

    let content = h
        .services
        .documents
        .content(&recruiter(), file.id)
        .await
        .expect("content readable");
    assert_eq!(content.bytes, CV_TEXT.as_bytes());
    assert_eq!(content.file_name, "resume.TXT");
}

#[tokio::test]
async fn rejected_upload_stores_nothing() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");

    let cases = [
        (upload("setup.exe", None, b"MZ"), "extension"),
        (upload("cv.pdf", Some("text/plain"), b"%PDF-1.4"), "mismatch"),
        (upload("cv.txt", None, b""), "empty"),
        (upload("cv", None, b"text"), "no extension"),
    ];

    for (request, case) in cases {
        let err = h
            .services
            .documents
            .upload(&recruiter(), applicant.id, request)
            .await
            .expect_err(case);
        assert!(matches!(err, DocumentError::Validation(_)), "{case}: {err}");
    }

    assert!(h.blobs.is_empty());
    assert!(h
        .services
        .documents
        .files_for_applicant(&recruiter(), applicant.id)
        .expect("files visible")
        .is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::default());
    let documents = DocumentService::new(
        Arc::clone(&store),
        blobs.clone(),
        UploadPolicy::new(16, vec!["txt".to_string()]),
    );
    let catalog = crate::workflows::screening::catalog::CatalogService::new(Arc::clone(&store));
    let job = catalog
        .create_job_post(&recruiter(), new_job_post("Backend Engineer"))
        .expect("job post created");
    let applicant = catalog
        .create_applicant(&recruiter(), new_applicant(job.id, "Jordan", "Reyes"))
        .expect("applicant created");

    let err = documents
        .upload(&recruiter(), applicant.id, upload("cv.txt", None, &[b'a'; 17]))
        .await
        .expect_err("too large");

    assert!(matches!(
        err,
        DocumentError::Validation(ValidationError::FileTooLarge { size: 17, max: 16 })
    ));
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn upload_for_hidden_applicant_is_not_found() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");

    let err = h
        .services
        .documents
        .upload(&other_recruiter(), applicant.id, upload("cv.txt", None, b"hello"))
        .await
        .expect_err("hidden applicant");

    assert!(matches!(err, DocumentError::NotFound));
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn extraction_marks_file_processed() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let file = h.upload_text(&recruiter(), applicant.id, "  Jordan   Reyes \n\n\n Go  ").await;

    let processed = h
        .services
        .documents
        .extract(&recruiter(), file.id)
        .await
        .expect("extraction succeeds");

    assert_eq!(processed.status, CvFileStatus::Processed);
    let text = processed.extracted_text.expect("text stored");
    assert!(text.contains("Jordan Reyes"));
    assert!(text.contains("Go"));
    assert!(processed.failure_reason.is_none());

    h.blobs
        .delete(&file.storage_key)
        .await
        .expect("bytes removed");
    let again = h
        .services
        .documents
        .extract(&recruiter(), file.id)
        .await
        .expect("stored text reused");
    assert_eq!(again.extracted_text.as_deref(), Some(text.as_str()));
}

#[tokio::test]
async fn docx_upload_is_extracted() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let bytes = docx_from_paragraphs(&["Jordan Reyes", "Staff engineer at Acme"])
        .expect("docx builds");

    let file = h
        .services
        .documents
        .upload(&recruiter(), applicant.id, upload("cv.docx", None, &bytes))
        .await
        .expect("upload accepted");
    assert_eq!(
        file.content_type,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );

    let processed = h
        .services
        .documents
        .extract(&recruiter(), file.id)
        .await
        .expect("extraction succeeds");
    let text = processed.extracted_text.expect("text stored");
    assert!(text.contains("Staff engineer at Acme"));
}

#[tokio::test]
async fn corrupt_document_ends_in_error() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let file = h
        .services
        .documents
        .upload(
            &recruiter(),
            applicant.id,
            upload("cv.pdf", Some("application/pdf"), b"%PDF-1.4 truncated"),
        )
        .await
        .expect("upload accepted");

    let err = h
        .services
        .documents
        .extract(&recruiter(), file.id)
        .await
        .expect_err("corrupt pdf");
    assert!(matches!(err, DocumentError::Extraction(_)));

    let stored = h
        .services
        .documents
        .files_for_applicant(&recruiter(), applicant.id)
        .expect("files visible")
        .remove(0);
    assert_eq!(stored.status, CvFileStatus::Error);
    assert!(stored.failure_reason.is_some());
    assert!(stored.extracted_text.is_none());
}

#[tokio::test]
async fn missing_bytes_end_in_error() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let file = h.upload_text(&recruiter(), applicant.id, CV_TEXT).await;
    h.blobs
        .delete(&file.storage_key)
        .await
        .expect("bytes removed");

    let err = h
        .services
        .documents
        .extract(&recruiter(), file.id)
        .await
        .expect_err("bytes gone");

    assert!(matches!(err, DocumentError::Storage(_)));
    assert_eq!(h.file_status(file.id), CvFileStatus::Error);
}

#[tokio::test]
async fn delete_removes_record_and_bytes() {
    let h = harness(StubScorer::returning(verdict(50)));
    let job = h.job(&recruiter(), "Backend Engineer");
    let applicant = h.applicant(&recruiter(), job.id, "Jordan", "Reyes");
    let file = h.upload_text(&recruiter(), applicant.id, CV_TEXT).await;

    let hidden = h
        .services
        .documents
        .delete_file(&other_recruiter(), file.id)
        .await
        .expect_err("hidden file");
    assert!(matches!(hidden, DocumentError::NotFound));
    assert!(h.blobs.contains(&file.storage_key));

    h.services
        .documents
        .delete_file(&recruiter(), file.id)
        .await
        .expect("file deleted");

    assert!(!h.blobs.contains(&file.storage_key));
    assert!(matches!(
        h.services.documents.content(&recruiter(), file.id).await,
        Err(DocumentError::NotFound)
    ));
}

#[test]
fn validate_checks_declared_metadata_only() {
    let h = harness(StubScorer::returning(verdict(50)));
    let documents = &h.services.documents;

    assert!(documents.validate("cv.pdf", Some("application/pdf"), 2048).is_ok());
    assert!(documents.validate("cv.docx", None, 2048).is_ok());
    assert!(documents
        .validate("cv.pdf", Some("application/octet-stream"), 2048)
        .is_ok());
    assert!(matches!(
        documents.validate("cv.pdf", Some("text/plain"), 2048),
        Err(ValidationError::ContentTypeMismatch { .. })
    ));
    assert!(matches!(
        documents.validate("cv.rtf", None, 2048),
        Err(ValidationError::ExtensionNotAllowed { .. })
    ));
    assert!(matches!(
        documents.validate("cv.pdf", None, documents.policy().max_file_bytes() + 1),
        Err(ValidationError::FileTooLarge { .. })
    ));
}
