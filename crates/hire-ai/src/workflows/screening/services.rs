use std::sync::Arc;

use super::catalog::CatalogService;
use super::documents::{BlobStore, DocumentService, UploadPolicy};
use super::orchestrator::ScreeningOrchestrator;
use super::query::ApplicantQueryEngine;
use super::repository::RecruitmentStore;
use super::scoring::Scorer;
use crate::config::{QueryConfig, ScreeningConfig};

/// Every screening component wired over one store.
pub struct ScreeningServices<S> {
    pub catalog: CatalogService<S>,
    pub documents: DocumentService<S>,
    pub orchestrator: ScreeningOrchestrator<S>,
    pub queries: ApplicantQueryEngine<S>,
}

impl<S> ScreeningServices<S>
where
    S: RecruitmentStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        blobs: Arc<dyn BlobStore>,
        scorer: Arc<dyn Scorer>,
        screening: &ScreeningConfig,
        query: QueryConfig,
    ) -> Self {
        let documents = DocumentService::new(
            Arc::clone(&store),
            blobs,
            UploadPolicy::from_config(screening),
        );
        let orchestrator = ScreeningOrchestrator::new(
            Arc::clone(&store),
            documents.clone(),
            scorer,
            screening.max_concurrency,
        );

        Self {
            catalog: CatalogService::new(Arc::clone(&store)),
            documents,
            orchestrator,
            queries: ApplicantQueryEngine::new(store, query),
        }
    }
}
