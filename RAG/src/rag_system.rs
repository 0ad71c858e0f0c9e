use crate::config::RagConfig;
use crate::document_processor::{FileStore, PdfLoader};
use crate::embedding_service::OllamaEmbeddings;
use crate::ingest_service::IngestService;
use crate::ollama_service::OllamaLlm;
use crate::query_service::QueryService;
use crate::text_splitter::RecursiveCharacterTextSplitter;
use crate::vector_store::LanceVectorStore;
use anyhow::Result;
use std::sync::Arc;

/// The services the HTTP layer needs, built once at startup and shared
/// read-only afterwards.
#[derive(Clone)]
pub struct RagSystem {
    pub query_service: Arc<QueryService>,
    pub ingest_service: Arc<IngestService>,
}

impl RagSystem {
    pub fn new(query_service: Arc<QueryService>, ingest_service: Arc<IngestService>) -> Self {
        Self {
            query_service,
            ingest_service,
        }
    }

    /// Wires the Ollama-backed embedder and generator, the on-disk index and
    /// the PDF loader according to `config`.
    pub async fn from_config(config: &RagConfig) -> Result<Self> {
        log::info!("Initializing RAG System...");

        let embedder = Arc::new(OllamaEmbeddings::new(
            &config.ollama_base_url,
            &config.embed_model,
        ));
        let generator = Arc::new(OllamaLlm::new(&config.ollama_base_url, &config.generate_model));
        let index = Arc::new(LanceVectorStore::open(&config.db_dir).await?);
        let files = FileStore::open(&config.pdf_dir).await?;
        let splitter = RecursiveCharacterTextSplitter::new(config.chunk_size, config.chunk_overlap)?;

        let query_service = Arc::new(QueryService::new(
            embedder.clone(),
            generator.clone(),
            index.clone(),
            config.retrieval_k,
            config.score_threshold,
        ));
        let ingest_service = Arc::new(IngestService::new(
            files,
            Arc::new(PdfLoader::new()),
            splitter,
            embedder,
            index,
        ));

        log::info!(
            "RAG System initialized (model={}, embeddings={}, index={})",
            generator.model(),
            config.embed_model,
            config.db_dir.display()
        );

        Ok(Self::new(query_service, ingest_service))
    }
}
