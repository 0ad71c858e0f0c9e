pub mod config;
pub mod document_processor;
pub mod embedding_service;
pub mod ingest_service;
pub mod models;
pub mod ollama_service;
pub mod query_service;
pub mod rag_system;
pub mod text_splitter;
pub mod vector_store;

pub use config::RagConfig;
pub use document_processor::{DocumentLoader, FileStore, PdfLoader};
pub use embedding_service::{Embedder, OllamaEmbeddings};
pub use ingest_service::IngestService;
pub use models::*;
pub use ollama_service::{Generator, OllamaLlm};
pub use query_service::QueryService;
pub use rag_system::RagSystem;
pub use text_splitter::RecursiveCharacterTextSplitter;
pub use vector_store::{LanceVectorStore, VectorIndex};
