use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a piece of text came from. Every chunk and every stored record keeps
/// this so a retrieved hit can be attributed back to its page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// Zero-based page index within `source`.
    pub page: u32,
}

/// One page of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

/// A bounded-length fragment of a page, including the text it shares with its
/// neighbour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl VectorRecord {
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            embedding,
            text: chunk.page_content,
            metadata: chunk.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub page: u32,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub file_name: String,
    pub saved_path: String,
    pub pages: usize,
    pub chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct OllamaGenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct OllamaGenerateResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct OllamaEmbedRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct OllamaEmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
}
