use crate::document_processor::{DocumentLoader, FileStore};
use crate::embedding_service::Embedder;
use crate::models::*;
use crate::text_splitter::RecursiveCharacterTextSplitter;
use crate::vector_store::VectorIndex;
use anyhow::Result;
use std::sync::Arc;

/// Upload pipeline: save, load pages, split, embed, append.
///
/// There is no rollback. If any step after saving fails the raw file stays on
/// disk and whatever was appended before the failure stays in the index.
pub struct IngestService {
    files: FileStore,
    loader: Arc<dyn DocumentLoader>,
    splitter: RecursiveCharacterTextSplitter,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl IngestService {
    pub fn new(
        files: FileStore,
        loader: Arc<dyn DocumentLoader>,
        splitter: RecursiveCharacterTextSplitter,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            files,
            loader,
            splitter,
            embedder,
            index,
        }
    }

    pub async fn ingest(&self, file_name: &str, bytes: &[u8]) -> Result<IngestReport> {
        let saved_path = self.files.save(file_name, bytes).await?;

        let documents = self.loader.load(&saved_path).await?;

        let chunks = self.splitter.split_documents(&documents);
        log::info!("Chunks len={}", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.page_content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        anyhow::ensure!(
            embeddings.len() == chunks.len(),
            "embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        );

        let chunk_count = chunks.len();
        let records = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord::from_chunk(chunk, embedding))
            .collect();
        self.index.add(records).await?;

        Ok(IngestReport {
            file_name: file_name.to_string(),
            saved_path: saved_path.to_string_lossy().to_string(),
            pages: documents.len(),
            chunks: chunk_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::LanceVectorStore;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    /// Reads the saved file as UTF-8 and treats form feeds as page breaks.
    struct FormFeedLoader;

    #[async_trait]
    impl DocumentLoader for FormFeedLoader {
        async fn load(&self, path: &Path) -> Result<Vec<Document>> {
            let text = tokio::fs::read_to_string(path).await?;
            let source = path.to_string_lossy().to_string();
            if text.is_empty() {
                return Ok(Vec::new());
            }
            Ok(text
                .split('\u{c}')
                .enumerate()
                .map(|(page, content)| Document {
                    page_content: content.to_string(),
                    metadata: DocumentMetadata {
                        source: source.clone(),
                        page: page as u32,
                    },
                })
                .collect())
        }
    }

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, text.len() as f32])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("embedding model unavailable")
        }
    }

    fn body_text(prefix: &str, min_chars: usize) -> String {
        let mut text = String::new();
        let mut i = 0;
        while text.len() < min_chars {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&format!("{}{}", prefix, i));
            i += 1;
        }
        text
    }

    async fn setup(dir: &TempDir, embedder: Arc<dyn Embedder>) -> (IngestService, Arc<LanceVectorStore>) {
        let files = FileStore::open(dir.path().join("pdf")).await.unwrap();
        let index = Arc::new(LanceVectorStore::open(dir.path().join("db")).await.unwrap());
        let service = IngestService::new(
            files,
            Arc::new(FormFeedLoader),
            RecursiveCharacterTextSplitter::new(1024, 80).unwrap(),
            embedder,
            index.clone(),
        );
        (service, index)
    }

    #[tokio::test]
    async fn three_page_upload_reports_pages_and_chunks() {
        let dir = TempDir::new().unwrap();
        let (service, index) = setup(&dir, Arc::new(LengthEmbedder)).await;
        let pdf = (0..3)
            .map(|p| body_text(&format!("page{}word", p), 2500))
            .collect::<Vec<_>>()
            .join("\u{c}");

        let report = service.ingest("resume.pdf", pdf.as_bytes()).await.unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.chunks, 9);
        assert_eq!(report.file_name, "resume.pdf");
        assert!(report.saved_path.ends_with("resume.pdf"));
        assert_eq!(index.len().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn empty_document_has_no_chunks() {
        let dir = TempDir::new().unwrap();
        let (service, index) = setup(&dir, Arc::new(LengthEmbedder)).await;

        let report = service.ingest("blank.pdf", b"   \x0c  ").await.unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.chunks, 0);
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn same_name_overwrites_file_but_index_keeps_both() {
        let dir = TempDir::new().unwrap();
        let (service, index) = setup(&dir, Arc::new(LengthEmbedder)).await;

        service.ingest("cv.pdf", b"first version").await.unwrap();
        service.ingest("cv.pdf", b"second version").await.unwrap();

        let saved = std::fs::read_to_string(dir.path().join("pdf").join("cv.pdf")).unwrap();
        assert_eq!(saved, "second version");

        let hits = index.search(&[1.0, 0.0], 10, 0.0).await.unwrap();
        let mut texts: Vec<String> = hits.into_iter().map(|h| h.record.text).collect();
        texts.sort();
        assert_eq!(texts, vec!["first version", "second version"]);
    }

    #[tokio::test]
    async fn failed_embedding_keeps_the_raw_file() {
        let dir = TempDir::new().unwrap();
        let (service, index) = setup(&dir, Arc::new(FailingEmbedder)).await;

        let err = service.ingest("cv.pdf", b"some text").await.unwrap_err();

        assert!(err.to_string().contains("embedding model unavailable"));
        assert!(dir.path().join("pdf").join("cv.pdf").exists());
        assert_eq!(index.len().await.unwrap(), 0);
    }
}
