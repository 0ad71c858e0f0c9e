use crate::embedding_service::Embedder;
use crate::models::*;
use crate::ollama_service::Generator;
use crate::vector_store::VectorIndex;
use anyhow::Result;
use std::sync::Arc;

/// Answers questions, either straight from the model or grounded in the
/// retrieved PDF chunks.
pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    index: Arc<dyn VectorIndex>,
    k: usize,
    score_threshold: f32,
}

impl QueryService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: Arc<dyn VectorIndex>,
        k: usize,
        score_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            generator,
            index,
            k,
            score_threshold,
        }
    }

    /// The model's completion for `query`, untouched.
    pub async fn ask(&self, query: &str) -> Result<String> {
        self.generator.generate(query).await
    }

    pub async fn ask_with_context(&self, query: &str) -> Result<Answer> {
        let query_embedding = self.embedder.embed(query).await?;

        log::info!("Creating retriever (k={}, threshold={})", self.k, self.score_threshold);
        let hits = self
            .index
            .search(&query_embedding, self.k, self.score_threshold)
            .await?;

        let context = hits
            .iter()
            .map(|hit| hit.record.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = build_prompt(query, &context);

        let answer = self.generator.generate(&prompt).await?;

        let sources = hits
            .into_iter()
            .map(|hit| Source {
                page: hit.record.metadata.page,
                context: hit.record.text,
            })
            .collect();

        Ok(Answer { answer, sources })
    }
}

/// When nothing was retrieved the context is empty and the instruction to say
/// "I don't know" applies.
fn build_prompt(query: &str, context: &str) -> String {
    format!(
        r#"<s>[INST] You are a technical assistant good at searching documents and answering questions. Answer the question using only the context provided below. If the context does not contain the answer, say "I don't know".[/INST] </s>
[INST] {query}
    Context: {context}
    Answer:
[/INST]"#
    )
}
