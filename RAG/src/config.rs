use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub bind_addr: String,
    pub ollama_base_url: String,
    pub generate_model: String,
    pub embed_model: String,
    pub pdf_dir: PathBuf,
    pub db_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    pub score_threshold: f32,
    pub max_upload_bytes: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            generate_model: "llama3.1".to_string(),
            embed_model: "llama3.1".to_string(),
            pdf_dir: PathBuf::from("pdf"),
            db_dir: PathBuf::from("db"),
            chunk_size: 1024,
            chunk_overlap: 80,
            retrieval_k: 20,
            score_threshold: 0.1,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl RagConfig {
    /// Reads the configuration from the process environment, falling back to
    /// the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            ollama_base_url: lookup("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            generate_model: lookup("OLLAMA_MODEL").unwrap_or(defaults.generate_model),
            embed_model: lookup("OLLAMA_EMBED_MODEL").unwrap_or(defaults.embed_model),
            pdf_dir: lookup("PDF_DIR").map(PathBuf::from).unwrap_or(defaults.pdf_dir),
            db_dir: lookup("DB_DIR").map(PathBuf::from).unwrap_or(defaults.db_dir),
            chunk_size: parse_var(&lookup, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_var(&lookup, "CHUNK_OVERLAP", defaults.chunk_overlap)?,
            retrieval_k: parse_var(&lookup, "RETRIEVAL_K", defaults.retrieval_k)?,
            score_threshold: parse_var(&lookup, "SCORE_THRESHOLD", defaults.score_threshold)?,
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        };

        anyhow::ensure!(
            config.chunk_overlap < config.chunk_size,
            "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
            config.chunk_overlap,
            config.chunk_size
        );

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
