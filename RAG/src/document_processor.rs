use crate::models::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;

/// Turns a file on disk into one `Document` per page, in page order.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Vec<Document>>;
}

pub struct PdfLoader;

impl PdfLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let source = path.to_string_lossy().to_string();
        log::info!("Loading PDF: {}", source);

        let bytes = fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", source))?;

        // pdf-extract is CPU bound and synchronous.
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .context("PDF extraction task failed")?
        .with_context(|| format!("failed to extract text from {}", source))?;

        let documents: Vec<Document> = pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| Document {
                page_content: clean_page_text(&text),
                metadata: DocumentMetadata {
                    source: source.clone(),
                    page: index as u32,
                },
            })
            .collect();

        log::info!("Docs len={}", documents.len());
        Ok(documents)
    }
}

/// Collapses runs of spaces/tabs and of blank lines left behind by the PDF
/// text layer. Single and double newlines survive since the splitter cuts on
/// them.
fn clean_page_text(text: &str) -> String {
    static RE_SPACES: OnceLock<Regex> = OnceLock::new();
    static RE_BLANK_LINES: OnceLock<Regex> = OnceLock::new();

    let re_spaces = RE_SPACES.get_or_init(|| Regex::new(r"[ \t\u{a0}]+").expect("static pattern"));
    let re_blank_lines =
        RE_BLANK_LINES.get_or_init(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("static pattern"));

    let cleaned = re_spaces.replace_all(text, " ");
    let cleaned = re_blank_lines.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}

/// Raw uploads, one file per name. Saving an existing name replaces it.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create upload directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Where `file_name` is stored. Only the final path component of the
    /// client-supplied name is used.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        let name = Path::new(file_name)
            .file_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow::anyhow!("invalid file name: {:?}", file_name))?;
        Ok(self.dir.join(name))
    }

    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(file_name)?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to save {}", path.display()))?;
        log::info!("File saved as: {}", path.display());
        Ok(path)
    }
}
