use pdf_rag::{Answer, IngestReport};
use serde::Serialize;

#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Serialize)]
pub struct SourceEntry {
    #[serde(rename = "Page Number")]
    pub page_number: u32,
    #[serde(rename = "Context")]
    pub context: String,
}

#[derive(Serialize)]
pub struct AskPdfResponse {
    pub answer: String,
    pub sources: Vec<SourceEntry>,
}

impl From<Answer> for AskPdfResponse {
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.answer,
            sources: answer
                .sources
                .into_iter()
                .map(|source| SourceEntry {
                    page_number: source.page,
                    context: source.context,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub file_name: String,
    pub message: String,
    #[serde(rename = "Doc Length")]
    pub doc_length: usize,
    #[serde(rename = "Chunks Length")]
    pub chunks_length: usize,
}

impl From<IngestReport> for UploadResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            status: "success".to_string(),
            file_name: report.file_name,
            message: "File saved successfully".to_string(),
            doc_length: report.pages,
            chunks_length: report.chunks,
        }
    }
}
