use crate::error::AppError;
use crate::query_payload::QueryPayload;
use crate::rag_response::{AskPdfResponse, AskResponse, UploadResponse};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use pdf_rag::RagSystem;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

pub fn router(rag: RagSystem, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/ai", post(ask))
        .route("/ask_pdf", post(ask_pdf))
        .route("/pdf", post(upload_pdf))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(rag)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /ai
async fn ask(
    State(rag): State<RagSystem>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<AskResponse>, AppError> {
    let answer = rag.query_service.ask(&payload.query).await?;
    Ok(Json(AskResponse { answer }))
}

/// POST /ask_pdf
async fn ask_pdf(
    State(rag): State<RagSystem>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<AskPdfResponse>, AppError> {
    let answer = rag.query_service.ask_with_context(&payload.query).await?;
    log::info!("Answered with {} sources", answer.sources.len());
    Ok(Json(answer.into()))
}

/// POST /pdf, multipart with the document in the `file` field.
async fn upload_pdf(
    State(rag): State<RagSystem>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no name".to_string()))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
        log::info!("Received {} ({} bytes)", file_name, data.len());

        let report = rag.ingest_service.ingest(&file_name, &data).await?;
        return Ok(Json(report.into()));
    }

    Err(AppError::BadRequest("Missing multipart field 'file'".to_string()))
}
