mod error;
mod query_payload;
mod rag_response;
mod routes;

use pdf_rag::{RagConfig, RagSystem};

#[tokio::main]
async fn main() {
    // Initialize environment variables and logging
    dotenv::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        log::error!("Server stopped: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = RagConfig::from_env()?;
    let rag_system = RagSystem::from_config(&config).await?;

    let app = routes::router(rag_system, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
