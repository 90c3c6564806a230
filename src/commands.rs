use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::RagError;
use crate::compose::{AnswerComposer, PromptPolicy};
use crate::config::Config;
use crate::embeddings::EmbeddingsClient;
use crate::generation::GenerationClient;
use crate::graph::ChatGraph;
use crate::index::service::IndexService;
use crate::loader::LoaderRegistry;
use crate::pipeline::{IngestionPipeline, RetrievalPipeline};
use crate::server::{self, AppState};

/// Components shared by the HTTP server and the CLI ingest path.
struct Stack {
    service: Arc<IndexService>,
    ingestion: IngestionPipeline,
    graph: ChatGraph,
}

fn build_stack(config: &Config) -> Stack {
    let embeddings = EmbeddingsClient::new(&config.embeddings, config.provider_timeout);
    let generation = GenerationClient::new(&config.generation, config.provider_timeout);

    let service = Arc::new(IndexService::new(config.index_path(), embeddings.profile()));
    let ingestion = IngestionPipeline::new(
        LoaderRegistry::new(),
        embeddings.clone(),
        config.chunking.clone(),
        Arc::clone(&service),
    );
    let retrieval =
        RetrievalPipeline::new(embeddings, Arc::clone(&service), config.retrieval_top_k);
    let composer = AnswerComposer::new(PromptPolicy::default(), generation);
    let graph = ChatGraph::new(retrieval, composer);

    Stack {
        service,
        ingestion,
        graph,
    }
}

/// Start the chatbot HTTP API
#[inline]
pub async fn serve(bind: Option<SocketAddr>) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let addr = bind.unwrap_or(config.bind_addr);

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .context("Failed to create data directory")?;
    tokio::fs::create_dir_all(config.uploads_dir())
        .await
        .context("Failed to create uploads directory")?;

    let stack = build_stack(&config);

    // A leftover index from a previous run is served immediately; anything
    // unusable is ignored and rebuilt on the next upload.
    match stack.service.ensure_loaded().await {
        Ok(index) => info!("Resuming with a persisted index of {} chunks", index.len()),
        Err(RagError::IndexNotFound) => {
            info!("No persisted index found; waiting for the first upload");
        }
        Err(error) => warn!("Ignoring unusable persisted index: {}", error),
    }

    println!("AI Heart Disease Chatbot API");
    println!("  Generation model: {}", config.generation.model);
    println!("  Embedding model: {}", config.embeddings.model);
    println!("  Index path: {}", config.index_path().display());
    println!("  Listening on http://{}", addr);

    let state = AppState::new(
        stack.service,
        stack.ingestion,
        stack.graph,
        config.uploads_dir(),
    );
    server::serve(state, addr).await?;

    Ok(())
}

/// Ingest a document into the persisted vector index
#[inline]
pub async fn ingest(file: &Path) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .context("Failed to create data directory")?;

    let stack = build_stack(&config);

    println!("Ingesting {}...", file.display());

    let summary = stack
        .ingestion
        .ingest(file)
        .await
        .context("Failed to ingest document")?;

    println!("Processed successfully!");
    println!("  Document: {}", summary.document);
    println!("  Chunks: {}", summary.chunks);
    println!("  Embedding dimension: {}", summary.dimension);
    println!("  Index written to: {}", config.index_path().display());

    Ok(())
}
