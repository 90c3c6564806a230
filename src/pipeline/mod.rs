//! Orchestration of document ingestion and chunk retrieval.


use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use crate::chunking::{self, Chunk, ChunkingConfig};
use crate::embeddings::EmbeddingsClient;
use crate::index::VectorIndex;
use crate::index::service::IndexService;
use crate::loader::LoaderRegistry;
use crate::{RagError, Result};

/// Outcome of a successful ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub document: String,
    pub chunks: usize,
    pub dimension: usize,
}

/// Turns an uploaded document into the active vector index.
#[derive(Clone)]
pub struct IngestionPipeline {
    registry: LoaderRegistry,
    embeddings: EmbeddingsClient,
    chunking: ChunkingConfig,
    service: Arc<IndexService>,
    index_path: PathBuf,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(
        registry: LoaderRegistry,
        embeddings: EmbeddingsClient,
        chunking: ChunkingConfig,
        service: Arc<IndexService>,
    ) -> Self {
        let index_path = service.index_path().to_path_buf();
        Self {
            registry,
            embeddings,
            chunking,
            service,
            index_path,
        }
    }

    /// Whether a loader is registered for the document at `path`.
    #[inline]
    pub fn can_ingest(&self, path: &Path) -> bool {
        self.registry.supports(path)
    }

    #[inline]
    pub fn supported_extensions(&self) -> Vec<String> {
        self.registry.supported_extensions()
    }

    /// Runs the full load, chunk, embed, persist sequence for one document.
    ///
    /// The new index becomes active only after it has been persisted, so a
    /// failure partway through leaves the previous index untouched.
    #[inline]
    pub async fn ingest(&self, path: &Path) -> Result<IngestSummary> {
        let document = document_name(path);
        // Resolve the loader up front so unsupported formats fail before any IO.
        let loader = self.registry.resolve(path)?;

        info!("Ingesting document '{}'", document);

        let load_path = path.to_path_buf();
        let segments = tokio::task::spawn_blocking(move || loader.load(&load_path))
            .await
            .context("Document load task failed")??;

        let chunks = chunking::split_document(&document, &segments, &self.chunking);
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument(document));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embeddings.clone();
        let vectors = tokio::task::spawn_blocking(move || embeddings.embed_batch(&texts))
            .await
            .context("Embedding task failed")??;

        let index = VectorIndex::build(chunks, vectors, &self.embeddings.profile())?;

        let persist_path = self.index_path.clone();
        let index = tokio::task::spawn_blocking(move || -> Result<VectorIndex> {
            index.persist(&persist_path)?;
            Ok(index)
        })
        .await
        .context("Index persist task failed")??;

        let installed = self.service.install(index).await;

        info!(
            "Ingested '{}' into {} chunks ({}d embeddings)",
            document,
            installed.len(),
            installed.fingerprint().dimension
        );

        Ok(IngestSummary {
            document,
            chunks: installed.len(),
            dimension: installed.fingerprint().dimension,
        })
    }
}

/// Retrieves the chunks most relevant to a question.
#[derive(Clone)]
pub struct RetrievalPipeline {
    embeddings: EmbeddingsClient,
    service: Arc<IndexService>,
    top_k: usize,
}

impl RetrievalPipeline {
    #[inline]
    pub fn new(embeddings: EmbeddingsClient, service: Arc<IndexService>, top_k: usize) -> Self {
        Self {
            embeddings,
            service,
            top_k,
        }
    }

    /// Embeds the question and returns the closest chunks from the index.
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        let index = match self.service.ensure_loaded().await {
            Ok(index) => index,
            Err(RagError::IndexNotFound) => return Err(RagError::NoDocumentLoaded),
            Err(err) => return Err(err),
        };

        let embeddings = self.embeddings.clone();
        let query = question.to_string();
        let vector = tokio::task::spawn_blocking(move || embeddings.embed(&query))
            .await
            .context("Query embedding task failed")??;

        let hits = index.search(&vector, self.top_k)?;
        for (chunk, score) in &hits {
            debug!(
                "Retrieved chunk {} of '{}' (score {:.4})",
                chunk.sequence, chunk.source, score
            );
        }

        Ok(hits.into_iter().map(|(chunk, _)| chunk).collect())
    }
}

fn document_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}
