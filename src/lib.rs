use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Document has no extractable text: {0}")]
    EmptyDocument(String),

    #[error("No persisted index found")]
    IndexNotFound,

    #[error("No document has been uploaded yet. Please upload a document first.")]
    NoDocumentLoaded,

    #[error("Vector index holds no entries")]
    EmptyIndex,

    #[error("Index fingerprint mismatch: {0}")]
    IndexMismatch(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod compose;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod graph;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod server;
