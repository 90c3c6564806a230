
pub mod service;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunking::Chunk;
use crate::embeddings::{self, EmbeddingProfile};
use crate::{RagError, Result};

/// Bump when the persisted layout changes shape.
const STORAGE_VERSION: u32 = 1;

const EPSILON: f32 = 1e-10;

/// Embedding-space identity stamped into a persisted index.
///
/// An index built under one fingerprint is meaningless under another, so
/// loads reject any mismatch instead of silently serving bad scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFingerprint {
    pub model: String,
    pub normalized: bool,
    pub dimension: usize,
}

impl IndexFingerprint {
    /// Whether an index with this fingerprint can serve a live profile.
    #[inline]
    pub fn matches(&self, profile: &EmbeddingProfile) -> bool {
        self.model == profile.model && self.normalized == profile.normalize
    }
}

/// One embedded chunk stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Flat in-memory vector index with exact cosine search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    fingerprint: IndexFingerprint,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from parallel chunk and embedding lists.
    #[inline]
    pub fn build(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        profile: &EmbeddingProfile,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between chunk and embedding counts: {} vs {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(RagError::Embedding(
                "embeddings have zero dimension".to_string(),
            ));
        }

        for vector in &vectors {
            if vector.len() != dimension {
                return Err(RagError::Embedding(format!(
                    "Inconsistent embedding dimensions: {} vs {}",
                    dimension,
                    vector.len()
                )));
            }
        }

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexEntry {
                id: Uuid::new_v4().to_string(),
                chunk,
                embedding,
            })
            .collect();

        info!(
            "Built vector index with {} entries ({}d)",
            entries.len(),
            dimension
        );

        Ok(Self {
            version: STORAGE_VERSION,
            fingerprint: IndexFingerprint {
                model: profile.model.clone(),
                normalized: profile.normalize,
                dimension,
            },
            built_at: Utc::now(),
            entries,
        })
    }

    /// Exact top-k search over every entry.
    ///
    /// Normalized indexes score by dot product, unnormalized ones by full
    /// cosine similarity. Ties keep insertion order; `k` beyond the index
    /// size is capped; `k == 0` yields no hits.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>> {
        if self.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        if query.len() != self.fingerprint.dimension {
            return Err(RagError::Embedding(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.fingerprint.dimension
            )));
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let score = if self.fingerprint.normalized {
                    dot_product(query, &entry.embedding)
                } else {
                    cosine_similarity(query, &entry.embedding)
                };
                (position, score)
            })
            .collect();

        // Stable sort keeps earlier entries first on equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let hits = scored
            .into_iter()
            .take(k)
            .map(|(position, score)| (self.entries[position].chunk.clone(), score))
            .collect();

        Ok(hits)
    }

    /// Atomically persist the index as JSON.
    ///
    /// Writes a sibling temp file first and renames it into place, so a
    /// crash mid-write never corrupts an existing index.
    #[inline]
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(self).context("Failed to serialize vector index")?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)?;
        fs::rename(&tmp_path, path)?;

        info!(
            "Persisted vector index with {} entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a persisted index and verify it matches the live profile.
    #[inline]
    pub fn load(path: &Path, expected: &EmbeddingProfile) -> Result<Self> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound);
            }
            Err(error) => return Err(error.into()),
        };

        let mut index: Self =
            serde_json::from_str(&json).context("Failed to parse persisted vector index")?;

        if index.version != STORAGE_VERSION {
            return Err(RagError::IndexMismatch(format!(
                "storage version {} (expected {})",
                index.version, STORAGE_VERSION
            )));
        }

        if !index.fingerprint.matches(expected) {
            warn!(
                "Persisted index was built with model '{}' (normalized: {}); active profile is '{}' (normalized: {})",
                index.fingerprint.model,
                index.fingerprint.normalized,
                expected.model,
                expected.normalize
            );
            return Err(RagError::IndexMismatch(format!(
                "index was built with model '{}' (normalized: {}); upload the document again to rebuild it",
                index.fingerprint.model, index.fingerprint.normalized
            )));
        }

        // Guard against drift from JSON round-tripping of floats.
        if expected.normalize {
            for entry in &mut index.entries {
                embeddings::normalize(&mut entry.embedding);
            }
        }

        debug!(
            "Loaded vector index with {} entries from {}",
            index.entries.len(),
            path.display()
        );
        Ok(index)
    }

    /// Number of entries in the index.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn fingerprint(&self) -> &IndexFingerprint {
        &self.fingerprint
    }

    /// When the index was built.
    #[inline]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = dot_product(a, a).sqrt();
    let norm_b = dot_product(b, b).sqrt();

    if norm_a < EPSILON || norm_b < EPSILON {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
