
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A contiguous span of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text
    pub content: String,
    /// Name of the document the chunk came from
    pub source: String,
    /// Position of the chunk within the document
    pub sequence: usize,
}

/// Configuration for text chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// Join extracted segments into a single document text.
///
/// Blank segments are dropped; the rest are trimmed and separated by a
/// blank line.
#[inline]
pub fn assemble_text(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .join("\n\n")
}

/// Split text into fixed-size character windows.
///
/// Windows advance by `chunk_size - overlap` characters, so consecutive
/// chunks share exactly `overlap` characters verbatim. The final chunk may
/// be shorter than `chunk_size`. Boundaries are measured in characters, so
/// multi-byte text never splits inside a code point.
#[expect(
    clippy::string_slice,
    reason = "offsets come from char_indices and always land on char boundaries"
)]
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    let step = config.chunk_size.saturating_sub(config.overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + config.chunk_size).min(total);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}

/// Split a document's extracted segments into overlapping chunks.
#[inline]
pub fn split_document(source: &str, segments: &[String], config: &ChunkingConfig) -> Vec<Chunk> {
    let text = assemble_text(segments);
    let pieces = split_text(&text, config);

    debug!(
        "Chunked document '{}' into {} chunks ({} chars)",
        source,
        pieces.len(),
        text.chars().count()
    );

    pieces
        .into_iter()
        .enumerate()
        .map(|(sequence, content)| Chunk {
            content,
            source: source.to_string(),
            sequence,
        })
        .collect()
}
