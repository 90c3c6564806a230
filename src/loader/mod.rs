
use anyhow::Context;
use lopdf::Document as PdfDocument;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{RagError, Result};

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Text,
    Markdown,
}

/// Extracts plain text from one document format.
pub trait DocumentLoader: Send + Sync {
    fn format(&self) -> DocumentFormat;

    /// Extract the document's text as an ordered list of segments.
    ///
    /// Segment granularity is up to the loader; PDF yields one segment per
    /// page, plain formats yield a single segment.
    fn load(&self, path: &Path) -> Result<Vec<String>>;
}

/// Loader for PDF documents.
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    #[inline]
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    #[inline]
    fn load(&self, path: &Path) -> Result<Vec<String>> {
        let data = fs::read(path)?;
        let doc = PdfDocument::load_mem(&data).context("Failed to parse PDF document")?;

        let pages = doc.get_pages();
        let mut segments = Vec::with_capacity(pages.len());

        for (page_num, _page_id) in pages {
            match doc.extract_text(&[page_num]) {
                Ok(page_text) => segments.push(page_text),
                Err(error) => {
                    // A single broken page should not sink the document.
                    warn!("Skipping PDF page {}: {}", page_num, error);
                }
            }
        }

        debug!("Extracted text from {} PDF pages", segments.len());
        Ok(segments)
    }
}

/// Loader for plain text documents.
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    #[inline]
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Text
    }

    #[inline]
    fn load(&self, path: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)?;
        Ok(vec![content])
    }
}

/// Loader for markdown documents.
pub struct MarkdownLoader;

impl DocumentLoader for MarkdownLoader {
    #[inline]
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Markdown
    }

    #[inline]
    fn load(&self, path: &Path) -> Result<Vec<String>> {
        let markdown = fs::read_to_string(path)?;
        Ok(vec![markdown_to_text(&markdown)])
    }
}

/// Strip markdown syntax, keeping readable text and code content.
fn markdown_to_text(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut text = String::new();

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph | Tag::Heading { .. } | Tag::CodeBlock(_) => {
                    if !text.is_empty() && !text.ends_with("\n\n") {
                        text.push('\n');
                    }
                }
                Tag::Item => {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::Item => {
                    text.push('\n');
                }
                _ => {}
            },
            Event::Text(content) => text.push_str(&content),
            Event::Code(code) => text.push_str(&code),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            _ => {}
        }
    }

    text.trim().to_string()
}

/// Dispatches a document path to the loader for its extension.
#[derive(Clone)]
pub struct LoaderRegistry {
    by_extension: HashMap<String, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    /// Build a registry with the built-in loaders (`pdf`, `txt`, `md`).
    #[inline]
    pub fn new() -> Self {
        let mut registry = Self {
            by_extension: HashMap::new(),
        };
        registry.register("pdf", Arc::new(PdfLoader));
        registry.register("txt", Arc::new(TextLoader));
        registry.register("md", Arc::new(MarkdownLoader));
        registry
    }

    /// Register a loader for a file extension (without the dot).
    #[inline]
    pub fn register(&mut self, extension: &str, loader: Arc<dyn DocumentLoader>) {
        self.by_extension.insert(extension.to_lowercase(), loader);
    }

    /// Find the loader for a path, matching the extension case-insensitively.
    #[inline]
    pub fn resolve(&self, path: &Path) -> Result<Arc<dyn DocumentLoader>> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .ok_or_else(|| RagError::UnsupportedFormat("missing file extension".to_string()))?;

        self.by_extension
            .get(&extension)
            .map(Arc::clone)
            .ok_or_else(|| RagError::UnsupportedFormat(format!(".{extension}")))
    }

    /// Whether a path's extension maps to a registered loader.
    #[inline]
    pub fn supports(&self, path: &Path) -> bool {
        self.resolve(path).is_ok()
    }

    /// Extensions this registry can ingest, without dots, sorted.
    #[inline]
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }
}

impl Default for LoaderRegistry {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
