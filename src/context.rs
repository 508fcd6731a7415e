//! Context retrieval for SQL generation.
//!
//! A retriever returns short documents related to the question (business
//! rules, naming conventions) that are added to the generation prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::RwLock;

use crate::error::{GateError, Result};

/// Default chunk size for ingested documents, in characters.
const CHUNK_SIZE: usize = 500;

/// Default cap on stored chunks.
pub const DEFAULT_MAX_STORED_CHUNKS: usize = 10_000;

/// A retrieved context document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDoc {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Relevance score; higher is better.
    #[serde(default)]
    pub score: f32,
}

impl ContextDoc {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: None,
            score: 0.0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Retrieves context documents relevant to a question.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Returns at most `limit` documents, best first.
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<ContextDoc>>;

    /// Stores a document for later retrieval. Returns the number of chunks
    /// stored.
    async fn ingest(&self, _content: &str, _source: Option<&str>) -> Result<usize> {
        Err(GateError::unavailable("context store does not accept documents"))
    }
}

/// In-memory retriever ranking chunks by shared keywords.
///
/// Holds at most `max_chunks` chunks; once full, the oldest are evicted.
#[derive(Debug)]
pub struct KeywordRetriever {
    chunks: RwLock<VecDeque<ContextDoc>>,
    max_chunks: usize,
}

impl Default for KeywordRetriever {
    fn default() -> Self {
        Self {
            chunks: RwLock::new(VecDeque::new()),
            max_chunks: DEFAULT_MAX_STORED_CHUNKS,
        }
    }
}

impl KeywordRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks.max(1);
        self
    }

    /// Splits `content` into chunks and stores them. Returns the chunk count.
    pub fn add_document(&self, content: &str, source: Option<&str>) -> Result<usize> {
        let pieces = chunk_text(content, CHUNK_SIZE);
        let count = pieces.len();

        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| GateError::internal("context store lock poisoned"))?;
        for piece in pieces {
            let doc = ContextDoc::new(piece);
            chunks.push_back(match source {
                Some(source) => doc.with_source(source),
                None => doc,
            });
        }

        let evicted = chunks.len().saturating_sub(self.max_chunks);
        chunks.drain(..evicted);

        tracing::info!(count, evicted, "Stored context chunks");
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContextRetriever for KeywordRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<ContextDoc>> {
        let terms = keywords(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let chunks = self
            .chunks
            .read()
            .map_err(|_| GateError::internal("context store lock poisoned"))?;

        let mut scored: Vec<ContextDoc> = chunks
            .iter()
            .filter_map(|doc| {
                let doc_terms = keywords(&doc.content);
                let shared = terms.intersection(&doc_terms).count();
                (shared > 0).then(|| ContextDoc {
                    score: shared as f32 / terms.len() as f32,
                    ..doc.clone()
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);

        tracing::debug!(retrieved = scored.len(), "Retrieved context documents");
        Ok(scored)
    }

    async fn ingest(&self, content: &str, source: Option<&str>) -> Result<usize> {
        self.add_document(content, source)
    }
}

/// Lowercased words of at least three characters.
fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Splits text into chunks of at most `size` characters on word boundaries.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
