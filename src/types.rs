//! Core types for the cordex search index.

use serde::{Deserialize, Serialize};

/// Segment-local document identifier (0-based within a segment).
pub type DocId = u32;

/// Segment-local term identifier, dense in first-seen order.
pub type TermId = u32;

/// Per-document record stored in a segment's `docs.bin`.
///
/// Immutable after the segment is written. `doc_len` counts indexable
/// tokens (after the stopword and minimum-length filters).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocInfo {
    /// Stable external identifier from the corpus metadata.
    pub cord_uid: String,
    /// Display title.
    pub title: String,
    /// Relative path of the source JSON inside the corpus slice.
    pub json_relpath: String,
    /// Number of indexable tokens.
    pub doc_len: u32,
}

/// A posting: document and in-document term frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    /// Segment-local document ID.
    pub doc_id: DocId,
    /// Term frequency, always >= 1.
    pub tf: u32,
}

/// Lexicon entry locating a term's posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexEntry {
    /// Segment-local term ID.
    pub term_id: TermId,
    /// Document frequency (length of the posting list).
    pub df: u32,
    /// Byte offset of the posting list inside its inverted file.
    pub offset: u64,
    /// Number of postings at `offset`; equals `df`.
    pub count: u32,
    /// Barrel that owns the term (0 for legacy segments).
    pub barrel_id: u32,
}

/// A single ranked search hit as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    pub segment: String,
    #[serde(rename = "docId")]
    pub doc_id: DocId,
    pub cord_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Response body for a search request. Also the value type of the search
/// result cache; timing fields are filled in by the HTTP layer and are
/// not part of the cached payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub k: u32,
    pub segments: usize,
    pub found: u64,
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_lookup_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<f64>,
}

impl SearchResponse {
    /// An empty response shell for a query (no results, `found = 0`).
    pub fn empty(query: &str, k: u32, segments: usize) -> Self {
        Self {
            query: query.to_string(),
            k,
            segments,
            found: 0,
            results: Vec::new(),
            cached: false,
            search_time_ms: None,
            cache_lookup_ms: None,
            total_time_ms: None,
        }
    }
}

/// Response body for an autocomplete request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub query: String,
    pub limit: usize,
    pub suggestions: Vec<String>,
}
