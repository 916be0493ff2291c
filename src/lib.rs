//! cordex - a self-contained full-text search service over the CORD-19
//! corpus.
//!
//! The library builds an on-disk inverted index from the corpus metadata
//! CSV plus per-document JSON parses, then serves BM25-ranked retrieval,
//! prefix autocomplete, and optional embedding-based query expansion:
//! - **Segments**: immutable index units with a barrelized lexicon and
//!   postings layout, registered in a binary manifest
//! - **Engine**: the process-wide service object combining segments,
//!   metadata positions, autocomplete, embeddings, and result caches
//! - **HTTP API**: a small axum surface for search/suggest/reload/append

pub mod autocomplete;
pub mod binio;
pub mod builder;
pub mod cache;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod query;
pub mod segment;
pub mod semantic;
pub mod server;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use autocomplete::AutocompleteIndex;
pub use builder::{append_document, SegmentWriter};
pub use cache::LruCache;
pub use engine::Engine;
pub use error::{Error, IndexError, Result, SearchError};
pub use metadata::MetadataTable;
pub use segment::{load_manifest, save_manifest, seg_name, Segment};
pub use semantic::SemanticIndex;
pub use text::tokenize;
pub use types::{DocId, DocInfo, LexEntry, SearchHit, SearchResponse, TermId};
