//! The process-wide search service object.
//!
//! The engine owns the segments, the metadata positions, the autocomplete
//! trie, the optional semantic index, and the three result caches. The
//! HTTP layer wraps it in one coarse mutex: reloads, searches, suggests,
//! cache traffic, and appends all serialize on it, which keeps the shared
//! posting-stream handles and cache state consistent.

use crate::autocomplete::AutocompleteIndex;
use crate::builder;
use crate::cache::{
    self, LruCache, AI_OVERVIEW_CACHE_CAPACITY, AI_OVERVIEW_CACHE_FILE, AI_SUMMARY_CACHE_CAPACITY,
    AI_SUMMARY_CACHE_FILE, SEARCH_CACHE_CAPACITY, SEARCH_CACHE_FILE,
};
use crate::error::{IndexError, Result, SearchError};
use crate::metadata::MetadataTable;
use crate::query::{self, Hit, TopK};
use crate::segment::{self, Segment};
use crate::semantic::SemanticIndex;
use crate::text;
use crate::types::{DocInfo, SearchHit, SearchResponse, SuggestResponse};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Environment variable overriding the embeddings file location.
pub const EMBEDDINGS_ENV: &str = "EMBEDDINGS_PATH";

/// Filenames probed for embeddings under the index directory when the
/// environment variable is unset.
const EMBEDDING_CANDIDATES: &[&str] =
    &["embeddings.vec", "embeddings.txt", "glove.txt", "vectors.txt"];

/// Candidates per base term during semantic expansion.
const EXPAND_PER_TERM: usize = 3;
/// Candidates from the query centroid.
const EXPAND_GLOBAL_TOPK: usize = 5;
/// Minimum cosine similarity for an expansion candidate.
const EXPAND_MIN_SIM: f32 = 0.55;
/// Weight scale for expanded terms.
const EXPAND_ALPHA: f32 = 0.6;
/// Hard cap on the weighted query term set.
const EXPAND_MAX_TERMS: usize = 40;

/// Suggestions kept per trie node.
const AUTOCOMPLETE_TOP: usize = 10;

/// Usage counters surfaced at `/api/stats`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EngineStats {
    pub total_searches: u64,
    pub search_cache_hits: u64,
    pub suggest_calls: u64,
    pub documents_added: u64,
    pub reloads: u64,
}

pub struct Engine {
    index_dir: PathBuf,
    seg_names: Vec<String>,
    segments: Vec<Segment>,
    metadata: Option<MetadataTable>,
    autocomplete: AutocompleteIndex,
    semantic: SemanticIndex,
    search_cache: LruCache<SearchResponse>,
    overview_cache: LruCache<Value>,
    summary_cache: LruCache<Value>,
    stats: EngineStats,
}

impl Engine {
    /// Engine with cache files in the process working directory.
    pub fn new(index_dir: impl Into<PathBuf>) -> Engine {
        Self::with_cache_dir(index_dir, ".")
    }

    /// Engine with cache files rooted at an explicit directory.
    pub fn with_cache_dir(index_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Engine {
        let cache_dir = cache_dir.into();
        Engine {
            index_dir: index_dir.into(),
            seg_names: Vec::new(),
            segments: Vec::new(),
            metadata: None,
            autocomplete: AutocompleteIndex::new(),
            semantic: SemanticIndex::default(),
            search_cache: LruCache::open(cache_dir.join(SEARCH_CACHE_FILE), SEARCH_CACHE_CAPACITY),
            overview_cache: LruCache::open(
                cache_dir.join(AI_OVERVIEW_CACHE_FILE),
                AI_OVERVIEW_CACHE_CAPACITY,
            ),
            summary_cache: LruCache::open(
                cache_dir.join(AI_SUMMARY_CACHE_FILE),
                AI_SUMMARY_CACHE_CAPACITY,
            ),
            stats: EngineStats::default(),
        }
    }

    pub fn index_dir(&self) -> &std::path::Path {
        &self.index_dir
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Rebuild all in-memory state from disk.
    ///
    /// Any failure leaves the previous state intact: new segments are
    /// loaded into a scratch list and only swapped in once every one of
    /// them opened cleanly.
    pub fn reload(&mut self) -> Result<()> {
        let manifest_path = self.index_dir.join("manifest.bin");
        let mut seg_names = segment::load_manifest(&manifest_path)?;

        if seg_names.is_empty() {
            // No manifest: fall back to scanning the segments directory.
            let segroot = self.index_dir.join("segments");
            if segroot.is_dir() {
                for entry in fs::read_dir(&segroot)? {
                    let entry = entry?;
                    if !entry.file_type()?.is_dir() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.starts_with("seg_") {
                        seg_names.push(name);
                    }
                }
                seg_names.sort();
            }
        }

        if seg_names.is_empty() {
            return Err(IndexError::EmptyIndex.into());
        }

        let mut loaded = Vec::with_capacity(seg_names.len());
        for name in &seg_names {
            let segdir = self.index_dir.join("segments").join(name);
            match Segment::open(&segdir) {
                Ok(seg) => loaded.push(seg),
                Err(e) => {
                    error!(segment = %segdir.display(), error = %e, "failed to load segment");
                    return Err(e);
                }
            }
        }

        self.seg_names = seg_names;
        self.segments = loaded;

        // Autocomplete scores are document frequencies summed across all
        // segment lexicons.
        let mut term_to_score: HashMap<String, u32> = HashMap::new();
        for seg in &self.segments {
            for (term, entry) in &seg.lex {
                let score = term_to_score.entry(term.clone()).or_insert(0);
                *score = score.saturating_add(entry.df);
            }
        }
        self.autocomplete.build(&term_to_score, AUTOCOMPLETE_TOP);

        let meta_path = self.index_dir.join("metadata.csv");
        self.metadata = match MetadataTable::scan(&meta_path) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "metadata unavailable");
                None
            }
        };

        self.semantic = SemanticIndex::default();
        if let Some(path) = self.embeddings_path() {
            let needed: HashSet<String> = term_to_score.into_keys().collect();
            match SemanticIndex::load_from_text(&path, &needed) {
                Ok(idx) if idx.enabled => self.semantic = idx,
                Ok(_) => warn!(
                    path = %path.display(),
                    "embeddings file had no usable vectors; semantic expansion disabled"
                ),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load embeddings"),
            }
        }

        // Re-read cache files; unsaved updates are flushed first so a
        // reload never loses puts.
        self.search_cache.flush();
        self.overview_cache.flush();
        self.summary_cache.flush();
        self.search_cache =
            LruCache::open(self.search_cache.path().to_path_buf(), SEARCH_CACHE_CAPACITY);
        self.overview_cache = LruCache::open(
            self.overview_cache.path().to_path_buf(),
            AI_OVERVIEW_CACHE_CAPACITY,
        );
        self.summary_cache = LruCache::open(
            self.summary_cache.path().to_path_buf(),
            AI_SUMMARY_CACHE_CAPACITY,
        );

        self.stats.reloads += 1;
        info!(
            segments = self.segments.len(),
            metadata_rows = self.metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            semantic = self.semantic.enabled,
            "reload complete"
        );
        Ok(())
    }

    fn embeddings_path(&self) -> Option<PathBuf> {
        if let Ok(p) = std::env::var(EMBEDDINGS_ENV) {
            return Some(PathBuf::from(p));
        }
        EMBEDDING_CANDIDATES
            .iter()
            .map(|c| self.index_dir.join(c))
            .find(|p| p.exists())
    }

    /// BM25 search with result caching. `k` clamps to 1..100.
    pub fn search(&mut self, query: &str, k: i64) -> Result<SearchResponse> {
        let k = k.clamp(1, 100) as u32;
        self.stats.total_searches += 1;

        let key = cache::search_cache_key(query, k);
        if let Some(mut cached) = self.search_cache.get(&key) {
            cached.cached = true;
            self.stats.search_cache_hits += 1;
            return Ok(cached);
        }

        let resp = self.evaluate(query, k)?;
        self.search_cache.put(&key, resp.clone());
        Ok(resp)
    }

    fn evaluate(&mut self, query: &str, k: u32) -> Result<SearchResponse> {
        let mut resp = SearchResponse::empty(query, k, self.segments.len());

        let base_terms: Vec<String> = text::tokenize(query)
            .into_iter()
            .filter(|t| t.len() >= 2 && !text::is_stopword(t))
            .collect();
        if base_terms.is_empty() || self.segments.is_empty() {
            return Ok(resp);
        }

        let weighted: Vec<(String, f32)> = if self.semantic.enabled {
            self.semantic.expand(
                &base_terms,
                EXPAND_PER_TERM,
                EXPAND_GLOBAL_TOPK,
                EXPAND_MIN_SIM,
                EXPAND_ALPHA,
                EXPAND_MAX_TERMS,
            )
        } else {
            base_terms.into_iter().map(|t| (t, 1.0)).collect()
        };
        if weighted.is_empty() {
            return Ok(resp);
        }

        let mut topk = TopK::new(k as usize);
        // Counts per-segment matches; a document present in several
        // segments counts once per segment since docIds are segment-local.
        let mut total_found = 0u64;

        for (seg_id, seg) in self.segments.iter_mut().enumerate() {
            let scores = query::score_segment(seg, &weighted)?;
            total_found += scores.len() as u64;
            for (doc_id, score) in scores {
                topk.push(Hit {
                    score,
                    seg_id: seg_id as u32,
                    doc_id,
                });
            }
        }
        resp.found = total_found;

        for hit in topk.into_sorted_vec() {
            let seg = &self.segments[hit.seg_id as usize];
            let doc = &seg.docs[hit.doc_id as usize];
            let mut out = SearchHit {
                score: hit.score,
                segment: self.seg_names[hit.seg_id as usize].clone(),
                doc_id: hit.doc_id,
                cord_uid: doc.cord_uid.clone(),
                title: None,
                url: None,
                publish_time: None,
                author: None,
            };

            if let Some(meta) = &self.metadata {
                match meta.fetch(&doc.cord_uid) {
                    Ok(Some(rec)) => {
                        if !rec.title.is_empty() {
                            out.title = Some(rec.title);
                        }
                        // Multi-valued url column: only the first entry.
                        let url = rec.url.split(';').next().unwrap_or("").trim();
                        if !url.is_empty() {
                            out.url = Some(url.to_string());
                        }
                        if !rec.publish_time.is_empty() {
                            out.publish_time = Some(rec.publish_time);
                        }
                        if !rec.author.is_empty() {
                            out.author = Some(rec.author);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(cord_uid = %doc.cord_uid, error = %e, "metadata fetch failed")
                    }
                }
            }

            resp.results.push(out);
        }

        Ok(resp)
    }

    /// Autocomplete suggestions. `limit` clamps to 1..10.
    pub fn suggest(&mut self, user_input: &str, limit: i64) -> SuggestResponse {
        self.stats.suggest_calls += 1;
        let limit = limit.clamp(1, 10) as usize;
        SuggestResponse {
            query: user_input.to_string(),
            limit,
            suggestions: self.autocomplete.suggest(user_input, limit),
        }
    }

    /// Index one new document as a fresh segment and reload.
    pub fn add_document(
        &mut self,
        cord_uid: &str,
        title: &str,
        json_relpath: &str,
        text_content: &str,
    ) -> Result<String> {
        let (term_freqs, doc_len) = text::term_frequencies(text_content);
        if doc_len == 0 {
            return Err(IndexError::EmptyDocument(cord_uid.to_string()).into());
        }

        let meta = DocInfo {
            cord_uid: cord_uid.to_string(),
            title: title.to_string(),
            json_relpath: json_relpath.to_string(),
            doc_len,
        };
        let name = builder::append_document(&self.index_dir, meta, &term_freqs)?;
        self.stats.documents_added += 1;
        self.reload()?;
        Ok(name)
    }

    /// Look up a cached AI summary for a document.
    ///
    /// Unknown uids are a caller error; a known uid without a cached
    /// summary yields `None` (the LLM call itself lives outside the
    /// engine).
    pub fn summary_lookup(&mut self, cord_uid: &str) -> Result<Option<Value>> {
        let known = self
            .metadata
            .as_ref()
            .map(|m| m.contains(cord_uid))
            .unwrap_or(false);
        if !known {
            return Err(SearchError::UnknownDocument(cord_uid.to_string()).into());
        }
        let key = cache::summary_cache_key(cord_uid);
        Ok(self.summary_cache.get(&key).map(mark_from_cache))
    }

    /// Store an AI summary produced by the external service.
    pub fn summary_store(&mut self, cord_uid: &str, value: Value) {
        let key = cache::summary_cache_key(cord_uid);
        self.summary_cache.put(&key, value);
    }

    /// Look up a cached AI overview for a query.
    pub fn overview_lookup(&mut self, query: &str, k: i64) -> Option<Value> {
        let key = cache::search_cache_key(query, k.clamp(1, 100) as u32);
        self.overview_cache.get(&key).map(mark_from_cache)
    }

    /// Store an AI overview produced by the external service.
    pub fn overview_store(&mut self, query: &str, k: i64, value: Value) {
        let key = cache::search_cache_key(query, k.clamp(1, 100) as u32);
        self.overview_cache.put(&key, value);
    }

    /// Persist any dirty caches.
    pub fn flush_caches(&mut self) {
        self.search_cache.flush();
        self.overview_cache.flush();
        self.summary_cache.flush();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.flush_caches();
    }
}

fn mark_from_cache(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("from_cache".to_string(), Value::Bool(true));
    }
    value
}
