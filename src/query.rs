//! BM25 scoring and top-k aggregation across segments.

use crate::segment::Segment;
use crate::types::DocId;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// BM25 parameter k1 (term frequency saturation).
pub const BM25_K1: f32 = 1.2;

/// BM25 parameter b (length normalization).
pub const BM25_B: f32 = 0.75;

/// BM25 IDF from segment document count and document frequency.
pub fn bm25_idf(n_docs: u32, df: u32) -> f32 {
    let n = n_docs as f32;
    let d = df as f32;
    (((n - d + 0.5) / (d + 0.5)) + 1.0).ln()
}

/// Length-normalized term frequency component.
pub fn bm25_tf(tf: u32, doc_len: u32, avgdl: f32) -> f32 {
    let tf = tf as f32;
    let dl = doc_len as f32;
    let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (dl / avgdl));
    tf * (BM25_K1 + 1.0) / denom
}

/// A scored document, identified by (segment, docId).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub score: f32,
    pub seg_id: u32,
    pub doc_id: DocId,
}

impl Eq for Hit {}

impl Ord for Hit {
    /// Score order with a deterministic tie-break: among equal scores the
    /// hit with the smaller (segId, docId) ranks higher.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seg_id.cmp(&self.seg_id))
            .then_with(|| other.doc_id.cmp(&self.doc_id))
    }
}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded min-heap keeping the best `k` hits seen so far.
pub struct TopK {
    heap: BinaryHeap<Reverse<Hit>>,
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
        }
    }

    /// Offer a hit; keeps it only if it beats the current worst.
    pub fn push(&mut self, hit: Hit) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(Reverse(hit));
        } else if let Some(Reverse(worst)) = self.heap.peek() {
            if hit > *worst {
                self.heap.pop();
                self.heap.push(Reverse(hit));
            }
        }
    }

    /// Drain into a list sorted best-first.
    pub fn into_sorted_vec(self) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self.heap.into_iter().map(|Reverse(h)| h).collect();
        hits.sort_unstable_by(|a, b| b.cmp(a));
        hits
    }
}

/// Accumulate BM25 scores for the weighted query terms over one segment.
///
/// Returns a docId -> score map; its size is the number of documents in
/// this segment matching at least one query term.
pub fn score_segment(
    seg: &mut Segment,
    weighted_terms: &[(String, f32)],
) -> crate::error::Result<HashMap<DocId, f32>> {
    let mut scores: HashMap<DocId, f32> = HashMap::new();

    for (term, weight) in weighted_terms {
        let Some(entry) = seg.lex.get(term).copied() else {
            continue;
        };
        if entry.df == 0 {
            continue;
        }

        let idf = bm25_idf(seg.n_docs, entry.df);
        let postings = seg.read_postings(&entry)?;
        for p in postings {
            let Some(doc) = seg.docs.get(p.doc_id as usize) else {
                continue;
            };
            let s = idf * bm25_tf(p.tf, doc.doc_len, seg.avgdl);
            *scores.entry(p.doc_id).or_insert(0.0) += weight * s;
        }
    }

    Ok(scores)
}
