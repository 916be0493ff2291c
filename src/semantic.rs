//! Embedding-based query expansion.
//!
//! Word vectors are loaded from a GloVe-style text file (one word and its
//! floats per line, optional "rows dim" header), restricted to terms that
//! actually occur in the index, and L2-normalized so cosine similarity is
//! a plain dot product. Expansion adds per-term nearest neighbors plus
//! neighbors of the query centroid, each with a similarity-derived weight
//! below the original terms' weight of 1.0.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Vectors shorter than this are rejected as junk lines.
const MIN_DIM: usize = 10;

/// Dense L2-normalized word vectors for a subset of the lexicon.
#[derive(Debug, Default)]
pub struct SemanticIndex {
    pub enabled: bool,
    pub dim: usize,
    pub terms: Vec<String>,
    /// Row-major, `terms.len() * dim` floats.
    vecs: Vec<f32>,
    term_to_row: HashMap<String, u32>,
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x = (*x as f64 / norm) as f32;
        }
    }
}

/// Header lines look like "400000 300": exactly two positive integers with
/// a plausible dimension.
fn looks_like_header(line: &str) -> bool {
    let mut it = line.split_whitespace();
    let (Some(a), Some(b), None) = (it.next(), it.next(), it.next()) else {
        return false;
    };
    matches!(
        (a.parse::<i64>(), b.parse::<i64>()),
        (Ok(rows), Ok(dim)) if rows > 0 && dim > 0 && dim < 5000
    )
}

impl SemanticIndex {
    /// Load vectors from a text embeddings file, keeping only `needed`
    /// terms. Returns a disabled index when nothing usable loads.
    pub fn load_from_text(path: &Path, needed: &HashSet<String>) -> std::io::Result<SemanticIndex> {
        let mut index = SemanticIndex::default();
        let reader = BufReader::new(File::open(path)?);

        let mut first_line = true;
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if first_line {
                first_line = false;
                if looks_like_header(&line) {
                    continue;
                }
            }

            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else { continue };
            if !needed.is_empty() && !needed.contains(word) {
                continue;
            }

            let mut v: Vec<f32> = Vec::new();
            let mut bad = false;
            for p in parts {
                match p.parse::<f32>() {
                    Ok(x) => v.push(x),
                    Err(_) => {
                        bad = true;
                        break;
                    }
                }
            }
            if bad || v.len() < MIN_DIM {
                continue;
            }
            if index.dim == 0 {
                index.dim = v.len();
            }
            if v.len() != index.dim {
                continue;
            }

            l2_normalize(&mut v);
            let row = index.terms.len() as u32;
            index.term_to_row.insert(word.to_string(), row);
            index.terms.push(word.to_string());
            index.vecs.extend_from_slice(&v);
        }

        index.enabled = !index.terms.is_empty() && index.dim > 0;
        if index.enabled {
            info!(
                terms = index.terms.len(),
                dim = index.dim,
                path = %path.display(),
                "semantic embeddings loaded"
            );
        }
        Ok(index)
    }

    /// Build an index directly from in-memory vectors. All vectors must
    /// share one dimension; they are L2-normalized on insert.
    pub fn from_vectors(vectors: Vec<(String, Vec<f32>)>) -> SemanticIndex {
        let mut index = SemanticIndex::default();
        for (word, mut v) in vectors {
            if v.is_empty() {
                continue;
            }
            if index.dim == 0 {
                index.dim = v.len();
            }
            if v.len() != index.dim {
                continue;
            }
            l2_normalize(&mut v);
            let row = index.terms.len() as u32;
            index.term_to_row.insert(word.clone(), row);
            index.terms.push(word);
            index.vecs.extend_from_slice(&v);
        }
        index.enabled = !index.terms.is_empty();
        index
    }

    fn row_vec(&self, row: u32) -> &[f32] {
        let start = row as usize * self.dim;
        &self.vecs[start..start + self.dim]
    }

    fn term_vec(&self, term: &str) -> Option<&[f32]> {
        self.term_to_row.get(term).map(|&r| self.row_vec(r))
    }

    /// Top-k rows by cosine similarity to `qvec`, excluding `banned` rows
    /// and anything below `min_sim`. Sorted by (similarity desc, row asc).
    fn most_similar(
        &self,
        qvec: &[f32],
        topk: usize,
        min_sim: f32,
        banned: &HashSet<u32>,
    ) -> Vec<(u32, f32)> {
        if !self.enabled || topk == 0 {
            return Vec::new();
        }

        #[derive(PartialEq)]
        struct Sim(f32, u32);
        impl Eq for Sim {}
        impl Ord for Sim {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0
                    .total_cmp(&other.0)
                    .then_with(|| other.1.cmp(&self.1))
            }
        }
        impl PartialOrd for Sim {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut heap: BinaryHeap<Reverse<Sim>> = BinaryHeap::with_capacity(topk + 1);
        for row in 0..self.terms.len() as u32 {
            if banned.contains(&row) {
                continue;
            }
            let sim = dot(qvec, self.row_vec(row));
            if sim < min_sim {
                continue;
            }
            let cand = Sim(sim, row);
            if heap.len() < topk {
                heap.push(Reverse(cand));
            } else if let Some(Reverse(worst)) = heap.peek() {
                if cand > *worst {
                    heap.pop();
                    heap.push(Reverse(cand));
                }
            }
        }

        let mut out: Vec<(u32, f32)> = heap.into_iter().map(|Reverse(s)| (s.1, s.0)).collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Expand base query terms into a weighted term set.
    ///
    /// Base terms keep weight 1.0. Each base term contributes up to
    /// `per_term` neighbors weighted `clamp(alpha * sim, 0, alpha)`; the
    /// normalized centroid of the base vectors contributes `global_topk`
    /// more at 0.8 of that scale. Collisions keep the maximum weight. The
    /// result is sorted by weight and capped at `max_total_terms`.
    pub fn expand(
        &self,
        base_terms: &[String],
        per_term: usize,
        global_topk: usize,
        min_sim: f32,
        alpha: f32,
        max_total_terms: usize,
    ) -> Vec<(String, f32)> {
        let mut weights: HashMap<String, f32> = HashMap::new();
        for t in base_terms {
            if !t.is_empty() {
                weights.insert(t.clone(), 1.0);
            }
        }

        if !self.enabled || base_terms.is_empty() {
            let mut out: Vec<(String, f32)> = weights.into_iter().collect();
            out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            return out;
        }

        let banned: HashSet<u32> = base_terms
            .iter()
            .filter_map(|t| self.term_to_row.get(t).copied())
            .collect();

        for t in base_terms {
            let Some(v) = self.term_vec(t) else { continue };
            for (row, sim) in self.most_similar(v, per_term, min_sim, &banned) {
                let cand = &self.terms[row as usize];
                let weight = (alpha * sim).clamp(0.0, alpha);
                let w = weights.entry(cand.clone()).or_insert(0.0);
                *w = (*w).max(weight);
            }
        }

        if global_topk > 0 {
            let mut centroid = vec![0.0f32; self.dim];
            let mut cnt = 0usize;
            for t in base_terms {
                if let Some(v) = self.term_vec(t) {
                    for (c, x) in centroid.iter_mut().zip(v) {
                        *c += x;
                    }
                    cnt += 1;
                }
            }
            if cnt > 0 {
                for c in centroid.iter_mut() {
                    *c /= cnt as f32;
                }
                l2_normalize(&mut centroid);
                let scale = 0.8 * alpha;
                for (row, sim) in self.most_similar(&centroid, global_topk, min_sim, &banned) {
                    let cand = &self.terms[row as usize];
                    let weight = (scale * sim).clamp(0.0, scale);
                    let w = weights.entry(cand.clone()).or_insert(0.0);
                    *w = (*w).max(weight);
                }
            }
        }

        let mut out: Vec<(String, f32)> = weights.into_iter().collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(max_total_terms);
        out
    }
}
