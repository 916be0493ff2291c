//! Trie-based prefix autocomplete over the lexicon.
//!
//! Each trie node keeps a small pre-ranked top list, so suggesting costs
//! O(|prefix|). Terms are ranked by score (summed document frequency
//! across segments) with a lexicographic tie-break.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Cand {
    term_index: u32,
    score: u32,
}

#[derive(Debug, Default)]
struct Node {
    next: HashMap<u8, u32>,
    top: Vec<Cand>,
}

/// Autocomplete index rebuilt on every engine reload.
#[derive(Debug, Default)]
pub struct AutocompleteIndex {
    nodes: Vec<Node>,
    terms: Vec<String>,
    scores: Vec<u32>,
    max_top: usize,
}

impl AutocompleteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Build the trie from a term -> score map.
    ///
    /// Terms are normalized (lowercase ASCII alphanumeric) and anything
    /// shorter than two characters is dropped. Insertion follows a global
    /// (score desc, term asc) order so every per-node top list resolves
    /// ties the same way.
    pub fn build(&mut self, term_to_score: &HashMap<String, u32>, max_candidates_per_prefix: usize) {
        self.nodes.clear();
        self.terms.clear();
        self.scores.clear();
        self.max_top = max_candidates_per_prefix.max(1);

        self.nodes.push(Node::default());

        let mut entries: Vec<(String, u32)> = term_to_score
            .iter()
            .filter_map(|(term, &score)| {
                let t = crate::text::normalize_token(term);
                (t.len() >= 2).then_some((t, score))
            })
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (term, score) in entries {
            self.terms.push(term);
            self.scores.push(score);
        }

        for i in 0..self.terms.len() as u32 {
            self.insert_term(i);
        }
    }

    fn insert_term(&mut self, term_index: u32) {
        let term = self.terms[term_index as usize].clone();
        let cand = Cand {
            term_index,
            score: self.scores[term_index as usize],
        };

        let mut node = 0u32;
        Self::update_top(&mut self.nodes[0].top, cand, &self.terms, self.max_top);

        for &b in term.as_bytes() {
            let next = match self.nodes[node as usize].next.get(&b) {
                Some(&n) => n,
                None => {
                    let n = self.nodes.len() as u32;
                    self.nodes.push(Node::default());
                    self.nodes[node as usize].next.insert(b, n);
                    n
                }
            };
            node = next;
            Self::update_top(
                &mut self.nodes[node as usize].top,
                cand,
                &self.terms,
                self.max_top,
            );
        }
    }

    /// Merge a candidate into a node's top list: dedup by term keeping the
    /// higher score, re-rank by (score desc, term asc), cap at `max_top`.
    fn update_top(top: &mut Vec<Cand>, cand: Cand, terms: &[String], max_top: usize) {
        match top.iter_mut().find(|c| c.term_index == cand.term_index) {
            Some(existing) => existing.score = existing.score.max(cand.score),
            None => top.push(cand),
        }
        top.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| terms[a.term_index as usize].cmp(&terms[b.term_index as usize]))
        });
        top.truncate(max_top);
    }

    fn lookup_node(&self, prefix: &str) -> Option<u32> {
        let mut node = 0u32;
        for &b in prefix.as_bytes() {
            node = *self.nodes[node as usize].next.get(&b)?;
        }
        Some(node)
    }

    /// Complete the last token of `user_input`, preserving everything
    /// before it. Returns at most `limit` full query strings.
    pub fn suggest(&self, user_input: &str, limit: usize) -> Vec<String> {
        if self.is_empty() || limit == 0 {
            return Vec::new();
        }

        // Locate the last alphanumeric run in the raw input.
        let bytes = user_input.as_bytes();
        let mut end = bytes.len();
        while end > 0 && !bytes[end - 1].is_ascii_alphanumeric() {
            end -= 1;
        }
        let mut start = end;
        while start > 0 && bytes[start - 1].is_ascii_alphanumeric() {
            start -= 1;
        }

        let base = &user_input[..start];
        let prefix = crate::text::normalize_token(&user_input[start..end]);
        if prefix.is_empty() {
            return Vec::new();
        }

        let Some(node) = self.lookup_node(&prefix) else {
            return Vec::new();
        };

        self.nodes[node as usize]
            .top
            .iter()
            .take(limit)
            .map(|c| format!("{}{}", base, self.terms[c.term_index as usize]))
            .collect()
    }
}
