//! Tokenization and stopword filtering shared by the builder and the
//! query evaluator.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Fixed stopword list excluded from indexing and query terms.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "for", "on", "with", "by", "as", "is", "are",
    "was", "were", "be", "been", "it", "this", "that", "from", "at",
];

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

pub fn is_stopword(token: &str) -> bool {
    stopword_set().contains(token)
}

/// Split text into lowercase ASCII-alphanumeric runs.
///
/// Length and stopword filtering are applied by the caller, matching the
/// index-time and query-time rules.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for b in text.bytes() {
        if b.is_ascii_alphanumeric() {
            cur.push(b.to_ascii_lowercase() as char);
        } else if !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

/// Keep only lowercase ASCII-alphanumeric characters of `s`.
pub fn normalize_token(s: &str) -> String {
    s.bytes()
        .filter(|b| b.is_ascii_alphanumeric())
        .map(|b| b.to_ascii_lowercase() as char)
        .collect()
}

/// Count term frequencies of the indexable tokens in `text`.
///
/// Tokens shorter than two characters and stopwords are dropped. Terms are
/// returned in first-occurrence order so the segment builder assigns dense
/// term IDs deterministically. The second element is `doc_len`, the total
/// number of kept tokens.
pub fn term_frequencies(text: &str) -> (Vec<(String, u32)>, u32) {
    let mut order: Vec<(String, u32)> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut doc_len = 0u32;

    for token in tokenize(text) {
        if token.len() < 2 || is_stopword(&token) {
            continue;
        }
        doc_len += 1;
        match index.get(&token) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(token.clone(), order.len());
                order.push((token, 1));
            }
        }
    }

    (order, doc_len)
}
