//! CORD-19 corpus ingestion: turning a paper's JSON parse into the
//! `(cord_uid, title, relpath, term frequencies)` stream the segment
//! builder consumes.

use crate::text;
use serde_json::Value;
use std::path::Path;

/// Concatenate the searchable text fields of a CORD-19 document JSON:
/// `title`, then every `abstract[].text`, then every `body_text[].text`.
pub fn extract_text(doc: &Value) -> String {
    let mut out = String::new();

    if let Some(title) = doc.get("title").and_then(Value::as_str) {
        out.push_str(title);
        out.push('\n');
    }

    for key in ["abstract", "body_text"] {
        let Some(sections) = doc.get(key).and_then(Value::as_array) else {
            continue;
        };
        for sec in sections {
            if let Some(text) = sec.get("text").and_then(Value::as_str) {
                out.push_str(text);
                out.push('\n');
            }
        }
    }

    out
}

/// Tokenize a raw document JSON string into term frequencies.
///
/// Returns `None` when the JSON cannot be parsed or yields no indexable
/// tokens.
pub fn index_document_json(raw: &str) -> Option<(Vec<(String, u32)>, u32)> {
    let doc: Value = serde_json::from_str(raw).ok()?;
    let (tf, doc_len) = text::term_frequencies(&extract_text(&doc));
    (doc_len > 0).then_some((tf, doc_len))
}

/// Pick the first usable relpath from a `;`-separated CSV path column.
///
/// The corpus uses `nan` for absent values; entries that do not exist
/// under `slice_root` are rejected too.
pub fn pick_existing_path(slice_root: &Path, field: &str) -> Option<String> {
    let first = field.split(';').next().unwrap_or("").trim();
    if first.is_empty() || first == "nan" {
        return None;
    }
    slice_root.join(first).exists().then(|| first.to_string())
}

/// Resolve a metadata row's document JSON, preferring the PDF parse over
/// the PMC parse.
pub fn resolve_json_relpath(slice_root: &Path, pdf_field: &str, pmc_field: &str) -> Option<String> {
    pick_existing_path(slice_root, pdf_field).or_else(|| pick_existing_path(slice_root, pmc_field))
}
