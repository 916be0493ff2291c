//! Integration tests for the cordex library.
//!
//! These cover the full paths: building segments, reloading the engine,
//! ranked search, autocomplete, semantic expansion, appends, and cache
//! persistence.

use cordex::builder::{append_document, SegmentWriter};
use cordex::cache::LruCache;
use cordex::engine::Engine;
use cordex::query;
use cordex::segment::{self, Segment};
use cordex::semantic::SemanticIndex;
use cordex::types::{DocInfo, Posting};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn doc(uid: &str, title: &str, doc_len: u32) -> DocInfo {
    DocInfo {
        cord_uid: uid.to_string(),
        title: title.to_string(),
        json_relpath: format!("document_parses/{}.json", uid),
        doc_len,
    }
}

fn tf(pairs: &[(&str, u32)]) -> Vec<(String, u32)> {
    pairs.iter().map(|(t, c)| (t.to_string(), *c)).collect()
}

/// The three-document corpus used across scenarios:
/// D0 "alpha beta", D1 "beta gamma gamma", D2 "alpha alpha delta".
fn write_minimal_index(index_dir: &Path) {
    let mut w = SegmentWriter::new();
    w.add_document(doc("d0", "alpha beta", 2), &tf(&[("alpha", 1), ("beta", 1)]));
    w.add_document(
        doc("d1", "beta gamma gamma", 3),
        &tf(&[("beta", 1), ("gamma", 2)]),
    );
    w.add_document(
        doc("d2", "alpha alpha delta", 3),
        &tf(&[("alpha", 2), ("delta", 1)]),
    );
    w.write_segment(&index_dir.join("segments").join("seg_000001"))
        .unwrap();
    segment::save_manifest(
        &index_dir.join("manifest.bin"),
        &["seg_000001".to_string()],
    )
    .unwrap();
}

fn engine_at(tmp: &TempDir) -> Engine {
    let cache_dir = tmp.path().join("caches");
    std::fs::create_dir_all(&cache_dir).unwrap();
    Engine::with_cache_dir(tmp.path(), cache_dir)
}

#[test]
fn test_minimal_index_layout() {
    let tmp = TempDir::new().unwrap();
    write_minimal_index(tmp.path());
    let segdir = tmp.path().join("segments").join("seg_000001");

    let mut seg = Segment::open(&segdir).unwrap();
    assert_eq!(seg.n_docs, 3);
    assert!((seg.avgdl - 8.0 / 3.0).abs() < 1e-5);

    // Term table in first-seen order.
    let terms = segment::read_terms(&segdir).unwrap();
    assert_eq!(terms, vec!["alpha", "beta", "gamma", "delta"]);

    let expect = |seg: &mut Segment, term: &str, postings: &[(u32, u32)]| {
        let entry = seg.lex[term];
        assert_eq!(entry.df as usize, postings.len());
        let got = seg.read_postings(&entry).unwrap();
        let want: Vec<Posting> = postings
            .iter()
            .map(|&(doc_id, tf)| Posting { doc_id, tf })
            .collect();
        assert_eq!(got, want);
    };
    expect(&mut seg, "alpha", &[(0, 1), (2, 2)]);
    expect(&mut seg, "beta", &[(0, 1), (1, 1)]);
    expect(&mut seg, "gamma", &[(1, 2)]);
    expect(&mut seg, "delta", &[(2, 1)]);
}

#[test]
fn test_bm25_ranking_and_scores() {
    let tmp = TempDir::new().unwrap();
    write_minimal_index(tmp.path());
    let mut engine = engine_at(&tmp);
    engine.reload().unwrap();

    let resp = engine.search("alpha gamma", 3).unwrap();
    assert_eq!(resp.found, 3);
    assert_eq!(resp.results.len(), 3);

    // Expected scores straight from the BM25 definition with k1=1.2,
    // b=0.75, idf = ln(((N - df + 0.5) / (df + 0.5)) + 1), N=3,
    // avgdl=8/3.
    let avgdl = 8.0f32 / 3.0;
    let idf_alpha = (((3.0f32 - 2.0 + 0.5) / (2.0 + 0.5)) + 1.0).ln();
    let idf_gamma = (((3.0f32 - 1.0 + 0.5) / (1.0 + 0.5)) + 1.0).ln();
    let tf_part = |tf: f32, dl: f32| {
        tf * (1.2 + 1.0) / (tf + 1.2 * (1.0 - 0.75 + 0.75 * (dl / avgdl)))
    };
    let d0 = idf_alpha * tf_part(1.0, 2.0);
    let d1 = idf_gamma * tf_part(2.0, 3.0);
    let d2 = idf_alpha * tf_part(2.0, 3.0);

    // gamma is the rarer term, so D1 outranks both alpha documents.
    assert!(d1 > d2 && d2 > d0);
    assert_eq!(resp.results[0].cord_uid, "d1");
    assert_eq!(resp.results[1].cord_uid, "d2");
    assert_eq!(resp.results[2].cord_uid, "d0");
    assert!((resp.results[0].score - d1).abs() < 1e-4);
    assert!((resp.results[1].score - d2).abs() < 1e-4);
    assert!((resp.results[2].score - d0).abs() < 1e-4);
}

#[test]
fn test_bm25_single_segment_matches_direct_scoring() {
    let tmp = TempDir::new().unwrap();
    write_minimal_index(tmp.path());
    let segdir = tmp.path().join("segments").join("seg_000001");
    let mut seg = Segment::open(&segdir).unwrap();

    let weighted = vec![("alpha".to_string(), 1.0f32), ("gamma".to_string(), 1.0)];
    let scores = query::score_segment(&mut seg, &weighted).unwrap();
    assert_eq!(scores.len(), 3);
    assert!(scores[&1] > scores[&2]);
    assert!(scores[&2] > scores[&0]);
}

#[test]
fn test_autocomplete_scenarios() {
    let map: std::collections::HashMap<String, u32> =
        [("alpha", 10u32), ("algorithm", 7), ("beta", 5), ("algae", 3)]
            .iter()
            .map(|(t, s)| (t.to_string(), *s))
            .collect();
    let mut ac = cordex::AutocompleteIndex::new();
    ac.build(&map, 3);

    assert_eq!(ac.suggest("al", 10), vec!["alpha", "algorithm", "algae"]);
    assert_eq!(ac.suggest("alg", 10), vec!["algorithm", "algae"]);
    assert!(ac.suggest("z", 10).is_empty());
    assert_eq!(
        ac.suggest("hello al", 10),
        vec!["hello alpha", "hello algorithm", "hello algae"]
    );
}

#[test]
fn test_semantic_expansion_scenario() {
    let idx = SemanticIndex::from_vectors(vec![
        ("alpha".to_string(), vec![1.0, 0.0]),
        ("beta".to_string(), vec![0.9, 0.1]),
        ("gamma".to_string(), vec![0.0, 1.0]),
    ]);
    assert!(idx.enabled);

    let out = idx.expand(&["alpha".to_string()], 2, 0, 0.5, 0.6, 40);
    let weights: std::collections::HashMap<&str, f32> =
        out.iter().map(|(t, w)| (t.as_str(), *w)).collect();

    assert_eq!(weights["alpha"], 1.0);
    // cos(alpha, beta) after normalizing beta = 0.9 / sqrt(0.82).
    let expected = 0.6 * (0.9f32 / 0.82f32.sqrt());
    assert!((weights["beta"] - expected).abs() < 1e-4);
    assert!(!weights.contains_key("gamma"));
}

#[test]
fn test_append_and_reload() {
    let tmp = TempDir::new().unwrap();
    write_minimal_index(tmp.path());

    let before = segment::load_manifest(&tmp.path().join("manifest.bin")).unwrap();
    let name = append_document(
        tmp.path(),
        doc("d3", "alpha epsilon", 2),
        &tf(&[("alpha", 1), ("epsilon", 1)]),
    )
    .unwrap();
    assert_eq!(name, "seg_000002");

    // Manifest is a suffix extension of the previous one.
    let after = segment::load_manifest(&tmp.path().join("manifest.bin")).unwrap();
    assert_eq!(&after[..before.len()], &before[..]);
    assert_eq!(after.len(), before.len() + 1);

    // The fresh segment holds exactly the one document.
    let mut seg = Segment::open(&tmp.path().join("segments").join(&name)).unwrap();
    assert_eq!(seg.n_docs, 1);
    assert_eq!(seg.lex.len(), 2);
    let alpha = seg.lex["alpha"];
    assert_eq!(
        seg.read_postings(&alpha).unwrap(),
        vec![Posting { doc_id: 0, tf: 1 }]
    );
    let epsilon = seg.lex["epsilon"];
    assert_eq!(
        seg.read_postings(&epsilon).unwrap(),
        vec![Posting { doc_id: 0, tf: 1 }]
    );

    // Reload picks up the new segment; "alpha" now matches once per
    // segment occurrence.
    let mut engine = engine_at(&tmp);
    engine.reload().unwrap();
    assert_eq!(engine.segment_count(), 2);

    let resp = engine.search("alpha", 10).unwrap();
    assert_eq!(resp.found, 3);
    let uids: Vec<&str> = resp.results.iter().map(|r| r.cord_uid.as_str()).collect();
    assert!(uids.contains(&"d0"));
    assert!(uids.contains(&"d2"));
    assert!(uids.contains(&"d3"));
}

#[test]
fn test_cache_lru_with_persistence() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("search_cache.json");

    {
        let mut cache: LruCache<Value> = LruCache::open(&path, 2);
        cache.put("K1", json!({"r": 1}));
        cache.put("K2", json!({"r": 2}));
        assert!(cache.get("K1").is_some());
        cache.put("K3", json!({"r": 3})); // evicts K2

        assert!(cache.get("K2").is_none());
        assert!(cache.get("K1").is_some());
        assert!(cache.get("K3").is_some());
        cache.flush();
    }

    // Same hits and misses after restoring from disk.
    let mut cache: LruCache<Value> = LruCache::open(&path, 2);
    assert!(cache.get("K2").is_none());
    assert!(cache.get("K1").is_some());
    assert!(cache.get("K3").is_some());
}

#[test]
fn test_search_cache_survives_engine_restart() {
    let tmp = TempDir::new().unwrap();
    write_minimal_index(tmp.path());
    let cache_dir = tmp.path().join("caches");
    std::fs::create_dir_all(&cache_dir).unwrap();

    {
        let mut engine = Engine::with_cache_dir(tmp.path(), &cache_dir);
        engine.reload().unwrap();
        let resp = engine.search("beta", 5).unwrap();
        assert!(!resp.cached);
        engine.flush_caches();
    }

    let mut engine = Engine::with_cache_dir(tmp.path(), &cache_dir);
    engine.reload().unwrap();
    let resp = engine.search("beta", 5).unwrap();
    assert!(resp.cached);
    assert_eq!(resp.found, 2);
}

#[test]
fn test_corpus_slice_to_search_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let slice = tmp.path();
    std::fs::create_dir_all(slice.join("document_parses")).unwrap();

    let papers = [
        (
            "uid01",
            "Spike protein binding",
            json!({
                "title": "Spike protein binding",
                "abstract": [{"text": "The spike protein binds receptors."}],
                "body_text": [{"text": "Binding affinity measurements."}]
            }),
        ),
        (
            "uid02",
            "Vaccine efficacy",
            json!({
                "title": "Vaccine efficacy",
                "body_text": [{"text": "Vaccine trials show strong efficacy."}]
            }),
        ),
    ];

    let mut writer = SegmentWriter::new();
    let mut meta = std::fs::File::create(slice.join("metadata.csv")).unwrap();
    writeln!(meta, "cord_uid,title,authors,publish_time,url,abstract").unwrap();

    for (uid, title, body) in &papers {
        let rel = format!("document_parses/{}.json", uid);
        std::fs::write(slice.join(&rel), serde_json::to_string(body).unwrap()).unwrap();

        let raw = std::fs::read_to_string(slice.join(&rel)).unwrap();
        let (term_freqs, doc_len) = cordex::corpus::index_document_json(&raw).unwrap();
        writer.add_document(
            DocInfo {
                cord_uid: uid.to_string(),
                title: title.to_string(),
                json_relpath: rel,
                doc_len,
            },
            &term_freqs,
        );

        writeln!(
            meta,
            "{},{},\"Doe, Jane\",2020-05-01,https://example.org/{},Abstract text",
            uid, title, uid
        )
        .unwrap();
    }
    meta.flush().unwrap();

    writer
        .write_segment(&slice.join("segments").join("seg_000001"))
        .unwrap();
    segment::save_manifest(&slice.join("manifest.bin"), &["seg_000001".to_string()]).unwrap();

    let mut engine = engine_at(&tmp);
    engine.reload().unwrap();

    let resp = engine.search("spike receptors", 5).unwrap();
    assert_eq!(resp.results[0].cord_uid, "uid01");
    assert_eq!(resp.results[0].title.as_deref(), Some("Spike protein binding"));
    assert_eq!(resp.results[0].author.as_deref(), Some("Doe et al."));
    assert_eq!(
        resp.results[0].url.as_deref(),
        Some("https://example.org/uid01")
    );

    let resp = engine.search("vaccine", 5).unwrap();
    assert_eq!(resp.results[0].cord_uid, "uid02");

    // Suggest completes from the merged lexicon.
    let sugg = engine.suggest("eff", 5);
    assert_eq!(sugg.suggestions, vec!["efficacy"]);
}

#[test]
fn test_semantic_expansion_changes_ranking_end_to_end() {
    let tmp = TempDir::new().unwrap();

    // d0 mentions "virus", d1 only its neighbor "pathogen".
    let mut w = SegmentWriter::new();
    w.add_document(doc("d0", "", 2), &tf(&[("virus", 1), ("spread", 1)]));
    w.add_document(doc("d1", "", 2), &tf(&[("pathogen", 1), ("spread", 1)]));
    w.write_segment(&tmp.path().join("segments").join("seg_000001"))
        .unwrap();
    segment::save_manifest(&tmp.path().join("manifest.bin"), &["seg_000001".to_string()])
        .unwrap();

    // 12-dimensional embeddings: "pathogen" close to "virus", "spread"
    // orthogonal.
    let emb_path = tmp.path().join("embeddings.vec");
    let mut f = std::fs::File::create(&emb_path).unwrap();
    writeln!(f, "virus 1 0 0 0 0 0 0 0 0 0 0 0").unwrap();
    writeln!(f, "pathogen 0.95 0.05 0 0 0 0 0 0 0 0 0 0").unwrap();
    writeln!(f, "spread 0 0 1 0 0 0 0 0 0 0 0 0").unwrap();
    f.flush().unwrap();

    let mut engine = engine_at(&tmp);
    engine.reload().unwrap();

    let resp = engine.search("virus", 5).unwrap();
    // Expansion pulls in d1 through the "pathogen" neighbor.
    assert_eq!(resp.found, 2);
    let uids: Vec<&str> = resp.results.iter().map(|r| r.cord_uid.as_str()).collect();
    assert_eq!(uids[0], "d0");
    assert!(uids.contains(&"d1"));
    // The directly matching document keeps the higher score.
    assert!(resp.results[0].score > resp.results[1].score);
}
