//! Segment builder: turns a stream of tokenized documents into an
//! immutable on-disk segment.
//!
//! The writer interns terms in first-seen order, accumulates per-document
//! forward lists and per-term posting lists in memory, then persists the
//! six segment files. Postings are barrelized: the lexicon and inverted
//! data are partitioned by termId range across `BARREL_COUNT` file pairs
//! so no single file has to be held in memory while reading.
//!
//! A segment directory is fully written before its name is appended to
//! the manifest; readers only ever observe the manifest switch.

use crate::binio::{write_f32, write_string, write_u32, write_u64};
use crate::error::{IndexError, Result};
use crate::segment::{
    self, inv_barrel_path, lex_barrel_path, seg_name, write_barrels_manifest, BarrelParams,
    BARREL_COUNT,
};
use crate::types::{DocInfo, Posting, TermId};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

/// In-memory accumulator for one segment.
pub struct SegmentWriter {
    term_to_id: HashMap<String, TermId>,
    id_to_term: Vec<String>,
    /// forward[docId] = (termId, tf) sorted by termId.
    forward: Vec<Vec<(TermId, u32)>>,
    /// inverted[termId] = postings in insertion (docId) order.
    inverted: Vec<Vec<Posting>>,
    docs: Vec<DocInfo>,
    total_len: u64,
}

impl SegmentWriter {
    pub fn new() -> Self {
        Self {
            term_to_id: HashMap::new(),
            id_to_term: Vec::new(),
            forward: Vec::new(),
            inverted: Vec::new(),
            docs: Vec::new(),
            total_len: 0,
        }
    }

    /// Intern a term, assigning the next dense term ID on first sight.
    fn intern_term(&mut self, term: &str) -> TermId {
        if let Some(&id) = self.term_to_id.get(term) {
            return id;
        }
        let id = self.id_to_term.len() as TermId;
        self.term_to_id.insert(term.to_string(), id);
        self.id_to_term.push(term.to_string());
        self.inverted.push(Vec::new());
        id
    }

    /// Ingest one document with its term frequencies.
    ///
    /// `term_freqs` order determines term ID assignment for unseen terms;
    /// the forward list is re-sorted by term ID before storage.
    pub fn add_document(&mut self, meta: DocInfo, term_freqs: &[(String, u32)]) {
        let doc_id = self.docs.len() as u32;
        self.total_len += meta.doc_len as u64;
        self.docs.push(meta);

        let mut fwd = Vec::with_capacity(term_freqs.len());
        for (term, tf) in term_freqs {
            let tid = self.intern_term(term);
            fwd.push((tid, *tf));
            self.inverted[tid as usize].push(Posting { doc_id, tf: *tf });
        }
        fwd.sort_unstable();
        self.forward.push(fwd);
    }

    pub fn doc_count(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn term_count(&self) -> u32 {
        self.id_to_term.len() as u32
    }

    pub fn avgdl(&self) -> f32 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.docs.len() as f32
        }
    }

    /// Persist the segment into `segdir`, creating the directory.
    pub fn write_segment(&mut self, segdir: &Path) -> Result<()> {
        fs::create_dir_all(segdir)?;

        // stats.bin
        {
            let mut out = BufWriter::new(File::create(segdir.join("stats.bin"))?);
            write_u32(&mut out, self.docs.len() as u32)?;
            write_f32(&mut out, self.avgdl())?;
            out.flush()?;
        }

        // docs.bin
        {
            let mut out = BufWriter::new(File::create(segdir.join("docs.bin"))?);
            write_u32(&mut out, self.docs.len() as u32)?;
            for d in &self.docs {
                write_string(&mut out, &d.cord_uid)?;
                write_string(&mut out, &d.title)?;
                write_string(&mut out, &d.json_relpath)?;
                write_u32(&mut out, d.doc_len)?;
            }
            out.flush()?;
        }

        // terms.bin
        {
            let mut out = BufWriter::new(File::create(segdir.join("terms.bin"))?);
            write_u32(&mut out, self.id_to_term.len() as u32)?;
            for t in &self.id_to_term {
                write_string(&mut out, t)?;
            }
            out.flush()?;
        }

        // forward.bin: numDocs, then per doc: count, (termId, tf) * count
        {
            let mut out = BufWriter::new(File::create(segdir.join("forward.bin"))?);
            write_u32(&mut out, self.forward.len() as u32)?;
            for list in &self.forward {
                write_u32(&mut out, list.len() as u32)?;
                for &(tid, tf) in list {
                    write_u32(&mut out, tid)?;
                    write_u32(&mut out, tf)?;
                }
            }
            out.flush()?;
        }

        self.write_barrels(segdir)
    }

    /// Barrelized lexicon + inverted files.
    ///
    /// Each lexicon barrel starts with a placeholder term count that is
    /// patched in place once all terms have been routed.
    fn write_barrels(&mut self, segdir: &Path) -> Result<()> {
        let tcount = self.id_to_term.len() as u32;
        let params = BarrelParams {
            barrel_count: BARREL_COUNT,
            terms_per_barrel: (tcount.div_ceil(BARREL_COUNT)).max(1),
        };
        write_barrels_manifest(segdir, &params)?;

        let mut inv = Vec::with_capacity(params.barrel_count as usize);
        let mut lex = Vec::with_capacity(params.barrel_count as usize);
        let mut offsets = vec![0u64; params.barrel_count as usize];
        let mut term_counts = vec![0u32; params.barrel_count as usize];

        for b in 0..params.barrel_count {
            inv.push(BufWriter::new(File::create(inv_barrel_path(segdir, b))?));
            let mut l = BufWriter::new(File::create(lex_barrel_path(segdir, b))?);
            write_u32(&mut l, 0)?; // placeholder, patched below
            lex.push(l);
        }

        for tid in 0..tcount {
            let plist = &mut self.inverted[tid as usize];
            if plist.is_empty() {
                continue;
            }
            // Already in docId order by construction; enforced before write.
            plist.sort_unstable_by_key(|p| p.doc_id);

            let df = plist.len() as u32;
            let b = segment::barrel_for_term(tid, &params) as usize;
            term_counts[b] += 1;

            write_string(&mut lex[b], &self.id_to_term[tid as usize])?;
            write_u32(&mut lex[b], tid)?;
            write_u32(&mut lex[b], df)?;
            write_u64(&mut lex[b], offsets[b])?;
            write_u32(&mut lex[b], df)?;

            for p in plist.iter() {
                write_u32(&mut inv[b], p.doc_id)?;
                write_u32(&mut inv[b], p.tf)?;
            }
            offsets[b] += df as u64 * 8;
        }

        for mut w in inv {
            w.flush()?;
        }
        for mut w in lex {
            w.flush()?;
        }

        // Patch the real term count into each lexicon barrel header.
        for b in 0..params.barrel_count {
            let mut f = OpenOptions::new()
                .write(true)
                .open(lex_barrel_path(segdir, b))?;
            f.seek(SeekFrom::Start(0))?;
            write_u32(&mut f, term_counts[b as usize])?;
            f.flush()?;
        }

        Ok(())
    }
}

impl Default for SegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a fresh single-document segment and append it to the manifest.
///
/// The segment is fully persisted before the manifest is rewritten, so a
/// failure part-way leaves the manifest (and every reader) untouched.
/// Returns the new segment name; callers trigger an engine reload to pick
/// it up.
pub fn append_document(
    index_dir: &Path,
    meta: DocInfo,
    term_freqs: &[(String, u32)],
) -> Result<String> {
    if meta.doc_len == 0 || term_freqs.is_empty() {
        return Err(IndexError::EmptyDocument(meta.cord_uid).into());
    }

    let manifest_path = index_dir.join("manifest.bin");
    let mut segs = segment::load_manifest(&manifest_path)?;

    let new_id = segs.len() as u32 + 1;
    let name = seg_name(new_id);
    let segdir = index_dir.join("segments").join(&name);

    let mut writer = SegmentWriter::new();
    writer.add_document(meta, term_freqs);
    writer.write_segment(&segdir)?;

    segs.push(name.clone());
    segment::save_manifest(&manifest_path, &segs)?;
    info!(segment = %name, "appended single-document segment");

    Ok(name)
}
