//! Segment reader: loads stats, docs, and the lexicon, and serves posting
//! list reads from the inverted file(s).
//!
//! Two on-disk layouts are supported. Barrelized segments partition the
//! lexicon and postings by termId range across `lexicon_bNNN.bin` /
//! `inverted_bNNN.bin` pairs described by `barrels.bin`. Legacy segments
//! keep a single `lexicon.bin` / `inverted.bin` pair. The reader prefers
//! barrels when `barrels.bin` and the barrel-0 files exist.

use crate::binio::{read_f32, read_string, read_u32, read_u64, write_string, write_u32};
use crate::error::{IndexError, Result};
use crate::types::{DocInfo, LexEntry, Posting, TermId};
use rand::Rng;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Number of lexicon/postings partitions written per segment.
pub const BARREL_COUNT: u32 = 64;

/// Barrel configuration stored in a segment's `barrels.bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrelParams {
    pub barrel_count: u32,
    pub terms_per_barrel: u32,
}

/// Map a term ID to the barrel that owns it.
pub fn barrel_for_term(term_id: TermId, p: &BarrelParams) -> u32 {
    if p.terms_per_barrel == 0 {
        return 0;
    }
    (term_id / p.terms_per_barrel).min(p.barrel_count - 1)
}

pub fn barrels_manifest_path(segdir: &Path) -> PathBuf {
    segdir.join("barrels.bin")
}

pub fn lex_barrel_path(segdir: &Path, barrel_id: u32) -> PathBuf {
    segdir.join(format!("lexicon_b{:03}.bin", barrel_id))
}

pub fn inv_barrel_path(segdir: &Path, barrel_id: u32) -> PathBuf {
    segdir.join(format!("inverted_b{:03}.bin", barrel_id))
}

/// Whether a segment directory uses the barrelized layout.
pub fn has_barrels(segdir: &Path) -> bool {
    barrels_manifest_path(segdir).exists()
        && inv_barrel_path(segdir, 0).exists()
        && lex_barrel_path(segdir, 0).exists()
}

pub fn write_barrels_manifest(segdir: &Path, p: &BarrelParams) -> Result<()> {
    let path = barrels_manifest_path(segdir);
    let mut out = BufWriter::new(File::create(&path)?);
    write_u32(&mut out, p.barrel_count)?;
    write_u32(&mut out, p.terms_per_barrel)?;
    Ok(())
}

pub fn read_barrels_manifest(segdir: &Path) -> Result<BarrelParams> {
    let path = barrels_manifest_path(segdir);
    let mut r = BufReader::new(open_for_read(&path)?);
    let barrel_count = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
    let terms_per_barrel =
        read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
    if barrel_count == 0 {
        return Err(IndexError::corrupt(&path, "barrel_count is zero").into());
    }
    Ok(BarrelParams {
        barrel_count,
        terms_per_barrel,
    })
}

/// Zero-padded segment directory name for a numeric id.
pub fn seg_name(id: u32) -> String {
    format!("seg_{:06}", id)
}

/// Read the ordered segment list from `manifest.bin`.
///
/// A missing manifest yields an empty list; the engine then falls back to
/// scanning the segments directory.
pub fn load_manifest(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut r = BufReader::new(open_for_read(path)?);
    let n = read_u32(&mut r).map_err(|e| IndexError::corrupt(path, e.to_string()))?;
    let mut segs = Vec::with_capacity(n as usize);
    for _ in 0..n {
        segs.push(read_string(&mut r).map_err(|e| IndexError::corrupt(path, e.to_string()))?);
    }
    Ok(segs)
}

/// Write the segment list to `manifest.bin` through a temp file + rename,
/// so readers never observe a partially written manifest.
pub fn save_manifest(path: &Path, segs: &[String]) -> Result<()> {
    let tmp = path.with_file_name(format!("manifest.bin.tmp-{}", rand_hex(8)));
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        write_u32(&mut out, segs.len() as u32)?;
        for s in segs {
            write_string(&mut out, s)?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn rand_hex(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| char::from_digit(rng.gen_range(0..16u32), 16).unwrap())
        .collect()
}

fn open_for_read(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| IndexError::corrupt(path, e.to_string()).into())
}

/// Open posting streams: one handle for legacy segments, one per barrel
/// otherwise. Handles live as long as the segment and are repositioned
/// per read.
#[derive(Debug)]
enum PostingStreams {
    Legacy(File),
    Barrels {
        params: BarrelParams,
        files: Vec<File>,
    },
}

/// An immutable, self-contained inverted index over part of the corpus.
#[derive(Debug)]
pub struct Segment {
    pub dir: PathBuf,
    /// Number of documents.
    pub n_docs: u32,
    /// Mean indexable-token length over all docs (0 when empty).
    pub avgdl: f32,
    pub docs: Vec<DocInfo>,
    /// term -> posting list location.
    pub lex: HashMap<String, LexEntry>,
    streams: PostingStreams,
}

impl Segment {
    /// Load a segment from its directory.
    pub fn open(segdir: &Path) -> Result<Segment> {
        // stats.bin: only (N, avgdl) are documented; older writers appended
        // per-doc lengths, so trailing bytes are ignored.
        let stats_path = segdir.join("stats.bin");
        let (n_docs, avgdl) = {
            let mut r = BufReader::new(open_for_read(&stats_path)?);
            let n = read_u32(&mut r)
                .map_err(|e| IndexError::corrupt(&stats_path, e.to_string()))?;
            let avgdl = read_f32(&mut r)
                .map_err(|e| IndexError::corrupt(&stats_path, e.to_string()))?;
            (n, avgdl)
        };

        let docs_path = segdir.join("docs.bin");
        let docs = {
            let mut r = BufReader::new(open_for_read(&docs_path)?);
            let n = read_u32(&mut r)
                .map_err(|e| IndexError::corrupt(&docs_path, e.to_string()))?;
            if n != n_docs {
                return Err(IndexError::corrupt(
                    &docs_path,
                    format!("doc count {} does not match stats N {}", n, n_docs),
                )
                .into());
            }
            let mut docs = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let doc = read_doc(&mut r)
                    .map_err(|e| IndexError::corrupt(&docs_path, e.to_string()))?;
                docs.push(doc);
            }
            docs
        };

        let (lex, streams) = if has_barrels(segdir) {
            load_barrels(segdir)?
        } else if segdir.join("lexicon.bin").exists() {
            load_legacy(segdir)?
        } else {
            return Err(IndexError::corrupt(segdir, "no lexicon files found").into());
        };

        Ok(Segment {
            dir: segdir.to_path_buf(),
            n_docs,
            avgdl,
            docs,
            lex,
            streams,
        })
    }

    pub fn uses_barrels(&self) -> bool {
        matches!(self.streams, PostingStreams::Barrels { .. })
    }

    pub fn barrel_params(&self) -> Option<BarrelParams> {
        match &self.streams {
            PostingStreams::Barrels { params, .. } => Some(*params),
            PostingStreams::Legacy(_) => None,
        }
    }

    /// Seek the relevant inverted stream and read a term's posting list.
    ///
    /// A list truncated by EOF contributes the postings that could be read
    /// and logs a warning; that state indicates corruption but must not
    /// abort the query.
    pub fn read_postings(&mut self, entry: &LexEntry) -> Result<Vec<Posting>> {
        let file = match &mut self.streams {
            PostingStreams::Legacy(f) => f,
            PostingStreams::Barrels { files, .. } => {
                files.get_mut(entry.barrel_id as usize).ok_or_else(|| {
                    IndexError::corrupt(
                        &self.dir,
                        format!("lexicon references missing barrel {}", entry.barrel_id),
                    )
                })?
            }
        };

        file.seek(SeekFrom::Start(entry.offset))?;
        let mut buf = vec![0u8; entry.count as usize * 8];
        let got = read_full(file, &mut buf)?;
        let pairs = got / 8;
        if pairs < entry.count as usize {
            warn!(
                segment = %self.dir.display(),
                term_id = entry.term_id,
                expected = entry.count,
                read = pairs,
                "posting list truncated by EOF"
            );
        }

        let mut postings = Vec::with_capacity(pairs);
        for i in 0..pairs {
            let at = i * 8;
            postings.push(Posting {
                doc_id: u32::from_le_bytes(buf[at..at + 4].try_into().unwrap()),
                tf: u32::from_le_bytes(buf[at + 4..at + 8].try_into().unwrap()),
            });
        }
        Ok(postings)
    }
}

fn read_doc<R: Read>(r: &mut R) -> std::io::Result<DocInfo> {
    Ok(DocInfo {
        cord_uid: read_string(r)?,
        title: read_string(r)?,
        json_relpath: read_string(r)?,
        doc_len: read_u32(r)?,
    })
}

fn read_lex_records<R: Read>(
    r: &mut R,
    count: u32,
    barrel_id: u32,
    lex: &mut HashMap<String, LexEntry>,
) -> std::io::Result<()> {
    for _ in 0..count {
        let term = read_string(r)?;
        let entry = LexEntry {
            term_id: read_u32(r)?,
            df: read_u32(r)?,
            offset: read_u64(r)?,
            count: read_u32(r)?,
            barrel_id,
        };
        lex.insert(term, entry);
    }
    Ok(())
}

fn load_barrels(segdir: &Path) -> Result<(HashMap<String, LexEntry>, PostingStreams)> {
    let params = read_barrels_manifest(segdir)?;

    let mut files = Vec::with_capacity(params.barrel_count as usize);
    for b in 0..params.barrel_count {
        files.push(open_for_read(&inv_barrel_path(segdir, b))?);
    }

    let mut lex = HashMap::new();
    for b in 0..params.barrel_count {
        let path = lex_barrel_path(segdir, b);
        let mut r = BufReader::new(open_for_read(&path)?);
        let count = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
        read_lex_records(&mut r, count, b, &mut lex)
            .map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
    }

    Ok((lex, PostingStreams::Barrels { params, files }))
}

fn load_legacy(segdir: &Path) -> Result<(HashMap<String, LexEntry>, PostingStreams)> {
    let path = segdir.join("lexicon.bin");
    let mut r = BufReader::new(open_for_read(&path)?);
    let count = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
    let mut lex = HashMap::new();
    read_lex_records(&mut r, count, 0, &mut lex)
        .map_err(|e| IndexError::corrupt(&path, e.to_string()))?;

    let inv = open_for_read(&segdir.join("inverted.bin"))?;
    Ok((lex, PostingStreams::Legacy(inv)))
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut at = 0;
    while at < buf.len() {
        match r.read(&mut buf[at..])? {
            0 => break,
            n => at += n,
        }
    }
    Ok(at)
}

/// Read a segment's term string table (`terms.bin`).
pub fn read_terms(segdir: &Path) -> Result<Vec<String>> {
    let path = segdir.join("terms.bin");
    let mut r = BufReader::new(open_for_read(&path)?);
    let n = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
    let mut terms = Vec::with_capacity(n as usize);
    for _ in 0..n {
        terms.push(read_string(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?);
    }
    Ok(terms)
}

/// Read a segment's per-document forward lists (`forward.bin`).
pub fn read_forward(segdir: &Path) -> Result<Vec<Vec<(TermId, u32)>>> {
    let path = segdir.join("forward.bin");
    let mut r = BufReader::new(open_for_read(&path)?);
    let n = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
    let mut forward = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let cnt = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
        let mut list = Vec::with_capacity(cnt as usize);
        for _ in 0..cnt {
            let term_id = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
            let tf = read_u32(&mut r).map_err(|e| IndexError::corrupt(&path, e.to_string()))?;
            list.push((term_id, tf));
        }
        forward.push(list);
    }
    Ok(forward)
}
