//! Random access into the corpus `metadata.csv`.
//!
//! A reload scans the file once and remembers only the byte offset and
//! length of the first row per `cord_uid`; full fields are re-parsed on
//! demand when a hit is being enriched. The row splitter handles quoted
//! fields and `""` escapes but not newlines inside quotes, a limitation
//! inherited from the corpus tooling: supporting them would shift every
//! stored offset.

use crate::error::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Byte position of one metadata row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPos {
    pub file_offset: u64,
    pub row_length: u32,
}

/// Column indices resolved from the CSV header.
#[derive(Debug, Clone, Copy, Default)]
struct Columns {
    cord_uid: usize,
    url: Option<usize>,
    publish_time: Option<usize>,
    authors: Option<usize>,
    title: Option<usize>,
    abstract_text: Option<usize>,
}

/// Metadata fields for one document, parsed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaRecord {
    pub url: String,
    pub publish_time: String,
    /// Derived "Surname et al." form of the authors column.
    pub author: String,
    pub title: String,
    pub abstract_text: String,
}

/// Positional index over `metadata.csv`.
pub struct MetadataTable {
    path: PathBuf,
    columns: Columns,
    uid_to_row: HashMap<String, RowPos>,
}

/// Split one CSV row into columns.
///
/// Commas split only outside double quotes; `""` inside a quoted field
/// yields a literal quote. Embedded newlines are not supported.
pub fn csv_split_row(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;

    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'"' {
            if in_quotes && bytes.get(i + 1) == Some(&b'"') {
                cur.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
        } else if c == b',' && !in_quotes {
            out.push(std::mem::take(&mut cur));
        } else {
            // Copy the full UTF-8 sequence starting at this byte.
            let ch_len = utf8_len(c);
            cur.push_str(&line[i..i + ch_len]);
            i += ch_len;
            continue;
        }
        i += 1;
    }
    out.push(cur);
    out
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

/// Derive "Surname et al." from a `;`-separated authors column.
pub fn first_author_et_al(authors_raw: &str) -> String {
    let first = authors_raw
        .trim()
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .trim();
    if first.is_empty() {
        return String::new();
    }

    // Romanized form inside parentheses wins over the native-script name.
    let mut name = first.to_string();
    if name.starts_with('(') {
        if let Some(close) = name.find(')') {
            let inside = name[1..close].trim().to_string();
            if !inside.is_empty() {
                name = inside;
            }
        }
    }

    let surname = match name.find(',') {
        Some(comma) => name[..comma].trim().to_string(),
        None => name
            .rsplit([' ', '\t'])
            .next()
            .unwrap_or(&name)
            .trim()
            .to_string(),
    };

    if surname.is_empty() {
        String::new()
    } else {
        format!("{} et al.", surname)
    }
}

impl MetadataTable {
    /// Scan the CSV once, remembering where each `cord_uid`'s first row
    /// lives. Later duplicate rows for a uid are ignored.
    pub fn scan(path: &Path) -> Result<MetadataTable> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut header = String::new();
        let header_bytes = reader.read_line(&mut header)?;
        if header_bytes == 0 {
            warn!(path = %path.display(), "metadata CSV is empty");
            return Ok(MetadataTable {
                path: path.to_path_buf(),
                columns: Columns::default(),
                uid_to_row: HashMap::new(),
            });
        }

        let cols = csv_split_row(header.trim_end_matches(['\r', '\n']));
        let find = |name: &str| cols.iter().position(|c| c == name);
        let Some(uid_col) = find("cord_uid") else {
            warn!(path = %path.display(), "metadata CSV missing cord_uid column");
            return Ok(MetadataTable {
                path: path.to_path_buf(),
                columns: Columns::default(),
                uid_to_row: HashMap::new(),
            });
        };
        let columns = Columns {
            cord_uid: uid_col,
            url: find("url"),
            publish_time: find("publish_time"),
            authors: find("authors"),
            title: find("title"),
            abstract_text: find("abstract"),
        };

        let mut uid_to_row: HashMap<String, RowPos> = HashMap::new();
        let mut pos = header_bytes as u64;
        let mut bad = 0usize;
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let row_pos = RowPos {
                file_offset: pos,
                row_length: n as u32,
            };
            pos += n as u64;

            let fields = csv_split_row(line.trim_end_matches(['\r', '\n']));
            if fields.len() <= uid_col {
                bad += 1;
                continue;
            }
            let uid = &fields[uid_col];
            if uid.is_empty() {
                continue;
            }
            uid_to_row.entry(uid.clone()).or_insert(row_pos);
        }

        info!(
            path = %path.display(),
            rows = uid_to_row.len(),
            bad_rows = bad,
            "metadata positions loaded"
        );

        Ok(MetadataTable {
            path: path.to_path_buf(),
            columns,
            uid_to_row,
        })
    }

    pub fn len(&self) -> usize {
        self.uid_to_row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uid_to_row.is_empty()
    }

    pub fn contains(&self, cord_uid: &str) -> bool {
        self.uid_to_row.contains_key(cord_uid)
    }

    pub fn row_pos(&self, cord_uid: &str) -> Option<RowPos> {
        self.uid_to_row.get(cord_uid).copied()
    }

    /// Fetch one document's metadata by seeking to its stored row. The
    /// CSV handle is per-call, so concurrent fetches need no coordination.
    pub fn fetch(&self, cord_uid: &str) -> Result<Option<MetaRecord>> {
        let Some(pos) = self.row_pos(cord_uid) else {
            return Ok(None);
        };

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(pos.file_offset))?;
        let mut buf = vec![0u8; pos.row_length as usize];
        let mut got = 0;
        while got < buf.len() {
            match file.read(&mut buf[got..])? {
                0 => break,
                n => got += n,
            }
        }
        buf.truncate(got);

        let line = String::from_utf8_lossy(&buf);
        let fields = csv_split_row(line.trim_end_matches(['\r', '\n']));

        let field = |idx: Option<usize>| -> String {
            idx.and_then(|i| fields.get(i)).cloned().unwrap_or_default()
        };

        Ok(Some(MetaRecord {
            url: field(self.columns.url),
            publish_time: field(self.columns.publish_time),
            author: first_author_et_al(&field(self.columns.authors)),
            title: field(self.columns.title),
            abstract_text: field(self.columns.abstract_text),
        }))
    }
}
