//! Corpus indexing binary.
//!
//! Builds one index segment from a CORD-19 slice (a directory holding
//! `metadata.csv` and `document_parses/`) and appends it to the manifest
//! of the target index directory. Document JSONs are parsed and tokenized
//! on a small worker pool; the writer ingests them in metadata order so
//! term IDs are assigned deterministically.
//!
//! Usage:
//! ```bash
//! cordex-build <SLICE_ROOT> <INDEX_DIR>
//! ```

use cordex::builder::SegmentWriter;
use cordex::corpus;
use cordex::metadata::csv_split_row;
use cordex::segment;
use cordex::types::DocInfo;
use crossbeam_channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;

/// One metadata row that resolved to an existing document JSON.
struct DocTask {
    idx: usize,
    cord_uid: String,
    title: String,
    json_relpath: String,
    json_path: PathBuf,
}

type ParsedDoc = (Vec<(String, u32)>, u32);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <SLICE_ROOT> <INDEX_DIR>", args[0]);
        eprintln!("Example: {} ./cord19_slice ./index", args[0]);
        std::process::exit(1);
    }
    let slice_root = PathBuf::from(&args[1]);
    let index_dir = PathBuf::from(&args[2]);

    let tasks = collect_tasks(&slice_root)?;
    if tasks.is_empty() {
        eprintln!("No documents could be resolved from metadata.csv paths");
        std::process::exit(1);
    }
    println!("Resolved {} documents from metadata.csv", tasks.len());

    let parsed = parse_documents(tasks)?;

    let mut writer = SegmentWriter::new();
    let mut skipped = 0usize;
    for (task, doc) in &parsed {
        match doc {
            Some((term_freqs, doc_len)) => {
                writer.add_document(
                    DocInfo {
                        cord_uid: task.cord_uid.clone(),
                        title: task.title.clone(),
                        json_relpath: task.json_relpath.clone(),
                        doc_len: *doc_len,
                    },
                    term_freqs,
                );
            }
            None => skipped += 1,
        }
    }

    if writer.doc_count() == 0 {
        eprintln!("No documents produced indexable tokens");
        std::process::exit(1);
    }

    // New segment id continues the manifest sequence.
    let manifest_path = index_dir.join("manifest.bin");
    let mut segs = segment::load_manifest(&manifest_path)?;
    let name = segment::seg_name(segs.len() as u32 + 1);
    let segdir = index_dir.join("segments").join(&name);

    println!(
        "Writing segment {} ({} docs, {} terms, avgdl {:.2})...",
        name,
        writer.doc_count(),
        writer.term_count(),
        writer.avgdl()
    );
    writer.write_segment(&segdir)?;

    segs.push(name.clone());
    segment::save_manifest(&manifest_path, &segs)?;

    println!(
        "Done: segment {} linked into {} ({} docs indexed, {} skipped)",
        name,
        manifest_path.display(),
        writer.doc_count(),
        skipped
    );
    Ok(())
}

/// Read metadata.csv and resolve each row's document JSON path.
fn collect_tasks(slice_root: &PathBuf) -> Result<Vec<DocTask>, Box<dyn std::error::Error>> {
    let meta_path = slice_root.join("metadata.csv");
    let mut reader = BufReader::new(File::open(&meta_path)?);

    let mut header = String::new();
    reader.read_line(&mut header)?;
    let cols = csv_split_row(header.trim_end_matches(['\r', '\n']));
    let find = |name: &str| cols.iter().position(|c| c == name);
    let (Some(uid_i), Some(title_i), Some(pdf_i), Some(pmc_i)) = (
        find("cord_uid"),
        find("title"),
        find("pdf_json_files"),
        find("pmc_json_files"),
    ) else {
        return Err(
            "metadata.csv missing required columns (cord_uid,title,pdf_json_files,pmc_json_files)"
                .into(),
        );
    };
    let max_col = uid_i.max(title_i).max(pdf_i).max(pmc_i);

    let mut tasks = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let row = csv_split_row(line.trim_end_matches('\r'));
        if row.len() <= max_col {
            continue;
        }

        let Some(relpath) = corpus::resolve_json_relpath(slice_root, &row[pdf_i], &row[pmc_i])
        else {
            continue;
        };
        tasks.push(DocTask {
            idx: tasks.len(),
            cord_uid: row[uid_i].clone(),
            title: row[title_i].clone(),
            json_path: slice_root.join(&relpath),
            json_relpath: relpath,
        });
    }
    Ok(tasks)
}

/// Parse and tokenize document JSONs on a worker pool, returning results
/// in the original metadata order.
fn parse_documents(
    tasks: Vec<DocTask>,
) -> Result<Vec<(DocTask, Option<ParsedDoc>)>, Box<dyn std::error::Error>> {
    let total = tasks.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    pb.set_message("Parsing document JSONs");

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8);

    let (task_tx, task_rx) = bounded::<(usize, PathBuf)>(total.max(1));
    let (result_tx, result_rx) = bounded::<(usize, Option<ParsedDoc>)>(total.max(1));

    for task in &tasks {
        task_tx.send((task.idx, task.json_path.clone())).ok();
    }
    drop(task_tx); // Signal no more tasks - prevents worker deadlock

    let mut handles = Vec::new();
    for _ in 0..workers {
        let task_rx = task_rx.clone();
        let result_tx = result_tx.clone();
        handles.push(thread::spawn(move || {
            while let Ok((idx, path)) = task_rx.recv() {
                let parsed = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|raw| corpus::index_document_json(&raw));
                if result_tx.send((idx, parsed)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut parsed: Vec<Option<Option<ParsedDoc>>> = (0..total).map(|_| None).collect();
    while let Ok((idx, doc)) = result_rx.recv() {
        parsed[idx] = Some(doc);
        pb.inc(1);
    }
    pb.finish_with_message("Parsed document JSONs");

    for handle in handles {
        if let Err(e) = handle.join() {
            eprintln!("Document parser thread panicked: {:?}", e);
        }
    }

    // Restore metadata order.
    let mut out = Vec::with_capacity(total);
    for task in tasks {
        let doc = parsed[task.idx].take().flatten();
        out.push((task, doc));
    }
    Ok(out)
}
