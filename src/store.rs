use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::model::{CandidateExtraction, CanonicalRecord, FacilityLink, RawRecord, StateLink};

pub const PROCESSED_PREFIX: &str = "processed_";
const JSONL: &str = "jsonl";

/// A raw record paired with its extraction, as written by the extract stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub record: RawRecord,
    pub candidate: CandidateExtraction,
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

// ── Link files ──

/// Overwrites the state link file (with header).
pub fn write_state_links(path: &Path, links: &[StateLink]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    for link in links {
        wtr.serialize(link)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Appends rows to the headerless facility link file.
pub fn append_facility_links(path: &Path, links: &[FacilityLink]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for link in links {
        wtr.serialize(link)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_facility_links(path: &Path) -> Result<Vec<FacilityLink>, StoreError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    let rows = rdr
        .deserialize()
        .collect::<Result<Vec<FacilityLink>, _>>()?;
    Ok(rows)
}

// ── JSON Lines intermediates ──

pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    for (i, item) in items.iter().enumerate() {
        serde_json::to_writer(&mut out, item).map_err(|source| StoreError::Json {
            file: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|source| StoreError::Json {
            file: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        items.push(item);
    }
    Ok(items)
}

/// `*.jsonl` files in `dir` whose name starts with `prefix`, sorted.
pub fn list_jsonl(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, StoreError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|e| e == JSONL)
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    files.sort();
    Ok(files)
}

pub fn processed_path(processed_dir: &Path, raw_file: &Path) -> PathBuf {
    let stem = raw_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("records");
    processed_dir.join(format!("{PROCESSED_PREFIX}{stem}.{JSONL}"))
}

/// Load every readable processed file. Unreadable files are skipped.
///
/// Fails only when nothing at all could be read.
pub fn read_processed_dir(dir: &Path) -> Result<Vec<ProcessedRecord>, StoreError> {
    let files = match list_jsonl(dir, PROCESSED_PREFIX) {
        Ok(files) => files,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot list processed files");
            Vec::new()
        }
    };

    let mut records = Vec::new();
    let mut readable = 0usize;
    for file in &files {
        match read_jsonl::<ProcessedRecord>(file) {
            Ok(rows) => {
                readable += 1;
                info!(file = %file.display(), rows = rows.len(), "Loaded processed file");
                records.extend(rows);
            }
            Err(e) => warn!(file = %file.display(), error = %e, "Could not read processed file"),
        }
    }

    if readable == 0 {
        return Err(StoreError::NoProcessedFiles(dir.to_path_buf()));
    }
    Ok(records)
}

// ── Final output ──

/// Writes the canonical table. The header row is written even when empty.
pub fn write_final(path: &Path, records: &[CanonicalRecord]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(CanonicalRecord::HEADER)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

// ── Tests ──
