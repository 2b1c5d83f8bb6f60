//! # Transcript Module
//!
//! Locates Claude Code JSONL transcripts and parses them into
//! [`TranscriptRecord`]s. Files are only ever read here.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::TranscriptRecord;

const TRANSCRIPT_EXT: &str = "jsonl";

/// Find `<base>/projects/*/*.jsonl` under every base directory.
///
/// Bases that don't exist are skipped, as are unreadable entries inside a
/// base; neither stops the scan of the remaining bases. Files are sorted by
/// name within each project directory.
pub fn discover(bases: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for base in bases {
        let root = base.join("projects");
        if !root.is_dir() {
            continue;
        }
        let walker = WalkDir::new(&root)
            .min_depth(2)
            .max_depth(2)
            .follow_links(true)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable transcript entry");
                    continue;
                }
            };
            let path = entry.path();
            let is_transcript = entry.file_type().is_file()
                && path.extension().is_some_and(|ext| ext == TRANSCRIPT_EXT);
            if is_transcript && seen.insert(path.to_path_buf()) {
                files.push(path.to_path_buf());
            }
        }
    }

    files
}

/// Read one transcript, keeping valid records in file order.
///
/// Only failing to open the file is an error. Lines that are not JSON,
/// records without a timestamp or usage, and repeats of an earlier
/// `message.id|requestId` key are dropped. Records with neither id are
/// always kept.
pub fn read_file(path: &Path) -> io::Result<Vec<TranscriptRecord>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "transcript read stopped early"
                );
                break;
            }
        }

        let Ok(record) = serde_json::from_slice::<TranscriptRecord>(&line) else {
            continue;
        };
        if !record.is_valid() {
            continue;
        }
        if let Some(key) = record.dedup_key() {
            if !seen.insert(key) {
                continue;
            }
        }
        records.push(record);
    }

    Ok(records)
}

/// Where the analytics read transcripts from: the discovery bases plus the
/// current session's transcript, which is always included.
#[derive(Debug, Clone, Default)]
pub struct TranscriptSources {
    bases: Vec<PathBuf>,
    current: Option<PathBuf>,
}

impl TranscriptSources {
    pub fn new(bases: Vec<PathBuf>, current: Option<PathBuf>) -> Self {
        Self {
            bases,
            current: current.filter(|p| !p.as_os_str().is_empty()),
        }
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Discovered files, with the session transcript appended if discovery
    /// missed it.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = discover(&self.bases);
        if let Some(current) = &self.current {
            if !files.contains(current) {
                files.push(current.clone());
            }
        }
        files
    }

    /// Records of every file, concatenated file by file. Unreadable files are
    /// skipped. `None` when there are no files at all.
    pub fn read_all(&self) -> Option<Vec<TranscriptRecord>> {
        let files = self.files();
        if files.is_empty() {
            return None;
        }
        let mut records = Vec::new();
        for f in &files {
            match read_file(f) {
                Ok(mut recs) => records.append(&mut recs),
                Err(err) => {
                    tracing::debug!(path = %f.display(), error = %err, "skipping transcript");
                }
            }
        }
        Some(records)
    }
}
