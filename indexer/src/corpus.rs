use anyhow::Result;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One crawled page as stored on disk.
#[derive(Debug, Deserialize)]
pub struct InputPage {
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "body")]
    pub content: String,
}

/// `*.json` (one page per file) and `*.jsonl` (one page per line) inputs, in
/// a stable order so doc ids are reproducible.
pub fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && is_input(p) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn is_input(p: &Path) -> bool {
    matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl"))
}

fn is_jsonl(p: &Path) -> bool { p.extension().and_then(|s| s.to_str()) == Some("jsonl") }

/// Expected number of pages, used to size the builder's chunks.
pub fn count_pages(files: &[PathBuf]) -> Result<usize> {
    let mut total = 0;
    for f in files {
        if is_jsonl(f) {
            let reader = BufReader::new(File::open(f)?);
            for line in reader.lines() {
                if !line?.trim().is_empty() {
                    total += 1;
                }
            }
        } else {
            total += 1;
        }
    }
    Ok(total)
}

/// Feed every usable page of `file` to `sink`. Unreadable pages are logged
/// and skipped; I/O errors on the file itself are returned.
pub fn for_each_page<F>(file: &Path, mut sink: F) -> Result<()>
where
    F: FnMut(InputPage) -> Result<()>,
{
    if is_jsonl(file) {
        let reader = BufReader::new(File::open(file)?);
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InputPage>(&line) {
                Ok(page) => deliver(page, file, &mut sink)?,
                Err(e) => warn!(file = %file.display(), line = lineno + 1, error = %e, "skipping malformed page"),
            }
        }
    } else {
        let reader = BufReader::new(File::open(file)?);
        match serde_json::from_reader::<_, InputPage>(reader) {
            Ok(page) => deliver(page, file, &mut sink)?,
            Err(e) => warn!(file = %file.display(), error = %e, "skipping malformed page"),
        }
    }
    Ok(())
}

fn deliver<F>(page: InputPage, file: &Path, sink: &mut F) -> Result<()>
where
    F: FnMut(InputPage) -> Result<()>,
{
    if page.url.trim().is_empty() || page.content.trim().is_empty() {
        warn!(file = %file.display(), "skipping page without url or content");
        return Ok(());
    }
    sink(page)
}
