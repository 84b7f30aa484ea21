#![allow(dead_code)]

use diskdex_core::tokenizer::tokenize;
use diskdex_core::{finalize, BuildConfig, BuildOutput, IndexBuilder, IndexPaths, MergeOutput};
use std::path::Path;

pub struct Page<'a> {
    pub url: &'a str,
    pub body: &'a str,
    pub important: &'a str,
}

pub fn page<'a>(url: &'a str, body: &'a str) -> Page<'a> {
    Page { url, body, important: "" }
}

pub fn observations(p: &Page) -> Vec<(String, bool)> {
    tokenize(p.body)
        .into_iter()
        .map(|t| (t, false))
        .chain(tokenize(p.important).into_iter().map(|t| (t, true)))
        .collect()
}

/// Run the builder only; partial segments stay on disk.
pub fn ingest(dir: &Path, pages: &[Page], config: &BuildConfig) -> BuildOutput {
    let mut builder = IndexBuilder::new(IndexPaths::new(dir), config, pages.len()).unwrap();
    for p in pages {
        builder.add_document(p.url, observations(p)).unwrap();
    }
    builder.finish().unwrap()
}

/// Build, merge and persist a complete index.
pub fn build(dir: &Path, pages: &[Page], config: &BuildConfig) -> (usize, MergeOutput) {
    let out = ingest(dir, pages, config);
    let flushes = out.stats.flushes.len();
    let (merged, _meta) = finalize(out, &IndexPaths::new(dir)).unwrap();
    (flushes, merged)
}

/// A corpus with overlapping vocabularies, deterministic.
pub fn synthetic_corpus(n: usize) -> Vec<(String, String)> {
    let words = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel"];
    (0..n)
        .map(|i| {
            let body: Vec<&str> = words
                .iter()
                .enumerate()
                .filter(|(w, _)| (i + 1) % (w + 2) == 0 || (i * 7 + w) % 5 == 0)
                .map(|(_, s)| *s)
                .collect();
            (format!("https://example.org/page/{i}"), body.join(" "))
        })
        .collect()
}
