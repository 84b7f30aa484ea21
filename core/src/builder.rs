//! Bounded-memory index construction.
//!
//! Observations accumulate in a term -> postings buffer. Once the buffer holds
//! a full chunk of documents and another document arrives, the buffer is
//! written out as a sorted partial segment and cleared.

use crate::config::BuildConfig;
use crate::error::{IndexError, Result};
use crate::index::{normalize_postings, DocId, DocMapping, Posting, PostingList};
use crate::persist::IndexPaths;
use crate::segment::SegmentWriter;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One flush as it happened.
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub seq: u32,
    pub path: PathBuf,
    pub docs: usize,
    pub terms: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub documents: usize,
    pub chunk_size: usize,
    pub peak_buffered_docs: usize,
    pub flushes: Vec<FlushReport>,
}

pub struct BuildOutput {
    pub segments: Vec<PathBuf>,
    pub mapping: DocMapping,
    pub stats: BuildStats,
}

pub struct IndexBuilder {
    paths: IndexPaths,
    chunk_size: usize,
    mapping: DocMapping,
    buffer: HashMap<String, PostingList>,
    buffered_docs: HashSet<DocId>,
    next_seq: u32,
    segments: Vec<PathBuf>,
    stats: BuildStats,
}

impl IndexBuilder {
    /// `total_docs_hint` is the expected corpus size, used to size chunks.
    pub fn new(paths: IndexPaths, config: &BuildConfig, total_docs_hint: usize) -> Result<Self> {
        config.validate()?;
        let chunk_size = config.effective_chunk_size(total_docs_hint);
        fs::create_dir_all(paths.segments_dir())?;
        info!(chunk_size, total_docs_hint, "index builder ready");
        Ok(Self {
            paths,
            chunk_size,
            mapping: DocMapping::new(),
            buffer: HashMap::new(),
            buffered_docs: HashSet::new(),
            next_seq: 0,
            segments: Vec::new(),
            stats: BuildStats { chunk_size, ..BuildStats::default() },
        })
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    pub fn mapping(&self) -> &DocMapping { &self.mapping }

    pub fn buffered_docs(&self) -> usize { self.buffered_docs.len() }

    pub fn flush_count(&self) -> usize { self.segments.len() }

    pub fn register_document(&mut self, url: &str) -> DocId { self.mapping.assign(url) }

    /// Register `url` and ingest all of its `(term, important)` observations.
    pub fn add_document<I>(&mut self, url: &str, terms: I) -> Result<DocId>
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        let doc_id = self.register_document(url);
        for (term, important) in terms {
            self.ingest(doc_id, term, important)?;
        }
        Ok(doc_id)
    }

    pub fn ingest(&mut self, doc_id: DocId, term: String, important: bool) -> Result<()> {
        if !self.buffered_docs.contains(&doc_id) {
            if self.buffered_docs.len() >= self.chunk_size {
                self.flush()?;
            }
            self.buffered_docs.insert(doc_id);
            self.stats.peak_buffered_docs =
                self.stats.peak_buffered_docs.max(self.buffered_docs.len());
        }

        let observed = Posting::new(doc_id, important);
        let list = self.buffer.entry(term).or_default();
        match list.last().map(|p| p.doc_id) {
            Some(last) if last == doc_id => {
                if let Some(p) = list.last_mut() {
                    p.absorb(&observed);
                }
            }
            // Interleaved documents: locate the slot instead of appending.
            Some(last) if last > doc_id => match list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                Ok(i) => list[i].absorb(&observed),
                Err(i) => list.insert(i, observed),
            },
            _ => list.push(observed),
        }
        Ok(())
    }

    /// Write the buffer as the next partial segment. No-op when empty.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            self.buffered_docs.clear();
            return Ok(());
        }
        let seq = self.next_seq;
        let path = self.paths.partial_segment(seq);
        let docs = self.buffered_docs.len();
        let terms = self.buffer.len();

        self.write_segment(&path).map_err(|e| IndexError::flush(seq, path.clone(), e))?;

        info!(seq, docs, terms, path = %path.display(), "flushed partial segment");
        self.next_seq += 1;
        self.segments.push(path.clone());
        self.stats.flushes.push(FlushReport { seq, path, docs, terms });
        self.buffer.clear();
        self.buffered_docs.clear();
        Ok(())
    }

    fn write_segment(&mut self, path: &Path) -> Result<()> {
        let mut entries: Vec<(&String, &mut PostingList)> = self.buffer.iter_mut().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        let mut writer = SegmentWriter::create(path)?;
        for (term, postings) in entries {
            normalize_postings(postings);
            writer.write_record(term, postings)?;
        }
        let bytes = writer.finish()?;
        debug!(bytes, "segment bytes written");
        Ok(())
    }

    /// End of stream: flush whatever is left and hand back the segments.
    pub fn finish(mut self) -> Result<BuildOutput> {
        self.flush()?;
        self.stats.documents = self.mapping.len();
        info!(
            documents = self.stats.documents,
            segments = self.segments.len(),
            "ingestion complete"
        );
        Ok(BuildOutput { segments: self.segments, mapping: self.mapping, stats: self.stats })
    }
}
