//! Disk-resident query engine.
//!
//! Only the offset directory, the doc mapping and a bounded LRU of decoded
//! posting lists live in memory. Each cache miss costs one seek and one read
//! of exactly the term's payload.

use crate::config::{EngineConfig, ScoringConfig};
use crate::directory::OffsetDirectory;
use crate::error::{IndexError, Result};
use crate::index::{DocId, DocMapping, PostingList};
use crate::persist::{load_directory, load_doc_mapping, load_meta, IndexPaths, MetaFile};
use crate::segment::read_payload;
use crate::tokenizer::{Analyzer, Normalizer};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub url: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    /// Normalized, deduplicated query terms.
    pub terms: Vec<String>,
    /// Documents matching every term, before the top-k cut.
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    pub bytes_read: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_terms: usize,
    pub cache_capacity: usize,
}

pub struct QueryEngine {
    paths: IndexPaths,
    directory: OffsetDirectory,
    mapping: DocMapping,
    meta: MetaFile,
    normalizer: Box<dyn Normalizer>,
    scoring: ScoringConfig,
    cache: Mutex<LruCache<String, Arc<PostingList>>>,
    bytes_read: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl QueryEngine {
    pub fn open<P: AsRef<Path>>(root: P, config: EngineConfig) -> Result<Self> {
        Self::open_with(root, config, Box::new(Analyzer))
    }

    /// Open with a custom normalizer; it must match the one used at build time.
    pub fn open_with<P: AsRef<Path>>(
        root: P,
        config: EngineConfig,
        normalizer: Box<dyn Normalizer>,
    ) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| IndexError::Config("cache_capacity must be at least 1".into()))?;
        let paths = IndexPaths::new(root);
        let segment_len = match std::fs::metadata(paths.postings()) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::MissingIndexFile(paths.postings()))
            }
            Err(e) => return Err(e.into()),
        };
        let directory = load_directory(&paths)?;
        directory.check_bounds(segment_len)?;
        let mapping = load_doc_mapping(&paths)?;
        let meta = load_meta(&paths)?;
        info!(
            terms = directory.len(),
            docs = mapping.len(),
            cache_capacity = config.cache_capacity,
            root = %paths.root.display(),
            "query engine opened"
        );
        Ok(Self {
            paths,
            directory,
            mapping,
            meta,
            normalizer,
            scoring: config.scoring,
            cache: Mutex::new(LruCache::new(capacity)),
            bytes_read: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &OffsetDirectory { &self.directory }

    pub fn mapping(&self) -> &DocMapping { &self.mapping }

    pub fn meta(&self) -> &MetaFile { &self.meta }

    pub fn num_docs(&self) -> usize { self.mapping.len() }

    pub fn stats(&self) -> EngineStats {
        let cache = self.cache.lock();
        EngineStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cached_terms: cache.len(),
            cache_capacity: cache.cap().get(),
        }
    }

    /// Ranked `(url, score)` hits for documents containing every query term.
    pub fn search(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        Ok(self.execute(text, top_k)?.hits)
    }

    pub fn execute(&self, text: &str, top_k: usize) -> Result<SearchResults> {
        let terms = unique_terms(self.normalizer.normalize(text));
        let mut results = SearchResults { terms, ..SearchResults::default() };
        if results.terms.is_empty() || top_k == 0 {
            return Ok(results);
        }
        // Any unknown term empties an AND query; check before touching disk.
        let missing = results.terms.iter().find(|t| !self.directory.contains(t.as_str())).cloned();
        if let Some(missing) = missing {
            debug!(term = %missing, "term not in vocabulary");
            return Ok(results);
        }

        let mut file: Option<File> = None;
        let mut lists = Vec::with_capacity(results.terms.len());
        for term in &results.terms {
            if let Some(list) = self.resolve(term, &mut file)? {
                lists.push(list);
            }
        }
        if lists.len() < results.terms.len() {
            return Ok(results);
        }

        let candidates = intersect_all(&lists);
        results.total_hits = candidates.len();
        if candidates.is_empty() {
            return Ok(results);
        }

        let scored = self.score(&candidates, &lists);
        results.hits = scored
            .into_iter()
            .take(top_k)
            .filter_map(|(doc_id, score)| {
                self.mapping.url(doc_id).map(|url| SearchHit { doc_id, url: url.to_string(), score })
            })
            .collect();
        Ok(results)
    }

    /// Posting list for one normalized term, empty if the term is unknown.
    pub fn postings(&self, term: &str) -> Result<Arc<PostingList>> {
        let mut file = None;
        Ok(self.resolve(term, &mut file)?.unwrap_or_default())
    }

    fn resolve(&self, term: &str, file: &mut Option<File>) -> Result<Option<Arc<PostingList>>> {
        if let Some(list) = self.cache.lock().get(term).cloned() {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(list));
        }
        let extent = match self.directory.get(term) {
            Some(e) => e,
            None => return Ok(None),
        };
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let f = match file {
            Some(f) => f,
            None => file.insert(File::open(self.paths.postings())?),
        };
        let list = Arc::new(read_payload(f, extent).map_err(|e| IndexError::lookup(term, e))?);
        self.bytes_read.fetch_add(extent.len, Ordering::Relaxed);
        debug!(term, bytes = extent.len, df = list.len(), "posting list loaded from disk");

        self.cache.lock().put(term.to_string(), Arc::clone(&list));
        Ok(Some(list))
    }

    fn score(&self, candidates: &[DocId], lists: &[Arc<PostingList>]) -> Vec<(DocId, f32)> {
        let n = self.num_docs() as f32;
        let mut sums = vec![0.0f32; candidates.len()];
        let mut matched = vec![0usize; candidates.len()];

        for list in lists {
            let df = list.len() as f32;
            let idf = ((n + 1.0) / (df + 1.0)).ln() + 1.0;
            let mut j = 0;
            for (i, doc_id) in candidates.iter().enumerate() {
                while j < list.len() && list[j].doc_id < *doc_id {
                    j += 1;
                }
                if j < list.len() && list[j].doc_id == *doc_id {
                    let p = &list[j];
                    let tf = 1.0 + (p.tf.max(1) as f32).ln();
                    let boost = if p.important { self.scoring.important_boost } else { 1.0 };
                    sums[i] += tf * idf * boost;
                    matched[i] += 1;
                }
            }
        }

        let q = lists.len();
        let norm = (q as f32).sqrt();
        let mut scored: Vec<(DocId, f32)> = candidates
            .iter()
            .zip(sums.into_iter().zip(matched))
            .map(|(doc_id, (sum, hits))| {
                let mut score = sum / norm;
                if hits == q {
                    score *= self.scoring.full_match_bonus;
                }
                (*doc_id, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored
    }
}

fn unique_terms(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

/// Intersect doc ids of all lists, smallest lists first.
fn intersect_all(lists: &[Arc<PostingList>]) -> Vec<DocId> {
    let mut order: Vec<&PostingList> = lists.iter().map(|l| l.as_ref()).collect();
    order.sort_by_key(|l| l.len());
    let mut iter = order.into_iter();
    let mut acc: Vec<DocId> = match iter.next() {
        Some(first) => first.iter().map(|p| p.doc_id).collect(),
        None => return Vec::new(),
    };
    for list in iter {
        if acc.is_empty() {
            break;
        }
        acc = intersect(&acc, list);
    }
    acc
}

fn intersect(acc: &[DocId], list: &PostingList) -> Vec<DocId> {
    let mut out = Vec::with_capacity(acc.len().min(list.len()));
    let (mut i, mut j) = (0, 0);
    while i < acc.len() && j < list.len() {
        match acc[i].cmp(&list[j].doc_id) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(acc[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
