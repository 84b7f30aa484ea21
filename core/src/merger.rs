//! External k-way merge of partial segments into the final segment and its
//! offset directory.

use crate::builder::BuildOutput;
use crate::directory::OffsetDirectory;
use crate::error::{IndexError, Result};
use crate::index::{is_strictly_ascending, normalize_postings, PostingList};
use crate::persist::{
    now_rfc3339, remove_meta, save_directory_to, save_doc_mapping_to, save_meta, temp_path,
    IndexPaths, MetaFile, FORMAT_VERSION,
};
use crate::segment::{SegmentReader, SegmentWriter};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug)]
pub struct MergeOutput {
    pub final_path: PathBuf,
    pub directory: OffsetDirectory,
    pub terms: u64,
    pub segments_merged: usize,
    /// Terms whose concatenated lists had to be re-sorted by doc id.
    pub resorted_terms: u64,
}

/// Head record of one input segment.
struct Head {
    term: String,
    postings: PostingList,
    source: usize,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for smallest term, then lowest source.
        other
            .term
            .cmp(&self.term)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.source == other.source
    }
}

impl Eq for Head {}

struct Inputs {
    readers: Vec<SegmentReader>,
    heap: BinaryHeap<Head>,
}

impl Inputs {
    fn open(segments: &[PathBuf]) -> Result<Self> {
        let mut readers = Vec::with_capacity(segments.len());
        for path in segments {
            let reader =
                SegmentReader::open(path).map_err(|e| IndexError::merge(path.clone(), None, e))?;
            readers.push(reader);
        }
        let mut inputs = Self { readers, heap: BinaryHeap::with_capacity(segments.len()) };
        for source in 0..inputs.readers.len() {
            inputs.advance(source)?;
        }
        Ok(inputs)
    }

    fn advance(&mut self, source: usize) -> Result<()> {
        let reader = &mut self.readers[source];
        match reader.next_record() {
            Ok(Some((term, postings))) => {
                self.heap.push(Head { term, postings, source });
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(IndexError::merge(reader.path().to_path_buf(), None, e)),
        }
    }

    /// Pop every head carrying the smallest term, concatenated in segment order.
    fn next_term(&mut self) -> Result<Option<(String, PostingList, usize)>> {
        let first = match self.heap.pop() {
            Some(h) => h,
            None => return Ok(None),
        };
        let term = first.term;
        let mut postings = first.postings;
        let mut parts = 1;
        self.advance(first.source)?;
        while self.heap.peek().map_or(false, |h| h.term == term) {
            if let Some(h) = self.heap.pop() {
                postings.extend(h.postings);
                parts += 1;
                self.advance(h.source)?;
            }
        }
        Ok(Some((term, postings, parts)))
    }
}

/// Merge `segments` into `paths.postings()` and `paths.directory()`.
///
/// Inputs are only deleted once both outputs are durable. On error the
/// temporary outputs are removed and the inputs are left untouched.
pub fn merge(segments: &[PathBuf], paths: &IndexPaths) -> Result<MergeOutput> {
    let final_path = paths.postings();
    let dir_path = paths.directory();
    let tmp_postings = temp_path(&final_path);
    let tmp_directory = temp_path(&dir_path);

    let result = merge_into(segments, &tmp_postings, &tmp_directory);
    let (directory, resorted_terms) = match result {
        Ok(v) => v,
        Err(e) => {
            discard(&[tmp_postings.as_path(), tmp_directory.as_path()]);
            return Err(e);
        }
    };

    // A half-replaced index must not open; meta.json comes back with finalize.
    remove_meta(paths)?;
    commit(&[
        (tmp_directory.as_path(), dir_path.as_path()),
        (tmp_postings.as_path(), final_path.as_path()),
    ])?;

    for seg in segments {
        if let Err(e) = fs::remove_file(seg) {
            warn!(segment = %seg.display(), error = %e, "could not delete merged segment");
        }
    }
    if let Err(e) = fs::remove_dir(paths.segments_dir()) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %paths.segments_dir().display(), error = %e, "could not remove segment directory");
        }
    }

    let terms = directory.len() as u64;
    info!(
        segments = segments.len(),
        terms,
        resorted_terms,
        path = %final_path.display(),
        "merged partial segments"
    );
    Ok(MergeOutput {
        final_path,
        directory,
        terms,
        segments_merged: segments.len(),
        resorted_terms,
    })
}

/// Persist the doc mapping, merge the build's segments and write `meta.json`.
/// The meta file is written last and marks the index as complete. A failed
/// merge leaves an existing index in the same directory as it was.
pub fn finalize(build: BuildOutput, paths: &IndexPaths) -> Result<(MergeOutput, MetaFile)> {
    fs::create_dir_all(&paths.root)?;
    let mapping_path = paths.doc_mapping();
    let tmp_mapping = temp_path(&mapping_path);
    if let Err(e) = save_doc_mapping_to(&tmp_mapping, &build.mapping) {
        discard(&[tmp_mapping.as_path()]);
        return Err(e);
    }
    let merged = match merge(&build.segments, paths) {
        Ok(m) => m,
        Err(e) => {
            discard(&[tmp_mapping.as_path()]);
            return Err(e);
        }
    };
    commit(&[(tmp_mapping.as_path(), mapping_path.as_path())])?;

    let meta = MetaFile {
        num_docs: build.mapping.len() as u32,
        num_terms: merged.terms,
        partial_segments: build.stats.flushes.len() as u32,
        chunk_size: build.stats.chunk_size as u64,
        created_at: now_rfc3339(),
        version: FORMAT_VERSION,
    };
    save_meta(paths, &meta)?;
    Ok((merged, meta))
}

/// Rename each `(tmp, dest)` pair in order. If one rename fails, every
/// remaining temp file and every destination already renamed is removed.
fn commit(moves: &[(&Path, &Path)]) -> Result<()> {
    for (i, (tmp, dest)) in moves.iter().enumerate() {
        if let Err(e) = fs::rename(tmp, dest) {
            warn!(from = %tmp.display(), to = %dest.display(), error = %e, "rename failed, rolling back");
            let pending: Vec<&Path> = moves[i..].iter().map(|(t, _)| *t).collect();
            let done: Vec<&Path> = moves[..i].iter().map(|(_, d)| *d).collect();
            discard(&pending);
            discard(&done);
            return Err(e.into());
        }
    }
    Ok(())
}

fn discard(files: &[&Path]) {
    for f in files {
        if let Err(e) = fs::remove_file(f) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(file = %f.display(), error = %e, "could not remove file");
            }
        }
    }
}

fn merge_into(
    segments: &[PathBuf],
    postings_path: &Path,
    directory_path: &Path,
) -> Result<(OffsetDirectory, u64)> {
    let mut inputs = Inputs::open(segments)?;
    let mut writer = SegmentWriter::create(postings_path)?;
    let mut directory = OffsetDirectory::new();
    let mut resorted = 0u64;

    while let Some((term, mut postings, parts)) = inputs.next_term()? {
        if parts > 1 && !is_strictly_ascending(&postings) {
            normalize_postings(&mut postings);
            resorted += 1;
        }
        let extent = writer
            .write_record(&term, &postings)
            .map_err(|e| IndexError::merge(postings_path.to_path_buf(), Some(term.clone()), e))?;
        directory.insert(term, extent);
    }

    let len = writer.finish()?;
    directory.check_bounds(len)?;
    save_directory_to(directory_path, &directory)?;
    Ok((directory, resorted))
}
