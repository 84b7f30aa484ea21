use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Byte range of one posting-list payload inside the final segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub offset: u64,
    pub len: u64,
}

impl Extent {
    /// One past the last payload byte; `None` if the range overflows.
    pub fn end(&self) -> Option<u64> { self.offset.checked_add(self.len) }
}

/// Term -> extent map. This is the only part of the index held in memory
/// while serving.
#[derive(Debug, Default, Clone)]
pub struct OffsetDirectory {
    entries: HashMap<String, Extent>,
}

impl OffsetDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn from_entries(entries: Vec<(String, Extent)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    pub fn insert(&mut self, term: String, extent: Extent) -> Option<Extent> {
        self.entries.insert(term, extent)
    }

    pub fn get(&self, term: &str) -> Option<Extent> { self.entries.get(term).copied() }

    pub fn contains(&self, term: &str) -> bool { self.entries.contains_key(term) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries ordered by term, the on-disk order.
    pub fn sorted_entries(&self) -> Vec<(String, Extent)> {
        let mut v: Vec<(String, Extent)> =
            self.entries.iter().map(|(t, e)| (t.clone(), *e)).collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }

    /// Every extent must lie inside a segment file of `file_len` bytes.
    pub fn check_bounds(&self, file_len: u64) -> Result<()> {
        for (term, extent) in &self.entries {
            match extent.end() {
                Some(end) if end <= file_len => {}
                Some(end) => {
                    return Err(IndexError::Corrupt(format!(
                        "term {term:?} extends to byte {end} but segment has {file_len}"
                    )))
                }
                None => {
                    return Err(IndexError::Corrupt(format!(
                        "term {term:?} has overflowing extent {}+{}",
                        extent.offset, extent.len
                    )))
                }
            }
        }
        Ok(())
    }
}
