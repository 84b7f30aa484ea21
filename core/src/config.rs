use crate::error::{IndexError, Result};

/// Memory budget for the builder, counted in documents.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Corpus size at or below which the whole build runs as a single chunk.
    pub min_chunk: usize,
    /// Minimum number of flushes for corpora larger than `min_chunk`.
    pub target_flush_count: usize,
    /// Fixed chunk size, bypassing the derivation from corpus size.
    pub max_docs_in_memory: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { min_chunk: 300, target_flush_count: 4, max_docs_in_memory: None }
    }
}

impl BuildConfig {
    pub fn with_chunk_size(chunk: usize) -> Self {
        Self { max_docs_in_memory: Some(chunk), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_chunk == 0 {
            return Err(IndexError::Config("min_chunk must be at least 1".into()));
        }
        if self.target_flush_count < 3 {
            return Err(IndexError::Config(format!(
                "target_flush_count must be at least 3, got {}",
                self.target_flush_count
            )));
        }
        if self.max_docs_in_memory == Some(0) {
            return Err(IndexError::Config("max_docs_in_memory must be at least 1".into()));
        }
        Ok(())
    }

    /// Documents held in memory before a flush, given the expected corpus size.
    pub fn effective_chunk_size(&self, total_docs: usize) -> usize {
        if let Some(chunk) = self.max_docs_in_memory {
            return chunk.max(1);
        }
        if total_docs <= self.min_chunk {
            return self.min_chunk;
        }
        (total_docs / self.target_flush_count).max(1)
    }
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Multiplier for postings flagged important.
    pub important_boost: f32,
    /// Multiplier for documents that matched every unique query term.
    pub full_match_bonus: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { important_boost: 2.0, full_match_bonus: 1.2 }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Decoded posting lists kept in the LRU, in terms.
    pub cache_capacity: usize,
    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { cache_capacity: 1000, scoring: ScoringConfig::default() }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(IndexError::Config("cache_capacity must be at least 1".into()));
        }
        if self.scoring.important_boost <= 1.0 {
            return Err(IndexError::Config("important_boost must be greater than 1".into()));
        }
        Ok(())
    }
}
