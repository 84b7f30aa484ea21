use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, merging or serving an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("flush #{seq} to {} failed: {source}", path.display())]
    Flush {
        seq: u32,
        path: PathBuf,
        #[source]
        source: Box<IndexError>,
    },

    #[error("merge failed on segment {} (term {term:?}): {source}", segment.display())]
    Merge {
        segment: PathBuf,
        term: Option<String>,
        #[source]
        source: Box<IndexError>,
    },

    #[error("reading postings for {term:?} failed: {source}")]
    Lookup {
        term: String,
        #[source]
        source: Box<IndexError>,
    },

    #[error("index file missing: {}", .0.display())]
    MissingIndexFile(PathBuf),

    #[error("corrupt index data: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn flush(seq: u32, path: PathBuf, source: IndexError) -> Self {
        IndexError::Flush { seq, path, source: Box::new(source) }
    }

    pub(crate) fn merge(segment: PathBuf, term: Option<String>, source: IndexError) -> Self {
        IndexError::Merge { segment, term, source: Box::new(source) }
    }

    pub(crate) fn lookup(term: &str, source: IndexError) -> Self {
        IndexError::Lookup { term: term.to_string(), source: Box::new(source) }
    }
}
