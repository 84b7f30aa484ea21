pub mod builder;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod index;
pub mod merger;
pub mod persist;
pub mod segment;
pub mod tokenizer;

pub use builder::{BuildOutput, BuildStats, FlushReport, IndexBuilder};
pub use config::{BuildConfig, EngineConfig, ScoringConfig};
pub use directory::{Extent, OffsetDirectory};
pub use engine::{EngineStats, QueryEngine, SearchHit, SearchResults};
pub use error::{IndexError, Result};
pub use index::{canonical_url, DocId, DocMapping, Posting, PostingList};
pub use merger::{finalize, merge, MergeOutput};
pub use persist::{IndexPaths, MetaFile};
pub use tokenizer::{Analyzer, Normalizer};
