pub mod bitap;
pub mod document;
pub mod engine;
pub mod error;
pub mod extended;
pub mod index;
pub mod keys;
pub mod logical;
pub mod ranking;
pub mod searcher;
pub mod storage;
pub mod tokenizer;

// Re-export commonly used types
pub use bitap::{bitap_search, BitapSearcher, MatchOptions, MatchRange, MatchResult};
pub use document::{FieldValue, GetFn};
pub use engine::{EngineOptions, Query, SearchEngine, SearchOptions};
pub use error::{ConfigurationError, Error, QueryError, Result};
pub use index::{create_index, FuzzyIndex, IndexSnapshot};
pub use keys::{Key, KeySpec};
pub use ranking::{MatchDetail, SearchResult, SortFn};
pub use storage::Storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
