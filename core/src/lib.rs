pub mod config;
pub mod error;
pub mod index;
pub mod loader;
pub mod manager;
pub mod persist;
pub mod search;
pub mod tokenizer;

pub use config::{CorpusConfig, RepoRoot};
pub use error::{Error, LoaderError, Result};
pub use index::{build, BuildReport, Document, Posting, RebuildSummary, SkippedDocument, Snapshot};
pub use loader::{DocumentSource, MarkdownCorpus};
pub use manager::{build_from, DocumentHit, IndexManager, IndexStatus, SearchOutcome};
pub use search::{search, search_counted, ScoredDoc};
