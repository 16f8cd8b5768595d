//! Vector search over pluggable backends, with MMR reranking.

mod engine;
pub mod filter;
mod hash_embedder;
mod in_memory;
pub mod mmr;
pub mod similarity;

pub use engine::{Candidate, SearchBackend, SearchEngine, SearchPlan};
pub use hash_embedder::HashEmbedder;
pub use in_memory::{InMemorySearchBackend, IndexedRow};
