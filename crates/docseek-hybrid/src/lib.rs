//! docseek-hybrid
//!
//! The retrieval engine: a vector retriever and the lexical index run in
//! parallel, their scores are min-max normalized and fused, an optional
//! cross-encoder reorders the top candidates, and hierarchy / attachment
//! resolvers enrich and filter the final list.
pub mod attachment;
pub mod engine;
pub mod fusion;
pub mod hierarchy;
pub mod rerank;
pub mod retriever;

pub use attachment::AttachmentFilter;
pub use engine::{SearchEngine, SearchMode, SearchRequest, SearchResponse};
pub use hierarchy::{HierarchyFilter, HierarchyGroup};
pub use rerank::RerankerHandle;
pub use retriever::VectorRetriever;
