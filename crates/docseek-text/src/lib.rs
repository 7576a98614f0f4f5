//! docseek-text
//!
//! In-memory lexical index: tantivy's analyzer chain for tokenization and a
//! BM25 postings table with tunable `k1`/`b`, published through an
//! atomically swapped snapshot handle.
pub mod analyzer;
pub mod bm25;
pub mod handle;

pub use bm25::{Bm25Params, LexicalIndex};
pub use handle::LexicalIndexHandle;
