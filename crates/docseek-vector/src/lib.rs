//! docseek-vector
//!
//! Vector store adapters behind `docseek_core::traits::VectorStore`.
pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
