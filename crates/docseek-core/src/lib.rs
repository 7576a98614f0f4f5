//! docseek-core
//!
//! Shared data model, configuration, errors and the collaborator traits
//! (embedder, vector store, corpus provider, cross-encoder) that the text,
//! vector and hybrid crates plug into.
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod corpus;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
