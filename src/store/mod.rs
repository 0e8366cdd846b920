//! Chroma vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::ChromaStore;
pub use types::{SearchError, VectorStoreError};
