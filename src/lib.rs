#![deny(missing_docs)]

//! Core library for the docpipe document ingestion pipeline.

/// Text chunking strategies and chunk assembly.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and batched generation.
pub mod embedding;
/// Extraction orchestration and request lifecycle.
pub mod extraction;
/// Document loading dispatch for the supported formats.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Core data model shared across the pipeline.
pub mod model;
/// Chroma vector store integration.
pub mod store;
