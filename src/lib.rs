#![deny(missing_docs)]

//! Core library for trialgate: quality-gated evaluation of product-trial documents and
//! tenant-isolated hybrid search over the results.

/// HTTP routing and REST handlers.
pub mod api;
/// Markdown chunking collaborator.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Dense embedding clients and sparse encoding.
pub mod embedding;
/// Multi-role quality evaluation panel.
pub mod evaluation;
/// Text and markdown extraction collaborator.
pub mod extraction;
/// Language-model client and model-backed collaborators.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Workflow and search counters.
pub mod metrics;
/// Confidence tiers and gate decisions.
pub mod policy;
/// Workflow execution, indexing, and search wiring.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Hybrid retrieval engine.
pub mod search;
/// Quality-gated workflow orchestration.
pub mod workflow;
