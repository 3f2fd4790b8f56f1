//! # publications-core
//!
//! In-memory engine for a rental-listing ("publication") service: the data
//! model, a declarative query-filter registry with a conjunctive composition
//! engine and geodesic distance search, the publication store, write-ahead
//! log entries, snapshots and daily statistics.
//!
//! This is the core library crate with zero async dependencies. The HTTP
//! service lives in `publications-server`.

/// Global configuration constants: limits, defaults, and geodesic parameters.
pub mod config;
/// Error types for filters, store mutations and statistics.
pub mod error;
/// Filter types used by the registry, the composition engine, and the store.
pub mod filter_types;
/// Core data model: publications and their images, questions and stars.
pub mod publication;
/// Listing search: filter registries, query composition, and distance search.
pub mod search;
/// Daily publication statistics.
pub mod stats;
/// Storage layer: the publication store, write-ahead log, and snapshots.
pub mod storage;
