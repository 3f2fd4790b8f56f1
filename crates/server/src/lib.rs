//! publications-server: HTTP server for rental publications.
//!
//! Provides the REST API and the async WAL.
//! Listing, search and persistence logic lives in `publications-core`.

/// REST API layer: Axum router, HTTP handlers, models, metrics.
pub mod api;
/// Async Write-Ahead Log with group commit (tokio-based).
pub mod wal_async;
