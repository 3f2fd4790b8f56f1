//! Storage layer: the in-memory publication store, write-ahead log entries,
//! and disk snapshots.
//!
//! Durability is provided by the WAL (CRC32 framed, replayed on startup) and
//! bincode snapshots (atomic temp-file + rename).

/// Snapshot save/load with atomic writes.
pub mod persistence;
/// In-memory publication store.
pub mod store;
/// Write-ahead log entries and their on-disk framing.
pub mod wal;

pub use persistence::{load_from_dir, load_snapshot, save_snapshot};
pub use store::{PublicationStore, StoreData};
pub use wal::{replay_file, serialize_and_frame, ReplayStats, WalEntry};
