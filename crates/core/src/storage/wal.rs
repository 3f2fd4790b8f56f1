//! Write-ahead log entry format.
//!
//! Every mutation is appended to the WAL before being applied in memory.
//! Each entry is framed as `[u32 length BE][u32 CRC32 BE][bincode payload]`.
//! Entries carry every server-assigned value (ids, timestamps, image ids) so
//! replaying them rebuilds exactly the state the live requests produced.

use crate::publication::{
    BlockchainPatch, Publication, PublicationDraft, PublicationQuestion, PublicationStar,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// A single mutation entry in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    CreatePublication {
        publication: Publication,
    },
    /// Replace every owner-editable field and the image set.
    ReplacePublication {
        publication_id: u64,
        draft: PublicationDraft,
    },
    PatchPublication {
        publication_id: u64,
        patch: BlockchainPatch,
    },
    BlockPublication {
        publication_id: u64,
    },
    StarPublication {
        star: PublicationStar,
    },
    UnstarPublication {
        publication_id: u64,
        user_id: i64,
    },
    AskQuestion {
        publication_id: u64,
        question: PublicationQuestion,
    },
    ReplyQuestion {
        publication_id: u64,
        question_id: u64,
        reply: String,
        replied_at: DateTime<Utc>,
    },
}

impl WalEntry {
    /// The publication the entry mutates.
    pub fn publication_id(&self) -> u64 {
        match self {
            WalEntry::CreatePublication { publication } => publication.id,
            WalEntry::StarPublication { star } => star.publication_id,
            WalEntry::ReplacePublication { publication_id, .. }
            | WalEntry::PatchPublication { publication_id, .. }
            | WalEntry::BlockPublication { publication_id }
            | WalEntry::UnstarPublication { publication_id, .. }
            | WalEntry::AskQuestion { publication_id, .. }
            | WalEntry::ReplyQuestion { publication_id, .. } => *publication_id,
        }
    }

    /// Operation label used in logs and metrics.
    pub fn operation(&self) -> &'static str {
        match self {
            WalEntry::CreatePublication { .. } => "create",
            WalEntry::ReplacePublication { .. } => "replace",
            WalEntry::PatchPublication { .. } => "patch",
            WalEntry::BlockPublication { .. } => "block",
            WalEntry::StarPublication { .. } => "star",
            WalEntry::UnstarPublication { .. } => "unstar",
            WalEntry::AskQuestion { .. } => "ask_question",
            WalEntry::ReplyQuestion { .. } => "reply_question",
        }
    }
}

/// Diagnostic statistics from a WAL replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of entries successfully deserialized.
    pub success: usize,
    /// Number of entries skipped due to deserialization errors (CRC was valid).
    pub skipped: usize,
    /// Number of CRC mismatches encountered (replay stopped).
    pub crc_errors: usize,
    /// Whether replay was terminated by a truncated entry.
    pub truncated: bool,
}

impl ReplayStats {
    /// Whether the log was read to its end without any anomaly.
    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.crc_errors == 0 && !self.truncated
    }
}

/// Serialize a WAL entry into its on-disk frame format:
/// `[u32 len BE][u32 crc32 BE][bincode payload]`.
pub fn serialize_and_frame(entry: &WalEntry) -> io::Result<Vec<u8>> {
    let bytes = bincode::serialize(entry).map_err(|e| io::Error::other(e.to_string()))?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "WAL entry too large"))?;
    let crc = crc32fast::hash(&bytes);

    let mut framed = Vec::with_capacity(8 + bytes.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&crc.to_be_bytes());
    framed.extend_from_slice(&bytes);
    Ok(framed)
}

/// Read all entries from a WAL file sequentially, verifying CRC32 checksums.
///
/// A missing file replays as empty. Replay stops at the first CRC mismatch
/// or truncated frame.
pub fn replay_file(path: &Path) -> io::Result<(Vec<WalEntry>, ReplayStats)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok((Vec::new(), ReplayStats::default()))
        }
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut stats = ReplayStats::default();
    let mut header_buf = [0u8; 8];

    loop {
        match reader.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes([header_buf[0], header_buf[1], header_buf[2], header_buf[3]])
            as usize;
        let stored_crc =
            u32::from_be_bytes([header_buf[4], header_buf[5], header_buf[6], header_buf[7]]);
        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::warn!("WAL truncated mid-entry, stopping replay");
                stats.truncated = true;
                break;
            }
            Err(e) => return Err(e),
        }
        if crc32fast::hash(&data) != stored_crc {
            tracing::warn!("WAL entry CRC mismatch, stopping replay");
            stats.crc_errors += 1;
            break;
        }
        match bincode::deserialize::<WalEntry>(&data) {
            Ok(entry) => {
                entries.push(entry);
                stats.success += 1;
            }
            Err(e) => {
                tracing::warn!("WAL entry deserialization failed, skipping: {}", e);
                stats.skipped += 1;
            }
        }
    }

    Ok((entries, stats))
}
