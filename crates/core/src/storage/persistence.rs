//! Snapshot persistence for the publication store.
//!
//! The whole store is serialized with bincode to a single file. Writes use
//! atomic temp-file + rename to prevent corruption on crash, and a CRC32
//! checksum is appended as a footer: `[payload][magic "PCR1"][u32 CRC32 BE]`.

use crate::config::SNAPSHOT_FILE_NAME;
use crate::storage::store::{PublicationStore, StoreData};
use std::fs;
use std::io;
use std::path::Path;

/// Magic bytes preceding the CRC32 footer.
const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"PCR1";

/// Save the store to `dir`, replacing any previous snapshot atomically.
pub fn save_snapshot(store: &PublicationStore, dir: &Path) -> io::Result<()> {
    let bytes = {
        let data = store.data.read();
        bincode::serialize(&*data).map_err(|e| io::Error::other(e.to_string()))?
    };
    let crc = crc32fast::hash(&bytes);

    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
    }
    let path = dir.join(SNAPSHOT_FILE_NAME);
    let tmp_path = dir.join(format!("{}.tmp", SNAPSHOT_FILE_NAME));

    let mut output = Vec::with_capacity(bytes.len() + 8);
    output.extend_from_slice(&bytes);
    output.extend_from_slice(SNAPSHOT_CRC_MAGIC);
    output.extend_from_slice(&crc.to_be_bytes());

    fs::write(&tmp_path, &output)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&tmp_path, &path)?;

    tracing::info!(
        "Saved snapshot {:?} ({} bytes, CRC32={:#010x})",
        path,
        bytes.len(),
        crc
    );
    Ok(())
}

/// Load a snapshot file, verifying its CRC32 footer and structural integrity.
pub fn load_snapshot(path: &Path) -> io::Result<PublicationStore> {
    let raw = fs::read(path)?;

    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != SNAPSHOT_CRC_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Snapshot {:?} has no CRC32 footer", path),
        ));
    }
    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Snapshot CRC32 mismatch: expected {:#010x}, got {:#010x}. File may be corrupted: {:?}",
                stored_crc, computed_crc, path
            ),
        ));
    }

    let data: StoreData = bincode::deserialize(payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    data.validate().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("snapshot validation failed: {}", e),
        )
    })?;

    tracing::info!(
        "Loaded snapshot {:?} ({} publications)",
        path,
        data.publications.len()
    );
    Ok(PublicationStore::from_data(data))
}

/// Load the snapshot from `dir`, or an empty store when there is none.
pub fn load_from_dir(dir: &Path) -> io::Result<PublicationStore> {
    let path = dir.join(SNAPSHOT_FILE_NAME);
    if !path.exists() {
        return Ok(PublicationStore::new());
    }
    load_snapshot(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{GeoPoint, Publication, PublicationDraft, PublicationImage};
    use crate::storage::wal::WalEntry;
    use chrono::Utc;
    use std::path::PathBuf;

    fn tmp_dir() -> PathBuf {
        let id = uuid::Uuid::new_v4();
        std::env::temp_dir().join(format!("publications_snapshot_test_{id}"))
    }

    fn store_with_one() -> PublicationStore {
        let store = PublicationStore::new();
        let id = store.next_publication_id();
        let draft = PublicationDraft {
            user_id: 8,
            title: "House".into(),
            description: "By the sea".into(),
            rooms: 3,
            beds: 4,
            bathrooms: 2,
            price_per_night: 120.5,
            images: vec![PublicationImage::new("https://img/a.png".into())],
            loc: GeoPoint::new(-38.0, -57.5).unwrap(),
        };
        store
            .apply(&WalEntry::CreatePublication {
                publication: Publication::new(id, draft, Utc::now()),
            })
            .unwrap();
        store
    }

    #[test]
    fn test_save_and_load() {
        let dir = tmp_dir();
        let store = store_with_one();
        save_snapshot(&store, &dir).unwrap();

        let loaded = load_from_dir(&dir).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(1), store.get(1));
        assert_eq!(loaded.next_publication_id(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_snapshot_is_empty_store() {
        let loaded = load_from_dir(&tmp_dir()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_corrupted_snapshot_rejected() {
        let dir = tmp_dir();
        save_snapshot(&store_with_one(), &dir).unwrap();
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let mut raw = fs::read(&path).unwrap();
        raw[0] ^= 0xFF;
        fs::write(&path, &raw).unwrap();

        let err = load_snapshot(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let _ = fs::remove_dir_all(&dir);
    }
}
